use super::output_trait::{DataWriter, OutputDataset, WriteError, FILL_VALUE};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// NetCDF writer for pressure-level output
pub struct NetCDFWriter {
    pub file_path: PathBuf,
}

impl NetCDFWriter {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }
}

impl DataWriter for NetCDFWriter {
    fn write(&mut self, dataset: &OutputDataset) -> Result<(), WriteError> {
        dataset.validate()?;

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Creating NetCDF file: {}", self.file_path.display());
        let mut file = netcdf::create(&self.file_path)?;

        for coord in &dataset.coordinates {
            file.add_dimension(&coord.name, coord.values.len())?;
        }

        file.add_attribute("title", "CESM output on pressure levels")?;
        file.add_attribute("source", "cesm_h2p hybrid to pressure conversion")?;
        file.add_attribute("Conventions", "CF-1.6")?;
        let creation_time = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        file.add_attribute("history", format!("Created on {}", creation_time))?;
        let mut globals: Vec<_> = dataset.global_attributes.iter().collect();
        globals.sort();
        for (key, value) in globals {
            file.add_attribute(key, value.as_str())?;
        }

        for coord in &dataset.coordinates {
            let mut var = file.add_variable::<f64>(&coord.name, &[coord.name.as_str()])?;
            for (key, value) in &coord.attributes {
                var.put_attribute(key, value.as_str())?;
            }
            var.put_values(&coord.values, ..)?;
        }

        for output in &dataset.variables {
            debug!("Writing {} with shape {:?}", output.name, output.data.shape());
            let dims: Vec<&str> = output.dims.iter().map(String::as_str).collect();
            let mut var = file.add_variable::<f32>(&output.name, &dims)?;
            var.put_attribute("_FillValue", FILL_VALUE)?;
            var.put_attribute("missing_value", FILL_VALUE)?;
            var.put_attribute("units", output.units.as_str())?;
            var.put_attribute("long_name", output.long_name.as_str())?;

            var.put_values(&filled(output.data.iter()), ..)?;
        }

        info!("Successfully created NetCDF file: {}", self.file_path.display());
        Ok(())
    }

    fn format_name(&self) -> &'static str {
        "netcdf"
    }
}

fn filled<'a>(values: impl Iterator<Item = &'a f32>) -> Vec<f32> {
    values.map(|&v| if v.is_nan() { FILL_VALUE } else { v }).collect()
}
