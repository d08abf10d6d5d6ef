use ndarray::ArrayD;
use std::collections::HashMap;
use thiserror::Error;

/// Value written in place of NaN
pub const FILL_VALUE: f32 = 1.0e20;

/// Error types for data writing operations
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// A 1-d coordinate variable
#[derive(Debug, Clone)]
pub struct Coordinate {
    pub name: String,
    pub values: Vec<f64>,
    pub attributes: Vec<(String, String)>,
}

impl Coordinate {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }
}

/// A data variable to be written, dimensions named after coordinates
#[derive(Debug, Clone)]
pub struct OutputVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
    pub units: String,
    pub long_name: String,
}

/// Contents of one monthly output file
#[derive(Debug, Clone, Default)]
pub struct OutputDataset {
    /// Coordinates, one dimension each
    pub coordinates: Vec<Coordinate>,
    pub variables: Vec<OutputVariable>,
    pub global_attributes: HashMap<String, String>,
}

impl OutputDataset {
    pub fn coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coordinates.iter().find(|c| c.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&OutputVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Check that every variable's shape agrees with its named coordinates
    pub fn validate(&self) -> Result<(), WriteError> {
        for var in &self.variables {
            if var.dims.len() != var.data.ndim() {
                return Err(WriteError::InvalidData(format!(
                    "{} has {} dimension names for rank {}",
                    var.name,
                    var.dims.len(),
                    var.data.ndim()
                )));
            }
            for (dim, &len) in var.dims.iter().zip(var.data.shape()) {
                let coord = self.coordinate(dim).ok_or_else(|| {
                    WriteError::InvalidData(format!("{} uses unknown dimension {}", var.name, dim))
                })?;
                if coord.values.len() != len {
                    return Err(WriteError::InvalidData(format!(
                        "{}: dimension {} has length {} but data has {}",
                        var.name,
                        dim,
                        coord.values.len(),
                        len
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Generic trait for writing pressure-level output to different formats
pub trait DataWriter {
    /// Write a complete dataset
    fn write(&mut self, dataset: &OutputDataset) -> Result<(), WriteError>;

    /// Output format name
    fn format_name(&self) -> &'static str;
}
