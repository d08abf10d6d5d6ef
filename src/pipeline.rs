//! Month-by-month conversion of CESM output to pressure levels.

use crate::config::Config;
use crate::data_io::{
    CesmReader, Coordinate, DataWriter, Field, MonthInputs, NetCDFWriter, OutputDataset,
    OutputVariable, ReaderError, WriteError,
};
use crate::error::PhysicsError;
use crate::math::{bottom_level, interpolate_to_pressure, sea_level_pressure};
use crate::regrid::{regrid_seaice, regrid_sst, RegridError, RegridWeights, Regridder};
use crate::time_utils::{monthly_slice, six_hourly_steps, time_units, upsample_to_steps, HOURS_PER_STEP};
use ndarray::{ArrayD, Axis};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Vertical axis of `(time, lev, lat, lon)` fields
const LEVEL_AXIS: Axis = Axis(1);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Regrid(#[from] RegridError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Configuration error: {0}")]
    Config(String),
}

type BoxedRegridder = Box<dyn Regridder + Send + Sync>;

/// Converts each configured month and writes one output file per month
pub struct Pipeline {
    config: Config,
    reader: CesmReader,
    /// Loaded on first use, once the ocean and atmosphere grid shapes are known
    regridder: OnceLock<BoxedRegridder>,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        let reader = CesmReader::new(&config.input_dir, config.constants.clone());
        Ok(Self {
            config,
            reader,
            regridder: OnceLock::new(),
        })
    }

    /// Replace the regridder used for the ocean fields
    pub fn with_regridder(mut self, regridder: impl Regridder + Send + Sync + 'static) -> Self {
        self.regridder = OnceLock::from(Box::new(regridder) as BoxedRegridder);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process every configured month in order, returning the files written
    pub fn run(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let mut written = Vec::new();
        for (year, month) in self.config.months() {
            written.push(self.process_month(year, month)?);
        }
        info!("Processed {} months", written.len());
        Ok(written)
    }

    /// Read, convert and write one month
    pub fn process_month(&self, year: i32, month: u32) -> Result<PathBuf, PipelineError> {
        let start = Instant::now();
        let inputs = self.reader.read_month(year, month)?;
        let dataset = self.build_month(&inputs, year, month)?;

        let path = self
            .config
            .output_path(year, month)
            .map_err(PipelineError::Config)?;
        NetCDFWriter::new(&path).write(&dataset)?;

        info!(
            "Finished {:04}-{:02} in {:.2}s",
            year,
            month,
            start.elapsed().as_secs_f64()
        );
        Ok(path)
    }

    /// Compute every output variable for one month of inputs
    pub fn build_month(
        &self,
        inputs: &MonthInputs,
        year: i32,
        month: u32,
    ) -> Result<OutputDataset, PipelineError> {
        let constants = &self.config.constants;
        let ps = inputs.ps.data.view();
        let ta = inputs.ta.data.view();

        info!("Computing pressure on hybrid levels");
        let pressure = inputs.coefficients.pressure_on_levels(ps.view())?;
        if pressure.shape() != ta.shape() {
            return Err(PhysicsError::Shape(format!(
                "temperature shape {:?} does not match hybrid pressure shape {:?}",
                ta.shape(),
                pressure.shape()
            ))
            .into());
        }

        info!("Computing sea level pressure");
        let pressure_view = pressure.view();
        let temp_bottom = bottom_level(&ta, LEVEL_AXIS)?;
        let pressure_bottom = bottom_level(&pressure_view, LEVEL_AXIS)?;
        let psl = sea_level_pressure(
            temp_bottom,
            inputs.phis.data.view(),
            ps,
            pressure_bottom,
            constants,
        )?;

        let steps = self.time_steps(inputs, month)?;
        let mut dataset = self.coordinates(inputs, year, month, steps)?;

        dataset.variables.push(output_variable(
            "PSL",
            &["time", "lat", "lon"],
            psl,
            "Pa",
            "sea level pressure",
        ));
        dataset.variables.push(output_variable(
            "PRES",
            &["time", "lev", "lat", "lon"],
            pressure.clone(),
            "Pa",
            "pressure on hybrid levels",
        ));

        info!("Interpolating to {} pressure levels", self.config.pressure_levels.len());
        for field in std::iter::once(&inputs.ta).chain(&inputs.upper_air) {
            let on_plev = interpolate_to_pressure(
                field.data.view(),
                pressure.view(),
                &self.config.pressure_levels,
                LEVEL_AXIS,
            )?;
            dataset.variables.push(output_variable(
                &field.name,
                &["time", "plev", "lat", "lon"],
                on_plev,
                field.units.as_deref().unwrap_or(""),
                field.long_name.as_deref().unwrap_or(&field.name),
            ));
        }

        self.add_ocean_fields(&mut dataset, inputs, steps)?;

        for field in &inputs.monthly {
            let record = monthly_slice(field.data.view(), month)?;
            let upsampled = upsample_to_steps(record, steps)?;
            let dims = surface_dims(field, &mut dataset);
            dataset.variables.push(OutputVariable {
                name: field.name.clone(),
                dims,
                data: upsampled,
                units: field.units.clone().unwrap_or_default(),
                long_name: field.long_name.clone().unwrap_or_else(|| field.name.clone()),
            });
        }

        if let Some(lmask) = &inputs.lmask {
            let mask = static_field(&lmask.data);
            dataset.variables.push(output_variable(
                "lmask",
                &["lat", "lon"],
                mask,
                lmask.units.as_deref().unwrap_or("1"),
                "land mask",
            ));
        }

        dataset.validate()?;
        Ok(dataset)
    }

    /// Number of 6-hourly records in the month, taken from the surface pressure
    fn time_steps(&self, inputs: &MonthInputs, month: u32) -> Result<usize, PipelineError> {
        let expected = six_hourly_steps(month)?;
        let actual = inputs.ps.data.shape().first().copied().unwrap_or(0);
        if actual != expected {
            warn!(
                "Surface pressure has {} records, a noleap month {} has {}; following the input",
                actual, month, expected
            );
        }
        if actual == 0 {
            return Err(PhysicsError::Shape("surface pressure has no time records".to_string()).into());
        }
        Ok(actual)
    }

    fn coordinates(
        &self,
        inputs: &MonthInputs,
        year: i32,
        month: u32,
        steps: usize,
    ) -> Result<OutputDataset, PipelineError> {
        let grid = &inputs.grid;
        let lev = if grid.lev.len() == inputs.coefficients.nlev() {
            grid.lev.clone()
        } else {
            (0..inputs.coefficients.nlev()).map(|k| k as f64).collect()
        };

        let mut dataset = OutputDataset {
            coordinates: vec![
                Coordinate::new(
                    "time",
                    (0..steps).map(|i| (i as i64 * HOURS_PER_STEP) as f64).collect(),
                )
                .with_attribute("units", time_units(year, month)?)
                .with_attribute("calendar", "noleap")
                .with_attribute("standard_name", "time"),
                Coordinate::new("lev", lev).with_attribute("long_name", "hybrid level at midpoints"),
                Coordinate::new("plev", self.config.pressure_levels.clone())
                    .with_attribute("units", "Pa")
                    .with_attribute("standard_name", "air_pressure")
                    .with_attribute("positive", "down"),
                Coordinate::new("lat", grid.lat.clone())
                    .with_attribute("units", "degrees_north")
                    .with_attribute("standard_name", "latitude"),
                Coordinate::new("lon", grid.lon.clone())
                    .with_attribute("units", "degrees_east")
                    .with_attribute("standard_name", "longitude"),
            ],
            ..OutputDataset::default()
        };
        dataset
            .global_attributes
            .insert("case".to_string(), self.config.scenario.to_string());
        dataset
            .global_attributes
            .insert("reference_pressure_Pa".to_string(), self.config.constants.p0.to_string());
        Ok(dataset)
    }

    /// Regrid SST and sea ice onto the atmosphere grid and upsample them
    fn add_ocean_fields(
        &self,
        dataset: &mut OutputDataset,
        inputs: &MonthInputs,
        steps: usize,
    ) -> Result<(), PipelineError> {
        let regridder = match self.regridder(inputs)? {
            Some(regridder) => regridder,
            None => return Ok(()),
        };

        let expected = (inputs.grid.lat.len(), inputs.grid.lon.len());
        if regridder.destination_shape() != expected {
            return Err(RegridError::Shape(format!(
                "weights map to {:?} but the atmosphere grid is {:?}",
                regridder.destination_shape(),
                expected
            ))
            .into());
        }

        if let Some(tos) = &inputs.tos {
            info!("Regridding SST");
            let sst = upsample_to_steps(regrid_sst(regridder, tos.data.view())?.view(), steps)?;
            dataset.variables.push(output_variable(
                "SST",
                &["time", "lat", "lon"],
                sst,
                tos.units.as_deref().unwrap_or("degC"),
                "sea surface temperature",
            ));
        }
        if let Some(sic) = &inputs.sic {
            info!("Regridding SEAICE");
            let ice = upsample_to_steps(regrid_seaice(regridder, sic.data.view())?.view(), steps)?;
            dataset.variables.push(output_variable(
                "SEAICE",
                &["time", "lat", "lon"],
                ice,
                "1",
                "sea ice fraction",
            ));
        }
        Ok(())
    }

    /// The configured regridder, loading the weights file on first use.
    ///
    /// Weights written by ESMF or xESMF carry no grid shapes, so the source
    /// shape is taken from the ocean fields and the destination shape from
    /// the atmosphere grid.
    fn regridder(&self, inputs: &MonthInputs) -> Result<Option<&dyn Regridder>, PipelineError> {
        if let Some(regridder) = self.regridder.get() {
            return Ok(Some(&**regridder as &dyn Regridder));
        }

        let ocean = match inputs.tos.as_ref().or(inputs.sic.as_ref()) {
            Some(field) => field,
            None => return Ok(None),
        };
        let path = match &self.config.weights_path {
            Some(path) => path,
            None => {
                warn!("No regridding weights configured, skipping SST and SEAICE");
                return Ok(None);
            }
        };

        let source = trailing_shape(ocean)?;
        let destination = (inputs.grid.lat.len(), inputs.grid.lon.len());
        let weights = RegridWeights::from_netcdf(path, Some((source, destination)))?;
        let _ = self.regridder.set(Box::new(weights));
        Ok(self.regridder.get().map(|regridder| &**regridder as &dyn Regridder))
    }
}

/// Shape of the two trailing (horizontal) axes of a field
fn trailing_shape(field: &Field) -> Result<(usize, usize), PipelineError> {
    match field.data.shape() {
        [.., ny, nx] => Ok((*ny, *nx)),
        shape => Err(PhysicsError::Shape(format!(
            "{} with shape {:?} has no horizontal axes",
            field.name, shape
        ))
        .into()),
    }
}

fn output_variable(
    name: &str,
    dims: &[&str],
    data: ArrayD<f32>,
    units: &str,
    long_name: &str,
) -> OutputVariable {
    OutputVariable {
        name: name.to_string(),
        dims: dims.iter().map(|d| d.to_string()).collect(),
        data,
        units: units.to_string(),
        long_name: long_name.to_string(),
    }
}

/// Output dimensions of a `(time, ..., lat, lon)` surface field.
///
/// Middle axes (soil layers) keep their names and get an index coordinate
/// when the dataset has none yet.
fn surface_dims(field: &Field, dataset: &mut OutputDataset) -> Vec<String> {
    let rank = field.data.ndim();
    let mut dims = Vec::with_capacity(rank);
    for (axis, &len) in field.data.shape().iter().enumerate() {
        let name = if axis == 0 {
            "time".to_string()
        } else if axis + 2 == rank {
            "lat".to_string()
        } else if axis + 1 == rank {
            "lon".to_string()
        } else {
            field
                .dims
                .get(axis)
                .cloned()
                .unwrap_or_else(|| format!("{}_dim{}", field.name, axis))
        };
        if dataset.coordinate(&name).is_none() {
            debug!("Adding index coordinate {} of length {}", name, len);
            dataset
                .coordinates
                .push(Coordinate::new(name.clone(), (0..len).map(|i| i as f64).collect()));
        }
        dims.push(name);
    }
    dims
}

/// Drop leading length-1 axes of a static field so it is `(lat, lon)`
fn static_field(data: &ArrayD<f32>) -> ArrayD<f32> {
    let mut view = data.view();
    while view.ndim() > 2 && view.len_of(Axis(0)) == 1 {
        view = view.index_axis_move(Axis(0), 0);
    }
    view.to_owned()
}
