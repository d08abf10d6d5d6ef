use super::{AtmosGrid, Field, MonthInputs};
use crate::config::Constants;
use crate::error::PhysicsError;
use crate::math::HybridCoefficients;
use ndarray::{ArrayD, IxDyn};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Data conversion error: {0}")]
    ConversionError(String),

    #[error("Invalid vertical coordinate: {0}")]
    Coordinate(#[from] PhysicsError),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

/// Optional 6-hourly fields on hybrid levels
pub const UPPER_AIR_VARIABLES: [&str; 3] = ["ua", "va", "hus"];

/// Monthly surface fields upsampled to 6-hourly
pub const MONTHLY_VARIABLES: [&str; 4] = ["snw", "mrlsl", "ts", "tsl"];

const HYAM_NAMES: [&str; 2] = ["hyam", "a"];
const HYBM_NAMES: [&str; 2] = ["hybm", "b"];
const P0_NAMES: [&str; 2] = ["P0", "p0"];
const GEOPOTENTIAL_NAMES: [&str; 3] = ["zsfc", "PHIS", "orog"];

/// Names a variable may carry inside its file (CMOR name first, CAM history name second)
pub fn variable_aliases(var: &str) -> Vec<&str> {
    let cam = match var {
        "ta" => Some("T"),
        "ps" => Some("PS"),
        "ua" => Some("U"),
        "va" => Some("V"),
        "hus" => Some("Q"),
        "tos" => Some("SST"),
        "sic" => Some("ICEFRAC"),
        "snw" => Some("SNOWHLND"),
        "ts" => Some("TS"),
        "lmask" => Some("LANDFRAC"),
        _ => None,
    };
    std::iter::once(var).chain(cam).collect()
}

/// Reader for per-variable CESM files named `atmos_<var>.nc`.
///
/// Each month is looked up in `<input>/<YYYY>-<MM>/` first, then in the
/// input directory itself. Monthly and daily files may carry a `_1` suffix
/// (`atmos_ts_1.nc`).
#[derive(Debug, Clone)]
pub struct CesmReader {
    pub input_dir: PathBuf,
    pub constants: Constants,
}

impl CesmReader {
    pub fn new(input_dir: impl AsRef<Path>, constants: Constants) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            constants,
        }
    }

    /// Directories searched for one month, most specific first
    fn search_dirs(&self, year: i32, month: u32) -> [PathBuf; 2] {
        [
            self.input_dir.join(format!("{:04}-{:02}", year, month)),
            self.input_dir.clone(),
        ]
    }

    /// Locate the file holding `var` for the given month
    pub fn resolve_path(&self, var: &str, year: i32, month: u32) -> Result<PathBuf, ReaderError> {
        let names = [format!("atmos_{}.nc", var), format!("atmos_{}_1.nc", var)];
        self.search_dirs(year, month)
            .iter()
            .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                ReaderError::FileNotFound(format!(
                    "atmos_{}.nc for {:04}-{:02} under {}",
                    var,
                    year,
                    month,
                    self.input_dir.display()
                ))
            })
    }

    /// Whether an input file for `var` exists for the given month
    pub fn has_variable(&self, var: &str, year: i32, month: u32) -> bool {
        self.resolve_path(var, year, month).is_ok()
    }

    /// Read `var` from its own file
    pub fn read_field(&self, var: &str, year: i32, month: u32) -> Result<Field, ReaderError> {
        let path = self.resolve_path(var, year, month)?;
        debug!("Reading {} from {}", var, path.display());
        let file = netcdf::open(&path)?;
        read_field_from(&file, var, &variable_aliases(var))
    }

    /// Read `var` when its file exists, warning and skipping otherwise
    pub fn read_optional(&self, var: &str, year: i32, month: u32) -> Result<Option<Field>, ReaderError> {
        if !self.has_variable(var, year, month) {
            warn!("No input for {} in {:04}-{:02}, skipping", var, year, month);
            return Ok(None);
        }
        self.read_field(var, year, month).map(Some)
    }

    /// Hybrid coefficients stored alongside the temperature field.
    ///
    /// The configured reference pressure is authoritative; a differing `P0` in
    /// the file is reported.
    pub fn read_coefficients(&self, year: i32, month: u32) -> Result<HybridCoefficients, ReaderError> {
        let path = self.resolve_path("ta", year, month)?;
        let file = netcdf::open(&path)?;

        let hyam = read_vector(&file, &HYAM_NAMES)?;
        let hybm = read_vector(&file, &HYBM_NAMES)?;

        if let Ok(p0) = read_vector(&file, &P0_NAMES) {
            if let Some(&file_p0) = p0.first() {
                if (file_p0 - self.constants.p0).abs() > 1e-6 * self.constants.p0 {
                    warn!(
                        "File reference pressure {} Pa differs from configured {} Pa; using configured value",
                        file_p0, self.constants.p0
                    );
                }
            }
        }

        Ok(HybridCoefficients::with_reference_pressure(
            hyam,
            hybm,
            self.constants.p0,
        )?)
    }

    /// Latitude, longitude and level coordinates from the temperature file
    pub fn read_grid(&self, year: i32, month: u32) -> Result<AtmosGrid, ReaderError> {
        let path = self.resolve_path("ta", year, month)?;
        let file = netcdf::open(&path)?;
        Ok(AtmosGrid {
            lat: read_vector(&file, &["lat", "latitude"])?,
            lon: read_vector(&file, &["lon", "longitude"])?,
            lev: read_vector(&file, &["lev"]).unwrap_or_default(),
        })
    }

    /// Surface geopotential (m²/s²).
    ///
    /// Heights stored in metres (`zsfc`, `orog`, or any variable with
    /// `units = "m"`) are multiplied by g.
    pub fn read_geopotential(&self, year: i32, month: u32) -> Result<Field, ReaderError> {
        let path = GEOPOTENTIAL_NAMES
            .iter()
            .find_map(|name| self.resolve_path(name, year, month).ok())
            .ok_or_else(|| ReaderError::FileNotFound("surface geopotential (atmos_zsfc.nc)".to_string()))?;
        let file = netcdf::open(&path)?;
        let mut field = read_field_from(&file, "phis", &GEOPOTENTIAL_NAMES)?;

        let in_metres = match field.units.as_deref() {
            Some(units) => units.trim() == "m" || units.trim() == "meters",
            None => file.variable("PHIS").is_none(),
        };
        if in_metres {
            debug!("Converting surface height to geopotential");
            let g = self.constants.g as f32;
            field.data.mapv_inplace(|z| z * g);
        }
        field.units = Some("m2 s-2".to_string());
        field.long_name = Some("surface geopotential".to_string());
        Ok(field)
    }

    /// Read every input needed to process one month
    pub fn read_month(&self, year: i32, month: u32) -> Result<MonthInputs, ReaderError> {
        info!("Opening files for {:04}-{:02}", year, month);

        let coefficients = self.read_coefficients(year, month)?;
        let grid = self.read_grid(year, month)?;
        let ta = self.read_field("ta", year, month)?;
        let ps = self.read_field("ps", year, month)?;
        let phis = self.read_geopotential(year, month)?;

        let mut upper_air = Vec::new();
        for var in UPPER_AIR_VARIABLES {
            if let Some(field) = self.read_optional(var, year, month)? {
                upper_air.push(field);
            }
        }

        let mut monthly = Vec::new();
        for var in MONTHLY_VARIABLES {
            if let Some(field) = self.read_optional(var, year, month)? {
                monthly.push(field);
            }
        }

        Ok(MonthInputs {
            grid,
            coefficients,
            ta,
            ps,
            phis,
            upper_air,
            monthly,
            tos: self.read_optional("tos", year, month)?,
            sic: self.read_optional("sic", year, month)?,
            lmask: self.read_optional("lmask", year, month)?,
        })
    }
}

fn find_variable<'f>(file: &'f netcdf::File, names: &[&str]) -> Result<netcdf::Variable<'f>, ReaderError> {
    names
        .iter()
        .find_map(|name| file.variable(name))
        .ok_or_else(|| ReaderError::MissingVariable(names.join("/")))
}

/// Read a 1-d variable as `f64`, trying each name in turn
pub fn read_vector(file: &netcdf::File, names: &[&str]) -> Result<Vec<f64>, ReaderError> {
    let var = find_variable(file, names)?;
    Ok(var.get_values::<f64, _>(..)?)
}

fn string_attribute(var: &netcdf::Variable<'_>, name: &str) -> Option<String> {
    match var.attribute_value(name) {
        Some(Ok(netcdf::AttributeValue::Str(s))) => Some(s),
        _ => None,
    }
}

fn numeric_attribute(var: &netcdf::Variable<'_>, name: &str) -> Option<f64> {
    match var.attribute_value(name) {
        Some(Ok(netcdf::AttributeValue::Float(v))) => Some(f64::from(v)),
        Some(Ok(netcdf::AttributeValue::Double(v))) => Some(v),
        Some(Ok(netcdf::AttributeValue::Short(v))) => Some(f64::from(v)),
        Some(Ok(netcdf::AttributeValue::Int(v))) => Some(f64::from(v)),
        _ => None,
    }
}

/// Read an n-d variable as `f32`, mapping `_FillValue` and `missing_value` to NaN
pub fn read_field_from(file: &netcdf::File, output_name: &str, names: &[&str]) -> Result<Field, ReaderError> {
    let var = find_variable(file, names)?;

    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let values: Vec<f32> = var.get_values::<f32, _>(..)?;

    let mut data = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| ReaderError::ConversionError(format!("{}: {}", var.name(), e)))?;

    let missing: Vec<f32> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|attr| numeric_attribute(&var, attr))
        .map(|v| v as f32)
        .collect();
    if !missing.is_empty() {
        data.mapv_inplace(|v| if missing.contains(&v) { f32::NAN } else { v });
    }

    let mut field = Field::new(output_name, dims, data);
    field.units = string_attribute(&var, "units");
    field.long_name = string_attribute(&var, "long_name");
    debug!("Read {} with shape {:?}", var.name(), field.shape());
    Ok(field)
}
