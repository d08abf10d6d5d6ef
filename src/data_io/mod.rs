pub mod output_trait;
pub mod reader;
pub mod writer;

pub use output_trait::*;
pub use reader::*;
pub use writer::*;

use crate::math::HybridCoefficients;
use ndarray::ArrayD;

/// One variable read from a CESM file
#[derive(Debug, Clone)]
pub struct Field {
    /// Variable name as used in the output (e.g. "ta", "ps")
    pub name: String,
    /// Dimension names in storage order
    pub dims: Vec<String>,
    /// Values with missing data already mapped to NaN
    pub data: ArrayD<f32>,
    /// Units attribute, when the file carries one
    pub units: Option<String>,
    /// Long name attribute, when the file carries one
    pub long_name: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, dims: Vec<String>, data: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            dims,
            data,
            units: None,
            long_name: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = Some(long_name.into());
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

/// Horizontal and vertical coordinates of the atmospheric grid
#[derive(Debug, Clone, Default)]
pub struct AtmosGrid {
    /// Latitudes (degrees north)
    pub lat: Vec<f64>,
    /// Longitudes (degrees east)
    pub lon: Vec<f64>,
    /// Hybrid level coordinate values
    pub lev: Vec<f64>,
}

/// Everything read from disk for one month of processing
#[derive(Debug, Clone)]
pub struct MonthInputs {
    pub grid: AtmosGrid,
    pub coefficients: HybridCoefficients,
    /// 6-hourly temperature `(time, lev, lat, lon)`
    pub ta: Field,
    /// 6-hourly surface pressure `(time, lat, lon)`
    pub ps: Field,
    /// Static surface geopotential (m²/s²)
    pub phis: Field,
    /// Optional 6-hourly 3-d fields (ua, va, hus) present on disk
    pub upper_air: Vec<Field>,
    /// Monthly surface fields (snw, mrlsl, ts, tsl) present on disk
    pub monthly: Vec<Field>,
    /// Daily SST on the ocean grid
    pub tos: Option<Field>,
    /// Daily sea-ice concentration (percent) on the ocean grid
    pub sic: Option<Field>,
    /// Static land mask
    pub lmask: Option<Field>,
}
