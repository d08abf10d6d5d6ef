//! Application of precomputed horizontal regridding weights.
//!
//! Weights are generated by an external tool (ESMF / xESMF) and stored as
//! sparse `(row, col, S)` triplets with 1-based indices. This module only
//! loads, persists and applies them; it never computes weights.

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use rayon::prelude::*;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum RegridError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("Variable not found in weights file: {0}")]
    MissingVariable(String),

    #[error("Inconsistent weights: {0}")]
    InvalidWeights(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),
}

/// Interpolation method the weights were generated with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegridMethod {
    Bilinear,
    Conservative,
    Patch,
    NearestSourceToDestination,
    NearestDestinationToSource,
}

impl fmt::Display for RegridMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegridMethod::Bilinear => "bilinear",
            RegridMethod::Conservative => "conservative",
            RegridMethod::Patch => "patch",
            RegridMethod::NearestSourceToDestination => "nearest_s2d",
            RegridMethod::NearestDestinationToSource => "nearest_d2s",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for RegridMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bilinear" => Ok(RegridMethod::Bilinear),
            "conservative" | "conserve" => Ok(RegridMethod::Conservative),
            "patch" => Ok(RegridMethod::Patch),
            "nearest_s2d" => Ok(RegridMethod::NearestSourceToDestination),
            "nearest_d2s" => Ok(RegridMethod::NearestDestinationToSource),
            _ => Err(format!("Unknown regrid method: {}", s)),
        }
    }
}

/// Horizontal regridding of the two trailing axes of a field
pub trait Regridder {
    /// Shape `(ny, nx)` of the source grid
    fn source_shape(&self) -> (usize, usize);

    /// Shape `(ny, nx)` of the destination grid
    fn destination_shape(&self) -> (usize, usize);

    /// Regrid `field`, whose two trailing axes must match the source grid.
    /// Leading axes (time, level) are carried through unchanged.
    fn regrid(&self, field: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, RegridError>;
}

/// Sparse regridding weights between two logically rectangular grids
#[derive(Clone, Debug)]
pub struct RegridWeights {
    /// 0-based destination index of each weight
    rows: Vec<usize>,
    /// 0-based source index of each weight
    cols: Vec<usize>,
    weights: Vec<f64>,
    src_shape: (usize, usize),
    dst_shape: (usize, usize),
    pub method: RegridMethod,
    pub periodic: bool,
    pub unmapped_to_nan: bool,
    /// Destination cells receiving at least one weight
    mapped: Vec<bool>,
}

impl RegridWeights {
    /// Build weights from 0-based `(row, col, S)` triplets
    pub fn from_triplets(
        rows: Vec<usize>,
        cols: Vec<usize>,
        weights: Vec<f64>,
        src_shape: (usize, usize),
        dst_shape: (usize, usize),
        method: RegridMethod,
    ) -> Result<Self, RegridError> {
        if rows.len() != cols.len() || rows.len() != weights.len() {
            return Err(RegridError::InvalidWeights(format!(
                "row/col/S lengths differ: {}/{}/{}",
                rows.len(),
                cols.len(),
                weights.len()
            )));
        }

        let n_src = src_shape.0 * src_shape.1;
        let n_dst = dst_shape.0 * dst_shape.1;
        if let Some(&row) = rows.iter().find(|&&r| r >= n_dst) {
            return Err(RegridError::InvalidWeights(format!(
                "destination index {} outside grid of {} cells",
                row + 1,
                n_dst
            )));
        }
        if let Some(&col) = cols.iter().find(|&&c| c >= n_src) {
            return Err(RegridError::InvalidWeights(format!(
                "source index {} outside grid of {} cells",
                col + 1,
                n_src
            )));
        }

        let mut mapped = vec![false; n_dst];
        for &row in &rows {
            mapped[row] = true;
        }

        Ok(Self {
            rows,
            cols,
            weights,
            src_shape,
            dst_shape,
            method,
            periodic: false,
            unmapped_to_nan: true,
            mapped,
        })
    }

    pub fn with_periodic(mut self, periodic: bool) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn with_unmapped_to_nan(mut self, unmapped_to_nan: bool) -> Self {
        self.unmapped_to_nan = unmapped_to_nan;
        self
    }

    /// Number of stored weights
    pub fn nnz(&self) -> usize {
        self.weights.len()
    }

    /// Load weights written by ESMF, xESMF or [`RegridWeights::to_netcdf`].
    ///
    /// Grid shapes are taken from `src_grid_dims`/`dst_grid_dims` when the file
    /// carries them (Fortran order, `[nx, ny]`), otherwise from `grid_shapes`.
    pub fn from_netcdf(
        path: impl AsRef<Path>,
        grid_shapes: Option<((usize, usize), (usize, usize))>,
    ) -> Result<Self, RegridError> {
        let path = path.as_ref();
        info!("Reading regridding weights from {}", path.display());
        let file = netcdf::open(path)?;

        let read_indices = |name: &str| -> Result<Vec<usize>, RegridError> {
            let var = file
                .variable(name)
                .ok_or_else(|| RegridError::MissingVariable(name.to_string()))?;
            let raw: Vec<i64> = var.get_values(..)?;
            raw.into_iter()
                .map(|i| {
                    usize::try_from(i - 1).map_err(|_| {
                        RegridError::InvalidWeights(format!("{} index {} is not 1-based", name, i))
                    })
                })
                .collect()
        };

        let rows = read_indices("row")?;
        let cols = read_indices("col")?;
        let weights: Vec<f64> = file
            .variable("S")
            .ok_or_else(|| RegridError::MissingVariable("S".to_string()))?
            .get_values(..)?;

        let read_dims = |name: &str| -> Result<Option<(usize, usize)>, RegridError> {
            match file.variable(name) {
                Some(var) => {
                    let dims: Vec<i64> = var.get_values(..)?;
                    match dims.as_slice() {
                        [nx, ny] => Ok(Some((*ny as usize, *nx as usize))),
                        [n] => Ok(Some((1, *n as usize))),
                        _ => Err(RegridError::InvalidWeights(format!("{} has rank {}", name, dims.len()))),
                    }
                }
                None => Ok(None),
            }
        };

        let (src_shape, dst_shape) = match (read_dims("src_grid_dims")?, read_dims("dst_grid_dims")?, grid_shapes) {
            (Some(src), Some(dst), _) => (src, dst),
            (_, _, Some(shapes)) => shapes,
            _ => {
                return Err(RegridError::InvalidWeights(
                    "grid shapes are neither stored in the file nor supplied".to_string(),
                ))
            }
        };

        let method = match file.attribute("regrid_method").map(|a| a.value()) {
            Some(Ok(netcdf::AttributeValue::Str(name))) => name.parse().unwrap_or(RegridMethod::Bilinear),
            _ => RegridMethod::Bilinear,
        };
        let flag = |name: &str, default: bool| match file.attribute(name).map(|a| a.value()) {
            Some(Ok(netcdf::AttributeValue::Int(v))) => v != 0,
            Some(Ok(netcdf::AttributeValue::Short(v))) => v != 0,
            Some(Ok(netcdf::AttributeValue::Uchar(v))) => v != 0,
            _ => default,
        };
        let periodic = flag("periodic", false);
        let unmapped_to_nan = flag("unmapped_to_nan", true);

        let weights = Self::from_triplets(rows, cols, weights, src_shape, dst_shape, method)?
            .with_periodic(periodic)
            .with_unmapped_to_nan(unmapped_to_nan);
        debug!(
            "Loaded {} weights, source {:?} -> destination {:?}",
            weights.nnz(),
            src_shape,
            dst_shape
        );
        Ok(weights)
    }

    /// Persist the weights so later runs can skip weight generation
    pub fn to_netcdf(&self, path: impl AsRef<Path>) -> Result<(), RegridError> {
        let path = path.as_ref();
        info!("Writing regridding weights to {}", path.display());
        let mut file = netcdf::create(path)?;

        file.add_dimension("n_s", self.nnz())?;
        file.add_dimension("grid_rank", 2)?;
        file.add_attribute("regrid_method", self.method.to_string())?;
        file.add_attribute("periodic", i32::from(self.periodic))?;
        file.add_attribute("unmapped_to_nan", i32::from(self.unmapped_to_nan))?;

        let rows: Vec<i32> = self.rows.iter().map(|&r| r as i32 + 1).collect();
        let cols: Vec<i32> = self.cols.iter().map(|&c| c as i32 + 1).collect();
        file.add_variable::<i32>("row", &["n_s"])?.put_values(&rows, ..)?;
        file.add_variable::<i32>("col", &["n_s"])?.put_values(&cols, ..)?;
        file.add_variable::<f64>("S", &["n_s"])?.put_values(&self.weights, ..)?;

        let src_dims = [self.src_shape.1 as i32, self.src_shape.0 as i32];
        let dst_dims = [self.dst_shape.1 as i32, self.dst_shape.0 as i32];
        file.add_variable::<i32>("src_grid_dims", &["grid_rank"])?
            .put_values(&src_dims, ..)?;
        file.add_variable::<i32>("dst_grid_dims", &["grid_rank"])?
            .put_values(&dst_dims, ..)?;

        Ok(())
    }

    fn apply_slice(&self, source: &[f32], destination: &mut [f32]) {
        let mut acc = vec![0.0f64; destination.len()];
        for ((&row, &col), &w) in self.rows.iter().zip(&self.cols).zip(&self.weights) {
            acc[row] += w * f64::from(source[col]);
        }
        for ((out, value), &mapped) in destination.iter_mut().zip(acc).zip(&self.mapped) {
            *out = if mapped {
                value as f32
            } else if self.unmapped_to_nan {
                f32::NAN
            } else {
                0.0
            };
        }
    }
}

impl Regridder for RegridWeights {
    fn source_shape(&self) -> (usize, usize) {
        self.src_shape
    }

    fn destination_shape(&self) -> (usize, usize) {
        self.dst_shape
    }

    fn regrid(&self, field: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, RegridError> {
        let ndim = field.ndim();
        if ndim < 2 || (field.shape()[ndim - 2], field.shape()[ndim - 1]) != self.src_shape {
            return Err(RegridError::Shape(format!(
                "field shape {:?} does not end with source grid {:?}",
                field.shape(),
                self.src_shape
            )));
        }

        let leading = &field.shape()[..ndim - 2];
        let n_lead: usize = leading.iter().product();
        let n_src = self.src_shape.0 * self.src_shape.1;
        let n_dst = self.dst_shape.0 * self.dst_shape.1;

        let source = field
            .as_standard_layout()
            .into_owned()
            .into_shape((n_lead, n_src))
            .map_err(|e| RegridError::Shape(e.to_string()))?;

        let mut out = ndarray::Array2::<f32>::zeros((n_lead, n_dst));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(source.axis_iter(Axis(0)).into_par_iter())
            .try_for_each(|(mut dst, src)| match (dst.as_slice_mut(), src.as_slice()) {
                (Some(dst), Some(src)) => {
                    self.apply_slice(src, dst);
                    Ok(())
                }
                _ => Err(RegridError::Shape("record is not contiguous in memory".to_string())),
            })?;

        let mut shape = leading.to_vec();
        shape.extend([self.dst_shape.0, self.dst_shape.1]);
        out.into_shape(IxDyn(&shape))
            .map_err(|e| RegridError::Shape(e.to_string()))
    }
}

/// Regrid sea-surface temperature onto the atmospheric grid
pub fn regrid_sst(
    regridder: &dyn Regridder,
    sst: ArrayViewD<'_, f32>,
) -> Result<ArrayD<f32>, RegridError> {
    info!("Interpolating SST to CESM domain");
    regridder.regrid(sst)
}

/// Regrid sea-ice concentration (percent) onto the atmospheric grid as a fraction
pub fn regrid_seaice(
    regridder: &dyn Regridder,
    ice_percent: ArrayViewD<'_, f32>,
) -> Result<ArrayD<f32>, RegridError> {
    info!("Interpolating SEAICE to CESM domain");
    let fraction = ice_percent.mapv(|v| v * 0.01);
    regridder.regrid(fraction.view())
}
