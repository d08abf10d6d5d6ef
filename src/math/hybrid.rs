//! Pressure on hybrid sigma-pressure levels.
//!
//! CAM/CESM define the pressure at model level `k` as
//! `p(k) = hyam(k) * p0 + hybm(k) * ps`. Levels are ordered from the model top
//! (index 0) to the level nearest the surface (last index).

use crate::config::Constants;
use crate::error::PhysicsError;
use ndarray::{ArrayD, ArrayViewD, Axis};
use rayon::prelude::*;
use tracing::debug;

/// Hybrid-A/B coefficients of one vertical grid plus its reference pressure
#[derive(Clone, Debug, PartialEq)]
pub struct HybridCoefficients {
    hyam: Vec<f64>,
    hybm: Vec<f64>,
    p0: f64,
}

impl HybridCoefficients {
    /// Coefficients with the default reference pressure (100000 Pa)
    pub fn new(hyam: Vec<f64>, hybm: Vec<f64>) -> Result<Self, PhysicsError> {
        Self::with_reference_pressure(hyam, hybm, Constants::default().p0)
    }

    pub fn with_reference_pressure(
        hyam: Vec<f64>,
        hybm: Vec<f64>,
        p0: f64,
    ) -> Result<Self, PhysicsError> {
        check_coefficients(&hyam, &hybm)?;
        check_reference_pressure(p0)?;
        Ok(Self { hyam, hybm, p0 })
    }

    pub fn hyam(&self) -> &[f64] {
        &self.hyam
    }

    pub fn hybm(&self) -> &[f64] {
        &self.hybm
    }

    pub fn p0(&self) -> f64 {
        self.p0
    }

    /// Number of vertical levels
    pub fn nlev(&self) -> usize {
        self.hyam.len()
    }

    /// Index of the level closest to the surface
    pub fn surface_level(&self) -> usize {
        self.nlev() - 1
    }

    /// Pressure (Pa) at `level` for one column with surface pressure `ps`
    pub fn pressure_at(&self, level: usize, ps: f64) -> f64 {
        self.hyam[level] * self.p0 + self.hybm[level] * ps
    }

    /// Pressure on every level, vertical axis placed before the horizontal axes
    pub fn pressure_on_levels(
        &self,
        surface_pressure: ArrayViewD<'_, f32>,
    ) -> Result<ArrayD<f32>, PhysicsError> {
        pressure_on_hybrid(&self.hyam, &self.hybm, surface_pressure, self.p0)
    }
}

fn check_coefficients(hyam: &[f64], hybm: &[f64]) -> Result<(), PhysicsError> {
    if hyam.len() != hybm.len() {
        return Err(PhysicsError::shape(format!(
            "hyam has {} levels but hybm has {}",
            hyam.len(),
            hybm.len()
        )));
    }
    if hyam.is_empty() {
        return Err(PhysicsError::shape("hybrid coefficients are empty"));
    }
    Ok(())
}

fn check_reference_pressure(p0: f64) -> Result<(), PhysicsError> {
    if !(p0.is_finite() && p0 > 0.0) {
        return Err(PhysicsError::invalid(format!(
            "reference pressure must be positive, got {}",
            p0
        )));
    }
    Ok(())
}

/// Default position of the vertical axis for a surface field of rank `ndim`.
///
/// The two trailing axes are horizontal, so `(time, lat, lon)` becomes
/// `(time, lev, lat, lon)` and `(lat, lon)` becomes `(lev, lat, lon)`.
pub fn default_level_axis(ndim: usize) -> Axis {
    Axis(ndim.saturating_sub(2))
}

/// Pressure on hybrid levels with the vertical axis at its default position
pub fn pressure_on_hybrid(
    hyam: &[f64],
    hybm: &[f64],
    surface_pressure: ArrayViewD<'_, f32>,
    p0: f64,
) -> Result<ArrayD<f32>, PhysicsError> {
    let axis = default_level_axis(surface_pressure.ndim());
    pressure_on_hybrid_along(hyam, hybm, surface_pressure, p0, axis)
}

/// Pressure on hybrid levels with the vertical axis inserted at `level_axis`.
///
/// Finite negative surface pressure is rejected; NaN and infinities pass
/// through elementwise.
pub fn pressure_on_hybrid_along(
    hyam: &[f64],
    hybm: &[f64],
    surface_pressure: ArrayViewD<'_, f32>,
    p0: f64,
    level_axis: Axis,
) -> Result<ArrayD<f32>, PhysicsError> {
    check_coefficients(hyam, hybm)?;
    check_reference_pressure(p0)?;

    if level_axis.index() > surface_pressure.ndim() {
        return Err(PhysicsError::shape(format!(
            "level axis {} out of range for a rank-{} surface pressure",
            level_axis.index(),
            surface_pressure.ndim()
        )));
    }
    if surface_pressure.iter().any(|&p| p.is_finite() && p < 0.0) {
        return Err(PhysicsError::invalid("surface pressure must be non-negative"));
    }

    let mut shape = surface_pressure.shape().to_vec();
    shape.insert(level_axis.index(), hyam.len());
    debug!("Pressure on hybrid levels: {:?} -> {:?}", surface_pressure.shape(), shape);

    let mut pressure = ArrayD::<f32>::zeros(shape);
    pressure
        .axis_iter_mut(level_axis)
        .into_par_iter()
        .enumerate()
        .for_each(|(k, mut level)| {
            let a = hyam[k] * p0;
            let b = hybm[k];
            level.zip_mut_with(&surface_pressure, |p, &ps| {
                *p = (a + b * f64::from(ps)) as f32;
            });
        });

    Ok(pressure)
}

/// The level nearest the surface (last index along `level_axis`)
pub fn bottom_level<'a, 'b>(
    field: &'a ArrayViewD<'b, f32>,
    level_axis: Axis,
) -> Result<ArrayViewD<'a, f32>, PhysicsError> {
    if level_axis.index() >= field.ndim() {
        return Err(PhysicsError::shape(format!(
            "level axis {} out of range for a rank-{} field",
            level_axis.index(),
            field.ndim()
        )));
    }
    let nlev = field.len_of(level_axis);
    if nlev == 0 {
        return Err(PhysicsError::shape("field has no vertical levels"));
    }
    Ok(field.index_axis(level_axis, nlev - 1))
}
