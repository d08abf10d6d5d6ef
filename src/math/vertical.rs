use crate::error::PhysicsError;
use ndarray::{ArrayD, ArrayView1, ArrayViewD, ArrayViewMut1, Axis, Zip};
use num_traits::Float;
use tracing::debug;

/// Generic linear interpolation between two values
pub fn lin_interp<T: Float>(v0: T, v1: T, fac: T) -> T {
    v0 + (v1 - v0) * fac
}

/// Interpolate one column to `target`, linear in ln(p).
///
/// Returns NaN when `target` lies outside the column's pressure range.
pub fn interpolate_column_log_p(values: ArrayView1<'_, f32>, pressure: ArrayView1<'_, f32>, target: f64) -> f64 {
    let ln_target = target.ln();

    for k in 1..pressure.len() {
        let (p0, p1) = (f64::from(pressure[k - 1]), f64::from(pressure[k]));
        let (lo, hi) = if p0 <= p1 { (p0, p1) } else { (p1, p0) };
        if !(lo <= target && target <= hi) {
            continue;
        }

        let (v0, v1) = (f64::from(values[k - 1]), f64::from(values[k]));
        if p0 == p1 {
            return v0;
        }
        let fac = (ln_target - p0.ln()) / (p1.ln() - p0.ln());
        return lin_interp(v0, v1, fac);
    }

    // Single-level columns can only match exactly
    if pressure.len() == 1 && f64::from(pressure[0]) == target {
        return f64::from(values[0]);
    }

    f64::NAN
}

fn interpolate_lane(
    mut out: ArrayViewMut1<'_, f32>,
    values: ArrayView1<'_, f32>,
    pressure: ArrayView1<'_, f32>,
    targets: &[f64],
) {
    for (slot, &target) in out.iter_mut().zip(targets) {
        *slot = interpolate_column_log_p(values, pressure, target) as f32;
    }
}

/// Interpolate a field on hybrid levels to fixed pressure levels.
///
/// `field` and `pressure` share a shape with the vertical axis at `level_axis`;
/// the result replaces that axis with one entry per target level (Pa). No
/// extrapolation is done: targets below the lowest or above the highest model
/// level are NaN.
pub fn interpolate_to_pressure(
    field: ArrayViewD<'_, f32>,
    pressure: ArrayViewD<'_, f32>,
    targets: &[f64],
    level_axis: Axis,
) -> Result<ArrayD<f32>, PhysicsError> {
    if field.shape() != pressure.shape() {
        return Err(PhysicsError::shape(format!(
            "field shape {:?} differs from pressure shape {:?}",
            field.shape(),
            pressure.shape()
        )));
    }
    if level_axis.index() >= field.ndim() {
        return Err(PhysicsError::shape(format!(
            "level axis {} out of range for a rank-{} field",
            level_axis.index(),
            field.ndim()
        )));
    }
    if targets.is_empty() {
        return Err(PhysicsError::invalid("no target pressure levels"));
    }

    let mut shape = field.shape().to_vec();
    shape[level_axis.index()] = targets.len();
    debug!("Vertical interpolation {:?} -> {:?}", field.shape(), shape);

    let mut out = ArrayD::<f32>::from_elem(shape, f32::NAN);
    Zip::from(out.lanes_mut(level_axis))
        .and(field.lanes(level_axis))
        .and(pressure.lanes(level_axis))
        .par_for_each(|out_col, values, column_pressure| {
            interpolate_lane(out_col, values, column_pressure, targets);
        });

    Ok(out)
}
