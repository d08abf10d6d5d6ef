//! Sea-level-pressure reduction following the CCM processor's `pslec` scheme.
//!
//! The bottom model level is extrapolated to sea level with a standard lapse
//! rate, and the lapse rate is reduced in very warm or very cold columns so the
//! hydrostatic extrapolation does not blow up over high terrain.

use crate::config::{Constants, SEA_LEVEL_HEIGHT_TOLERANCE, T_COLD, T_WARM};
use crate::error::PhysicsError;
use crate::math::broadcast::{broadcast_shape, broadcast_to};
use ndarray::{ArrayD, ArrayViewD, Zip};
use tracing::debug;

/// Branch of the piecewise sea-level-pressure formula
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlpCase {
    /// Terrain at sea level: `psl = ps`
    SeaLevel,
    /// Standard lapse rate
    Standard,
    /// Warm surface and warm sea level: isothermal at a reduced temperature
    WarmIsothermal,
    /// Moderate surface, warm sea level: lapse rate reduced to reach 290.5 K
    WarmReducedLapse,
    /// Cold surface: standard lapse rate from a raised mean temperature
    ColdStandard,
    /// Cold surface, warm sea level: reduced lapse rate from a raised mean temperature
    ColdReducedLapse,
}

impl SlpCase {
    /// Case number 1 to 6, in evaluation priority order
    pub fn number(&self) -> u8 {
        match self {
            SlpCase::SeaLevel => 1,
            SlpCase::Standard => 2,
            SlpCase::WarmIsothermal => 3,
            SlpCase::WarmReducedLapse => 4,
            SlpCase::ColdStandard => 5,
            SlpCase::ColdReducedLapse => 6,
        }
    }

    /// Select the branch for one point.
    ///
    /// Sea-level terrain is case 1 whatever the temperatures are. Elsewhere
    /// `None` is returned when no branch applies, which only happens for NaN
    /// inputs or a non-finite derived surface temperature.
    pub fn classify(
        phi_surf: f64,
        temp_surf: f64,
        temp_bottom_lapse: f64,
        constants: &Constants,
    ) -> Option<SlpCase> {
        if (phi_surf / constants.g).abs() < SEA_LEVEL_HEIGHT_TOLERANCE {
            return Some(SlpCase::SeaLevel);
        }
        if !(temp_surf.is_finite() && temp_bottom_lapse.is_finite()) {
            return None;
        }

        let ts = temp_surf;
        let t0 = temp_bottom_lapse;
        if ts >= T_COLD && t0 <= T_WARM {
            Some(SlpCase::Standard)
        } else if ts > T_WARM && t0 > T_WARM {
            Some(SlpCase::WarmIsothermal)
        } else if (T_COLD..=T_WARM).contains(&ts) && t0 > T_WARM {
            Some(SlpCase::WarmReducedLapse)
        } else if ts < T_COLD && t0 <= T_WARM {
            Some(SlpCase::ColdStandard)
        } else if ts < T_COLD && t0 > T_WARM {
            Some(SlpCase::ColdReducedLapse)
        } else {
            None
        }
    }
}

/// Intermediate temperatures of the reduction for one point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceTemperatures {
    /// Temperature extrapolated from the bottom level to the surface (K)
    pub temp_surf: f64,
    /// Surface temperature extrapolated down to sea level (K)
    pub temp_bottom_lapse: f64,
}

impl SurfaceTemperatures {
    pub fn new(
        temp_bottom: f64,
        phi_surf: f64,
        pressure_surf: f64,
        pressure_bottom: f64,
        constants: &Constants,
    ) -> Self {
        let temp_surf =
            temp_bottom * (1.0 + constants.alpha0() * (pressure_surf / pressure_bottom - 1.0));
        let temp_bottom_lapse = temp_surf + constants.lapse_rate * phi_surf / constants.g;
        Self {
            temp_surf,
            temp_bottom_lapse,
        }
    }
}

/// Truncated series `1 - x/2 + x²/3` shared by the lapse-rate branches
fn lapse_series(x: f64) -> f64 {
    1.0 - 0.5 * x + x * x / 3.0
}

/// Sea-level pressure at one point together with the branch used.
///
/// The case is `None` (and the pressure NaN) when no branch applies.
pub fn sea_level_pressure_case(
    temp_bottom: f64,
    phi_surf: f64,
    pressure_surf: f64,
    pressure_bottom: f64,
    constants: &Constants,
) -> (f64, Option<SlpCase>) {
    let SurfaceTemperatures {
        temp_surf,
        temp_bottom_lapse,
    } = SurfaceTemperatures::new(temp_bottom, phi_surf, pressure_surf, pressure_bottom, constants);
    let r = constants.r_dry;
    let alpha0 = constants.alpha0();

    let case = SlpCase::classify(phi_surf, temp_surf, temp_bottom_lapse, constants);
    let psl = match case {
        None => f64::NAN,
        Some(SlpCase::SeaLevel) => pressure_surf,
        Some(SlpCase::Standard) => {
            let c = alpha0 * phi_surf / (r * temp_surf);
            pressure_surf * ((c / alpha0) * lapse_series(c)).exp()
        }
        Some(SlpCase::WarmIsothermal) => {
            let t_star = 0.5 * (T_WARM + temp_surf);
            pressure_surf * (phi_surf / (r * t_star)).exp()
        }
        Some(SlpCase::WarmReducedLapse) => {
            // NCL/CCM `pslec` form: alpha = R (290.5 - Ts) / phi, so
            // alpha * phi / (R Ts) = (290.5 - Ts) / Ts rather than 290.5 - Ts
            let c = (T_WARM - temp_surf) / temp_surf;
            pressure_surf * ((phi_surf / (r * temp_surf)) * lapse_series(c)).exp()
        }
        Some(SlpCase::ColdStandard) => {
            let t_star = 0.5 * (T_COLD + temp_surf);
            let c = alpha0 * phi_surf / (r * t_star);
            pressure_surf * ((c / alpha0) * lapse_series(c)).exp()
        }
        Some(SlpCase::ColdReducedLapse) => {
            let alpha = (r / phi_surf) * (T_WARM - temp_surf);
            let t_star = 0.5 * (T_COLD + temp_surf);
            let c = alpha * phi_surf / (r * t_star);
            pressure_surf * ((c / alpha) * lapse_series(c)).exp()
        }
    };

    (psl, case)
}

/// Sea-level pressure (Pa) at one point
pub fn sea_level_pressure_point(
    temp_bottom: f64,
    phi_surf: f64,
    pressure_surf: f64,
    pressure_bottom: f64,
    constants: &Constants,
) -> f64 {
    sea_level_pressure_case(temp_bottom, phi_surf, pressure_surf, pressure_bottom, constants).0
}

/// Broadcast the four reduction inputs to their common shape
fn common_shape(
    temp_bottom: &ArrayViewD<'_, f32>,
    phi_surf: &ArrayViewD<'_, f32>,
    pressure_surf: &ArrayViewD<'_, f32>,
    pressure_bottom: &ArrayViewD<'_, f32>,
) -> Result<Vec<usize>, PhysicsError> {
    broadcast_shape(&[
        temp_bottom.shape(),
        phi_surf.shape(),
        pressure_surf.shape(),
        pressure_bottom.shape(),
    ])
}

/// Sea-level pressure over arbitrarily shaped fields.
///
/// * `temp_bottom` - temperature on the bottom model level (K)
/// * `phi_surf` - surface geopotential (m²/s²)
/// * `pressure_surf` - surface pressure (Pa)
/// * `pressure_bottom` - pressure on the bottom model level (Pa)
///
/// Inputs broadcast against each other (a static geopotential against a
/// time series of surface pressure, for example). Every point is an
/// independent function of its own four values; invalid points come back NaN.
pub fn sea_level_pressure(
    temp_bottom: ArrayViewD<'_, f32>,
    phi_surf: ArrayViewD<'_, f32>,
    pressure_surf: ArrayViewD<'_, f32>,
    pressure_bottom: ArrayViewD<'_, f32>,
    constants: &Constants,
) -> Result<ArrayD<f32>, PhysicsError> {
    let shape = common_shape(&temp_bottom, &phi_surf, &pressure_surf, &pressure_bottom)?;
    debug!("Sea-level pressure over shape {:?}", shape);

    let t = broadcast_to(&temp_bottom, &shape, "temp_bottom")?;
    let phi = broadcast_to(&phi_surf, &shape, "phi_surf")?;
    let ps = broadcast_to(&pressure_surf, &shape, "pressure_surf")?;
    let pb = broadcast_to(&pressure_bottom, &shape, "pressure_bottom")?;

    let psl = Zip::from(&t)
        .and(&phi)
        .and(&ps)
        .and(&pb)
        .par_map_collect(|&t, &phi, &ps, &pb| {
            sea_level_pressure_point(
                f64::from(t),
                f64::from(phi),
                f64::from(ps),
                f64::from(pb),
                constants,
            ) as f32
        });

    Ok(psl)
}

/// Case number (1 to 6, 0 where undefined) chosen at every point
pub fn classify_field(
    temp_bottom: ArrayViewD<'_, f32>,
    phi_surf: ArrayViewD<'_, f32>,
    pressure_surf: ArrayViewD<'_, f32>,
    pressure_bottom: ArrayViewD<'_, f32>,
    constants: &Constants,
) -> Result<ArrayD<u8>, PhysicsError> {
    let shape = common_shape(&temp_bottom, &phi_surf, &pressure_surf, &pressure_bottom)?;

    let t = broadcast_to(&temp_bottom, &shape, "temp_bottom")?;
    let phi = broadcast_to(&phi_surf, &shape, "phi_surf")?;
    let ps = broadcast_to(&pressure_surf, &shape, "pressure_surf")?;
    let pb = broadcast_to(&pressure_bottom, &shape, "pressure_bottom")?;

    Ok(Zip::from(&t)
        .and(&phi)
        .and(&ps)
        .and(&pb)
        .par_map_collect(|&t, &phi, &ps, &pb| {
            let temps = SurfaceTemperatures::new(
                f64::from(t),
                f64::from(phi),
                f64::from(ps),
                f64::from(pb),
                constants,
            );
            SlpCase::classify(
                f64::from(phi),
                temps.temp_surf,
                temps.temp_bottom_lapse,
                constants,
            )
            .map_or(0, |case| case.number())
        }))
}
