use super::broadcast::*;
use super::hybrid::*;
use super::physics::*;
use super::vertical::*;
use crate::config::{Constants, T_COLD, T_WARM};
use crate::error::PhysicsError;
use ndarray::{arr1, Array, ArrayD, Axis, IxDyn};

fn rel_diff(a: f64, b: f64) -> f64 {
    ((a - b) / b).abs()
}

fn field(shape: &[usize], values: Vec<f32>) -> ArrayD<f32> {
    Array::from_shape_vec(IxDyn(shape), values).unwrap()
}

/// Independent evaluation of the six branch conditions, in table order
fn branch_conditions(phi: f64, ts: f64, t0: f64, g: f64) -> [bool; 6] {
    [
        (phi / g).abs() < 1e-4,
        ts >= 255.0 && t0 <= 290.5,
        ts > 290.5 && t0 > 290.5,
        (255.0..=290.5).contains(&ts) && t0 > 290.5,
        ts < 255.0 && t0 <= 290.5,
        ts < 255.0 && t0 > 290.5,
    ]
}

#[test]
fn test_lin_interp() {
    assert_eq!(lin_interp(1.0, 3.0, 0.5), 2.0);
    assert_eq!(lin_interp(5.0_f32, 15.0, 0.0), 5.0);
}

#[test]
fn test_broadcast_shape() {
    assert_eq!(broadcast_shape(&[&[2, 3, 4], &[3, 4], &[1, 4]]).unwrap(), vec![2, 3, 4]);
    assert_eq!(broadcast_shape(&[&[], &[5]]).unwrap(), vec![5]);
    assert!(matches!(broadcast_shape(&[&[2, 3], &[2, 4]]), Err(PhysicsError::Shape(_))));
}

#[test]
fn test_surface_level_returns_surface_pressure() {
    let hyam = vec![0.002, 0.3, 0.1, 0.0];
    let hybm = vec![0.0, 0.2, 0.7, 1.0];
    let ps = field(&[2, 2, 3], vec![98000.0, 101325.0, 70000.0, 55000.5, 100000.0, 0.0, 99999.0, 85000.25, 60000.0, 90000.0, 101000.0, 102000.0]);

    let pressure = pressure_on_hybrid(&hyam, &hybm, ps.view(), 100000.0).unwrap();
    assert_eq!(pressure.shape(), &[2, 4, 2, 3]);

    let surface = pressure.index_axis(Axis(1), 3);
    assert_eq!(surface, ps);

    let top = pressure.index_axis(Axis(1), 0);
    assert!(top.iter().all(|&p| p == 200.0));

    let mid = pressure[[1, 2, 0, 0]];
    assert_eq!(mid, (0.1 * 100000.0 + 0.7 * 99999.0_f64) as f32);
}

#[test]
fn test_level_axis_placement() {
    assert_eq!(default_level_axis(3), Axis(1));
    assert_eq!(default_level_axis(2), Axis(0));
    assert_eq!(default_level_axis(1), Axis(0));

    let ps = arr1(&[100000.0_f32, 90000.0]).into_dyn();
    let pressure = pressure_on_hybrid(&[0.0, 0.0, 0.0], &[0.2, 0.5, 1.0], ps.view(), 1e5).unwrap();
    assert_eq!(pressure.shape(), &[3, 2]);
    assert_eq!(pressure[[1, 1]], 45000.0);

    let along = pressure_on_hybrid_along(&[0.0, 0.0, 0.0], &[0.2, 0.5, 1.0], ps.view(), 1e5, Axis(1)).unwrap();
    assert_eq!(along.shape(), &[2, 3]);
    assert_eq!(along[[1, 1]], 45000.0);
}

#[test]
fn test_reference_pressure_override() {
    let coeffs = HybridCoefficients::with_reference_pressure(vec![0.5, 0.0], vec![0.0, 1.0], 101325.0).unwrap();
    assert_eq!(coeffs.nlev(), 2);
    assert_eq!(coeffs.surface_level(), 1);
    assert_eq!(coeffs.pressure_at(0, 90000.0), 50662.5);

    let ps = field(&[1, 1], vec![90000.0]);
    let pressure = coeffs.pressure_on_levels(ps.view()).unwrap();
    assert_eq!(pressure[[0, 0, 0]], 50662.5);
    assert_eq!(pressure[[1, 0, 0]], 90000.0);
}

#[test]
fn test_mismatched_coefficients_are_shape_errors() {
    let hyam = vec![0.0; 26];
    let hybm = vec![0.0; 27];
    let ps = field(&[2], vec![100000.0, 90000.0]);

    let result = pressure_on_hybrid(&hyam, &hybm, ps.view(), 100000.0);
    assert!(matches!(result, Err(PhysicsError::Shape(_))));
    assert!(matches!(HybridCoefficients::new(hyam, hybm), Err(PhysicsError::Shape(_))));
    assert!(matches!(HybridCoefficients::new(vec![], vec![]), Err(PhysicsError::Shape(_))));
}

#[test]
fn test_invalid_hybrid_inputs() {
    let ps = field(&[2], vec![100000.0, -1.0]);
    assert!(matches!(
        pressure_on_hybrid(&[0.0], &[1.0], ps.view(), 1e5),
        Err(PhysicsError::InvalidInput(_))
    ));
    assert!(matches!(
        HybridCoefficients::with_reference_pressure(vec![0.0], vec![1.0], f64::NAN),
        Err(PhysicsError::InvalidInput(_))
    ));
}

#[test]
fn test_non_finite_surface_pressure_propagates() {
    let ps = field(&[3], vec![f32::NAN, 95000.0, f32::INFINITY]);
    let pressure = pressure_on_hybrid(&[0.1, 0.0], &[0.5, 1.0], ps.view(), 1e5).unwrap();

    assert!(pressure[[0, 0]].is_nan());
    assert!(pressure[[1, 0]].is_nan());
    assert_eq!(pressure[[0, 1]], 57500.0);
    assert_eq!(pressure[[1, 1]], 95000.0);
    assert_eq!(pressure[[1, 2]], f32::INFINITY);
}

#[test]
fn test_bottom_level() {
    let t = field(&[1, 3, 2], vec![200.0, 201.0, 250.0, 251.0, 280.0, 281.0]);
    let view = t.view();
    let bottom = bottom_level(&view, Axis(1)).unwrap();
    assert_eq!(bottom, field(&[1, 2], vec![280.0, 281.0]));
    assert!(bottom_level(&view, Axis(3)).is_err());
}

#[test]
fn test_sea_level_terrain_returns_surface_pressure() {
    let constants = Constants::default();
    for &ps in &[95000.0, 101325.0, 87654.321] {
        let (psl, case) = sea_level_pressure_case(280.0, 0.0, ps, 96000.0, &constants);
        assert_eq!(case, Some(SlpCase::SeaLevel));
        assert_eq!(psl, ps);

        let tiny = 0.5e-4 * constants.g;
        assert_eq!(sea_level_pressure_point(310.0, -tiny, ps, 96000.0, &constants), ps);
    }

    let ps = field(&[2], vec![95000.0, 101325.0]);
    let zeros = field(&[2], vec![0.0, 0.0]);
    let t = field(&[2], vec![250.0, 300.0]);
    let pb = field(&[2], vec![96000.0, 100000.0]);
    let psl = sea_level_pressure(t.view(), zeros.view(), ps.view(), pb.view(), &constants).unwrap();
    assert_eq!(psl, ps);
}

#[test]
fn test_standard_case_reference_value() {
    let constants = Constants::default();
    let phi = 500.0 * 9.80616;

    let temps = SurfaceTemperatures::new(288.0, phi, 95000.0, 97000.0, &constants);
    assert!(temps.temp_surf >= T_COLD);
    assert!(temps.temp_bottom_lapse <= T_WARM);
    assert!((temps.temp_surf - 286.870_184_438_664_2).abs() < 1e-9);
    assert!((temps.temp_bottom_lapse - 290.120_184_438_664_2).abs() < 1e-9);

    let (psl, case) = sea_level_pressure_case(288.0, phi, 95000.0, 97000.0, &constants);
    assert_eq!(case, Some(SlpCase::Standard));
    assert!(rel_diff(psl, 100_794.780_663_340_9) < 1e-10, "psl = {}", psl);

    let field_psl = sea_level_pressure(
        field(&[1], vec![288.0]).view(),
        field(&[1], vec![phi as f32]).view(),
        field(&[1], vec![95000.0]).view(),
        field(&[1], vec![97000.0]).view(),
        &constants,
    )
    .unwrap();
    assert!(rel_diff(f64::from(field_psl[[0]]), 100_794.780_663_340_9) < 1e-6);
}

#[test]
fn test_zero_bottom_pressure_is_nan() {
    let constants = Constants::default();
    let phi = 500.0 * 9.80616;
    let (psl, case) = sea_level_pressure_case(288.0, phi, 95000.0, 0.0, &constants);
    assert!(psl.is_nan());
    assert_eq!(case, None);

    let t = field(&[2], vec![288.0, 288.0]);
    let phis = field(&[2], vec![phi as f32, phi as f32]);
    let ps = field(&[2], vec![95000.0, 95000.0]);
    let pb = field(&[2], vec![0.0, 97000.0]);
    let psl = sea_level_pressure(t.view(), phis.view(), ps.view(), pb.view(), &constants).unwrap();
    assert!(psl[[0]].is_nan());
    assert!(psl[[1]].is_finite());
}

#[test]
fn test_nan_inputs_are_nan() {
    let constants = Constants::default();
    assert!(sea_level_pressure_point(f64::NAN, 1000.0, 90000.0, 91000.0, &constants).is_nan());
    assert!(sea_level_pressure_point(280.0, f64::NAN, 90000.0, 91000.0, &constants).is_nan());
    assert!(sea_level_pressure_point(280.0, 1000.0, 90000.0, f64::NAN, &constants).is_nan());
}

#[test]
fn test_sea_level_wins_over_missing_temperatures() {
    let constants = Constants::default();
    let (psl, case) = sea_level_pressure_case(f64::NAN, 0.0, 101000.0, 100000.0, &constants);
    assert_eq!(case, Some(SlpCase::SeaLevel));
    assert_eq!(psl, 101000.0);
    assert_eq!(sea_level_pressure_point(288.0, 0.0, 101000.0, 0.0, &constants), 101000.0);

    let t = field(&[2], vec![f32::NAN, 288.0]);
    let phi = field(&[2], vec![0.0, 0.0]);
    let ps = field(&[2], vec![101000.0, 99000.0]);
    let pb = field(&[2], vec![100000.0, 0.0]);
    let psl = sea_level_pressure(t.view(), phi.view(), ps.view(), pb.view(), &constants).unwrap();
    assert_eq!(psl, ps);
    let cases = classify_field(t.view(), phi.view(), ps.view(), pb.view(), &constants).unwrap();
    assert_eq!(cases, Array::from_elem(IxDyn(&[2]), 1u8));
}

/// Views created inside a function can be broadcast and sliced without
/// outliving their owners.
fn bottom_sum(owned: ArrayD<f32>, shape: &[usize]) -> f32 {
    let view = owned.view();
    let bottom = bottom_level(&view, Axis(0)).unwrap();
    let wide = broadcast_to(&bottom, shape, "bottom").unwrap();
    wide.sum()
}

#[test]
fn test_broadcast_of_local_views() {
    let data = field(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(bottom_sum(data, &[2, 3]), 30.0);
}

#[test]
fn test_case_partition_is_total_and_exclusive() {
    let constants = Constants::default();
    let g = constants.g;

    for ts_step in 0..=80 {
        let ts = 200.0 + ts_step as f64 * 1.5;
        for phi_step in -4..=40 {
            let phi = phi_step as f64 * 250.0 * g;
            // Equal pressures make the derived surface temperature equal temp_bottom
            let temps = SurfaceTemperatures::new(ts, phi, 90000.0, 90000.0, &constants);
            let conditions = branch_conditions(phi, temps.temp_surf, temps.temp_bottom_lapse, g);
            let first = conditions.iter().position(|&c| c).expect("no branch applies");

            let case = SlpCase::classify(phi, temps.temp_surf, temps.temp_bottom_lapse, &constants)
                .expect("classify returned no case");
            assert_eq!(case.number() as usize, first + 1);

            if phi_step != 0 {
                assert_eq!(conditions.iter().filter(|&&c| c).count(), 1, "ts={} phi={}", ts, phi);
            }
        }
    }
}

#[test]
fn test_each_case_is_reachable() {
    let constants = Constants::default();
    let g = constants.g;
    let cases = [
        (280.0, 0.0, SlpCase::SeaLevel),
        (280.0, 1000.0 * g, SlpCase::Standard),
        (300.0, 1000.0 * g, SlpCase::WarmIsothermal),
        (285.0, 1500.0 * g, SlpCase::WarmReducedLapse),
        (240.0, 3000.0 * g, SlpCase::ColdStandard),
        (250.0, 7000.0 * g, SlpCase::ColdReducedLapse),
    ];
    for (t, phi, expected) in cases {
        let (psl, case) = sea_level_pressure_case(t, phi, 80000.0, 80000.0, &constants);
        assert_eq!(case, Some(expected));
        assert!(psl.is_finite() && psl >= 80000.0, "{:?}: {}", expected, psl);
    }
}

/// Evaluate just below and above a boundary and compare the two branches
fn assert_continuous(t_below: f64, t_above: f64, phi_below: f64, phi_above: f64, expected: (SlpCase, SlpCase)) {
    let constants = Constants::default();
    let (low, case_low) = sea_level_pressure_case(t_below, phi_below, 85000.0, 85000.0, &constants);
    let (high, case_high) = sea_level_pressure_case(t_above, phi_above, 85000.0, 85000.0, &constants);
    assert_eq!((case_low, case_high), (Some(expected.0), Some(expected.1)));
    assert!(rel_diff(low, high) < 1e-3, "{:?}: {} vs {}", expected, low, high);
}

#[test]
fn test_continuity_across_cold_threshold() {
    let g = 9.80616;
    let eps = 1e-6;
    // lapse-adjusted temperature stays below 290.5
    assert_continuous(T_COLD - eps, T_COLD + eps, 1000.0 * g, 1000.0 * g, (SlpCase::ColdStandard, SlpCase::Standard));
    // lapse-adjusted temperature above 290.5
    assert_continuous(T_COLD - eps, T_COLD + eps, 6000.0 * g, 6000.0 * g, (SlpCase::ColdReducedLapse, SlpCase::WarmReducedLapse));
}

#[test]
fn test_continuity_across_warm_threshold() {
    let g = 9.80616;
    let lapse = 0.0065;
    let eps = 1e-6;

    // Sea-level temperature crossing 290.5 K with a moderate surface temperature
    let phi_edge = (T_WARM - 280.0) * g / lapse;
    assert_continuous(280.0, 280.0, phi_edge - eps, phi_edge + eps, (SlpCase::Standard, SlpCase::WarmReducedLapse));

    // Sea-level temperature crossing 290.5 K with a cold surface
    let phi_edge = (T_WARM - 250.0) * g / lapse;
    assert_continuous(250.0, 250.0, phi_edge - eps, phi_edge + eps, (SlpCase::ColdStandard, SlpCase::ColdReducedLapse));

    // Surface temperature crossing 290.5 K with a warm sea level
    assert_continuous(T_WARM - eps, T_WARM + eps, 1000.0 * g, 1000.0 * g, (SlpCase::WarmReducedLapse, SlpCase::WarmIsothermal));
}

#[test]
fn test_sea_level_pressure_shape_mismatch() {
    let constants = Constants::default();
    let a = field(&[2, 3], vec![280.0; 6]);
    let b = field(&[2, 4], vec![1000.0; 8]);
    let result = sea_level_pressure(a.view(), b.view(), a.view(), a.view(), &constants);
    assert!(matches!(result, Err(PhysicsError::Shape(_))));
}

#[test]
fn test_sea_level_pressure_broadcasts_static_geopotential() {
    let constants = Constants::default();
    let g = constants.g as f32;
    let phi = field(&[2, 2], vec![0.0, 100.0 * g, 1000.0 * g, 2000.0 * g]);
    let t = field(&[3, 2, 2], vec![280.0; 12]);
    let ps = field(&[3, 2, 2], vec![90000.0; 12]);
    let pb = field(&[3, 2, 2], vec![91000.0; 12]);

    let psl = sea_level_pressure(t.view(), phi.view(), ps.view(), pb.view(), &constants).unwrap();
    assert_eq!(psl.shape(), &[3, 2, 2]);
    for time in 0..3 {
        assert_eq!(psl[[time, 0, 0]], 90000.0);
        for (j, i) in [(0, 1), (1, 0), (1, 1)] {
            let expected = sea_level_pressure_point(280.0, f64::from(phi[[j, i]]), 90000.0, 91000.0, &constants);
            assert!(rel_diff(f64::from(psl[[time, j, i]]), expected) < 1e-6);
        }
    }
    assert!(psl[[0, 1, 1]] > psl[[0, 1, 0]]);

    let cases = classify_field(t.view(), phi.view(), ps.view(), pb.view(), &constants).unwrap();
    assert_eq!(cases[[0, 0, 0]], 1);
    assert_eq!(cases[[2, 1, 0]], 2);
    assert_eq!(cases[[2, 1, 1]], 4);
}

#[test]
fn test_interpolate_column_log_p() {
    let pressure = arr1(&[10000.0_f32, 50000.0, 100000.0]);
    let temps = arr1(&[220.0_f32, 260.0, 290.0]);

    assert_eq!(interpolate_column_log_p(temps.view(), pressure.view(), 50000.0), 260.0);
    assert!((interpolate_column_log_p(temps.view(), pressure.view(), 100000.0) - 290.0).abs() < 1e-9);

    let fac = (70000.0_f64.ln() - 50000.0_f64.ln()) / (100000.0_f64.ln() - 50000.0_f64.ln());
    let expected = 260.0 + 30.0 * fac;
    assert!((interpolate_column_log_p(temps.view(), pressure.view(), 70000.0) - expected).abs() < 1e-9);

    assert!(interpolate_column_log_p(temps.view(), pressure.view(), 101000.0).is_nan());
    assert!(interpolate_column_log_p(temps.view(), pressure.view(), 5000.0).is_nan());
}

#[test]
fn test_interpolate_to_pressure_field() {
    let hyam = [0.1, 0.0, 0.0];
    let hybm = [0.0, 0.5, 1.0];
    let ps = field(&[2, 1, 2], vec![100000.0, 80000.0, 100000.0, 80000.0]);
    let pressure = pressure_on_hybrid(&hyam, &hybm, ps.view(), 1e5).unwrap();
    let t = field(&[2, 3, 1, 2], vec![220.0, 220.0, 260.0, 260.0, 290.0, 290.0, 220.0, 220.0, 260.0, 260.0, 290.0, 290.0]);

    let targets = [85000.0, 50000.0];
    let out = interpolate_to_pressure(t.view(), pressure.view(), &targets, Axis(1)).unwrap();
    assert_eq!(out.shape(), &[2, 2, 1, 2]);
    assert_eq!(out[[0, 1, 0, 0]], 260.0);
    assert!(out[[0, 0, 0, 0]] > 260.0 && out[[0, 0, 0, 0]] < 290.0);
    // Below the surface of the 800 hPa column
    assert!(out[[1, 0, 0, 1]].is_nan());

    let bad = interpolate_to_pressure(t.view(), ps.view(), &targets, Axis(1));
    assert!(matches!(bad, Err(PhysicsError::Shape(_))));
    assert!(matches!(
        interpolate_to_pressure(t.view(), pressure.view(), &[], Axis(1)),
        Err(PhysicsError::InvalidInput(_))
    ));
}
