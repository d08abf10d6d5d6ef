use cesm_h2p::regrid::{RegridError, RegridMethod, RegridWeights, Regridder};
use ndarray::{Array, IxDyn};

fn bilinear_weights() -> RegridWeights {
    // 2x2 source averaged onto a single destination cell, second cell a copy
    RegridWeights::from_triplets(
        vec![0, 0, 0, 0, 1],
        vec![0, 1, 2, 3, 3],
        vec![0.25, 0.25, 0.25, 0.25, 1.0],
        (2, 2),
        (1, 2),
        RegridMethod::Conservative,
    )
    .unwrap()
    .with_periodic(true)
}

#[test]
fn test_weights_netcdf_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.nc");

    let weights = bilinear_weights();
    weights.to_netcdf(&path).unwrap();

    let loaded = RegridWeights::from_netcdf(&path, None).unwrap();
    assert_eq!(loaded.nnz(), 5);
    assert_eq!(loaded.source_shape(), (2, 2));
    assert_eq!(loaded.destination_shape(), (1, 2));
    assert_eq!(loaded.method, RegridMethod::Conservative);
    assert!(loaded.periodic);
    assert!(loaded.unmapped_to_nan);

    let field = Array::from_shape_vec(IxDyn(&[2, 2]), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let out = loaded.regrid(field.view()).unwrap();
    assert_eq!(out.shape(), &[1, 2]);
    assert_eq!(out[[0, 0]], 2.5);
    assert_eq!(out[[0, 1]], 4.0);
}

#[test]
fn test_esmf_file_without_grid_dims() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("esmf.nc");
    {
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("n_s", 2).unwrap();
        file.add_variable::<i32>("row", &["n_s"]).unwrap().put_values(&[1, 2], ..).unwrap();
        file.add_variable::<i32>("col", &["n_s"]).unwrap().put_values(&[2, 1], ..).unwrap();
        file.add_variable::<f64>("S", &["n_s"]).unwrap().put_values(&[1.0, 1.0], ..).unwrap();
    }

    assert!(matches!(
        RegridWeights::from_netcdf(&path, None),
        Err(RegridError::InvalidWeights(_))
    ));

    let swap = RegridWeights::from_netcdf(&path, Some(((1, 2), (1, 2)))).unwrap();
    assert_eq!(swap.method, RegridMethod::Bilinear);
    let field = Array::from_shape_vec(IxDyn(&[3, 1, 2]), vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let out = swap.regrid(field.view()).unwrap();
    assert_eq!(out.iter().copied().collect::<Vec<_>>(), vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0]);
}

#[test]
fn test_zero_based_index_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.nc");
    {
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("n_s", 1).unwrap();
        file.add_variable::<i32>("row", &["n_s"]).unwrap().put_values(&[0], ..).unwrap();
        file.add_variable::<i32>("col", &["n_s"]).unwrap().put_values(&[1], ..).unwrap();
        file.add_variable::<f64>("S", &["n_s"]).unwrap().put_values(&[1.0], ..).unwrap();
    }
    let result = RegridWeights::from_netcdf(&path, Some(((1, 1), (1, 1))));
    assert!(matches!(result, Err(RegridError::InvalidWeights(_))));
}

#[test]
fn test_missing_weights_variable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.nc");
    {
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("n_s", 1).unwrap();
    }
    let result = RegridWeights::from_netcdf(&path, Some(((1, 1), (1, 1))));
    assert!(matches!(result, Err(RegridError::MissingVariable(_))));
}
