use crate::error::PhysicsError;
use ndarray::{ArrayViewD, IxDyn};

/// Common shape of several arrays under trailing-axis broadcasting rules.
///
/// Axes are aligned from the right; a length-1 axis stretches to match.
pub fn broadcast_shape(shapes: &[&[usize]]) -> Result<Vec<usize>, PhysicsError> {
    let ndim = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1usize; ndim];

    for shape in shapes {
        let offset = ndim - shape.len();
        for (i, &len) in shape.iter().enumerate() {
            let target = &mut out[offset + i];
            if *target == 1 {
                *target = len;
            } else if len != 1 && len != *target {
                return Err(PhysicsError::shape(format!(
                    "cannot broadcast shapes {:?}",
                    shapes
                )));
            }
        }
    }

    Ok(out)
}

/// Broadcast a view to `shape`, reporting a shape error instead of `None`
pub fn broadcast_to<'a, 'b>(
    view: &'a ArrayViewD<'b, f32>,
    shape: &[usize],
    name: &str,
) -> Result<ArrayViewD<'a, f32>, PhysicsError> {
    view.broadcast(IxDyn(shape)).ok_or_else(|| {
        PhysicsError::shape(format!(
            "{} with shape {:?} does not broadcast to {:?}",
            name,
            view.shape(),
            shape
        ))
    })
}
