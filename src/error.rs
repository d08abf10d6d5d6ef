use thiserror::Error;

/// Errors raised by the vertical-coordinate kernels.
///
/// Numeric edge cases (division by zero geopotential, zero pressure, NaN inputs)
/// are never errors: they surface positionally as NaN or infinity in the result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// Incompatible array shapes or coefficient lengths.
    #[error("shape error: {0}")]
    Shape(String),

    /// Structurally invalid configuration or input values.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PhysicsError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        PhysicsError::Shape(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PhysicsError::InvalidInput(msg.into())
    }
}
