use thiserror::Error;

/// Crate-wide error taxonomy, grouped by cause rather than by call site.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GPError {
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch { expected: Vec<usize>, found: Vec<usize> },

    #[error("index {index} out of bounds for axis of length {len}")]
    IndexOutOfBounds { index: isize, len: usize },

    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("required input was absent: {0}")]
    NullInput(String),

    #[error("operation not supported for this rank/shape: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

pub type GPResult<T> = Result<T, GPError>;

impl GPError {
    pub fn shape(expected: impl Into<Vec<usize>>, found: impl Into<Vec<usize>>) -> Self {
        GPError::ShapeMismatch { expected: expected.into(), found: found.into() }
    }

    pub fn index(index: isize, len: usize) -> Self {
        GPError::IndexOutOfBounds { index, len }
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        GPError::ArgumentInvalid(msg.into())
    }
}
