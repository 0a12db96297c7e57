use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("grid has a zero dimension")]
    EmptyGrid,
    #[error("resolution must be finite and positive, got {0}")]
    InvalidResolution(f64),
}
