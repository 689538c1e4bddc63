use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconstructionError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Optimizer failed: {0}")]
    Optimizer(String),
}

impl From<argmin::core::Error> for ReconstructionError {
    fn from(e: argmin::core::Error) -> Self {
        Self::Optimizer(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconstructionError>;
