use thiserror::Error;

#[derive(Debug, Error)]
pub enum GavelError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reportable failure with a caller-safe message; details are logged
    /// where the error is raised.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GavelError {
    /// Short stable error code, suitable for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            GavelError::Config(_) => "CONFIG_ERROR",
            GavelError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, GavelError>;
