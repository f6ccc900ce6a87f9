use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapslotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl SnapslotError {
    /// Short error code string returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            SnapslotError::Config(_) => "CONFIG_ERROR",
            SnapslotError::InvalidValue(_) => "INVALID_VALUE",
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapslotError>;
