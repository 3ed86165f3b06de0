use thiserror::Error;

/// Errors raised while setting up the runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A configuration value is missing or out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The subscriber could not be installed or the filter did not parse.
    #[error("Logging error: {0}")]
    Logging(String),

    /// An optional feature is not configured; `message` tells the user how
    /// to enable it.
    #[error("{capability} is not configured: {message}")]
    CapabilityMissing { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
