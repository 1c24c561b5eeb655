use thiserror::Error;

/// Errors raised while assembling the runtime: configuration, bridges, and
/// the logging stack.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A global subscriber was already installed or the filter was rejected.
    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
