use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Buffer unavailable: {0}")]
    BufferUnavailable(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;
