pub mod config;
pub mod error;
pub mod types;

pub use config::{load_settings, OracleSettings, DEFAULT_BUFFER_CAPACITY};
pub use error::{OracleError, OracleResult};
pub use types::*;
