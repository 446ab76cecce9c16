pub mod buffer;
pub mod desired;
pub mod diff;
pub mod generator;
pub mod oracle;
pub mod provider;
pub mod retention;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use buffer::MemoryBuffer;
pub use oracle::{CycleOutcome, Oracle, OracleConfig, Phase, StatsSnapshot};
pub use provider::FileProvider;
pub use traits::{MatchBuffer, MatchFeed, MatchProvider};
