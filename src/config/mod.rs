//! Engine configuration and run statistics.
//!
//! Configuration is a plain serde struct so it can come from a TOML file,
//! from CLI flags, or be built in code.

mod engine;
mod stats;

pub use engine::{EngineConfig, OccursCheck};
pub use stats::Statistics;
