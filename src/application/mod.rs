//! Application Layer - wires detection, gating and positions into one loop

pub mod orchestrator;
pub mod stats;

pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStatus};
pub use stats::{Stats, StatsSnapshot};
