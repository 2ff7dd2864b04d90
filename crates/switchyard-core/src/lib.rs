//! switchyard-core — shared types and configuration for Switchyard.
//!
//! Holds the data model used across the workspace: environments and their
//! thresholds, the deployment state machine, per-deployment metrics, health
//! results, traffic switch plans, and the runtime settings the orchestrator
//! is built from. The [`config`] module parses `switchyard.toml` into those
//! settings.

pub mod config;
pub mod error;
pub mod types;

pub use config::{parse_duration, SwitchyardConfig};
pub use error::{CoreError, CoreResult};
pub use types::*;
