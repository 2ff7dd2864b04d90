//! Error types for the deployment orchestrator.

use thiserror::Error;

use switchyard_core::{CoreError, DeploymentStatus, Environment};

/// Errors returned to callers of the orchestrator.
///
/// Failures inside a running deployment never surface here: they trigger a
/// rollback and `deploy` reports `Ok(false)`.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("a deployment is already in progress")]
    DeploymentInProgress,

    #[error("{0} is already the active environment")]
    TargetIsActive(Environment),

    #[error("invalid configuration: {0}")]
    Config(#[from] CoreError),
}

/// Why a deployment phase failed. Internal to a single `deploy` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFailure {
    pub phase: DeploymentStatus,
    /// Stable, user-facing rollback reason.
    pub reason: String,
    /// Diagnostic detail for logs.
    pub detail: String,
}

impl PhaseFailure {
    pub fn new(phase: DeploymentStatus, reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            phase,
            reason: reason.into(),
            detail: detail.into(),
        }
    }
}

pub const REASON_HEALTH_CHECK: &str = "Health check failed";
pub const REASON_SMOKE_TESTS: &str = "Smoke tests failed";
pub const REASON_MIGRATION: &str = "Migration failed";
pub const REASON_TRAFFIC_SWITCH: &str = "Traffic switch failed";
pub const REASON_VALIDATION: &str = "Final validation failed";
pub const REASON_TIMEOUT: &str = "Deployment timeout";
pub const REASON_CANCELLED: &str = "Deployment cancelled";
