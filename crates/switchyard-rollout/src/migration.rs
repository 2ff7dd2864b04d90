//! Database migration coordination.
//!
//! Migrations are opaque to the orchestrator: a [`MigrationHook`] runs them,
//! validates the result and checks that the schema still serves the
//! previously active release. The three steps run in order and stop at the
//! first error.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use switchyard_core::config::MigrationSection;
use switchyard_core::EnvironmentConfig;

/// A migration step failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("{step} failed: {reason}")]
    Step { step: MigrationStep, reason: String },

    #[error("failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` exited with {code}: {stderr}")]
    Exit {
        command: String,
        code: String,
        stderr: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    Run,
    Validate,
    Compatibility,
}

impl std::fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MigrationStep::Run => "migration",
            MigrationStep::Validate => "migration validation",
            MigrationStep::Compatibility => "backward compatibility check",
        })
    }
}

pub type MigrationFuture<'a> = Pin<Box<dyn Future<Output = Result<(), MigrationError>> + Send + 'a>>;

/// Runs schema migrations for the target environment.
pub trait MigrationHook: Send + Sync {
    fn run_migrations<'a>(&'a self, target: &'a EnvironmentConfig) -> MigrationFuture<'a>;

    fn validate<'a>(&'a self, target: &'a EnvironmentConfig) -> MigrationFuture<'a>;

    fn check_backward_compatibility<'a>(&'a self, target: &'a EnvironmentConfig) -> MigrationFuture<'a>;
}

/// Run, validate, then check compatibility.
pub async fn coordinate(hook: &dyn MigrationHook, target: &EnvironmentConfig) -> Result<(), MigrationError> {
    hook.run_migrations(target).await?;
    debug!(environment = %target.environment, "migrations applied");
    hook.validate(target).await?;
    debug!(environment = %target.environment, "migrations validated");
    hook.check_backward_compatibility(target).await?;
    info!(environment = %target.environment, "migration coordination complete");
    Ok(())
}

/// Hook for deployments without schema changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMigrations;

impl MigrationHook for NoopMigrations {
    fn run_migrations<'a>(&'a self, _target: &'a EnvironmentConfig) -> MigrationFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn validate<'a>(&'a self, _target: &'a EnvironmentConfig) -> MigrationFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn check_backward_compatibility<'a>(&'a self, _target: &'a EnvironmentConfig) -> MigrationFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Runs each step as an external command.
///
/// Commands see `SWITCHYARD_TARGET` (the colour) and `DATABASE_URL` (the
/// target's datastore). A missing command makes that step a no-op.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandMigrations {
    pub run: Option<Vec<String>>,
    pub validate: Option<Vec<String>>,
    pub compatibility: Option<Vec<String>>,
}

impl CommandMigrations {
    pub fn from_section(section: &MigrationSection) -> Self {
        Self {
            run: section.run.clone(),
            validate: section.validate.clone(),
            compatibility: section.compatibility.clone(),
        }
    }

    async fn execute(
        &self,
        step: MigrationStep,
        argv: Option<&[String]>,
        target: &EnvironmentConfig,
    ) -> Result<(), MigrationError> {
        let Some(argv) = argv else {
            debug!(%step, "no command configured, skipping");
            return Ok(());
        };
        let Some((program, args)) = argv.split_first() else {
            return Err(MigrationError::Step {
                step,
                reason: "empty command".to_string(),
            });
        };
        let command = argv.join(" ");

        info!(%step, %command, environment = %target.environment, "running migration command");
        let output = Command::new(program)
            .args(args)
            .env("SWITCHYARD_TARGET", target.environment.as_str())
            .env("DATABASE_URL", &target.database_url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MigrationError::Spawn {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MigrationError::Exit {
                command,
                code: output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl MigrationHook for CommandMigrations {
    fn run_migrations<'a>(&'a self, target: &'a EnvironmentConfig) -> MigrationFuture<'a> {
        Box::pin(self.execute(MigrationStep::Run, self.run.as_deref(), target))
    }

    fn validate<'a>(&'a self, target: &'a EnvironmentConfig) -> MigrationFuture<'a> {
        Box::pin(self.execute(MigrationStep::Validate, self.validate.as_deref(), target))
    }

    fn check_backward_compatibility<'a>(&'a self, target: &'a EnvironmentConfig) -> MigrationFuture<'a> {
        Box::pin(self.execute(MigrationStep::Compatibility, self.compatibility.as_deref(), target))
    }
}
