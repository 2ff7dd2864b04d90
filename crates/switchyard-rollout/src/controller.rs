//! Deployment controller — drives one blue/green release at a time.
//!
//! A deployment walks the phases health check → smoke tests → migration →
//! traffic switching → validation. The first failing phase, a panic, or the
//! deployment-wide timeout triggers a rollback that puts all traffic back on
//! the previously active environment. The active pointer flips only after
//! every phase passed.
//!
//! Dropping the `deploy` future part-way (a caller timeout, Ctrl-C) cannot run
//! the async rollback. The deployment is then closed out as failed with
//! "Deployment cancelled" and flagged for manual intervention if traffic had
//! already moved.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::FutureExt;
use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use switchyard_core::{
    DeploymentMetrics, DeploymentStatus, Environment, EnvironmentConfig, HealthStatus,
    OrchestratorConfig, SwitchOperation, SystemHealthReport,
};
use switchyard_health::{HealthCheckOrchestrator, ResourceSampler, Transport};

use crate::error::{
    OrchestratorError, PhaseFailure, REASON_CANCELLED, REASON_HEALTH_CHECK, REASON_MIGRATION,
    REASON_SMOKE_TESTS, REASON_TIMEOUT, REASON_TRAFFIC_SWITCH, REASON_VALIDATION,
};
use crate::migration::{coordinate, MigrationHook, NoopMigrations};
use crate::smoke::run_smoke_tests;
use crate::strategy::{execute_switch, revert_switch, warm_up};
use crate::traffic::{InMemoryRouter, TrafficRouter};

/// Switch operations kept for the status report.
pub const SWITCH_HISTORY_LIMIT: usize = 50;
/// Finished deployments kept for the status report.
pub const DEPLOYMENT_HISTORY_LIMIT: usize = 20;
/// Health reports included in the status report.
pub const RECENT_HEALTH_CHECKS: usize = 10;
/// Performance samples taken while validation settles after full cutover.
pub const POST_CUTOVER_SAMPLES: u32 = 3;

/// Phases a deployment may skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    pub skip_migration: bool,
    pub skip_smoke_tests: bool,
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatusReport {
    pub status: DeploymentStatus,
    pub active: Environment,
    pub in_progress: bool,
    pub metrics: DeploymentMetrics,
    /// Both environments, newest first.
    pub recent_health_checks: Vec<SystemHealthReport>,
    /// Newest first.
    pub recent_switches: Vec<SwitchOperation>,
    /// Finished deployments, newest first.
    pub recent_deployments: Vec<DeploymentMetrics>,
}

struct OrchestratorState {
    status: DeploymentStatus,
    active: Environment,
    in_progress: bool,
    /// Set once the router accepted any step toward the target.
    traffic_moved: bool,
    /// Phase currently running and when it began.
    open_phase: Option<(DeploymentStatus, Instant)>,
    /// Traffic switch in flight, as last reported by the strategy.
    open_switch: Option<SwitchOperation>,
    metrics: DeploymentMetrics,
    switches: VecDeque<SwitchOperation>,
    deployments: VecDeque<DeploymentMetrics>,
}

/// Coordinates blue/green deployments.
pub struct DeploymentOrchestrator {
    config: OrchestratorConfig,
    transport: Arc<dyn Transport>,
    blue: HealthCheckOrchestrator,
    green: HealthCheckOrchestrator,
    router: Arc<dyn TrafficRouter>,
    migrations: Arc<dyn MigrationHook>,
    state: RwLock<OrchestratorState>,
    deploy_lock: tokio::sync::Mutex<()>,
}

impl DeploymentOrchestrator {
    /// Validate `config` and build an orchestrator with an in-memory router
    /// and no migrations.
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn Transport>) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let blue = HealthCheckOrchestrator::new(config.blue.clone(), config.health.clone(), Arc::clone(&transport));
        let green = HealthCheckOrchestrator::new(config.green.clone(), config.health.clone(), Arc::clone(&transport));
        let router = Arc::new(InMemoryRouter::starting_on(config.initial_active));

        info!(active = %config.initial_active, "deployment orchestrator ready");
        Ok(Self {
            state: RwLock::new(OrchestratorState {
                status: DeploymentStatus::Pending,
                active: config.initial_active,
                in_progress: false,
                traffic_moved: false,
                open_phase: None,
                open_switch: None,
                metrics: DeploymentMetrics::default(),
                switches: VecDeque::new(),
                deployments: VecDeque::new(),
            }),
            config,
            transport,
            blue,
            green,
            router,
            migrations: Arc::new(NoopMigrations),
            deploy_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_router(mut self, router: Arc<dyn TrafficRouter>) -> Self {
        self.router = router;
        self
    }

    pub fn with_migrations(mut self, migrations: Arc<dyn MigrationHook>) -> Self {
        self.migrations = migrations;
        self
    }

    /// Replace the host resource sampler of both health checkers.
    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.blue = self.blue.with_sampler(Arc::clone(&sampler));
        self.green = self.green.with_sampler(sampler);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn active(&self) -> Environment {
        self.read_state(|s| s.active)
    }

    pub fn health(&self, env: Environment) -> &HealthCheckOrchestrator {
        match env {
            Environment::Blue => &self.blue,
            Environment::Green => &self.green,
        }
    }

    /// Snapshot of status, metrics and recent history.
    pub fn status(&self) -> DeploymentStatusReport {
        let mut recent_health_checks = self.blue.history(Some(RECENT_HEALTH_CHECKS));
        recent_health_checks.extend(self.green.history(Some(RECENT_HEALTH_CHECKS)));
        recent_health_checks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent_health_checks.truncate(RECENT_HEALTH_CHECKS);

        self.read_state(|s| DeploymentStatusReport {
            status: s.status,
            active: s.active,
            in_progress: s.in_progress,
            metrics: s.metrics.clone(),
            recent_health_checks,
            recent_switches: s.switches.iter().cloned().collect(),
            recent_deployments: s.deployments.iter().cloned().collect(),
        })
    }

    /// Deploy to `target` (default: the inactive environment).
    ///
    /// Returns `Ok(true)` when the release completed and the active
    /// environment flipped, `Ok(false)` when it failed and was rolled back
    /// (or stopped, with auto-rollback off). Calls rejected before starting
    /// return an error and leave status and metrics untouched.
    pub async fn deploy(
        &self,
        target: Option<Environment>,
        options: DeployOptions,
    ) -> Result<bool, OrchestratorError> {
        let _guard = self
            .deploy_lock
            .try_lock()
            .map_err(|_| OrchestratorError::DeploymentInProgress)?;

        let active = self.active();
        let target = target.unwrap_or(active.other());
        if target == active {
            return Err(OrchestratorError::TargetIsActive(target));
        }

        let deployment_id = Uuid::new_v4().to_string();
        self.write_state(|s| {
            s.status = DeploymentStatus::Pending;
            s.metrics = DeploymentMetrics::start(&deployment_id, active, target);
            s.in_progress = true;
            s.traffic_moved = false;
            s.open_phase = None;
            s.open_switch = None;
        });
        let mut cancel_guard = CancelGuard {
            orchestrator: self,
            deployment_id: &deployment_id,
            armed: true,
        };
        info!(
            deployment_id = %deployment_id,
            source = %active,
            %target,
            skip_migration = options.skip_migration,
            skip_smoke_tests = options.skip_smoke_tests,
            "deployment started"
        );

        let phases = AssertUnwindSafe(self.run_phases(&deployment_id, target, options)).catch_unwind();
        let outcome = match tokio::time::timeout(self.config.deployment_timeout, phases).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = panic_message(panic);
                self.close_interrupted("panic");
                Err(PhaseFailure::new(
                    self.current_status(),
                    format!("Unexpected error: {message}"),
                    message,
                ))
            }
            Err(_) => {
                self.close_interrupted("timeout");
                Err(PhaseFailure::new(
                    self.current_status(),
                    REASON_TIMEOUT,
                    format!("exceeded {}ms", self.config.deployment_timeout.as_millis()),
                ))
            }
        };

        let succeeded = match outcome {
            Ok(()) => {
                self.complete(target);
                true
            }
            Err(failure) => {
                self.handle_failure(&deployment_id, active, target, failure).await;
                false
            }
        };

        let metrics = self.write_state(|s| {
            s.metrics.succeeded = succeeded;
            s.close_out()
        });
        cancel_guard.armed = false;
        info!(
            deployment_id = %deployment_id,
            succeeded,
            total_duration_ms = metrics.total_duration_ms,
            active = %self.active(),
            "deployment finished"
        );
        Ok(succeeded)
    }

    async fn run_phases(
        &self,
        deployment_id: &str,
        target: Environment,
        options: DeployOptions,
    ) -> Result<(), PhaseFailure> {
        let target_config = self.config.environment(target);
        let target_health = self.health(target);

        // Health check
        let started = self.begin_phase(DeploymentStatus::HealthCheck);
        let outcome = target_health.check_endpoints_with_retry(&self.config.retry).await;
        self.finish_phase(DeploymentStatus::HealthCheck, started, Some(self.config.budgets.health_check));
        self.write_state(|s| {
            s.metrics.health_checks_failed += outcome.failures;
            if outcome.passed {
                s.metrics.health_checks_passed += 1;
            }
        });
        if !outcome.passed {
            return Err(PhaseFailure::new(
                DeploymentStatus::HealthCheck,
                REASON_HEALTH_CHECK,
                format!("{} after {} attempts", outcome.last.describe(), outcome.attempts),
            ));
        }

        // Smoke tests
        if options.skip_smoke_tests {
            debug!(deployment_id, "smoke tests skipped");
        } else {
            let started = self.begin_phase(DeploymentStatus::SmokeTests);
            let report =
                run_smoke_tests(self.transport.as_ref(), target_config, &self.config.smoke, deployment_id).await;
            self.finish_phase(DeploymentStatus::SmokeTests, started, None);
            self.write_state(|s| {
                s.metrics.smoke_tests_passed = report.passed;
                s.metrics.smoke_tests_failed = report.failed;
            });
            if report.pass_rate() < target_config.min_success_rate {
                return Err(PhaseFailure::new(
                    DeploymentStatus::SmokeTests,
                    REASON_SMOKE_TESTS,
                    format!(
                        "pass rate {:.0}% below {:.0}%: {}",
                        report.pass_rate() * 100.0,
                        target_config.min_success_rate * 100.0,
                        report.failures().join("; ")
                    ),
                ));
            }
        }

        // Migration
        if options.skip_migration {
            debug!(deployment_id, "migration skipped");
        } else {
            let started = self.begin_phase(DeploymentStatus::Migration);
            let result = coordinate(self.migrations.as_ref(), target_config).await;
            self.finish_phase(DeploymentStatus::Migration, started, None);
            if let Err(e) = result {
                return Err(PhaseFailure::new(DeploymentStatus::Migration, REASON_MIGRATION, e.to_string()));
            }
        }

        // Traffic switching
        let started = self.begin_phase(DeploymentStatus::TrafficSwitching);
        let operation = self.switch_traffic(target, target_config, target_health).await;
        self.finish_phase(
            DeploymentStatus::TrafficSwitching,
            started,
            Some(self.config.budgets.traffic_switch),
        );
        let switched = operation.success;
        let reason = operation.reason.clone();
        self.write_state(|s| s.open_switch = None);
        self.record_switch(operation);
        if !switched {
            return Err(PhaseFailure::new(
                DeploymentStatus::TrafficSwitching,
                REASON_TRAFFIC_SWITCH,
                reason.unwrap_or_default(),
            ));
        }

        // Final validation
        let started = self.begin_phase(DeploymentStatus::Validation);
        let first = target_health.check_endpoints().await;
        let (watch, second) = if first.is_healthy() {
            let watch = self.watch_cutover(target_health, target_config).await;
            (watch, Some(target_health.check_endpoints().await))
        } else {
            (Ok(()), None)
        };
        self.finish_phase(DeploymentStatus::Validation, started, None);
        if let Err(reason) = watch {
            return Err(PhaseFailure::new(
                DeploymentStatus::Validation,
                REASON_VALIDATION,
                format!("post-cutover metrics: {reason}"),
            ));
        }
        match second {
            Some(second) if second.is_healthy() => Ok(()),
            Some(second) => Err(PhaseFailure::new(
                DeploymentStatus::Validation,
                REASON_VALIDATION,
                format!("second check: {}", second.describe()),
            )),
            None => Err(PhaseFailure::new(
                DeploymentStatus::Validation,
                REASON_VALIDATION,
                format!("first check: {}", first.describe()),
            )),
        }
    }

    async fn switch_traffic(
        &self,
        target: Environment,
        target_config: &EnvironmentConfig,
        target_health: &HealthCheckOrchestrator,
    ) -> SwitchOperation {
        let plan = &self.config.plan;
        warm_up(
            self.transport.as_ref(),
            target_config,
            &plan.warmup_paths,
            self.config.health.probe_timeout,
        )
        .await;

        execute_switch(
            self.router.as_ref(),
            target.other(),
            target,
            plan,
            |operation| {
                self.write_state(|s| {
                    s.traffic_moved = true;
                    s.open_switch = Some(operation.clone());
                })
            },
            |percentage| async move {
                let report = target_health.check_health(None, true).await;
                if report.overall == HealthStatus::Unhealthy {
                    return Err(format!("{target} unhealthy at {percentage}%"));
                }
                let observed = target_health.observe_performance().await?;
                debug!(
                    percentage,
                    error_rate = observed.error_rate,
                    avg_response_time_ms = observed.avg_response_time_ms,
                    simulated = observed.simulated,
                    "step performance"
                );
                observed.evaluate(target_config)
            },
        )
        .await
    }

    /// Sample observed performance at even intervals across the validation
    /// settle time. The first bad sample ends the watch.
    async fn watch_cutover(
        &self,
        target_health: &HealthCheckOrchestrator,
        target_config: &EnvironmentConfig,
    ) -> Result<(), String> {
        let settle = self.config.validation_settle;
        let started = Instant::now();
        for sample in 1..=POST_CUTOVER_SAMPLES {
            tokio::time::sleep_until(started + settle * sample / POST_CUTOVER_SAMPLES).await;
            let observed = target_health.observe_performance().await?;
            debug!(
                sample,
                error_rate = observed.error_rate,
                avg_response_time_ms = observed.avg_response_time_ms,
                simulated = observed.simulated,
                "post-cutover performance"
            );
            observed.evaluate(target_config)?;
        }
        Ok(())
    }

    fn complete(&self, target: Environment) {
        self.transition(DeploymentStatus::Completed);
        let previous = self.write_state(|s| std::mem::replace(&mut s.active, target));
        info!(from = %previous, to = %target, "active environment switched");
    }

    async fn handle_failure(
        &self,
        deployment_id: &str,
        active: Environment,
        target: Environment,
        failure: PhaseFailure,
    ) {
        error!(
            deployment_id,
            phase = %failure.phase,
            reason = %failure.reason,
            detail = %failure.detail,
            "deployment phase failed"
        );
        self.write_state(|s| s.metrics.rollback_reason = Some(failure.reason.clone()));

        if self.config.plan.auto_rollback {
            self.rollback(active, target, &failure.reason).await;
            return;
        }

        let traffic_moved = self.write_state(|s| {
            if s.traffic_moved {
                s.metrics.manual_intervention_required = true;
            }
            s.traffic_moved
        });
        if traffic_moved {
            error!(
                severity = "critical",
                deployment_id,
                %target,
                "auto-rollback disabled with traffic on the target; manual intervention required"
            );
        } else {
            warn!(deployment_id, "auto-rollback disabled; traffic untouched");
        }
        self.transition(DeploymentStatus::Failed);
    }

    /// Put all traffic back on `active` and confirm it is serving.
    ///
    /// Runs once and never retries. Any failure leaves the deployment
    /// flagged for manual intervention.
    async fn rollback(&self, active: Environment, target: Environment, reason: &str) {
        let started = self.begin_phase(DeploymentStatus::RollingBack);
        self.write_state(|s| s.metrics.rollback_triggered = true);
        warn!(%active, %target, reason, "rolling back");

        let operation = revert_switch(self.router.as_ref(), target, active).await;
        let router_error = operation.reason.clone();
        self.record_switch(operation);

        let recheck = self.health(active).check_endpoints().await;
        self.finish_phase(DeploymentStatus::RollingBack, started, Some(self.config.budgets.rollback));

        let failure = match (router_error, recheck.is_healthy()) {
            (None, true) => None,
            (Some(e), _) => Some(format!("router: {e}")),
            (None, false) => Some(format!("{active} re-check failed: {}", recheck.describe())),
        };
        match failure {
            None => info!(%active, "rollback complete"),
            Some(detail) => {
                error!(
                    severity = "critical",
                    %active,
                    %target,
                    %detail,
                    "rollback failed; manual intervention required"
                );
                self.write_state(|s| s.metrics.manual_intervention_required = true);
            }
        }
        self.transition(DeploymentStatus::Failed);
    }

    fn record_switch(&self, operation: SwitchOperation) {
        self.write_state(|s| {
            s.switches.push_front(operation);
            s.switches.truncate(SWITCH_HISTORY_LIMIT);
        });
    }

    fn begin_phase(&self, phase: DeploymentStatus) -> Instant {
        self.transition(phase);
        let started = Instant::now();
        self.write_state(|s| s.open_phase = Some((phase, started)));
        started
    }

    /// Record a phase duration and warn when an advisory budget is exceeded.
    fn finish_phase(&self, phase: DeploymentStatus, started: Instant, budget: Option<Duration>) {
        let elapsed = started.elapsed();
        self.write_state(|s| {
            s.open_phase = None;
            s.metrics.record_phase(phase, elapsed);
        });
        match budget {
            Some(budget) if elapsed > budget => warn!(
                %phase,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "phase exceeded its budget"
            ),
            _ => debug!(%phase, elapsed_ms = elapsed.as_millis() as u64, "phase finished"),
        }
    }

    /// Keep what a cut-off phase left behind: its duration so far and any
    /// traffic steps already applied.
    fn close_interrupted(&self, cause: &str) {
        self.write_state(|s| s.close_interrupted(cause));
    }

    /// Close out a deployment whose `deploy` future was dropped.
    fn abandon(&self, deployment_id: &str) {
        let (phase, stranded) = self.write_state(|s| {
            s.close_interrupted("cancelled");
            let phase = s.status;
            s.status = DeploymentStatus::Failed;
            s.metrics.rollback_reason.get_or_insert_with(|| REASON_CANCELLED.to_string());
            if s.traffic_moved {
                s.metrics.manual_intervention_required = true;
            }
            s.metrics.succeeded = false;
            s.close_out();
            (phase, s.traffic_moved)
        });
        if stranded {
            error!(
                severity = "critical",
                deployment_id,
                %phase,
                "deployment cancelled after traffic moved; manual intervention required"
            );
        } else {
            warn!(deployment_id, %phase, "deployment cancelled");
        }
    }

    fn transition(&self, next: DeploymentStatus) -> bool {
        self.write_state(|s| {
            if s.status.can_transition_to(next) {
                debug!(from = %s.status, to = %next, "status transition");
                s.status = next;
                true
            } else {
                warn!(from = %s.status, to = %next, "rejected status transition");
                false
            }
        })
    }

    fn current_status(&self) -> DeploymentStatus {
        self.read_state(|s| s.status)
    }

    fn read_state<T>(&self, f: impl FnOnce(&OrchestratorState) -> T) -> T {
        let state = self.state.read().expect("orchestrator state lock");
        f(&state)
    }

    fn write_state<T>(&self, f: impl FnOnce(&mut OrchestratorState) -> T) -> T {
        let mut state = self.state.write().expect("orchestrator state lock");
        f(&mut state)
    }
}

impl OrchestratorState {
    fn close_interrupted(&mut self, cause: &str) {
        if let Some((phase, started)) = self.open_phase.take() {
            self.metrics.record_phase(phase, started.elapsed());
        }
        if let Some(mut operation) = self.open_switch.take() {
            operation.reason = Some(format!("interrupted by {cause} at {}%", operation.traffic_percentage));
            operation.completed_at = Some(Utc::now());
            self.switches.push_front(operation);
            self.switches.truncate(SWITCH_HISTORY_LIMIT);
        }
    }

    /// Finalise metrics, clear the in-flight flag and file the deployment.
    fn close_out(&mut self) -> DeploymentMetrics {
        self.metrics.finalize();
        self.in_progress = false;
        self.deployments.push_front(self.metrics.clone());
        self.deployments.truncate(DEPLOYMENT_HISTORY_LIMIT);
        self.metrics.clone()
    }
}

/// Closes out the deployment if the `deploy` future is dropped mid-run.
struct CancelGuard<'a> {
    orchestrator: &'a DeploymentOrchestrator,
    deployment_id: &'a str,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.orchestrator.abandon(self.deployment_id);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
