//! Domain types shared by the health checker and the deployment orchestrator.
//!
//! Everything here is plain data: serializable, cheap to clone, and free of
//! I/O. Settings structs carry validated runtime values; the TOML layer in
//! [`crate::config`] converts into them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// ── Environment ───────────────────────────────────────────────────

/// One of the two parallel production stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Blue,
    Green,
}

impl Environment {
    /// The opposite colour.
    pub fn other(self) -> Self {
        match self {
            Environment::Blue => Environment::Green,
            Environment::Green => Environment::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Blue => "blue",
            Environment::Green => "green",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" => Ok(Environment::Blue),
            "green" => Ok(Environment::Green),
            other => Err(CoreError::InvalidEnvironment(other.to_string())),
        }
    }
}

/// Immutable description of one stack and its performance thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConfig {
    pub environment: Environment,
    /// Base URL of the application, e.g. `http://green.internal:8000`.
    pub base_url: String,
    /// Primary datastore connection string (passed to migrations).
    pub database_url: String,
    /// Cache connection string.
    pub cache_url: String,
    /// Liveness path, e.g. `/health`.
    pub health_path: String,
    /// Readiness path, e.g. `/health/ready`.
    pub readiness_path: String,
    /// Responses slower than this mark the API degraded.
    pub max_response_time_ms: u64,
    /// Highest tolerated observed error rate (0.0–1.0).
    pub max_error_rate: f64,
    /// Lowest tolerated smoke-test pass rate (0.0–1.0).
    pub min_success_rate: f64,
}

impl EnvironmentConfig {
    /// Config with default paths and thresholds.
    pub fn new(environment: Environment, base_url: impl Into<String>) -> Self {
        Self {
            environment,
            base_url: base_url.into(),
            database_url: String::new(),
            cache_url: String::new(),
            health_path: "/health".to_string(),
            readiness_path: "/health/ready".to_string(),
            max_response_time_ms: 2000,
            max_error_rate: 0.05,
            min_success_rate: 0.99,
        }
    }

    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn health_url(&self) -> String {
        self.url(&self.health_path)
    }

    pub fn readiness_url(&self) -> String {
        self.url(&self.readiness_path)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason: String| CoreError::InvalidEnvironmentConfig {
            environment: self.environment,
            reason,
        };

        if self.base_url.trim().is_empty() {
            return Err(invalid("base_url is empty".to_string()));
        }
        for (name, path) in [
            ("health_path", &self.health_path),
            ("readiness_path", &self.readiness_path),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(format!("{name} must start with '/': {path}")));
            }
        }
        for (name, rate) in [
            ("max_error_rate", self.max_error_rate),
            ("min_success_rate", self.min_success_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(invalid(format!("{name} must be within [0, 1], got {rate}")));
            }
        }
        Ok(())
    }
}

// ── Deployment state machine ──────────────────────────────────────

/// Orchestration state of the current (or last) deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    HealthCheck,
    SmokeTests,
    Migration,
    TrafficSwitching,
    Validation,
    Completed,
    RollingBack,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentStatus::Completed | DeploymentStatus::Failed)
    }

    /// Position in the forward phase sequence.
    fn phase_index(self) -> Option<u8> {
        match self {
            DeploymentStatus::Pending => Some(0),
            DeploymentStatus::HealthCheck => Some(1),
            DeploymentStatus::SmokeTests => Some(2),
            DeploymentStatus::Migration => Some(3),
            DeploymentStatus::TrafficSwitching => Some(4),
            DeploymentStatus::Validation => Some(5),
            DeploymentStatus::Completed => Some(6),
            DeploymentStatus::RollingBack | DeploymentStatus::Failed => None,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Phases only move forward (skipped phases are jumped over), rollback
    /// is reachable from any non-terminal state, and a new deployment resets
    /// a terminal state to `Pending`.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;

        match (self, next) {
            (_, Pending) => self.is_terminal() || self == Pending,
            (RollingBack, Failed) => true,
            (RollingBack, _) => false,
            (current, RollingBack) | (current, Failed) => !current.is_terminal(),
            (Validation, Completed) => true,
            (_, Completed) => false,
            (current, next) => match (current.phase_index(), next.phase_index()) {
                (Some(from), Some(to)) => to > from && !current.is_terminal(),
                _ => false,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::HealthCheck => "health_check",
            DeploymentStatus::SmokeTests => "smoke_tests",
            DeploymentStatus::Migration => "migration",
            DeploymentStatus::TrafficSwitching => "traffic_switching",
            DeploymentStatus::Validation => "validation",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::RollingBack => "rolling_back",
            DeploymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and counters for one deployment attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeploymentMetrics {
    pub deployment_id: String,
    pub source: Option<Environment>,
    pub target: Option<Environment>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_duration_ms: u64,
    pub health_check_duration_ms: u64,
    pub smoke_test_duration_ms: u64,
    pub migration_duration_ms: u64,
    pub traffic_switch_duration_ms: u64,
    pub validation_duration_ms: u64,
    pub rollback_duration_ms: u64,
    /// Health-check phase attempts that passed.
    pub health_checks_passed: u32,
    /// Health-check phase attempts that failed.
    pub health_checks_failed: u32,
    pub smoke_tests_passed: u32,
    pub smoke_tests_failed: u32,
    pub rollback_triggered: bool,
    pub rollback_reason: Option<String>,
    /// Set when automation stopped and an operator has to step in.
    pub manual_intervention_required: bool,
    pub succeeded: bool,
}

impl DeploymentMetrics {
    /// Fresh metrics for a deployment starting now.
    pub fn start(deployment_id: impl Into<String>, source: Environment, target: Environment) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            source: Some(source),
            target: Some(target),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Record how long a phase took. Phases without a duration slot are ignored.
    pub fn record_phase(&mut self, phase: DeploymentStatus, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        match phase {
            DeploymentStatus::HealthCheck => self.health_check_duration_ms = ms,
            DeploymentStatus::SmokeTests => self.smoke_test_duration_ms = ms,
            DeploymentStatus::Migration => self.migration_duration_ms = ms,
            DeploymentStatus::TrafficSwitching => self.traffic_switch_duration_ms = ms,
            DeploymentStatus::Validation => self.validation_duration_ms = ms,
            DeploymentStatus::RollingBack => self.rollback_duration_ms = ms,
            _ => {}
        }
    }

    /// Stamp the end time and compute the total duration.
    pub fn finalize(&mut self) {
        let ended = Utc::now();
        if let Some(started) = self.started_at {
            self.total_duration_ms = (ended - started).num_milliseconds().max(0) as u64;
        }
        self.ended_at = Some(ended);
    }
}

// ── Health ────────────────────────────────────────────────────────

/// Health of one component or of a whole environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of subsystem a health probe covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Api,
    PrimaryStore,
    Cache,
    ModelServing,
    Integration,
    HostResources,
}

impl ComponentType {
    pub const ALL: [ComponentType; 6] = [
        ComponentType::Api,
        ComponentType::PrimaryStore,
        ComponentType::Cache,
        ComponentType::ModelServing,
        ComponentType::Integration,
        ComponentType::HostResources,
    ];

    /// Components whose failure alone makes an environment unhealthy.
    pub const CRITICAL: [ComponentType; 3] = [
        ComponentType::Api,
        ComponentType::PrimaryStore,
        ComponentType::Cache,
    ];

    pub fn is_critical(self) -> bool {
        Self::CRITICAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentType::Api => "api",
            ComponentType::PrimaryStore => "primary_store",
            ComponentType::Cache => "cache",
            ComponentType::ModelServing => "model_serving",
            ComponentType::Integration => "integration",
            ComponentType::HostResources => "host_resources",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentType::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| CoreError::InvalidSettings(format!("unknown component: {s}")))
    }
}

/// Outcome of a single component probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckResult {
    pub component: String,
    pub component_type: ComponentType,
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub details: BTreeMap<String, serde_json::Value>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn new(
        component: impl Into<String>,
        component_type: ComponentType,
        status: HealthStatus,
        latency: Duration,
    ) -> Self {
        Self {
            component: component.into(),
            component_type,
            status,
            latency_ms: latency.as_millis() as u64,
            timestamp: Utc::now(),
            details: BTreeMap::new(),
            error: None,
        }
    }

    /// An unhealthy result carrying an error message.
    pub fn unhealthy(
        component: impl Into<String>,
        component_type: ComponentType,
        error: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(component, component_type, HealthStatus::Unhealthy, latency)
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Aggregate of one `check_health` call against one environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemHealthReport {
    pub environment: Environment,
    pub overall: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl SystemHealthReport {
    /// Find the result for a named component.
    pub fn check(&self, component: &str) -> Option<&HealthCheckResult> {
        self.checks.iter().find(|c| c.component == component)
    }
}

// ── Traffic switching ─────────────────────────────────────────────

/// How traffic moves from the active environment to the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficSwitchPlan {
    /// Move traffic in stages rather than all at once.
    pub gradual: bool,
    /// Target percentages, in order. The last must be 100.
    pub steps: Vec<u8>,
    /// Wait after each step before validating it.
    pub step_settle: Duration,
    /// Re-check target health and error rate after every step.
    pub validate_each_step: bool,
    /// Revert traffic automatically when a phase fails.
    pub auto_rollback: bool,
    /// Paths hit once (best-effort) before the first step.
    pub warmup_paths: Vec<String>,
}

impl Default for TrafficSwitchPlan {
    fn default() -> Self {
        Self {
            gradual: true,
            steps: vec![10, 50, 100],
            step_settle: Duration::from_secs(5),
            validate_each_step: true,
            auto_rollback: true,
            warmup_paths: vec!["/api/warmup".to_string(), "/cache/preload".to_string()],
        }
    }
}

impl TrafficSwitchPlan {
    /// The percentages actually applied: the configured steps when gradual,
    /// a single 100% step otherwise.
    pub fn effective_steps(&self) -> Vec<u8> {
        if self.gradual {
            self.steps.clone()
        } else {
            vec![100]
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.steps.is_empty() {
            return Err(CoreError::InvalidPlan("steps must not be empty".to_string()));
        }
        let mut previous = 0u8;
        for &step in &self.steps {
            if step == 0 || step > 100 {
                return Err(CoreError::InvalidPlan(format!("step {step} outside 1..=100")));
            }
            if step <= previous {
                return Err(CoreError::InvalidPlan(format!(
                    "steps must increase strictly: {step} after {previous}"
                )));
            }
            previous = step;
        }
        if previous != 100 {
            return Err(CoreError::InvalidPlan(format!(
                "last step must be 100, got {previous}"
            )));
        }
        Ok(())
    }
}

/// Kind of traffic movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    Gradual,
    Immediate,
    Rollback,
}

/// Record of one traffic movement between environments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwitchOperation {
    pub operation_id: String,
    pub from: Environment,
    pub to: Environment,
    pub kind: SwitchKind,
    /// Percentages sent to `to`, in the order they were applied.
    pub steps_applied: Vec<u8>,
    /// Last percentage successfully applied to `to`.
    pub traffic_percentage: u8,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub reason: Option<String>,
}

// ── Runtime settings ──────────────────────────────────────────────

/// Fixed or exponential retry with a bounded number of attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub exponential: bool,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            exponential: false,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            ..Default::default()
        }
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.delay;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Settings for component health checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSettings {
    /// Ceiling for each individual probe.
    pub probe_timeout: Duration,
    /// Ceiling for a whole `check_health` call.
    pub check_timeout: Duration,
    /// Reports kept in history.
    pub history_limit: usize,
    /// Third-party integrations probed at `/health/<name>`.
    pub integrations: Vec<String>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            check_timeout: Duration::from_secs(10),
            history_limit: 100,
            integrations: vec!["crm".to_string()],
        }
    }
}

/// Settings for the smoke-test battery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmokeSettings {
    /// Business endpoints that must answer 200 (or 404).
    pub endpoints: Vec<String>,
    pub webhook_path: String,
    pub timeout: Duration,
}

impl Default for SmokeSettings {
    fn default() -> Self {
        Self {
            endpoints: vec!["/api/v1/score".to_string(), "/api/v1/match".to_string()],
            webhook_path: "/webhooks/smoke-test".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Advisory phase budgets. Overruns are logged, not enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseBudgets {
    pub health_check: Duration,
    pub traffic_switch: Duration,
    pub rollback: Duration,
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            health_check: Duration::from_secs(10),
            traffic_switch: Duration::from_secs(30),
            rollback: Duration::from_secs(60),
        }
    }
}

/// Everything the deployment orchestrator is constructed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    pub blue: EnvironmentConfig,
    pub green: EnvironmentConfig,
    pub plan: TrafficSwitchPlan,
    pub health: HealthSettings,
    pub smoke: SmokeSettings,
    pub retry: RetryPolicy,
    pub budgets: PhaseBudgets,
    /// Enforced ceiling for a whole deployment.
    pub deployment_timeout: Duration,
    /// Wait between the two final validation checks.
    pub validation_settle: Duration,
    pub initial_active: Environment,
}

impl OrchestratorConfig {
    /// Defaults for everything except the two environments.
    pub fn new(blue: EnvironmentConfig, green: EnvironmentConfig) -> Self {
        Self {
            blue,
            green,
            plan: TrafficSwitchPlan::default(),
            health: HealthSettings::default(),
            smoke: SmokeSettings::default(),
            retry: RetryPolicy::default(),
            budgets: PhaseBudgets::default(),
            deployment_timeout: Duration::from_secs(300),
            validation_settle: Duration::from_secs(5),
            initial_active: Environment::Blue,
        }
    }

    pub fn environment(&self, env: Environment) -> &EnvironmentConfig {
        match env {
            Environment::Blue => &self.blue,
            Environment::Green => &self.green,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        for (expected, config) in [(Environment::Blue, &self.blue), (Environment::Green, &self.green)] {
            if config.environment != expected {
                return Err(CoreError::InvalidEnvironmentConfig {
                    environment: expected,
                    reason: format!("config is labelled {}", config.environment),
                });
            }
            config.validate()?;
        }
        if self.blue.base_url.trim_end_matches('/') == self.green.base_url.trim_end_matches('/') {
            return Err(CoreError::InvalidSettings(
                "blue and green must have different base URLs".to_string(),
            ));
        }
        self.plan.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(CoreError::InvalidSettings("retry max_attempts must be at least 1".to_string()));
        }
        if self.health.history_limit == 0 {
            return Err(CoreError::InvalidSettings("history_limit must be at least 1".to_string()));
        }
        if self.deployment_timeout.is_zero() {
            return Err(CoreError::InvalidSettings("deployment_timeout must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig::new(
            EnvironmentConfig::new(Environment::Blue, "http://blue.test"),
            EnvironmentConfig::new(Environment::Green, "http://green.test"),
        )
    }

    #[test]
    fn environment_other_and_parse() {
        assert_eq!(Environment::Blue.other(), Environment::Green);
        assert_eq!(Environment::Green.other(), Environment::Blue);
        assert_eq!("GREEN".parse::<Environment>().unwrap(), Environment::Green);
        assert!("red".parse::<Environment>().is_err());
        assert_eq!(Environment::default(), Environment::Blue);
    }

    #[test]
    fn environment_urls_join_cleanly() {
        let env = EnvironmentConfig::new(Environment::Green, "http://green.test/");
        assert_eq!(env.health_url(), "http://green.test/health");
        assert_eq!(env.readiness_url(), "http://green.test/health/ready");
        assert_eq!(env.url("/health/ml"), "http://green.test/health/ml");
    }

    #[test]
    fn environment_validation_rejects_bad_rates() {
        let mut env = EnvironmentConfig::new(Environment::Blue, "http://blue.test");
        env.min_success_rate = 1.5;
        assert!(env.validate().is_err());

        let mut env = EnvironmentConfig::new(Environment::Blue, "");
        env.max_error_rate = 0.1;
        assert!(env.validate().is_err());
    }

    #[test]
    fn forward_transitions_allowed() {
        use DeploymentStatus::*;
        assert!(Pending.can_transition_to(HealthCheck));
        assert!(HealthCheck.can_transition_to(SmokeTests));
        assert!(HealthCheck.can_transition_to(Migration));
        assert!(SmokeTests.can_transition_to(TrafficSwitching));
        assert!(TrafficSwitching.can_transition_to(Validation));
        assert!(Validation.can_transition_to(Completed));
    }

    #[test]
    fn backward_and_terminal_transitions_rejected() {
        use DeploymentStatus::*;
        assert!(!SmokeTests.can_transition_to(HealthCheck));
        assert!(!Migration.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(RollingBack));
        assert!(!Failed.can_transition_to(HealthCheck));
        assert!(!RollingBack.can_transition_to(Completed));
    }

    #[test]
    fn rollback_reachable_from_every_active_phase() {
        use DeploymentStatus::*;
        for status in [Pending, HealthCheck, SmokeTests, Migration, TrafficSwitching, Validation] {
            assert!(status.can_transition_to(RollingBack), "{status}");
        }
        assert!(RollingBack.can_transition_to(Failed));
    }

    #[test]
    fn new_deployment_resets_terminal_states() {
        use DeploymentStatus::*;
        assert!(Completed.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Migration.can_transition_to(Pending));
    }

    #[test]
    fn metrics_finalize_sets_end_time() {
        let mut metrics = DeploymentMetrics::start("d-1", Environment::Blue, Environment::Green);
        metrics.record_phase(DeploymentStatus::HealthCheck, Duration::from_millis(1500));
        metrics.finalize();
        assert!(metrics.ended_at.is_some());
        assert_eq!(metrics.health_check_duration_ms, 1500);
        assert!(metrics.ended_at >= metrics.started_at);
    }

    #[test]
    fn plan_validation() {
        assert!(TrafficSwitchPlan::default().validate().is_ok());

        let bad = |steps: Vec<u8>| TrafficSwitchPlan {
            steps,
            ..Default::default()
        };
        assert!(bad(vec![]).validate().is_err());
        assert!(bad(vec![10, 50]).validate().is_err());
        assert!(bad(vec![50, 10, 100]).validate().is_err());
        assert!(bad(vec![0, 100]).validate().is_err());
        assert!(bad(vec![100]).validate().is_ok());
    }

    #[test]
    fn immediate_plan_uses_single_step() {
        let plan = TrafficSwitchPlan {
            gradual: false,
            ..Default::default()
        };
        assert_eq!(plan.effective_steps(), vec![100]);
        assert_eq!(TrafficSwitchPlan::default().effective_steps(), vec![10, 50, 100]);
    }

    #[test]
    fn retry_policy_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[test]
    fn retry_policy_exponential_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            delay: Duration::from_secs(1),
            exponential: true,
            max_delay: Duration::from_secs(5),
        };
        // 1 → 2 → 4 → 5 → 5
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn orchestrator_config_validation() {
        assert!(config().validate().is_ok());

        let mut same_url = config();
        same_url.green.base_url = "http://blue.test/".to_string();
        assert!(same_url.validate().is_err());

        let mut swapped = config();
        swapped.blue.environment = Environment::Green;
        assert!(swapped.validate().is_err());

        let mut no_attempts = config();
        no_attempts.retry.max_attempts = 0;
        assert!(no_attempts.validate().is_err());
    }

    #[test]
    fn component_criticality() {
        assert!(ComponentType::Api.is_critical());
        assert!(ComponentType::Cache.is_critical());
        assert!(!ComponentType::ModelServing.is_critical());
        assert!(!ComponentType::HostResources.is_critical());
        assert_eq!("primary_store".parse::<ComponentType>().unwrap(), ComponentType::PrimaryStore);
    }
}
