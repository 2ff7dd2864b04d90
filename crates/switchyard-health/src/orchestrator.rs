//! Per-environment health check orchestration.
//!
//! Fans the selected component probes out on a [`JoinSet`], bounds each by
//! the probe timeout and the whole call by the check ceiling, aggregates the
//! results into a [`SystemHealthReport`], and keeps a bounded history.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use switchyard_core::{
    ComponentType, Environment, EnvironmentConfig, HealthCheckResult, HealthSettings,
    HealthStatus, RetryPolicy, SystemHealthReport,
};

use crate::checker::{
    check_endpoints, check_endpoints_with_retry, observe_performance, EndpointHealth,
    ObservedPerformance, RetryOutcome,
};
use crate::probes::ProbeTarget;
use crate::resources::{ResourceSampler, SysinfoSampler};
use crate::transport::Transport;

/// Runs component probes against one environment.
pub struct HealthCheckOrchestrator {
    config: Arc<EnvironmentConfig>,
    settings: HealthSettings,
    transport: Arc<dyn Transport>,
    sampler: Arc<dyn ResourceSampler>,
    history: RwLock<VecDeque<SystemHealthReport>>,
}

impl HealthCheckOrchestrator {
    pub fn new(
        config: EnvironmentConfig,
        settings: HealthSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            settings,
            transport,
            sampler: Arc::new(SysinfoSampler),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Replace the host resource sampler.
    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// Probe the selected components concurrently and record the report.
    ///
    /// `include` restricts the component types, `critical_only` restricts to
    /// the critical set; both together select the intersection. This never
    /// fails: timeouts and panics surface as unhealthy results.
    pub async fn check_health(
        &self,
        include: Option<&[ComponentType]>,
        critical_only: bool,
    ) -> SystemHealthReport {
        let started = Instant::now();
        let targets: Vec<ProbeTarget> = ProbeTarget::all(&self.settings.integrations)
            .into_iter()
            .filter(|t| include.is_none_or(|types| types.contains(&t.component_type())))
            .filter(|t| !critical_only || t.component_type().is_critical())
            .collect();

        let checks = self.run_probes(targets).await;
        let overall = overall_status(&checks);
        let report = SystemHealthReport {
            environment: self.config.environment,
            overall,
            checks,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        };

        info!(
            environment = %report.environment,
            overall = %report.overall,
            checks = report.checks.len(),
            duration_ms = report.duration_ms,
            "health check complete"
        );
        self.record(report.clone());
        report
    }

    async fn run_probes(&self, targets: Vec<ProbeTarget>) -> Vec<HealthCheckResult> {
        let probe_timeout = self.settings.probe_timeout;
        let deadline = tokio::time::Instant::now() + self.settings.check_timeout;

        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();
        for (index, target) in targets.into_iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            let sampler = Arc::clone(&self.sampler);
            let config = Arc::clone(&self.config);
            let probe = target.clone();
            let handle = tasks.spawn(async move {
                match tokio::time::timeout(
                    probe_timeout,
                    probe.run(transport.as_ref(), sampler.as_ref(), &config, probe_timeout),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => HealthCheckResult::unhealthy(
                        probe.name(),
                        probe.component_type(),
                        format!("probe timed out after {}ms", probe_timeout.as_millis()),
                        probe_timeout,
                    ),
                }
            });
            pending.insert(handle.id(), (index, target));
        }

        let mut results = Vec::with_capacity(pending.len());
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(Ok((id, result)))) => {
                    if let Some((index, _)) = pending.remove(&id) {
                        results.push((index, result));
                    }
                }
                Ok(Some(Err(err))) => {
                    if let Some((index, target)) = pending.remove(&err.id()) {
                        let reason = if err.is_panic() {
                            format!("probe panicked: {}", panic_message(err.into_panic()))
                        } else {
                            format!("probe cancelled: {err}")
                        };
                        warn!(component = %target.name(), %reason, "probe task failed");
                        results.push((
                            index,
                            HealthCheckResult::unhealthy(
                                target.name(),
                                target.component_type(),
                                reason,
                                Duration::ZERO,
                            ),
                        ));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        environment = %self.config.environment,
                        remaining = pending.len(),
                        "health check deadline exceeded"
                    );
                    tasks.abort_all();
                    for (_, (index, target)) in pending.drain() {
                        results.push((
                            index,
                            HealthCheckResult::unhealthy(
                                target.name(),
                                target.component_type(),
                                "health check deadline exceeded",
                                self.settings.check_timeout,
                            ),
                        ));
                    }
                    break;
                }
            }
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    fn record(&self, report: SystemHealthReport) {
        let mut history = self.history.write().expect("health history lock");
        history.push_front(report);
        history.truncate(self.settings.history_limit);
    }

    /// Recorded reports, newest first. `limit` caps how many are returned.
    pub fn history(&self, limit: Option<usize>) -> Vec<SystemHealthReport> {
        let history = self.history.read().expect("health history lock");
        let take = limit.unwrap_or(history.len());
        history.iter().take(take).cloned().collect()
    }

    /// Health and readiness endpoints, once.
    pub async fn check_endpoints(&self) -> EndpointHealth {
        check_endpoints(self.transport.as_ref(), &self.config, self.settings.probe_timeout).await
    }

    /// Health and readiness endpoints under a retry policy.
    pub async fn check_endpoints_with_retry(&self, policy: &RetryPolicy) -> RetryOutcome {
        debug!(environment = %self.config.environment, max_attempts = policy.max_attempts, "checking endpoints");
        check_endpoints_with_retry(
            self.transport.as_ref(),
            &self.config,
            self.settings.probe_timeout,
            policy,
        )
        .await
    }

    /// Observed error rate and latency from the metrics endpoint.
    pub async fn observe_performance(&self) -> Result<ObservedPerformance, String> {
        observe_performance(self.transport.as_ref(), &self.config, self.settings.probe_timeout).await
    }
}

/// Derive the overall status of a set of results.
///
/// No results is `Unknown`. A critical component that is unhealthy makes
/// the whole environment unhealthy; any degraded component, or a
/// non-critical unhealthy one, makes it degraded.
pub fn overall_status(checks: &[HealthCheckResult]) -> HealthStatus {
    if checks.is_empty() {
        return HealthStatus::Unknown;
    }
    if checks
        .iter()
        .any(|c| c.component_type.is_critical() && c.status == HealthStatus::Unhealthy)
    {
        return HealthStatus::Unhealthy;
    }
    if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
        return HealthStatus::Degraded;
    }
    if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::resources::{FixedSampler, ResourceUsage, SampleFuture};

    fn orchestrator(mock: Arc<MockTransport>) -> HealthCheckOrchestrator {
        HealthCheckOrchestrator::new(
            EnvironmentConfig::new(Environment::Green, "http://green.test"),
            HealthSettings::default(),
            mock,
        )
        .with_sampler(Arc::new(FixedSampler::idle()))
    }

    fn healthy_mock() -> Arc<MockTransport> {
        let mock = Arc::new(MockTransport::new());
        mock.respond("http://green.test/health", 200)
            .respond("http://green.test/health/ready", 200);
        mock
    }

    fn result(component_type: ComponentType, status: HealthStatus) -> HealthCheckResult {
        HealthCheckResult::new(component_type.as_str(), component_type, status, Duration::ZERO)
    }

    #[tokio::test]
    async fn all_components_healthy() {
        let health = orchestrator(healthy_mock());
        let report = health.check_health(None, false).await;

        assert_eq!(report.overall, HealthStatus::Healthy);
        assert_eq!(report.environment, Environment::Green);
        // api, database, cache, model_serving, integration:crm, host_resources
        assert_eq!(report.checks.len(), 6);
        assert_eq!(report.checks[0].component, "api");
        assert_eq!(report.checks[5].component, "host_resources");
    }

    #[tokio::test]
    async fn critical_only_excludes_non_critical() {
        let health = orchestrator(healthy_mock());
        let report = health.check_health(None, true).await;

        assert_eq!(report.checks.len(), 3);
        for check in &report.checks {
            assert!(check.component_type.is_critical(), "{}", check.component);
        }
    }

    #[tokio::test]
    async fn include_and_critical_only_intersect() {
        let health = orchestrator(healthy_mock());
        let include = [ComponentType::Cache, ComponentType::ModelServing];
        let report = health.check_health(Some(&include), true).await;

        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].component_type, ComponentType::Cache);
    }

    #[tokio::test]
    async fn empty_selection_is_unknown() {
        let health = orchestrator(healthy_mock());
        let include = [ComponentType::ModelServing];
        let report = health.check_health(Some(&include), true).await;
        assert!(report.checks.is_empty());
        assert_eq!(report.overall, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn non_critical_failure_degrades() {
        let mock = healthy_mock();
        mock.respond("http://green.test/health/ml", 500);
        let health = orchestrator(mock);

        let report = health.check_health(None, false).await;
        assert_eq!(report.check("model_serving").unwrap().status, HealthStatus::Unhealthy);
        assert_eq!(report.overall, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn critical_failure_is_unhealthy() {
        let mock = healthy_mock();
        mock.fail("http://green.test/health/database", "connection refused");
        let health = orchestrator(mock);

        let report = health.check_health(None, false).await;
        assert_eq!(report.overall, HealthStatus::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_times_out_individually() {
        let mock = healthy_mock();
        mock.delay("http://green.test/health/redis", Duration::from_secs(60), 200);
        let health = orchestrator(mock);

        let report = health.check_health(None, true).await;
        let cache = report.check("cache").unwrap();
        assert_eq!(cache.status, HealthStatus::Unhealthy);
        assert!(cache.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.overall, HealthStatus::Unhealthy);
    }

    struct StuckSampler;

    impl ResourceSampler for StuckSampler {
        fn sample(&self) -> SampleFuture<'_> {
            Box::pin(std::future::pending())
        }
    }

    struct PanickingSampler;

    fn explode() -> Result<ResourceUsage, String> {
        panic!("sampler exploded")
    }

    impl ResourceSampler for PanickingSampler {
        fn sample(&self) -> SampleFuture<'_> {
            Box::pin(async { explode() })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_aborts_remaining_probes() {
        let mut settings = HealthSettings::default();
        settings.probe_timeout = Duration::from_secs(30);
        settings.check_timeout = Duration::from_secs(10);
        let health = HealthCheckOrchestrator::new(
            EnvironmentConfig::new(Environment::Green, "http://green.test"),
            settings,
            healthy_mock(),
        )
        .with_sampler(Arc::new(StuckSampler));

        let report = health.check_health(None, false).await;
        let host = report.check("host_resources").unwrap();
        assert_eq!(host.error.as_deref(), Some("health check deadline exceeded"));
        assert_eq!(report.check("api").unwrap().status, HealthStatus::Healthy);
        assert_eq!(report.checks.len(), 6);
    }

    #[tokio::test]
    async fn panicking_probe_becomes_unhealthy() {
        let health = orchestrator(healthy_mock()).with_sampler(Arc::new(PanickingSampler));

        let report = health.check_health(None, false).await;
        let host = report.check("host_resources").unwrap();
        assert_eq!(host.status, HealthStatus::Unhealthy);
        assert!(host.error.as_deref().unwrap().contains("sampler exploded"));
        assert_eq!(report.overall, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn history_is_capped_and_newest_first() {
        let mut settings = HealthSettings::default();
        settings.history_limit = 100;
        let health = HealthCheckOrchestrator::new(
            EnvironmentConfig::new(Environment::Green, "http://green.test"),
            settings,
            healthy_mock(),
        )
        .with_sampler(Arc::new(FixedSampler::idle()));

        let include = [ComponentType::Api];
        for _ in 0..105 {
            health.check_health(Some(&include), false).await;
        }

        let all = health.history(None);
        assert_eq!(all.len(), 100);
        for pair in all.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        assert_eq!(health.history(Some(5)).len(), 5);
        assert_eq!(health.history(Some(5))[0], all[0]);
    }

    #[tokio::test]
    async fn host_resources_threshold_feeds_report() {
        let health = orchestrator(healthy_mock()).with_sampler(Arc::new(FixedSampler(ResourceUsage {
            cpu_percent: 88.0,
            memory_percent: 10.0,
            disk_percent: 10.0,
        })));
        let report = health.check_health(Some(&[ComponentType::HostResources]), false).await;
        assert_eq!(report.overall, HealthStatus::Degraded);
    }

    #[test]
    fn overall_status_exhaustive() {
        use HealthStatus::*;
        let statuses = [Healthy, Degraded, Unhealthy, Unknown];

        // One critical and one non-critical component, every combination.
        for critical in statuses {
            for other in statuses {
                let checks = vec![
                    result(ComponentType::Api, critical),
                    result(ComponentType::ModelServing, other),
                ];
                let expected = if critical == Unhealthy {
                    Unhealthy
                } else if critical == Degraded || other == Degraded || other == Unhealthy {
                    Degraded
                } else {
                    Healthy
                };
                assert_eq!(overall_status(&checks), expected, "critical={critical} other={other}");
            }
        }
    }

    #[test]
    fn overall_status_edge_cases() {
        assert_eq!(overall_status(&[]), HealthStatus::Unknown);
        assert_eq!(
            overall_status(&[result(ComponentType::Integration, HealthStatus::Unhealthy)]),
            HealthStatus::Degraded
        );
        assert_eq!(
            overall_status(&[result(ComponentType::Cache, HealthStatus::Unhealthy)]),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            overall_status(&[result(ComponentType::Api, HealthStatus::Unknown)]),
            HealthStatus::Healthy
        );
    }
}
