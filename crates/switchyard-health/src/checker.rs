//! Endpoint probe logic.
//!
//! Performs bounded HTTP checks against an environment's health and
//! readiness endpoints, with a retry policy for the deployment's
//! health-check phase, and reads observed performance during traffic
//! switching.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use switchyard_core::{EnvironmentConfig, RetryPolicy};

use crate::transport::Transport;

/// Result of a single endpoint probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Healthy,
    /// The endpoint returned a non-2xx status.
    Unhealthy(u16),
    /// The probe could not be executed (connection error or timeout).
    Failed(String),
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy)
    }

    /// Human-readable reason for a non-healthy result.
    pub fn describe(&self) -> String {
        match self {
            ProbeResult::Healthy => "healthy".to_string(),
            ProbeResult::Unhealthy(status) => format!("HTTP {status}"),
            ProbeResult::Failed(reason) => reason.clone(),
        }
    }
}

/// Perform a bounded GET against `url`.
///
/// Returns `Healthy` for 2xx, `Unhealthy` for other statuses, and `Failed`
/// when the request errors or exceeds `timeout`.
pub async fn http_probe(transport: &dyn Transport, url: &str, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, transport.get(url)).await {
        Ok(Ok(response)) if response.is_success() => ProbeResult::Healthy,
        Ok(Ok(response)) => {
            debug!(status = response.status, %url, "probe non-2xx");
            ProbeResult::Unhealthy(response.status)
        }
        Ok(Err(e)) => {
            debug!(error = %e, %url, "probe request failed");
            ProbeResult::Failed(e.to_string())
        }
        Err(_) => {
            debug!(%url, "probe timed out");
            ProbeResult::Failed(format!("timed out after {}ms", timeout.as_millis()))
        }
    }
}

/// Health and readiness of one environment at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHealth {
    pub health: ProbeResult,
    pub readiness: ProbeResult,
}

impl EndpointHealth {
    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy() && self.readiness.is_healthy()
    }

    pub fn describe(&self) -> String {
        format!(
            "health: {}, readiness: {}",
            self.health.describe(),
            self.readiness.describe()
        )
    }
}

/// Probe the health and readiness endpoints concurrently, once.
pub async fn check_endpoints(
    transport: &dyn Transport,
    env: &EnvironmentConfig,
    timeout: Duration,
) -> EndpointHealth {
    let health_url = env.health_url();
    let readiness_url = env.readiness_url();
    let (health, readiness) = tokio::join!(
        http_probe(transport, &health_url, timeout),
        http_probe(transport, &readiness_url, timeout),
    );
    EndpointHealth { health, readiness }
}

/// Outcome of a retried endpoint check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    pub passed: bool,
    pub attempts: u32,
    pub failures: u32,
    pub last: EndpointHealth,
}

/// Check endpoints until they pass or `policy.max_attempts` is exhausted.
pub async fn check_endpoints_with_retry(
    transport: &dyn Transport,
    env: &EnvironmentConfig,
    timeout: Duration,
    policy: &RetryPolicy,
) -> RetryOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut failures = 0;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let last = check_endpoints(transport, env, timeout).await;
        if last.is_healthy() {
            debug!(environment = %env.environment, attempt, "endpoint check passed");
            return RetryOutcome {
                passed: true,
                attempts: attempt,
                failures,
                last,
            };
        }

        failures += 1;
        warn!(
            environment = %env.environment,
            attempt,
            max_attempts,
            result = %last.describe(),
            "endpoint check failed"
        );

        if attempt >= max_attempts {
            return RetryOutcome {
                passed: false,
                attempts: attempt,
                failures,
                last,
            };
        }
        tokio::time::sleep(policy.delay_for(attempt)).await;
    }
}

/// Traffic-level performance reported by `GET /health/metrics`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceProbe {
    pub version: u32,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub requests_per_second: Option<f64>,
}

/// Observed performance, or a simulated zero when the endpoint is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedPerformance {
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub latency: Duration,
    pub simulated: bool,
}

impl ObservedPerformance {
    /// Check against the environment's thresholds. Latency may reach twice
    /// the configured maximum while traffic is shifting.
    pub fn evaluate(&self, env: &EnvironmentConfig) -> Result<(), String> {
        if self.error_rate > env.max_error_rate {
            return Err(format!(
                "error rate {:.2}% exceeds {:.2}%",
                self.error_rate * 100.0,
                env.max_error_rate * 100.0
            ));
        }
        let latency_ceiling = (env.max_response_time_ms * 2) as f64;
        if self.avg_response_time_ms > latency_ceiling {
            return Err(format!(
                "average response time {:.0}ms exceeds {latency_ceiling:.0}ms",
                self.avg_response_time_ms
            ));
        }
        Ok(())
    }
}

/// Read `/health/metrics` from an environment.
///
/// A 404 yields a simulated zero-error observation; any other failure is an
/// error because the step cannot be judged.
pub async fn observe_performance(
    transport: &dyn Transport,
    env: &EnvironmentConfig,
    timeout: Duration,
) -> Result<ObservedPerformance, String> {
    let url = env.url("/health/metrics");
    let started = Instant::now();
    let response = match tokio::time::timeout(timeout, transport.get(&url)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(format!("metrics unavailable: {e}")),
        Err(_) => return Err(format!("metrics timed out after {}ms", timeout.as_millis())),
    };
    let latency = started.elapsed();

    if response.is_not_found() {
        return Ok(ObservedPerformance {
            error_rate: 0.0,
            avg_response_time_ms: 0.0,
            latency,
            simulated: true,
        });
    }
    if !response.is_success() {
        return Err(format!("metrics endpoint returned HTTP {}", response.status));
    }

    let probe: PerformanceProbe = response
        .json()
        .ok_or_else(|| "metrics payload is not valid JSON".to_string())?;
    Ok(ObservedPerformance {
        error_rate: probe.error_rate,
        avg_response_time_ms: probe.avg_response_time_ms,
        latency,
        simulated: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use switchyard_core::Environment;

    fn green() -> EnvironmentConfig {
        EnvironmentConfig::new(Environment::Green, "http://green.test")
    }

    #[tokio::test]
    async fn probe_classifies_statuses() {
        let mock = MockTransport::new();
        mock.respond("http://green.test/ok", 200)
            .respond("http://green.test/bad", 503)
            .fail("http://green.test/down", "connection refused");

        let timeout = Duration::from_secs(1);
        assert_eq!(http_probe(&mock, "http://green.test/ok", timeout).await, ProbeResult::Healthy);
        assert_eq!(
            http_probe(&mock, "http://green.test/bad", timeout).await,
            ProbeResult::Unhealthy(503)
        );
        assert!(matches!(
            http_probe(&mock, "http://green.test/down", timeout).await,
            ProbeResult::Failed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_times_out() {
        let mock = MockTransport::new();
        mock.delay("http://green.test/slow", Duration::from_secs(30), 200);

        let result = http_probe(&mock, "http://green.test/slow", Duration::from_secs(2)).await;
        assert_eq!(result, ProbeResult::Failed("timed out after 2000ms".to_string()));
    }

    #[tokio::test]
    async fn both_endpoints_must_pass() {
        let mock = MockTransport::new();
        mock.respond("http://green.test/health", 200);

        let result = check_endpoints(&mock, &green(), Duration::from_secs(1)).await;
        assert!(result.health.is_healthy());
        assert_eq!(result.readiness, ProbeResult::Unhealthy(404));
        assert!(!result.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_passes_on_first_attempt() {
        let mock = MockTransport::new();
        mock.respond("http://green.test/health", 200)
            .respond("http://green.test/health/ready", 200);

        let outcome = check_endpoints_with_retry(
            &mock,
            &green(),
            Duration::from_secs(2),
            &RetryPolicy::fixed(3, Duration::from_secs(2)),
        )
        .await;
        assert!(outcome.passed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_after_failures() {
        let mock = MockTransport::new();
        mock.respond_sequence("http://green.test/health", &[500, 500, 200])
            .respond("http://green.test/health/ready", 200);

        let started = tokio::time::Instant::now();
        let outcome = check_endpoints_with_retry(
            &mock,
            &green(),
            Duration::from_secs(2),
            &RetryPolicy::fixed(3, Duration::from_secs(2)),
        )
        .await;
        assert!(outcome.passed);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.failures, 2);
        // Two fixed waits between three attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let mock = MockTransport::new();
        mock.respond("http://green.test/health", 500)
            .respond("http://green.test/health/ready", 200);

        let outcome = check_endpoints_with_retry(
            &mock,
            &green(),
            Duration::from_secs(2),
            &RetryPolicy::fixed(3, Duration::from_secs(2)),
        )
        .await;
        assert!(!outcome.passed);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(mock.calls("http://green.test/health"), 3);
        assert_eq!(outcome.last.health, ProbeResult::Unhealthy(500));
    }

    #[tokio::test]
    async fn missing_metrics_endpoint_is_simulated() {
        let mock = MockTransport::new();
        let observed = observe_performance(&mock, &green(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(observed.simulated);
        assert!(observed.evaluate(&green()).is_ok());
    }

    #[tokio::test]
    async fn observed_error_rate_is_checked() {
        let mock = MockTransport::new();
        mock.respond_json(
            "http://green.test/health/metrics",
            200,
            serde_json::json!({"error_rate": 0.12, "avg_response_time_ms": 80.0}),
        );

        let observed = observe_performance(&mock, &green(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!observed.simulated);
        let err = observed.evaluate(&green()).unwrap_err();
        assert!(err.contains("error rate"), "{err}");
    }

    #[test]
    fn observed_latency_allows_twice_the_maximum() {
        let env = green();
        let observed = |ms: f64| ObservedPerformance {
            error_rate: 0.0,
            avg_response_time_ms: ms,
            latency: Duration::ZERO,
            simulated: false,
        };
        assert!(observed(3999.0).evaluate(&env).is_ok());
        assert!(observed(4001.0).evaluate(&env).is_err());
    }
}
