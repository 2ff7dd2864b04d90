//! Component probes.
//!
//! Each probe makes one bounded request (or one resource sample) and turns
//! the outcome into a [`HealthCheckResult`]. Probes never return errors: a
//! failure is an `Unhealthy` result carrying the error text.
//!
//! Optional component endpoints answer with small JSON payloads whose fields
//! are all optional. A 404 means the application does not expose that
//! component and is reported as a simulated success.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use switchyard_core::{ComponentType, EnvironmentConfig, HealthCheckResult, HealthStatus};

use crate::resources::ResourceSampler;
use crate::transport::{HttpResponse, Transport};

/// Pool utilisation at or above this is degraded.
pub const POOL_DEGRADED_RATIO: f64 = 0.9;
/// Cache memory usage at or above this is degraded.
pub const CACHE_MEMORY_DEGRADED_PERCENT: f64 = 90.0;
/// Remaining third-party quota below this is degraded.
pub const RATE_LIMIT_DEGRADED_BELOW: u64 = 10;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseProbe {
    pub version: u32,
    pub status: Option<String>,
    pub pool_size: Option<u64>,
    pub active_connections: Option<u64>,
    pub response_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheProbe {
    pub version: u32,
    pub status: Option<String>,
    pub hit_rate: Option<f64>,
    pub memory_usage_percent: Option<f64>,
    pub connected_clients: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelProbe {
    pub version: u32,
    pub status: Option<String>,
    pub models_loaded: Option<u64>,
    pub avg_inference_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntegrationProbe {
    pub version: u32,
    pub status: Option<String>,
    pub rate_limit_remaining: Option<u64>,
    pub last_success: Option<String>,
}

/// A component that can be probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    Api,
    PrimaryStore,
    Cache,
    ModelServing,
    Integration(String),
    HostResources,
}

impl ProbeTarget {
    /// Every probe for an environment, in report order.
    pub fn all(integrations: &[String]) -> Vec<ProbeTarget> {
        let mut targets = vec![
            ProbeTarget::Api,
            ProbeTarget::PrimaryStore,
            ProbeTarget::Cache,
            ProbeTarget::ModelServing,
        ];
        targets.extend(integrations.iter().cloned().map(ProbeTarget::Integration));
        targets.push(ProbeTarget::HostResources);
        targets
    }

    pub fn component_type(&self) -> ComponentType {
        match self {
            ProbeTarget::Api => ComponentType::Api,
            ProbeTarget::PrimaryStore => ComponentType::PrimaryStore,
            ProbeTarget::Cache => ComponentType::Cache,
            ProbeTarget::ModelServing => ComponentType::ModelServing,
            ProbeTarget::Integration(_) => ComponentType::Integration,
            ProbeTarget::HostResources => ComponentType::HostResources,
        }
    }

    /// Component name used in results.
    pub fn name(&self) -> String {
        match self {
            ProbeTarget::Api => "api".to_string(),
            ProbeTarget::PrimaryStore => "database".to_string(),
            ProbeTarget::Cache => "cache".to_string(),
            ProbeTarget::ModelServing => "model_serving".to_string(),
            ProbeTarget::Integration(name) => format!("integration:{name}"),
            ProbeTarget::HostResources => "host_resources".to_string(),
        }
    }

    /// Run this probe once. The caller bounds it with the per-probe timeout.
    pub async fn run(
        &self,
        transport: &dyn Transport,
        sampler: &dyn ResourceSampler,
        env: &EnvironmentConfig,
        timeout: Duration,
    ) -> HealthCheckResult {
        match self {
            ProbeTarget::Api => probe_api(transport, env, timeout).await,
            ProbeTarget::PrimaryStore => probe_database(transport, env, timeout).await,
            ProbeTarget::Cache => probe_cache(transport, env, timeout).await,
            ProbeTarget::ModelServing => probe_models(transport, env, timeout).await,
            ProbeTarget::Integration(name) => probe_integration(transport, env, name, timeout).await,
            ProbeTarget::HostResources => probe_host(sampler).await,
        }
    }
}

/// Liveness endpoint; slow answers are degraded.
pub async fn probe_api(
    transport: &dyn Transport,
    env: &EnvironmentConfig,
    timeout: Duration,
) -> HealthCheckResult {
    let name = ProbeTarget::Api.name();
    let url = env.health_url();
    let started = Instant::now();
    let response = match fetch(transport, &url, timeout).await {
        Ok(response) => response,
        Err(error) => {
            return HealthCheckResult::unhealthy(name, ComponentType::Api, error, started.elapsed());
        }
    };
    let latency = started.elapsed();

    if !response.is_success() {
        return HealthCheckResult::unhealthy(
            name,
            ComponentType::Api,
            format!("HTTP {}", response.status),
            latency,
        )
        .with_detail("status_code", response.status);
    }

    let status = if latency.as_millis() as u64 > env.max_response_time_ms {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    HealthCheckResult::new(name, ComponentType::Api, status, latency)
        .with_detail("status_code", response.status)
        .with_detail("max_response_time_ms", env.max_response_time_ms)
}

pub async fn probe_database(
    transport: &dyn Transport,
    env: &EnvironmentConfig,
    timeout: Duration,
) -> HealthCheckResult {
    component_probe::<DatabaseProbe>(
        transport,
        &env.url("/health/database"),
        ProbeTarget::PrimaryStore,
        timeout,
        |payload, mut result| {
            if let (Some(pool), Some(active)) = (payload.pool_size, payload.active_connections) {
                result = result
                    .with_detail("pool_size", pool)
                    .with_detail("active_connections", active);
                if pool > 0 {
                    let utilisation = active as f64 / pool as f64;
                    result = result.with_detail("pool_utilisation", utilisation);
                    if utilisation >= POOL_DEGRADED_RATIO {
                        result = degrade(result, format!("connection pool {:.0}% used", utilisation * 100.0));
                    }
                }
            }
            if let Some(ms) = payload.response_time_ms {
                result = result.with_detail("response_time_ms", ms);
            }
            with_payload_status(result, payload.status.as_deref())
        },
    )
    .await
}

pub async fn probe_cache(
    transport: &dyn Transport,
    env: &EnvironmentConfig,
    timeout: Duration,
) -> HealthCheckResult {
    component_probe::<CacheProbe>(
        transport,
        &env.url("/health/redis"),
        ProbeTarget::Cache,
        timeout,
        |payload, mut result| {
            if let Some(rate) = payload.hit_rate {
                result = result.with_detail("hit_rate", rate);
            }
            if let Some(clients) = payload.connected_clients {
                result = result.with_detail("connected_clients", clients);
            }
            if let Some(memory) = payload.memory_usage_percent {
                result = result.with_detail("memory_usage_percent", memory);
                if memory >= CACHE_MEMORY_DEGRADED_PERCENT {
                    result = degrade(result, format!("cache memory at {memory:.0}%"));
                }
            }
            with_payload_status(result, payload.status.as_deref())
        },
    )
    .await
}

pub async fn probe_models(
    transport: &dyn Transport,
    env: &EnvironmentConfig,
    timeout: Duration,
) -> HealthCheckResult {
    component_probe::<ModelProbe>(
        transport,
        &env.url("/health/ml"),
        ProbeTarget::ModelServing,
        timeout,
        |payload, mut result| {
            if let Some(ms) = payload.avg_inference_ms {
                result = result.with_detail("avg_inference_ms", ms);
            }
            if let Some(loaded) = payload.models_loaded {
                result = result.with_detail("models_loaded", loaded);
                if loaded == 0 {
                    result = degrade(result, "no models loaded".to_string());
                }
            }
            with_payload_status(result, payload.status.as_deref())
        },
    )
    .await
}

pub async fn probe_integration(
    transport: &dyn Transport,
    env: &EnvironmentConfig,
    name: &str,
    timeout: Duration,
) -> HealthCheckResult {
    component_probe::<IntegrationProbe>(
        transport,
        &env.url(&format!("/health/{name}")),
        ProbeTarget::Integration(name.to_string()),
        timeout,
        |payload, mut result| {
            if let Some(last) = payload.last_success {
                result = result.with_detail("last_success", last);
            }
            if let Some(remaining) = payload.rate_limit_remaining {
                result = result.with_detail("rate_limit_remaining", remaining);
                if remaining < RATE_LIMIT_DEGRADED_BELOW {
                    result = degrade(result, format!("rate limit nearly exhausted ({remaining} left)"));
                }
            }
            with_payload_status(result, payload.status.as_deref())
        },
    )
    .await
}

pub async fn probe_host(sampler: &dyn ResourceSampler) -> HealthCheckResult {
    let name = ProbeTarget::HostResources.name();
    let started = Instant::now();
    match sampler.sample().await {
        Ok(usage) => HealthCheckResult::new(
            name,
            ComponentType::HostResources,
            usage.classify(),
            started.elapsed(),
        )
        .with_detail("cpu_percent", usage.cpu_percent)
        .with_detail("memory_percent", usage.memory_percent)
        .with_detail("disk_percent", usage.disk_percent),
        Err(error) => {
            HealthCheckResult::unhealthy(name, ComponentType::HostResources, error, started.elapsed())
        }
    }
}

async fn fetch(transport: &dyn Transport, url: &str, timeout: Duration) -> Result<HttpResponse, String> {
    match tokio::time::timeout(timeout, transport.get(url)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
    }
}

/// Shared flow for JSON component endpoints.
async fn component_probe<P>(
    transport: &dyn Transport,
    url: &str,
    target: ProbeTarget,
    timeout: Duration,
    interpret: impl FnOnce(P, HealthCheckResult) -> HealthCheckResult,
) -> HealthCheckResult
where
    P: serde::de::DeserializeOwned,
{
    let name = target.name();
    let component_type = target.component_type();
    let started = Instant::now();

    let response = match fetch(transport, url, timeout).await {
        Ok(response) => response,
        Err(error) => {
            debug!(component = %name, %error, "component probe failed");
            return HealthCheckResult::unhealthy(name, component_type, error, started.elapsed());
        }
    };
    let latency = started.elapsed();

    if response.is_not_found() {
        return HealthCheckResult::new(name, component_type, HealthStatus::Healthy, latency)
            .with_detail("simulated", true);
    }
    if !response.is_success() {
        return HealthCheckResult::unhealthy(
            name,
            component_type,
            format!("HTTP {}", response.status),
            latency,
        )
        .with_detail("status_code", response.status);
    }

    let healthy = HealthCheckResult::new(name, component_type, HealthStatus::Healthy, latency);
    match response.json::<P>() {
        Some(payload) => interpret(payload, healthy),
        None => healthy.with_detail("payload", "unparsed"),
    }
}

/// Lower a healthy result to degraded, keeping the first reason.
fn degrade(mut result: HealthCheckResult, reason: String) -> HealthCheckResult {
    if result.status == HealthStatus::Healthy {
        result.status = HealthStatus::Degraded;
        result.error = Some(reason);
    }
    result
}

/// Apply a status reported by the component itself. It can only make the
/// result worse.
fn with_payload_status(mut result: HealthCheckResult, status: Option<&str>) -> HealthCheckResult {
    match status.map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("unhealthy") => {
            result.status = HealthStatus::Unhealthy;
            result.error.get_or_insert_with(|| "component reports unhealthy".to_string());
            result
        }
        Some("degraded") => degrade(result, "component reports degraded".to_string()),
        _ => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::resources::{FixedSampler, ResourceUsage};
    use serde_json::json;
    use switchyard_core::Environment;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn env() -> EnvironmentConfig {
        EnvironmentConfig::new(Environment::Green, "http://green.test")
    }

    #[test]
    fn targets_in_report_order() {
        let targets = ProbeTarget::all(&["crm".to_string(), "mls".to_string()]);
        let names: Vec<String> = targets.iter().map(ProbeTarget::name).collect();
        assert_eq!(
            names,
            vec![
                "api",
                "database",
                "cache",
                "model_serving",
                "integration:crm",
                "integration:mls",
                "host_resources"
            ]
        );
        assert_eq!(targets[4].component_type(), ComponentType::Integration);
    }

    #[tokio::test]
    async fn api_healthy_and_unhealthy() {
        let mock = MockTransport::new();
        mock.respond("http://green.test/health", 200);
        let result = probe_api(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Healthy);

        mock.respond("http://green.test/health", 503);
        let result = probe_api(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn slow_api_is_degraded() {
        let mock = MockTransport::new();
        mock.delay("http://green.test/health", Duration::from_millis(1500), 200);
        let mut env = env();
        env.max_response_time_ms = 1000;

        let result = probe_api(&mock, &env, TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn missing_component_is_simulated_success() {
        let mock = MockTransport::new();
        let result = probe_database(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.details.get("simulated"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn saturated_pool_is_degraded() {
        let mock = MockTransport::new();
        mock.respond_json(
            "http://green.test/health/database",
            200,
            json!({"version": 1, "pool_size": 20, "active_connections": 19}),
        );
        let result = probe_database(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.details.get("pool_size"), Some(&json!(20)));
    }

    #[tokio::test]
    async fn cache_memory_pressure_is_degraded() {
        let mock = MockTransport::new();
        mock.respond_json(
            "http://green.test/health/redis",
            200,
            json!({"hit_rate": 0.93, "memory_usage_percent": 91.5}),
        );
        let result = probe_cache(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn no_models_loaded_is_degraded() {
        let mock = MockTransport::new();
        mock.respond_json("http://green.test/health/ml", 200, json!({"models_loaded": 0}));
        let result = probe_models(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.error.as_deref(), Some("no models loaded"));
    }

    #[tokio::test]
    async fn low_rate_limit_is_degraded() {
        let mock = MockTransport::new();
        mock.respond_json(
            "http://green.test/health/crm",
            200,
            json!({"rate_limit_remaining": 3, "last_success": "2026-01-01T00:00:00Z"}),
        );
        let result = probe_integration(&mock, &env(), "crm", TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.component, "integration:crm");
    }

    #[tokio::test]
    async fn payload_status_is_honoured() {
        let mock = MockTransport::new();
        mock.respond_json("http://green.test/health/redis", 200, json!({"status": "unhealthy"}));
        let result = probe_cache(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn unparsed_payload_is_tolerated() {
        let mock = MockTransport::new();
        mock.respond_json("http://green.test/health/ml", 200, json!("ok"));
        let result = probe_models(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.details.get("payload"), Some(&json!("unparsed")));
    }

    #[tokio::test]
    async fn component_error_status_is_unhealthy() {
        let mock = MockTransport::new();
        mock.respond("http://green.test/health/database", 500);
        let result = probe_database(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);

        mock.fail("http://green.test/health/database", "connection refused");
        let result = probe_database(&mock, &env(), TIMEOUT).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn host_probe_uses_sampler() {
        let sampler = FixedSampler(ResourceUsage {
            cpu_percent: 97.0,
            memory_percent: 20.0,
            disk_percent: 20.0,
        });
        let result = probe_host(&sampler).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.details.get("cpu_percent"), Some(&json!(97.0)));
    }
}
