//! Smoke-test battery run against the target before traffic moves.
//!
//! Five independent tests run concurrently, each under its own timeout. A
//! 404 passes: the endpoint is optional for the application under test.

use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use switchyard_core::{EnvironmentConfig, SmokeSettings};
use switchyard_health::Transport;

/// One test in the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmokeTest {
    ApiEndpoints,
    ModelInference,
    PrimaryStore,
    Cache,
    Webhook,
}

impl SmokeTest {
    pub const ALL: [SmokeTest; 5] = [
        SmokeTest::ApiEndpoints,
        SmokeTest::ModelInference,
        SmokeTest::PrimaryStore,
        SmokeTest::Cache,
        SmokeTest::Webhook,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SmokeTest::ApiEndpoints => "api_endpoints",
            SmokeTest::ModelInference => "model_inference",
            SmokeTest::PrimaryStore => "primary_store",
            SmokeTest::Cache => "cache",
            SmokeTest::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmokeResult {
    pub test: SmokeTest,
    pub passed: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmokeReport {
    pub results: Vec<SmokeResult>,
    pub passed: u32,
    pub failed: u32,
}

impl SmokeReport {
    /// Fraction of tests that passed. An empty battery passes.
    pub fn pass_rate(&self) -> f64 {
        let total = self.passed + self.failed;
        if total == 0 {
            1.0
        } else {
            self.passed as f64 / total as f64
        }
    }

    pub fn failures(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| format!("{}: {}", r.test.name(), r.error.as_deref().unwrap_or("failed")))
            .collect()
    }
}

/// Run the whole battery against `target`.
pub async fn run_smoke_tests(
    transport: &dyn Transport,
    target: &EnvironmentConfig,
    settings: &SmokeSettings,
    deployment_id: &str,
) -> SmokeReport {
    let runs = SmokeTest::ALL.map(|test| async move {
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            settings.timeout,
            run_one(test, transport, target, settings, deployment_id),
        )
        .await
        .unwrap_or_else(|_| Err(format!("timed out after {}ms", settings.timeout.as_millis())));
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                debug!(test = test.name(), latency_ms, "smoke test passed");
                SmokeResult {
                    test,
                    passed: true,
                    latency_ms,
                    error: None,
                }
            }
            Err(error) => {
                warn!(test = test.name(), %error, "smoke test failed");
                SmokeResult {
                    test,
                    passed: false,
                    latency_ms,
                    error: Some(error),
                }
            }
        }
    });
    let results = join_all(runs).await;

    let passed = results.iter().filter(|r| r.passed).count() as u32;
    let report = SmokeReport {
        failed: results.len() as u32 - passed,
        passed,
        results,
    };
    info!(
        environment = %target.environment,
        passed = report.passed,
        failed = report.failed,
        pass_rate = report.pass_rate(),
        "smoke tests complete"
    );
    report
}

async fn run_one(
    test: SmokeTest,
    transport: &dyn Transport,
    target: &EnvironmentConfig,
    settings: &SmokeSettings,
    deployment_id: &str,
) -> Result<(), String> {
    match test {
        SmokeTest::ApiEndpoints => {
            for path in &settings.endpoints {
                expect_ok_or_missing(transport, &target.url(path)).await?;
            }
            Ok(())
        }
        SmokeTest::ModelInference => expect_ok_or_missing(transport, &target.url("/health/ml")).await,
        SmokeTest::PrimaryStore => expect_ok_or_missing(transport, &target.url("/health/database")).await,
        SmokeTest::Cache => expect_ok_or_missing(transport, &target.url("/health/redis")).await,
        SmokeTest::Webhook => {
            let url = target.url(&settings.webhook_path);
            let body = serde_json::json!({
                "event": "smoke_test",
                "deployment_id": deployment_id,
                "environment": target.environment,
                "timestamp": Utc::now(),
            });
            let response = transport
                .post_json(&url, body.to_string().into_bytes())
                .await
                .map_err(|e| format!("{url}: {e}"))?;
            if response.is_success() || response.is_not_found() {
                Ok(())
            } else {
                Err(format!("{url}: HTTP {}", response.status))
            }
        }
    }
}

async fn expect_ok_or_missing(transport: &dyn Transport, url: &str) -> Result<(), String> {
    let response = transport.get(url).await.map_err(|e| format!("{url}: {e}"))?;
    if response.is_success() || response.is_not_found() {
        Ok(())
    } else {
        Err(format!("{url}: HTTP {}", response.status))
    }
}
