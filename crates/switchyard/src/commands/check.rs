use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use switchyard_core::{ComponentType, Environment, HealthStatus, SystemHealthReport};
use switchyard_health::{HealthCheckOrchestrator, HyperTransport};

pub async fn check(
    config: &Path,
    environment: Environment,
    critical_only: bool,
    components: &[ComponentType],
    json: bool,
) -> anyhow::Result<ExitCode> {
    let (_, settings) = super::load(config)?;
    let health = HealthCheckOrchestrator::new(
        settings.environment(environment).clone(),
        settings.health.clone(),
        Arc::new(HyperTransport::new()),
    );

    let include = (!components.is_empty()).then_some(components);
    let report = health.check_health(include, critical_only).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_report(&report));
    }

    Ok(if report.overall == HealthStatus::Unhealthy {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

pub fn format_report(report: &SystemHealthReport) -> String {
    let mut out = format!(
        "{} environment: {} ({}ms)\n",
        report.environment, report.overall, report.duration_ms
    );
    for check in &report.checks {
        let mark = match check.status {
            HealthStatus::Healthy => "✓",
            HealthStatus::Degraded => "~",
            HealthStatus::Unhealthy => "✗",
            HealthStatus::Unknown => "?",
        };
        out.push_str(&format!(
            "  {mark} {:<18} {:<10} {:>5}ms",
            check.component,
            check.status.as_str(),
            check.latency_ms
        ));
        if let Some(error) = &check.error {
            out.push_str(&format!("  {error}"));
        }
        out.push('\n');
    }
    out
}
