use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::warn;

use switchyard_core::Environment;
use switchyard_health::{HyperTransport, Transport};
use switchyard_rollout::{
    CommandMigrations, DeployOptions, DeploymentOrchestrator, DeploymentStatusReport,
    InMemoryRouter, MigrationHook, NoopMigrations, TrafficRouter, WebhookRouter,
};

pub async fn deploy(
    config: &Path,
    target: Option<Environment>,
    active: Option<Environment>,
    options: DeployOptions,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let (file, mut settings) = super::load(config)?;
    if let Some(active) = active {
        settings.initial_active = active;
    }

    let transport: Arc<dyn Transport> = Arc::new(HyperTransport::new());
    let router: Arc<dyn TrafficRouter> = match file.router.as_ref().and_then(|r| r.webhook_url.clone()) {
        Some(url) => Arc::new(WebhookRouter::new(url, Arc::clone(&transport))),
        None => {
            warn!("no [router] webhook_url configured; traffic weights are only recorded in memory");
            Arc::new(InMemoryRouter::starting_on(settings.initial_active))
        }
    };
    let migrations: Arc<dyn MigrationHook> = match &file.migration {
        Some(section) => Arc::new(CommandMigrations::from_section(section)),
        None => Arc::new(NoopMigrations),
    };

    let orchestrator = DeploymentOrchestrator::new(settings, transport)?
        .with_router(router)
        .with_migrations(migrations);
    let succeeded = orchestrator.deploy(target, options).await?;
    let report = orchestrator.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_summary(&report));
    }
    Ok(ExitCode::from(exit_code(succeeded, &report)))
}

/// 0 on success, 1 on a rolled-back failure, 2 when an operator must step in.
pub fn exit_code(succeeded: bool, report: &DeploymentStatusReport) -> u8 {
    if succeeded {
        0
    } else if report.metrics.manual_intervention_required {
        2
    } else {
        1
    }
}

pub fn format_summary(report: &DeploymentStatusReport) -> String {
    let metrics = &report.metrics;
    let mut out = format!(
        "deployment {}: {} (active: {}, {}ms)\n",
        metrics.deployment_id, report.status, report.active, metrics.total_duration_ms
    );
    out.push_str(&format!(
        "  health checks  {} passed, {} failed ({}ms)\n",
        metrics.health_checks_passed, metrics.health_checks_failed, metrics.health_check_duration_ms
    ));
    out.push_str(&format!(
        "  smoke tests    {} passed, {} failed ({}ms)\n",
        metrics.smoke_tests_passed, metrics.smoke_tests_failed, metrics.smoke_test_duration_ms
    ));
    out.push_str(&format!("  migration      {}ms\n", metrics.migration_duration_ms));
    out.push_str(&format!("  traffic switch {}ms\n", metrics.traffic_switch_duration_ms));
    out.push_str(&format!("  validation     {}ms\n", metrics.validation_duration_ms));
    if metrics.rollback_triggered {
        out.push_str(&format!("  rollback       {}ms\n", metrics.rollback_duration_ms));
    }
    if let Some(reason) = &metrics.rollback_reason {
        out.push_str(&format!("  reason: {reason}\n"));
    }
    if metrics.manual_intervention_required {
        out.push_str("  MANUAL INTERVENTION REQUIRED\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{DeploymentMetrics, DeploymentStatus};

    fn report(metrics: DeploymentMetrics) -> DeploymentStatusReport {
        DeploymentStatusReport {
            status: DeploymentStatus::Failed,
            active: Environment::Blue,
            in_progress: false,
            metrics,
            recent_health_checks: Vec::new(),
            recent_switches: Vec::new(),
            recent_deployments: Vec::new(),
        }
    }

    #[test]
    fn exit_codes() {
        let failed = report(DeploymentMetrics::default());
        assert_eq!(exit_code(true, &failed), 0);
        assert_eq!(exit_code(false, &failed), 1);

        let stuck = report(DeploymentMetrics {
            manual_intervention_required: true,
            ..Default::default()
        });
        assert_eq!(exit_code(false, &stuck), 2);
    }

    #[test]
    fn summary_mentions_reason() {
        let text = format_summary(&report(DeploymentMetrics {
            deployment_id: "d-1".to_string(),
            rollback_triggered: true,
            rollback_reason: Some("Smoke tests failed".to_string()),
            ..Default::default()
        }));
        assert!(text.starts_with("deployment d-1: failed (active: blue"));
        assert!(text.contains("reason: Smoke tests failed"));
        assert!(!text.contains("MANUAL"));
    }
}
