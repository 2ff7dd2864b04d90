//! Traffic switch execution.
//!
//! Moves traffic from the active environment to the target according to a
//! [`TrafficSwitchPlan`]: one 100% step when immediate, or the configured
//! steps in order when gradual. With per-step validation the switch waits
//! for the plan's settle time and asks the caller to judge the step; the
//! first failing step ends the switch and no later step is applied. The
//! switch does not revert traffic itself; that is the rollback's job.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use switchyard_core::{Environment, EnvironmentConfig, SwitchKind, SwitchOperation, TrafficSwitchPlan};
use switchyard_health::Transport;

use crate::traffic::{TrafficRouter, TrafficWeights};

fn new_operation(from: Environment, to: Environment, kind: SwitchKind) -> SwitchOperation {
    SwitchOperation {
        operation_id: Uuid::new_v4().to_string(),
        from,
        to,
        kind,
        steps_applied: Vec::new(),
        traffic_percentage: 0,
        started_at: Utc::now(),
        completed_at: None,
        success: false,
        reason: None,
    }
}

/// Shift traffic from `from` to `to`.
///
/// `on_applied` sees the operation as soon as the router accepted a step.
/// `validate_step` judges a step after it settled and returns the failure
/// reason when the step is bad.
pub async fn execute_switch<V, Fut>(
    router: &dyn TrafficRouter,
    from: Environment,
    to: Environment,
    plan: &TrafficSwitchPlan,
    on_applied: impl Fn(&SwitchOperation),
    mut validate_step: V,
) -> SwitchOperation
where
    V: FnMut(u8) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let kind = if plan.gradual {
        SwitchKind::Gradual
    } else {
        SwitchKind::Immediate
    };
    let mut operation = new_operation(from, to, kind);
    let steps = plan.effective_steps();
    info!(
        operation_id = %operation.operation_id,
        %from,
        %to,
        steps = ?steps,
        "starting traffic switch"
    );

    for percentage in steps {
        if let Err(e) = router.apply(TrafficWeights::toward(to, percentage)).await {
            warn!(%to, percentage, error = %e, "router refused traffic step");
            operation.reason = Some(format!("router failed at {percentage}%: {e}"));
            operation.completed_at = Some(Utc::now());
            return operation;
        }
        operation.steps_applied.push(percentage);
        operation.traffic_percentage = percentage;
        on_applied(&operation);
        debug!(%to, percentage, "traffic step applied");

        if plan.validate_each_step {
            tokio::time::sleep(plan.step_settle).await;
            if let Err(reason) = validate_step(percentage).await {
                warn!(%to, percentage, %reason, "traffic step failed validation");
                operation.reason = Some(format!("step {percentage}% failed: {reason}"));
                operation.completed_at = Some(Utc::now());
                return operation;
            }
        }
    }

    operation.success = true;
    operation.completed_at = Some(Utc::now());
    info!(operation_id = %operation.operation_id, %to, "traffic switch complete");
    operation
}

/// Send all traffic back to `to` in a single step.
pub async fn revert_switch(router: &dyn TrafficRouter, from: Environment, to: Environment) -> SwitchOperation {
    let mut operation = new_operation(from, to, SwitchKind::Rollback);
    match router.apply(TrafficWeights::all_on(to)).await {
        Ok(()) => {
            operation.steps_applied.push(100);
            operation.traffic_percentage = 100;
            operation.success = true;
        }
        Err(e) => {
            operation.reason = Some(e.to_string());
        }
    }
    operation.completed_at = Some(Utc::now());
    operation
}

/// Hit the warm-up paths once, concurrently. Failures are ignored.
pub async fn warm_up(transport: &dyn Transport, target: &EnvironmentConfig, paths: &[String], timeout: Duration) {
    let requests = paths.iter().map(|path| async move {
        let url = target.url(path);
        match tokio::time::timeout(timeout, transport.get(&url)).await {
            Ok(Ok(response)) => debug!(%url, status = response.status, "warm-up request"),
            Ok(Err(e)) => debug!(%url, error = %e, "warm-up request failed"),
            Err(_) => debug!(%url, "warm-up request timed out"),
        }
    });
    join_all(requests).await;
}
