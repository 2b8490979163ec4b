//! Queue manager (spec §4.3): admission control against the scheduler's
//! global job cap, dispatched to the submit service.

use crate::submit::SubmitService;
use mace_connectors::SchedulerClient;
use mace_core::error::MaceResult;
use mace_core::model::Calculation;
use mace_core::store::Store;
use tracing::{info, warn};

/// `periodic` — a full tick from a cron-style driver. `completion` — run
/// from a job's completion hook, after the callback pipeline has already
/// processed recently-ended jobs in this workflow. `status` — read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    Periodic,
    Completion,
    Status,
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub active_before: u32,
    pub available: u32,
    pub submitted: Vec<String>,
    pub submission_errors: Vec<String>,
}

/// Run one admission tick: `available = max_jobs - reserve - active`;
/// submit up to `min(available, max_submit)` dependency-eligible pending
/// calculations, FIFO by creation time.
pub async fn tick(
    store: &Store,
    scheduler: &dyn SchedulerClient,
    submit_service: &SubmitService<'_>,
    max_jobs: u32,
    reserve: u32,
    max_submit: u32,
    mode: TickMode,
) -> MaceResult<TickReport> {
    let status = scheduler.query_active().await?;
    let active = status.active_count;
    let available = (max_jobs.saturating_sub(reserve)).saturating_sub(active);
    let mut report = TickReport { active_before: active, available, ..Default::default() };

    if mode == TickMode::Status || available == 0 {
        return Ok(report);
    }

    let budget = available.min(max_submit);
    let eligible = store.list_eligible_pending(budget).await?;
    info!(count = eligible.len(), budget, "queue tick admitting calculations");

    for calc in eligible {
        match submit_one(store, submit_service, &calc).await {
            Ok(job_id) => report.submitted.push(job_id),
            Err(e) => {
                warn!(calc_id = %calc.id, error = %e, "submission failed, calculation remains pending");
                report.submission_errors.push(e.to_string());
            }
        }
    }
    Ok(report)
}

async fn submit_one(store: &Store, submit_service: &SubmitService<'_>, calc: &Calculation) -> MaceResult<String> {
    let workflow = store
        .get_workflow(calc.workflow_id)
        .await?
        .ok_or_else(|| mace_core::error::MaceError::Dependency("workflow instance not found".into()))?;
    let plan = store
        .get_plan(workflow.plan_id)
        .await?
        .ok_or_else(|| mace_core::error::MaceError::Dependency("workflow plan not found".into()))?;
    let step = plan
        .step_for(calc.calc_type)
        .ok_or_else(|| mace_core::error::MaceError::Dependency("calc type absent from plan".into()))?;
    submit_service.submit(calc, step).await
}
