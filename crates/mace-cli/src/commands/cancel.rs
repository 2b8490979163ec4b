use crate::cli::ExitCode;
use crate::context::Context;
use mace_connectors::SchedulerClient;
use mace_core::error::MaceResult;
use mace_core::model::{Calculation, CalculationStatus};
use tracing::{info, warn};
use uuid::Uuid;

/// Cancels every non-terminal calculation in a workflow, or a single
/// calculation — whichever selector was given (spec §5: manual
/// cancellation marks pending rows cancelled directly and asks the
/// scheduler to cancel anything already submitted or running).
pub async fn run(ctx: &Context, workflow_id: Option<String>, calc_id: Option<String>) -> MaceResult<ExitCode> {
    let targets = match (workflow_id, calc_id) {
        (Some(raw), None) => {
            let Ok(id) = raw.parse::<Uuid>() else {
                warn!(workflow_id = raw, "not a valid uuid");
                return Ok(ExitCode::UserError);
            };
            if ctx.store.get_workflow(id).await?.is_none() {
                warn!(%id, "workflow not found");
                return Ok(ExitCode::UserError);
            }
            ctx.store.list_by_workflow(id).await?
        }
        (None, Some(raw)) => {
            let Ok(id) = raw.parse::<Uuid>() else {
                warn!(calc_id = raw, "not a valid uuid");
                return Ok(ExitCode::UserError);
            };
            match ctx.store.get_calculation(id).await? {
                Some(calc) => vec![calc],
                None => {
                    warn!(%id, "calculation not found");
                    return Ok(ExitCode::UserError);
                }
            }
        }
        _ => {
            warn!("cancel requires exactly one of --workflow-id or --calc-id");
            return Ok(ExitCode::UserError);
        }
    };

    let mut cancelled = 0usize;
    for calc in &targets {
        if cancel_one(ctx, calc).await? {
            cancelled += 1;
        }
    }

    info!(cancelled, "cancellation complete");
    Ok(if cancelled == 0 { ExitCode::NoWork } else { ExitCode::Success })
}

async fn cancel_one(ctx: &Context, calc: &Calculation) -> MaceResult<bool> {
    match calc.status {
        CalculationStatus::Pending => {
            ctx.store.mark_cancelled(calc.id).await?;
            Ok(true)
        }
        CalculationStatus::Submitted | CalculationStatus::Running => {
            if let Some(job_id) = &calc.job_id {
                if let Err(e) = ctx.scheduler.cancel(job_id).await {
                    warn!(%calc.id, job_id, error = %e, "scheduler cancel failed, calculation left as-is");
                    return Ok(false);
                }
            }
            ctx.store.mark_cancelled(calc.id).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}
