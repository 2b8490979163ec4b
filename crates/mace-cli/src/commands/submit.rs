use crate::cli::ExitCode;
use crate::context::Context;
use mace_core::error::MaceResult;
use mace_core::model::CalculationStatus;
use mace_runtime::SubmitService;
use tracing::{info, warn};
use uuid::Uuid;

pub async fn run(ctx: &Context, calc_id: &str) -> MaceResult<ExitCode> {
    let id = match calc_id.parse::<Uuid>() {
        Ok(id) => id,
        Err(_) => {
            warn!(calc_id, "not a valid uuid");
            return Ok(ExitCode::UserError);
        }
    };

    let Some(calc) = ctx.store.get_calculation(id).await? else {
        warn!(%id, "calculation not found");
        return Ok(ExitCode::UserError);
    };
    if calc.status != CalculationStatus::Pending {
        info!(%id, status = %calc.status, "calculation is not pending, nothing to submit");
        return Ok(ExitCode::NoWork);
    }

    let workflow = ctx.store.get_workflow(calc.workflow_id).await?;
    let Some(workflow) = workflow else {
        warn!(%id, "workflow instance missing for calculation");
        return Ok(ExitCode::OperationalFailure);
    };
    let plan = ctx.store.get_plan(workflow.plan_id).await?;
    let Some(plan) = plan else {
        warn!(%id, "workflow plan missing for calculation");
        return Ok(ExitCode::OperationalFailure);
    };
    let Some(step) = plan.step_for(calc.calc_type) else {
        warn!(%id, "calc type absent from plan");
        return Ok(ExitCode::OperationalFailure);
    };

    let submit_service = SubmitService::new(
        &ctx.store,
        &ctx.scheduler,
        ctx.base_dir.clone(),
        ctx.config.slurm_account.clone(),
        ctx.config.slurm_partition.clone(),
        ctx.config.scratch.clone(),
    );
    match submit_service.submit(&calc, step).await {
        Ok(job_id) => {
            info!(%id, job_id, "submitted");
            Ok(ExitCode::Success)
        }
        Err(e) => {
            warn!(%id, error = %e, "submission failed");
            Ok(ExitCode::OperationalFailure)
        }
    }
}
