use crate::cli::ExitCode;
use crate::context::Context;
use mace_core::error::MaceResult;
use mace_engine::WorkflowEngine;
use tracing::{info, warn};

/// Reads the job id from the argument, falling back to `SLURM_JOB_ID` (the
/// scheduler sets this in the completion hook's own environment).
pub async fn run(ctx: &Context, job_id: Option<String>) -> MaceResult<ExitCode> {
    let job_id = job_id.or_else(|| std::env::var("SLURM_JOB_ID").ok());
    let Some(job_id) = job_id else {
        warn!("no job id given and SLURM_JOB_ID is unset");
        return Ok(ExitCode::UserError);
    };

    let engine = WorkflowEngine::new(&ctx.store, &ctx.generator, ctx.base_dir.clone());
    match mace_runtime::run_callback(&ctx.store, &engine, &ctx.base_dir, &job_id).await {
        Ok(outcome) => {
            info!(
                calc_id = %outcome.calc_id,
                status = %outcome.status,
                successors = outcome.successors_created,
                "callback processed"
            );
            Ok(ExitCode::Success)
        }
        Err(e) => {
            warn!(job_id, error = %e, "callback failed");
            Ok(ExitCode::OperationalFailure)
        }
    }
}
