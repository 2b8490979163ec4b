use crate::cli::{ExitCode, TickModeArg};
use crate::context::Context;
use mace_core::error::MaceResult;
use mace_engine::WorkflowEngine;
use mace_runtime::{SubmitService, TickLock, TickMode};
use tracing::{info, warn};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    ctx: &Context,
    mode: TickModeArg,
    job_id: Option<String>,
    max_jobs: u32,
    reserve: u32,
    max_submit: u32,
) -> MaceResult<ExitCode> {
    let mode = match mode {
        TickModeArg::Periodic => TickMode::Periodic,
        TickModeArg::Completion => TickMode::Completion,
        TickModeArg::Status => TickMode::Status,
    };

    if mode == TickMode::Completion {
        // The completion hook re-enters here from inside the scheduler's
        // own job environment, which is where `SLURM_JOB_ID` lives — the
        // explicit flag is only needed when driving this by hand.
        let job_id = job_id.or_else(|| std::env::var("SLURM_JOB_ID").ok());
        let Some(job_id) = job_id else {
            warn!("completion tick requires --job-id or SLURM_JOB_ID");
            return Ok(ExitCode::UserError);
        };
        let engine = WorkflowEngine::new(&ctx.store, &ctx.generator, ctx.base_dir.clone());
        match mace_runtime::run_callback(&ctx.store, &engine, &ctx.base_dir, &job_id).await {
            Ok(outcome) => info!(
                calc_id = %outcome.calc_id,
                status = %outcome.status,
                successors = outcome.successors_created,
                "completion callback processed"
            ),
            Err(e) => {
                warn!(job_id, error = %e, "completion callback failed");
                return Ok(ExitCode::OperationalFailure);
            }
        }
    }

    // Admission is serialized across concurrently-firing ticks (periodic
    // cron plus however many completion hooks land at once) with an
    // advisory lock file; losing the race is not an error, just a skip.
    let lock_path = ctx.base_dir.join(".mace_tick.lock");
    let _lock = match TickLock::try_acquire(&lock_path)? {
        Some(lock) => lock,
        None => {
            info!("another tick already holds the admission lock, skipping");
            return Ok(ExitCode::NoWork);
        }
    };

    let submit_service = SubmitService::new(
        &ctx.store,
        &ctx.scheduler,
        ctx.base_dir.clone(),
        ctx.config.slurm_account.clone(),
        ctx.config.slurm_partition.clone(),
        ctx.config.scratch.clone(),
    );
    let report = mace_runtime::tick(&ctx.store, &ctx.scheduler, &submit_service, max_jobs, reserve, max_submit, mode)
        .await?;
    info!(
        active_before = report.active_before,
        available = report.available,
        submitted = report.submitted.len(),
        errors = report.submission_errors.len(),
        "tick complete"
    );

    if !report.submission_errors.is_empty() {
        Ok(ExitCode::OperationalFailure)
    } else if mode != TickMode::Status && report.submitted.is_empty() {
        Ok(ExitCode::NoWork)
    } else {
        Ok(ExitCode::Success)
    }
}
