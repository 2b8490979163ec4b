use crate::cli::ExitCode;
use crate::context::Context;
use mace_core::error::MaceResult;
use std::path::PathBuf;
use tracing::{info, warn};

/// Bootstraps a new workflow: loads the plan document, discovers starting
/// input files, and creates the first-step calculation for every material
/// found (spec §6's plan-file contract).
pub async fn run(ctx: &Context, plan_path: &std::path::Path, inputs_dir: Option<PathBuf>) -> MaceResult<ExitCode> {
    let plan = match mace_engine::load_plan(plan_path).await {
        Ok(plan) => plan,
        Err(e) => {
            warn!(path = %plan_path.display(), error = %e, "could not load plan file");
            return Ok(ExitCode::UserError);
        }
    };

    let inputs_dir = inputs_dir.unwrap_or_else(|| mace_core::layout::inputs_dir(&ctx.base_dir));
    if !inputs_dir.is_dir() {
        warn!(dir = %inputs_dir.display(), "inputs directory does not exist");
        return Ok(ExitCode::UserError);
    }

    let workflow =
        mace_engine::bootstrap_workflow(&ctx.store, &ctx.generator, &ctx.base_dir, &plan, &inputs_dir).await?;

    if workflow.materials.is_empty() {
        info!(workflow_id = %workflow.id, "bootstrap found no starting inputs");
        return Ok(ExitCode::NoWork);
    }

    info!(workflow_id = %workflow.id, materials = workflow.materials.len(), "workflow initialized");
    Ok(ExitCode::Success)
}
