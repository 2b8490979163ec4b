use crate::cli::ExitCode;
use crate::context::Context;
use mace_core::error::MaceResult;
use mace_core::model::CalculationStatus;
use mace_engine::fan_out;
use tracing::info;

/// The pending-trigger scan (spec §4.5). Without `--auto-progress` this is
/// read-only: it reports materials whose highest-completed step has an
/// eligible successor missing from the plan's sequence, but does not
/// materialize anything. With `--auto-progress` it delegates to the engine,
/// which both creates the missing rows and runs their input generators.
pub async fn run(ctx: &Context, auto_progress: bool) -> MaceResult<ExitCode> {
    if auto_progress {
        let created = mace_engine::scan_pending_triggers(&ctx.store, &ctx.generator, &ctx.base_dir).await?;
        info!(created = created.len(), "pending-trigger scan materialized successors");
        return Ok(if created.is_empty() { ExitCode::NoWork } else { ExitCode::Success });
    }

    let mut missing = 0usize;
    for workflow in ctx.store.list_active_workflows().await? {
        for material_id in &workflow.materials {
            let Some(highest) = ctx.store.highest_completed(material_id, workflow.id).await? else {
                continue;
            };
            let Some(plan) = ctx.store.get_plan(workflow.plan_id).await? else {
                continue;
            };
            for candidate in fan_out(highest.calc_type) {
                if !plan.contains(candidate) {
                    continue;
                }
                let existing =
                    ctx.store.find_calculations_any_attempt(material_id, workflow.id, candidate).await?;
                if existing.is_empty() {
                    missing += 1;
                    info!(material_id, workflow_id = %workflow.id, successor = %candidate, "missing successor");
                } else if existing.iter().all(|c| c.status == CalculationStatus::TerminallyFailed) {
                    info!(material_id, workflow_id = %workflow.id, successor = %candidate, "successor terminally failed");
                }
            }
        }
    }
    Ok(if missing == 0 { ExitCode::NoWork } else { ExitCode::Success })
}
