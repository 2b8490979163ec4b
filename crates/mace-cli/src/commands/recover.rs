use crate::cli::ExitCode;
use crate::context::Context;
use mace_core::config::RecoveryRules;
use mace_core::error::MaceResult;
use mace_core::layout;
use mace_core::model::CalculationStatus;
use tracing::{info, warn};
use uuid::Uuid;

pub async fn run(ctx: &Context, calc_id: &str, recovery_rules_path: Option<&std::path::Path>) -> MaceResult<ExitCode> {
    let Ok(id) = calc_id.parse::<Uuid>() else {
        warn!(calc_id, "not a valid uuid");
        return Ok(ExitCode::UserError);
    };
    let Some(calc) = ctx.store.get_calculation(id).await? else {
        warn!(%id, "calculation not found");
        return Ok(ExitCode::UserError);
    };
    if calc.status != CalculationStatus::Failed {
        info!(%id, status = %calc.status, "calculation is not in a failed state");
        return Ok(ExitCode::NoWork);
    }

    let rules = match recovery_rules_path {
        Some(path) => RecoveryRules::load_merged(path)?,
        None => RecoveryRules::defaults(),
    };

    // The SHRINK_TOO_SMALL remediation needs the actual solver text to
    // find a safe k-mesh value (spec §4.7); read it back from the step
    // directory the failed job ran in, if it's still there.
    let step_dir = layout::step_dir(
        &ctx.base_dir,
        &calc.workflow_id.to_string(),
        calc.step_index,
        &calc.calc_type.label(),
        &calc.material_id,
    );
    let output_path = step_dir.join(format!("{}.out", calc.material_id));
    let failure_text = tokio::fs::read_to_string(&output_path).await.ok();

    match mace_engine::apply_recovery(&ctx.store, &rules, &calc, failure_text.as_deref()).await? {
        Some(retry) => {
            info!(%id, retry_id = %retry.id, attempt = retry.attempt, "recovery scheduled a retry");
            Ok(ExitCode::Success)
        }
        None => {
            info!(%id, "recovery exhausted, calculation marked terminally failed");
            Ok(ExitCode::NoWork)
        }
    }
}
