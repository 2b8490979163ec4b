use crate::cli::ExitCode;
use crate::context::Context;
use crate::output::TableBuilder;
use mace_core::error::MaceResult;
use mace_core::model::CalculationStatus;
use uuid::Uuid;

const STATUSES: [CalculationStatus; 7] = [
    CalculationStatus::Pending,
    CalculationStatus::Submitted,
    CalculationStatus::Running,
    CalculationStatus::Completed,
    CalculationStatus::Failed,
    CalculationStatus::TerminallyFailed,
    CalculationStatus::Cancelled,
];

pub async fn run(ctx: &Context, workflow_id: Option<String>) -> MaceResult<ExitCode> {
    let workflows = match workflow_id {
        Some(raw) => {
            let Ok(id) = raw.parse::<Uuid>() else {
                return Ok(ExitCode::UserError);
            };
            match ctx.store.get_workflow(id).await? {
                Some(wf) => vec![wf],
                None => return Ok(ExitCode::UserError),
            }
        }
        None => ctx.store.list_workflows().await?,
    };

    let mut builder = TableBuilder::new().headers(&[
        "workflow", "materials", "pending", "submitted", "running", "completed", "failed", "terminal",
    ]);

    for wf in &workflows {
        let calcs = ctx.store.list_by_workflow(wf.id).await?;
        let mut counts = [0usize; 7];
        for calc in &calcs {
            if let Some(idx) = STATUSES.iter().position(|s| *s == calc.status) {
                counts[idx] += 1;
            }
        }
        builder = builder.add_row(vec![
            wf.id.to_string(),
            wf.materials.len().to_string(),
            counts[0].to_string(),
            counts[1].to_string(),
            counts[2].to_string(),
            counts[3].to_string(),
            counts[4].to_string(),
            (counts[5] + counts[6]).to_string(),
        ]);
    }

    println!("{}", builder.build());
    Ok(ExitCode::Success)
}
