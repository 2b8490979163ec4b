use crate::cli::ExitCode;
use crate::context::Context;
use mace_core::error::MaceResult;
use std::time::Duration;
use tracing::info;

/// Refreshes the status table at a fixed interval until interrupted. Thin by
/// design (spec §6 scopes the CLI's own surface down to this) — the heavier
/// reference TUI's widgets and panes have no counterpart here.
pub async fn run(ctx: &Context, interval_secs: u64) -> MaceResult<ExitCode> {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    info!(interval_secs, "monitor started, press ctrl-c to stop");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print!("\x1B[2J\x1B[1;1H");
                super::status::run(ctx, None).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(ExitCode::Success);
            }
        }
    }
}
