//! MACE — Materials Automated CRYSTAL Engine control-plane CLI (spec §6).

mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;
use cli::{Cli, Commands, ExitCode};
use context::Context;
use mace_core::config::AppConfig;
use mace_core::error::MaceError;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let exit_code = match run(cli, config).await {
        Ok(code) => code,
        Err(e @ (MaceError::Configuration(_) | MaceError::Dependency(_))) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::UserError
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::OperationalFailure
        }
    };
    std::process::exit(exit_code as i32);
}

async fn run(cli: Cli, config: AppConfig) -> mace_core::error::MaceResult<ExitCode> {
    let ctx = Context::build(config).await?;

    match cli.command {
        Commands::Init { plan, inputs_dir } => commands::init::run(&ctx, &plan, inputs_dir).await,
        Commands::Submit { calc_id } => commands::submit::run(&ctx, &calc_id).await,
        Commands::Tick { mode, job_id, max_jobs, reserve, max_submit } => {
            commands::tick::run(&ctx, mode, job_id, max_jobs, reserve, max_submit).await
        }
        Commands::Callback { job_id } => commands::callback::run(&ctx, job_id).await,
        Commands::Status { workflow_id } => commands::status::run(&ctx, workflow_id).await,
        Commands::Monitor { interval_secs } => commands::monitor::run(&ctx, interval_secs).await,
        Commands::Check { auto_progress } => commands::check::run(&ctx, auto_progress).await,
        Commands::Recover { calc_id } => {
            commands::recover::run(&ctx, &calc_id, cli.recovery_rules.as_deref()).await
        }
        Commands::Cancel { workflow_id, calc_id } => commands::cancel::run(&ctx, workflow_id, calc_id).await,
    }
}
