//! CLI command definitions (spec §6): `submit`, `tick`, `callback`,
//! `status`, `monitor`, `check`, `recover`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mace")]
#[command(author, version, about = "Materials Automated CRYSTAL Engine", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the MACE SQLite database (overrides MACE_DB).
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a recovery-rule TOML file (merged over built-in defaults).
    #[arg(long, global = true)]
    pub recovery_rules: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bootstrap a new workflow from a plan file and a directory of
    /// starting input files.
    Init {
        /// Path to the workflow plan JSON document.
        #[arg(long)]
        plan: PathBuf,

        /// Directory of starting input files (defaults to
        /// `<MACE_HOME>/workflow_inputs`).
        #[arg(long)]
        inputs_dir: Option<PathBuf>,
    },

    /// Submit a single pending calculation one-shot.
    Submit {
        /// Calculation id (UUID).
        calc_id: String,
    },

    /// Run a queue-manager admission tick.
    Tick {
        /// `periodic` (cron-style driver) or `completion` (from a job hook).
        #[arg(long, value_enum, default_value_t = TickModeArg::Periodic)]
        mode: TickModeArg,

        /// Job id whose completion triggered this tick, for the callback stage.
        #[arg(long)]
        job_id: Option<String>,

        #[arg(long, default_value_t = 200)]
        max_jobs: u32,

        #[arg(long, default_value_t = 10)]
        reserve: u32,

        #[arg(long, default_value_t = 5)]
        max_submit: u32,
    },

    /// Run the completion callback pipeline for a finished job.
    Callback {
        /// Scheduler job id (read from the environment if omitted).
        job_id: Option<String>,
    },

    /// Read-only status report.
    Status {
        /// Restrict to one workflow (UUID).
        #[arg(long)]
        workflow_id: Option<String>,
    },

    /// Refreshing terminal view of active workflows.
    Monitor {
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },

    /// Trigger the pending-trigger scan.
    Check {
        /// Materialize missing successors instead of just reporting them.
        #[arg(long)]
        auto_progress: bool,
    },

    /// Apply recovery to a failed calculation.
    Recover {
        /// Calculation id (UUID).
        calc_id: String,
    },

    /// Cancel pending/submitted/running calculations for a workflow or a
    /// single calculation.
    Cancel {
        /// Cancel every non-terminal calculation in this workflow.
        #[arg(long, conflicts_with = "calc_id")]
        workflow_id: Option<String>,

        /// Cancel a single calculation.
        #[arg(long, conflicts_with = "workflow_id")]
        calc_id: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TickModeArg {
    Periodic,
    Completion,
    Status,
}

/// Exit codes (spec §6): 0 success, 1 operational failure, 2 user error, 3 no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    OperationalFailure = 1,
    UserError = 2,
    NoWork = 3,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn tick_defaults_parse() {
        let parsed = Cli::try_parse_from(["mace", "tick"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn tick_completion_mode_parses_with_job_id() {
        let parsed = Cli::try_parse_from(["mace", "tick", "--mode", "completion", "--job-id", "12345"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn check_auto_progress_flag_parses() {
        let parsed = Cli::try_parse_from(["mace", "check", "--auto-progress"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn recover_requires_calc_id() {
        let parsed = Cli::try_parse_from(["mace", "recover"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn init_requires_plan() {
        assert!(Cli::try_parse_from(["mace", "init"]).is_err());
        assert!(Cli::try_parse_from(["mace", "init", "--plan", "plan.json"]).is_ok());
    }

    #[test]
    fn cancel_rejects_both_selectors_together() {
        let parsed = Cli::try_parse_from([
            "mace",
            "cancel",
            "--workflow-id",
            "11111111-1111-1111-1111-111111111111",
            "--calc-id",
            "22222222-2222-2222-2222-222222222222",
        ]);
        assert!(parsed.is_err());
    }
}
