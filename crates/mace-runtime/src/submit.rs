//! Submit service (spec §4.2): renders a submission script for a pending
//! calculation, invokes the scheduler, and records the returned job id.

use crate::retry::{retry_with_policy, RetryConfig};
use mace_connectors::SchedulerClient;
use mace_core::error::{MaceError, MaceResult};
use mace_core::layout;
use mace_core::model::{Calculation, PlanStep};
use mace_core::store::Store;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct SubmitService<'a> {
    store: &'a Store,
    scheduler: &'a dyn SchedulerClient,
    base_dir: PathBuf,
    slurm_account: Option<String>,
    slurm_partition: Option<String>,
    scratch: Option<PathBuf>,
}

impl<'a> SubmitService<'a> {
    pub fn new(
        store: &'a Store,
        scheduler: &'a dyn SchedulerClient,
        base_dir: impl Into<PathBuf>,
        slurm_account: Option<String>,
        slurm_partition: Option<String>,
        scratch: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            scheduler,
            base_dir: base_dir.into(),
            slurm_account,
            slurm_partition,
            scratch,
        }
    }

    /// Turn `calc` (`pending`) into a submitted batch job. The calculation
    /// stays `pending` on failure — the queue manager is responsible for
    /// the next admission attempt (spec §4.2 error conditions).
    pub async fn submit(&self, calc: &Calculation, step: &PlanStep) -> MaceResult<String> {
        let step_dir = layout::step_dir(
            &self.base_dir,
            &calc.workflow_id.to_string(),
            calc.step_index,
            &calc.calc_type.label(),
            &calc.material_id,
        );
        tokio::fs::create_dir_all(&step_dir).await?;

        let script_path = step_dir.join(format!("{}.sh", calc.material_id));
        if !script_path.exists() {
            let script = self.render_script(calc, step, &step_dir);
            tokio::fs::write(&script_path, script).await?;
        }

        let config = RetryConfig::submit_default();
        let job_id = retry_with_policy(
            &config,
            |e| matches!(e, MaceError::JobSubmission(_)),
            || self.scheduler.submit(&script_path),
        )
        .await?;

        self.store.mark_submitted(calc.id, &job_id).await?;
        Ok(job_id)
    }

    fn render_script(&self, calc: &Calculation, step: &PlanStep, step_dir: &Path) -> String {
        let rp = &step.resource_profile;
        let account = rp.account.as_deref().or(self.slurm_account.as_deref());
        let scratch_path = self.scratch.as_ref().map(|base| {
            base.join(calc.workflow_id.to_string())
                .join(format!("step_{:03}", calc.step_index))
                .join(&calc.material_id)
        });

        let mut out = String::new();
        out.push_str("#!/bin/bash\n");
        out.push_str(&format!("#SBATCH --job-name={}_{}\n", calc.material_id, calc.calc_type.label()));
        out.push_str(&format!("#SBATCH --ntasks={}\n", rp.cores));
        out.push_str(&format!("#SBATCH --mem={}G\n", rp.memory_gb));
        out.push_str(&format!("#SBATCH --time={}\n", rp.walltime_min));
        if let Some(account) = account {
            out.push_str(&format!("#SBATCH --account={account}\n"));
        }
        if let Some(partition) = &self.slurm_partition {
            out.push_str(&format!("#SBATCH --partition={partition}\n"));
        }
        out.push('\n');
        out.push_str(&format!("cd {}\n", step_dir.display()));
        if let Some(scratch) = scratch_path {
            out.push_str(&format!("export MACE_SCRATCH={}\n", scratch.display()));
        }
        out.push_str(&format!(
            "crystal < {}.d12 > {}.out 2> {}.err\n",
            calc.material_id, calc.material_id, calc.material_id
        ));
        out.push('\n');
        out.push_str(&self.completion_hook(calc, step_dir));
        out
    }

    /// The fragment appended to every script that re-enters the queue
    /// manager in completion mode (spec §4.2 path-resolution contract).
    fn completion_hook(&self, _calc: &Calculation, step_dir: &Path) -> String {
        let bin = match resolve_queue_manager_binary(step_dir) {
            Some(path) => path.display().to_string(),
            None => {
                warn!("could not resolve mace binary for completion hook; falling back to PATH lookup at runtime");
                "mace".to_string()
            }
        };
        format!("\"{bin}\" tick --mode completion --job-id \"$SLURM_JOB_ID\" --max-submit 5 || true\n")
    }
}

/// Three-step resolution: `MACE_HOME` env var, `which`-style PATH lookup,
/// then a fixed set of relative candidates climbing out of `cwd`. The
/// first hit wins; absence of all three is a warning, never a job failure.
fn resolve_queue_manager_binary(cwd: &Path) -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("MACE_HOME") {
        let candidate = PathBuf::from(home).join("bin").join("mace");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    if let Ok(path) = which::which("mace") {
        return Some(path);
    }
    for rel in ["../../../bin/mace", "../../bin/mace", "../bin/mace", "./mace"] {
        let candidate = cwd.join(rel);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_falls_through_to_none_when_nothing_matches() {
        std::env::remove_var("MACE_HOME");
        let dir = tempfile::tempdir().unwrap();
        // No MACE_HOME, "mace" near-certainly absent from PATH in a test
        // sandbox, and none of the relative candidates exist under a fresh
        // tempdir.
        assert!(resolve_queue_manager_binary(dir.path()).is_none() || which::which("mace").is_ok());
    }

    #[test]
    fn mace_home_candidate_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let bin_path = bin_dir.join("mace");
        std::fs::write(&bin_path, b"").unwrap();

        std::env::set_var("MACE_HOME", dir.path());
        let resolved = resolve_queue_manager_binary(dir.path());
        std::env::remove_var("MACE_HOME");

        assert_eq!(resolved, Some(bin_path));
    }
}
