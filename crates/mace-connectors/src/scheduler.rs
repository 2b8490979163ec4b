//! The batch scheduler contract (spec §6): submit, query, cancel — nothing
//! else. [`SlurmClient`] is the one process-invoking implementation; any
//! other scheduler only needs these three operations to plug in.

use async_trait::async_trait;
use mace_core::error::{MaceError, MaceResult};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub job_id: String,
    /// Scheduler-reported state token (`PENDING`, `RUNNING`, …), kept
    /// opaque — callers only care about membership in the active set.
    pub state: String,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub active_count: u32,
    pub jobs: Vec<JobStatus>,
}

/// The three operations spec §6 allows the control plane to depend on.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    async fn submit(&self, script_path: &Path) -> MaceResult<String>;
    async fn query_active(&self) -> MaceResult<SchedulerStatus>;
    async fn cancel(&self, job_id: &str) -> MaceResult<()>;
}

/// Slurm-backed implementation: `sbatch`, `squeue`, `scancel` invoked as
/// subprocesses. No dependency on any Slurm feature beyond these three
/// commands and their plain-text output conventions.
pub struct SlurmClient {
    pub user: String,
    sbatch_bin: String,
    squeue_bin: String,
    scancel_bin: String,
}

impl SlurmClient {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            sbatch_bin: "sbatch".to_string(),
            squeue_bin: "squeue".to_string(),
            scancel_bin: "scancel".to_string(),
        }
    }

    /// Parses `sbatch`'s conventional `"Submitted batch job 123456"` line.
    fn parse_job_id(stdout: &str) -> MaceResult<String> {
        stdout
            .lines()
            .find_map(|l| l.trim().strip_prefix("Submitted batch job "))
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                MaceError::JobSubmission(format!("could not parse job id from: {stdout:?}"))
            })
    }
}

#[async_trait]
impl SchedulerClient for SlurmClient {
    async fn submit(&self, script_path: &Path) -> MaceResult<String> {
        let mut cmd = Command::new(&self.sbatch_bin);
        cmd.arg(script_path);
        let output = timeout(SUBMIT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| MaceError::Timeout("scheduler submit exceeded 60s".into()))??;
        if !output.status.success() {
            return Err(MaceError::JobSubmission(format!(
                "sbatch exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Self::parse_job_id(&String::from_utf8_lossy(&output.stdout))
    }

    async fn query_active(&self) -> MaceResult<SchedulerStatus> {
        let mut cmd = Command::new(&self.squeue_bin);
        cmd.args(["-h", "-u", &self.user, "-o", "%i %T"]);
        let output = timeout(QUERY_TIMEOUT, cmd.output())
            .await
            .map_err(|_| MaceError::Timeout("scheduler query exceeded 30s".into()))??;
        if !output.status.success() {
            return Err(MaceError::Database(format!(
                "squeue exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let jobs: Vec<JobStatus> = stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let job_id = parts.next()?.to_string();
                let state = parts.next().unwrap_or("UNKNOWN").to_string();
                Some(JobStatus { job_id, state })
            })
            .collect();
        Ok(SchedulerStatus {
            active_count: jobs.len() as u32,
            jobs,
        })
    }

    async fn cancel(&self, job_id: &str) -> MaceResult<()> {
        let mut cmd = Command::new(&self.scancel_bin);
        cmd.arg(job_id);
        let output = timeout(SUBMIT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| MaceError::Timeout("scheduler cancel exceeded 60s".into()))??;
        if !output.status.success() {
            return Err(MaceError::Database(format!(
                "scancel exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conventional_sbatch_output() {
        let id = SlurmClient::parse_job_id("Submitted batch job 884213\n").unwrap();
        assert_eq!(id, "884213");
    }

    #[test]
    fn rejects_unparseable_output() {
        assert!(SlurmClient::parse_job_id("error: something went wrong\n").is_err());
    }
}
