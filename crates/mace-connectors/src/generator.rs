//! The input-file generator contract (spec §4.1, §6): invoked as a
//! subprocess with a JSON configuration file and an output directory,
//! never interactively. Success is zero exit code *and* the expected
//! output file present on disk — the generator's own internals (CIF→D12,
//! OPT→SP, D3 builders) are out of scope.

use async_trait::async_trait;
use mace_core::error::{MaceError, MaceResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

#[async_trait]
pub trait InputGenerator: Send + Sync {
    /// Materialize input files for one plan step into `output_dir`,
    /// driven entirely by `config_path`. Returns the path(s) actually
    /// written so the caller can register them as file artifacts.
    async fn generate(
        &self,
        config_path: &Path,
        output_dir: &Path,
        timeout_secs: u64,
    ) -> MaceResult<Vec<PathBuf>>;
}

/// Invokes an external generator binary as `<bin> --config <config_path>
/// --output-dir <output_dir>`, matching the reference architecture's
/// subprocess-tool calling convention (`mofa-plugins::tools::shell`).
pub struct ProcessInputGenerator {
    binary: String,
    /// Filename the generator is expected to produce, relative to
    /// `output_dir`; its absence after a zero exit is still a failure
    /// (spec §6: "the expected output file present on disk").
    expected_output: String,
}

impl ProcessInputGenerator {
    pub fn new(binary: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            expected_output: expected_output.into(),
        }
    }
}

#[async_trait]
impl InputGenerator for ProcessInputGenerator {
    async fn generate(
        &self,
        config_path: &Path,
        output_dir: &Path,
        timeout_secs: u64,
    ) -> MaceResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(output_dir).await?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--config")
            .arg(config_path)
            .arg("--output-dir")
            .arg(output_dir);

        let bound = Duration::from_secs(timeout_secs);
        let output = timeout(bound, cmd.output()).await.map_err(|_| {
            MaceError::Timeout(format!(
                "input generator exceeded {timeout_secs}s: {}",
                self.binary
            ))
        })??;

        if !output.status.success() {
            return Err(MaceError::Calculation {
                kind: "input_generation_failed".into(),
                message: format!(
                    "{} exited with {}: {}",
                    self.binary,
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let expected = output_dir.join(&self.expected_output);
        if !expected.exists() {
            return Err(MaceError::Calculation {
                kind: "input_generation_failed".into(),
                message: format!("expected output {} was not produced", expected.display()),
            });
        }
        Ok(vec![expected])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A generator binary that doesn't exist must surface as a
    /// generator failure, not a panic or a hang.
    #[tokio::test]
    async fn missing_binary_is_a_calculation_error() {
        let dir = tempdir().unwrap();
        let gen = ProcessInputGenerator::new("mace-nonexistent-generator", "out.d12");
        let config = dir.path().join("cfg.json");
        tokio::fs::write(&config, "{}").await.unwrap();
        let result = gen.generate(&config, dir.path(), 5).await;
        assert!(result.is_err());
    }
}
