//! Layered configuration (spec §6, §9).
//!
//! Precedence, highest first: environment variables, the loaded recovery
//! rule file (merged over built-in defaults), then built-in defaults.
//! Mirrors the reference CLI's `config` crate usage — one `Config` builder
//! composing sources, never hand-rolled env parsing scattered through the
//! codebase.

use crate::error::{MaceError, MaceResult};
use crate::model::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Recovery action applied when retrying a calculation of a given error
/// kind (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryAction {
    pub max_attempts: u32,
    /// `false` means the kind is always terminal (max_attempts == 0).
    #[serde(default)]
    pub description: String,
}

/// The merged recovery-rule table: external file entries override the
/// built-in defaults per kind; kinds absent from the file fall back to the
/// defaults untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryRules {
    pub rules: HashMap<ErrorKind, RecoveryAction>,
}

impl RecoveryRules {
    pub fn defaults() -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            ErrorKind::ScfNotConverged,
            RecoveryAction {
                max_attempts: 3,
                description: "bump MAXCYCLE, enable/adjust mixing, retry".into(),
            },
        );
        rules.insert(
            ErrorKind::MemoryExhausted,
            RecoveryAction {
                max_attempts: 2,
                description: "escalate resource profile (next memory tier), retry".into(),
            },
        );
        rules.insert(
            ErrorKind::ShrinkTooSmall,
            RecoveryAction {
                max_attempts: 2,
                description: "replace k-mesh with the smallest safe value, retry".into(),
            },
        );
        rules.insert(
            ErrorKind::WalltimeExceeded,
            RecoveryAction {
                max_attempts: 2,
                description: "escalate walltime tier, retry".into(),
            },
        );
        rules.insert(
            ErrorKind::GeometryCollision,
            RecoveryAction {
                max_attempts: 0,
                description: "mark terminal".into(),
            },
        );
        rules.insert(
            ErrorKind::InputGenerationFailed,
            RecoveryAction {
                max_attempts: 1,
                description: "re-invoke generator once; if still failing, terminal".into(),
            },
        );
        rules.insert(
            ErrorKind::DiskSpace,
            RecoveryAction {
                max_attempts: 0,
                description: "terminal, require manual intervention".into(),
            },
        );
        rules.insert(
            ErrorKind::FileOperation,
            RecoveryAction {
                max_attempts: 0,
                description: "terminal, missing or unreadable solver output".into(),
            },
        );
        rules.insert(
            ErrorKind::Unknown,
            RecoveryAction {
                max_attempts: 0,
                description: "terminal".into(),
            },
        );
        Self { rules }
    }

    /// Load a TOML rule file and merge it *over* the built-in defaults —
    /// entries present in the file win; absent entries keep their default
    /// (spec §9's resolution of the "two parallel recovery-rule systems"
    /// open question).
    pub fn load_merged(path: &Path) -> MaceResult<Self> {
        let mut merged = Self::defaults();
        if !path.exists() {
            return Ok(merged);
        }
        let text = std::fs::read_to_string(path)?;
        let file_rules: HashMap<String, RecoveryAction> = toml_to_map(&text)?;
        for (kind_str, action) in file_rules {
            let kind = kind_str
                .parse::<ErrorKind>()
                .map_err(MaceError::Configuration)?;
            merged.rules.insert(kind, action);
        }
        Ok(merged)
    }

    pub fn max_attempts(&self, kind: ErrorKind) -> u32 {
        self.rules.get(&kind).map(|r| r.max_attempts).unwrap_or(0)
    }
}

fn toml_to_map(text: &str) -> MaceResult<HashMap<String, RecoveryAction>> {
    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(flatten)]
        rules: HashMap<String, RecoveryAction>,
    }
    let w: Wrapper = ::config::Config::builder()
        .add_source(::config::File::from_str(text, ::config::FileFormat::Toml))
        .build()
        .map_err(|e| MaceError::Configuration(e.to_string()))?
        .try_deserialize()
        .map_err(|e| MaceError::Configuration(e.to_string()))?;
    Ok(w.rules)
}

/// Priority-ordered unit-assignment constants exposed for configuration
/// rather than hard-coded, resolving the metal/semimetal cutoff and
/// DOS-at-Fermi Open Question from spec §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Metal/semimetal band-gap cutoff, in Hartree.
    pub metal_gap_threshold_ha: f64,
    /// DOS-at-Fermi criterion: g(E_F) > ratio * g_mean.
    pub dos_fermi_ratio: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            metal_gap_threshold_ha: 0.001,
            dos_fermi_ratio: 0.05,
        }
    }
}

/// Process-wide configuration, composed from defaults, environment
/// overrides, and (optionally) a user config file — never a bare
/// process-wide singleton reached into by ad-hoc call sites (spec §9's
/// "Global material database singleton" re-architecture note: the loaded
/// `AppConfig` is handed explicitly to every component that needs it).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mace_home: Option<PathBuf>,
    pub slurm_account: Option<String>,
    pub slurm_partition: Option<String>,
    pub scratch: Option<PathBuf>,
    pub database_path: PathBuf,
    pub log_filter: String,
    pub extraction: ExtractionConfig,
}

impl AppConfig {
    /// Compose defaults with environment-variable overrides (spec §6).
    pub fn from_env() -> Self {
        Self {
            mace_home: std::env::var_os("MACE_HOME").map(PathBuf::from),
            slurm_account: std::env::var("SLURM_ACCOUNT").ok(),
            slurm_partition: std::env::var("SLURM_PARTITION").ok(),
            scratch: std::env::var_os("SCRATCH").map(PathBuf::from),
            database_path: std::env::var_os("MACE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("mace.db")),
            log_filter: std::env::var("MACE_LOG").unwrap_or_else(|_| "info".to_string()),
            extraction: ExtractionConfig::default(),
        }
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.database_path.display())
    }
}
