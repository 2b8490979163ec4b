//! Domain entities (spec §3): Material, WorkflowPlan, WorkflowInstance,
//! Calculation, FileArtifact, Property, InputSettings — and the small
//! value types (`CalcType`, `CalculationStatus`, `ErrorKind`, …) that tie
//! them together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One of the seven calculation-type tokens from the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalcKind {
    Opt,
    Sp,
    Freq,
    Band,
    Doss,
    Transport,
    ChargePotential,
}

impl CalcKind {
    /// Leaves never fan out to a successor (spec §4.1 table).
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            CalcKind::Freq | CalcKind::Band | CalcKind::Doss | CalcKind::Transport | CalcKind::ChargePotential
        )
    }

    fn token(&self) -> &'static str {
        match self {
            CalcKind::Opt => "OPT",
            CalcKind::Sp => "SP",
            CalcKind::Freq => "FREQ",
            CalcKind::Band => "BAND",
            CalcKind::Doss => "DOSS",
            CalcKind::Transport => "TRANSPORT",
            CalcKind::ChargePotential => "CHARGE+POTENTIAL",
        }
    }
}

impl fmt::Display for CalcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for CalcKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPT" => Ok(CalcKind::Opt),
            "SP" => Ok(CalcKind::Sp),
            "FREQ" => Ok(CalcKind::Freq),
            "BAND" => Ok(CalcKind::Band),
            "DOSS" => Ok(CalcKind::Doss),
            "TRANSPORT" => Ok(CalcKind::Transport),
            "CHARGE+POTENTIAL" => Ok(CalcKind::ChargePotential),
            other => Err(format!("unknown calculation kind: {other}")),
        }
    }
}

/// A calculation type with its deterministic numeric suffix: the first
/// occurrence of a kind in a plan has `index == 1` and renders bare
/// (`OPT`); subsequent occurrences render `OPT2`, `OPT3`, … (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalcType {
    pub kind: CalcKind,
    pub index: u32,
}

impl CalcType {
    pub fn new(kind: CalcKind, index: u32) -> Self {
        assert!(index >= 1, "calc type index is 1-based");
        Self { kind, index }
    }

    pub fn first(kind: CalcKind) -> Self {
        Self::new(kind, 1)
    }

    /// The label used as the `"{type}_{step_index}"` key in plan files and
    /// as the human-readable calculation label (`OPT`, `OPT2`, `SP3`, …).
    pub fn label(&self) -> String {
        if self.index <= 1 {
            self.kind.to_string()
        } else {
            format!("{}{}", self.kind, self.index)
        }
    }
}

impl fmt::Display for CalcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for CalcType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // CHARGE+POTENTIAL carries a literal '+' and is never suffixed.
        if s == "CHARGE+POTENTIAL" {
            return Ok(CalcType::first(CalcKind::ChargePotential));
        }
        let split_at = s
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit())
            .map(|(i, _)| i);
        match split_at {
            None => Ok(CalcType::first(CalcKind::from_str(s)?)),
            Some(i) => {
                let (base, suffix) = s.split_at(i);
                let index: u32 = suffix
                    .parse()
                    .map_err(|_| format!("bad numeric suffix in {s}"))?;
                Ok(CalcType::new(CalcKind::from_str(base)?, index))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationStatus {
    Pending,
    Submitted,
    Running,
    Completed,
    Failed,
    TerminallyFailed,
    Cancelled,
}

impl fmt::Display for CalculationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TerminallyFailed => "terminally_failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CalculationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "submitted" => Ok(Self::Submitted),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "terminally_failed" => Ok(Self::TerminallyFailed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown calculation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Planned,
    Active,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// Classified failure kinds (spec §4.4 / §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ScfNotConverged,
    MemoryExhausted,
    ShrinkTooSmall,
    GeometryCollision,
    WalltimeExceeded,
    InputGenerationFailed,
    DiskSpace,
    FileOperation,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ScfNotConverged => "scf_not_converged",
            Self::MemoryExhausted => "memory_exhausted",
            Self::ShrinkTooSmall => "shrink_too_small",
            Self::GeometryCollision => "geometry_collision",
            Self::WalltimeExceeded => "walltime_exceeded",
            Self::InputGenerationFailed => "input_generation_failed",
            Self::DiskSpace => "disk_space",
            Self::FileOperation => "file_operation",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scf_not_converged" => Ok(Self::ScfNotConverged),
            "memory_exhausted" => Ok(Self::MemoryExhausted),
            "shrink_too_small" => Ok(Self::ShrinkTooSmall),
            "geometry_collision" => Ok(Self::GeometryCollision),
            "walltime_exceeded" => Ok(Self::WalltimeExceeded),
            "input_generation_failed" => Ok(Self::InputGenerationFailed),
            "disk_space" => Ok(Self::DiskSpace),
            "file_operation" => Ok(Self::FileOperation),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown error kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Input,
    Wavefunction,
    PropertiesInput,
    SolverOutput,
    Auxiliary,
    Log,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Wavefunction => "wavefunction",
            Self::PropertiesInput => "properties_input",
            Self::SolverOutput => "solver_output",
            Self::Auxiliary => "auxiliary",
            Self::Log => "log",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(Self::Input),
            "wavefunction" => Ok(Self::Wavefunction),
            "properties_input" => Ok(Self::PropertiesInput),
            "solver_output" => Ok(Self::SolverOutput),
            "auxiliary" => Ok(Self::Auxiliary),
            "log" => Ok(Self::Log),
            other => Err(format!("unknown file kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Scalar(f64),
    Text(String),
    Structured(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    /// Deterministic identifier derived from the first input filename.
    pub id: String,
    pub formula: Option<String>,
    pub space_group: Option<u32>,
    pub dimensionality: Option<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    Cif,
    D12,
    Mixed,
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cif => "cif",
            Self::D12 => "d12",
            Self::Mixed => "mixed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub cores: u32,
    pub memory_gb: u32,
    pub walltime_min: u32,
    pub account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_index: u32,
    pub calc_type: CalcType,
    pub resource_profile: ResourceProfile,
    /// Generator handle — either an inline options block or an
    /// `options_file` path, kept opaque to the engine (spec §6).
    pub config_handle: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    pub max_concurrent_jobs: u32,
    pub enable_material_tracking: bool,
    #[serde(default = "default_generator_timeout")]
    pub generator_timeout_secs: u64,
}

fn default_generator_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPlan {
    /// Monotonic, timestamp-based identifier.
    pub id: i64,
    pub input_type: InputType,
    pub sequence: Vec<PlanStep>,
    pub execution_settings: ExecutionSettings,
    pub created_at: DateTime<Utc>,
}

impl WorkflowPlan {
    /// Whether `calc_type` appears anywhere in the plan's ordered sequence.
    pub fn contains(&self, calc_type: CalcType) -> bool {
        self.sequence.iter().any(|s| s.calc_type == calc_type)
    }

    pub fn step_for(&self, calc_type: CalcType) -> Option<&PlanStep> {
        self.sequence.iter().find(|s| s.calc_type == calc_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub plan_id: i64,
    pub materials: Vec<String>,
    pub status: WorkflowStatus,
    /// Highest plan step index reached so far, per material.
    pub max_step_reached: HashMap<String, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calculation {
    pub id: Uuid,
    pub material_id: String,
    pub workflow_id: Uuid,
    pub step_index: u32,
    pub calc_type: CalcType,
    pub status: CalculationStatus,
    pub job_id: Option<String>,
    /// Recovery-attempt counter; strictly increasing across retries of the
    /// same step index (spec §4.7, invariant 5).
    pub attempt: u32,
    /// Effective settings for this attempt (predecessor's blob plus any
    /// recovery action applied).
    pub config: serde_json::Value,
    /// Parent calculations this row depends on (invariant 1).
    pub parents: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub running_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_kind: Option<ErrorKind>,
}

impl Calculation {
    pub fn label(&self) -> String {
        self.calc_type.label()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileArtifact {
    pub id: Uuid,
    pub calc_id: Uuid,
    pub path: String,
    pub kind: FileKind,
    pub content_hash: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub calc_id: Uuid,
    pub name: String,
    pub value: PropertyValue,
    pub unit: Option<String>,
    pub category: String,
    pub inherited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InputSettings {
    pub calc_id: Uuid,
    pub method: Option<String>,
    pub basis: Option<String>,
    pub tolerances: Option<String>,
    pub k_points: Option<String>,
    pub functional: Option<String>,
    pub dispersion: bool,
    pub opt_flags: Option<String>,
    /// Condensed band-path string with `|` discontinuity markers.
    pub k_path: Option<String>,
}
