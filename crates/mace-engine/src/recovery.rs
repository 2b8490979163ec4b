//! Error classifier + recovery (spec §4.7): converts a `failed`
//! calculation into either a retry with an adjusted configuration blob,
//! or a terminal failure, governed by [`RecoveryRules`].

use chrono::Utc;
use mace_core::config::RecoveryRules;
use mace_core::error::{MaceError, MaceResult};
use mace_core::model::{Calculation, CalculationStatus, ErrorKind};
use mace_core::store::Store;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use uuid::Uuid;

/// Apply recovery to a `failed` calculation. Returns the new retry row
/// when one is spawned, or `None` when the per-kind attempt bound has
/// been reached and the predecessor was moved to `terminally_failed`
/// (spec §4.7, testable property 8).
pub async fn apply_recovery(
    store: &Store,
    rules: &RecoveryRules,
    failed: &Calculation,
    failure_text: Option<&str>,
) -> MaceResult<Option<Calculation>> {
    if failed.status != CalculationStatus::Failed {
        return Err(MaceError::Dependency(
            "recovery requires a row in the failed state".into(),
        ));
    }
    let kind = failed
        .error_kind
        .ok_or_else(|| MaceError::Dependency("recovery requires a classified error kind".into()))?;
    let max_attempts = rules.max_attempts(kind);

    if failed.attempt >= max_attempts {
        store.mark_terminally_failed(failed.id).await?;
        return Ok(None);
    }

    let retry = Calculation {
        id: Uuid::new_v4(),
        material_id: failed.material_id.clone(),
        workflow_id: failed.workflow_id,
        step_index: failed.step_index,
        calc_type: failed.calc_type,
        status: CalculationStatus::Pending,
        job_id: None,
        attempt: failed.attempt + 1,
        config: adjust_config(&failed.config, kind, failure_text),
        // Same step linkage as the predecessor — recovery retries the
        // step in place, it does not re-derive parents from the plan.
        parents: failed.parents.clone(),
        created_at: Utc::now(),
        submitted_at: None,
        running_at: None,
        completed_at: None,
        failed_at: None,
        error_kind: None,
    };
    store.insert_calculation(&retry).await?;
    Ok(Some(retry))
}

/// Apply the per-kind remediation action (spec §4.7 table) to a
/// predecessor's effective config blob.
fn adjust_config(config: &Value, kind: ErrorKind, failure_text: Option<&str>) -> Value {
    let mut cfg = config.clone();
    if !cfg.is_object() {
        cfg = serde_json::json!({});
    }
    let obj = cfg.as_object_mut().expect("forced to object above");
    match kind {
        ErrorKind::ScfNotConverged => {
            let current = obj.get("maxcycle").and_then(Value::as_u64).unwrap_or(50);
            obj.insert("maxcycle".into(), serde_json::json!(current + 50));
            obj.insert("fmixing".into(), serde_json::json!(30));
        }
        ErrorKind::MemoryExhausted => {
            let tier = obj.get("memory_tier").and_then(Value::as_u64).unwrap_or(1);
            obj.insert("memory_tier".into(), serde_json::json!(tier + 1));
        }
        ErrorKind::ShrinkTooSmall => {
            let safe = failure_text.and_then(extract_safe_shrink).unwrap_or(8);
            obj.insert("shrink".into(), serde_json::json!(safe));
        }
        ErrorKind::WalltimeExceeded => {
            let tier = obj.get("walltime_tier").and_then(Value::as_u64).unwrap_or(1);
            obj.insert("walltime_tier".into(), serde_json::json!(tier + 1));
        }
        // geometry_collision, input_generation_failed, disk_space, unknown
        // carry zero or one retry and need no config adjustment.
        _ => {}
    }
    cfg
}

fn extract_safe_shrink(text: &str) -> Option<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)SHRINK FACTORS LESS THAN\s+(\d+)").unwrap());
    re.captures(text)?.get(1)?.as_str().parse().ok()
}
