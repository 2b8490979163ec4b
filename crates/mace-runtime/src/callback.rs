//! Completion callback (spec §4.4): closes the loop from a finished batch
//! job back into the state machine. Every step here is written to be safe
//! under re-invocation for the same job id (spec §5 idempotency, testable
//! property 5) — row updates are `UPDATE`s, file registration is
//! hash-keyed, property writes are upserts, and engine emission checks for
//! existing successors before creating.

use mace_connectors::{
    band_path_from_config, classify_outcome, extract_dimensionality, extract_input_settings, extract_properties,
    extract_space_group, hash_file,
};
use mace_core::error::{MaceError, MaceResult};
use mace_core::layout;
use mace_core::model::{
    Calculation, CalculationStatus, FileArtifact, FileKind, InputSettings, Property, PropertyValue,
};
use mace_core::store::Store;
use mace_engine::WorkflowEngine;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub calc_id: Uuid,
    pub status: CalculationStatus,
    pub successors_created: usize,
}

/// Runs the five-stage pipeline for the calculation identified by
/// `job_id`: outcome classification, file-registry update, property
/// extraction (on success), engine entry, admission is left to the caller
/// (the queue-manager tick invoked right after, per spec §4.4 stage 5).
pub async fn run_callback<'a>(
    store: &'a Store,
    engine: &WorkflowEngine<'a>,
    base_dir: &Path,
    job_id: &str,
) -> MaceResult<CallbackOutcome> {
    let calc = store
        .find_by_job_id(job_id)
        .await?
        .ok_or_else(|| MaceError::Dependency(format!("no calculation tracks job id {job_id}")))?;

    let step_dir = layout::step_dir(
        base_dir,
        &calc.workflow_id.to_string(),
        calc.step_index,
        &calc.calc_type.label(),
        &calc.material_id,
    );
    let output_path = step_dir.join(format!("{}.out", calc.material_id));
    let solver_output = match tokio::fs::read_to_string(&output_path).await {
        Ok(text) => text,
        Err(e) => {
            store.mark_failed(calc.id, mace_core::model::ErrorKind::FileOperation).await?;
            info!(calc_id = %calc.id, path = %output_path.display(), "solver output missing, marked failed");
            return Err(MaceError::FileOperation(format!(
                "could not read solver output {}: {e}",
                output_path.display()
            )));
        }
    };

    let (status, error_kind) = classify_outcome(&solver_output);
    register_outputs(store, &calc, &step_dir).await?;

    match status {
        CalculationStatus::Completed => {
            store.mark_completed(calc.id).await?;
            extract_and_store_properties(store, &calc, &solver_output).await;
            store_input_settings(store, &calc, &solver_output).await?;
            fill_material_metadata(store, &calc, &solver_output).await?;
            let completed = store
                .get_calculation(calc.id)
                .await?
                .ok_or_else(|| MaceError::Database("calculation vanished after mark_completed".into()))?;
            let successors = engine.on_completion(&completed).await?;
            Ok(CallbackOutcome { calc_id: calc.id, status, successors_created: successors.len() })
        }
        _ => {
            let kind = error_kind.unwrap_or(mace_core::model::ErrorKind::Unknown);
            store.mark_failed(calc.id, kind).await?;
            info!(calc_id = %calc.id, ?kind, "calculation failed, deferring to recovery");
            Ok(CallbackOutcome { calc_id: calc.id, status, successors_created: 0 })
        }
    }
}

async fn register_outputs(store: &Store, calc: &Calculation, step_dir: &Path) -> MaceResult<()> {
    let candidates = [
        (format!("{}.out", calc.material_id), FileKind::SolverOutput),
        (format!("{}.f9", calc.material_id), FileKind::Wavefunction),
        (format!("{}.d12", calc.material_id), FileKind::Input),
    ];
    for (name, kind) in candidates {
        let path = step_dir.join(&name);
        if !path.exists() {
            continue;
        }
        let content_hash = hash_file(&path).await?;
        let size = tokio::fs::metadata(&path).await?.len();
        let artifact = FileArtifact {
            id: Uuid::new_v4(),
            calc_id: calc.id,
            path: path.display().to_string(),
            kind,
            content_hash,
            size,
            created_at: chrono::Utc::now(),
        };
        store.register_file(&artifact).await?;
    }
    Ok(())
}

/// Parses this calculation's own effective settings and (for BAND steps)
/// its k-path label, then upserts them — the store's COALESCE merge means
/// a value already inherited from a parent (spec §4.6, `propagate_inherited`)
/// is never overwritten by this calculation's own, possibly incomplete, parse.
async fn store_input_settings(store: &Store, calc: &Calculation, solver_output: &str) -> MaceResult<()> {
    let extracted = extract_input_settings(solver_output);
    let k_path = if calc.calc_type.kind == mace_core::model::CalcKind::Band {
        band_path_from_config(&calc.config)
    } else {
        None
    };
    store
        .upsert_input_settings(&InputSettings {
            calc_id: calc.id,
            method: extracted.method,
            basis: extracted.basis,
            tolerances: extracted.tolerances,
            k_points: extracted.k_points,
            functional: extracted.functional,
            dispersion: extracted.dispersion,
            opt_flags: extracted.opt_flags,
            k_path,
        })
        .await
}

/// Fill in the owning material's `formula`/`space_group`/`dimensionality`
/// fields (spec §3) the first time any calculation reports them — a
/// one-time fill via `Store::fill_material_metadata`'s COALESCE update, not
/// a general mutation of the otherwise-immutable `Material` row.
async fn fill_material_metadata(store: &Store, calc: &Calculation, solver_output: &str) -> MaceResult<()> {
    let formula = store
        .get_property(calc.id, "formula")
        .await?
        .and_then(|p| match p.value {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        });
    let space_group = extract_space_group(solver_output);
    let dimensionality = extract_dimensionality(solver_output);
    if formula.is_some() || space_group.is_some() || dimensionality.is_some() {
        store
            .fill_material_metadata(&calc.material_id, formula.as_deref(), space_group, dimensionality)
            .await?;
    }
    Ok(())
}

async fn extract_and_store_properties(store: &Store, calc: &Calculation, solver_output: &str) {
    for extracted in extract_properties(solver_output) {
        let prop = Property {
            id: Uuid::new_v4(),
            calc_id: calc.id,
            name: extracted.name,
            value: extracted.value,
            unit: extracted.unit,
            category: extracted.category,
            inherited: false,
        };
        if let Err(e) = store.upsert_property(&prop).await {
            warn!(calc_id = %calc.id, error = %e, "property extraction write failed");
            let error_prop = Property {
                id: Uuid::new_v4(),
                calc_id: calc.id,
                name: "extraction_error".to_string(),
                value: PropertyValue::Text(e.to_string()),
                unit: None,
                category: "diagnostic".to_string(),
                inherited: false,
            };
            let _ = store.upsert_property(&error_prop).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mace_core::model::{CalcKind, CalcType, ExecutionSettings, InputType, PlanStep, ResourceProfile, WorkflowInstance, WorkflowStatus};

    struct NoopGenerator;

    #[async_trait::async_trait]
    impl mace_connectors::InputGenerator for NoopGenerator {
        async fn generate(&self, _config_path: &Path, _output_dir: &Path, _timeout_secs: u64) -> MaceResult<Vec<PathBuf>> {
            Ok(vec![])
        }
    }

    async fn seeded_opt(store: &Store, base: &Path) -> (Calculation, Uuid) {
        let profile = ResourceProfile { cores: 4, memory_gb: 8, walltime_min: 60, account: None };
        let plan = mace_core::model::WorkflowPlan {
            id: 1,
            input_type: InputType::D12,
            sequence: vec![
                PlanStep {
                    step_index: 1,
                    calc_type: CalcType::first(CalcKind::Opt),
                    resource_profile: profile.clone(),
                    config_handle: serde_json::json!({}),
                },
                PlanStep {
                    step_index: 2,
                    calc_type: CalcType::first(CalcKind::Sp),
                    resource_profile: profile,
                    config_handle: serde_json::json!({}),
                },
            ],
            execution_settings: ExecutionSettings {
                max_concurrent_jobs: 10,
                enable_material_tracking: true,
                generator_timeout_secs: 300,
            },
            created_at: Utc::now(),
        };
        store.insert_plan(&plan).await.unwrap();
        let workflow_id = Uuid::new_v4();
        let workflow = WorkflowInstance {
            id: workflow_id,
            plan_id: plan.id,
            materials: vec!["diamond".into()],
            status: WorkflowStatus::Active,
            max_step_reached: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_workflow(&workflow).await.unwrap();

        let calc = Calculation {
            id: Uuid::new_v4(),
            material_id: "diamond".into(),
            workflow_id,
            step_index: 1,
            calc_type: CalcType::first(CalcKind::Opt),
            status: CalculationStatus::Submitted,
            job_id: Some("12345".into()),
            attempt: 1,
            config: serde_json::json!({}),
            parents: vec![],
            created_at: Utc::now(),
            submitted_at: Some(Utc::now()),
            running_at: None,
            completed_at: None,
            failed_at: None,
            error_kind: None,
        };
        store.insert_calculation(&calc).await.unwrap();

        let step_dir = layout::step_dir(base, &workflow_id.to_string(), 1, "OPT", "diamond");
        tokio::fs::create_dir_all(&step_dir).await.unwrap();
        tokio::fs::write(
            step_dir.join("diamond.out"),
            "SPACE GROUP N. 227  :FD-3M\nCRYSTAL\nCHEMICAL FORMULA: C2\nENDED - TOTAL CPU TIME  10.0\n",
        )
        .await
        .unwrap();
        tokio::fs::write(step_dir.join("diamond.f9"), b"wavefunction-bytes").await.unwrap();

        (calc, workflow_id)
    }

    #[tokio::test]
    async fn completion_advances_engine_and_fills_material_metadata() {
        let store = Store::in_memory().await.unwrap();
        let base = tempfile::tempdir().unwrap();
        let (_calc, _workflow_id) = seeded_opt(&store, base.path()).await;

        let generator = NoopGenerator;
        let engine = WorkflowEngine::new(&store, &generator, base.path().to_path_buf());
        let outcome = run_callback(&store, &engine, base.path(), "12345").await.unwrap();

        assert_eq!(outcome.status, CalculationStatus::Completed);
        assert_eq!(outcome.successors_created, 1, "SP emitted after OPT (FREQ absent from this plan)");

        let material = store.get_material("diamond").await.unwrap().expect("material seeded");
        assert_eq!(material.formula.as_deref(), Some("C2"));
        assert_eq!(material.space_group, Some(227));
        assert_eq!(material.dimensionality, Some(3));
    }

    #[tokio::test]
    async fn rerunning_callback_for_the_same_job_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        let base = tempfile::tempdir().unwrap();
        let (calc, _workflow_id) = seeded_opt(&store, base.path()).await;

        let generator = NoopGenerator;
        let engine = WorkflowEngine::new(&store, &generator, base.path().to_path_buf());
        run_callback(&store, &engine, base.path(), "12345").await.unwrap();
        let files_first = store.list_files_for_calc(calc.id).await.unwrap();
        let props_first = store.list_properties_for_calc(calc.id).await.unwrap();

        let outcome_second = run_callback(&store, &engine, base.path(), "12345").await.unwrap();
        let files_second = store.list_files_for_calc(calc.id).await.unwrap();
        let props_second = store.list_properties_for_calc(calc.id).await.unwrap();

        assert_eq!(outcome_second.successors_created, 0, "successor already present, not recreated");
        assert_eq!(files_first.len(), files_second.len());
        assert_eq!(props_first.len(), props_second.len());
    }
}

/// Resolve the submit directory a completion hook is invoked from into the
/// base workflow directory it was rendered under (the hook's CWD is the
/// step directory; climbing three levels recovers `<base>`).
pub fn base_dir_from_step_cwd(cwd: &Path) -> PathBuf {
    cwd.parent()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.to_path_buf())
}
