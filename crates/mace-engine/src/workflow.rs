//! The workflow state machine (spec §4.1): translates a completed
//! calculation into the next eligible pending calculations, obeying the
//! plan sequence and the dependency fan-out rules.

use chrono::Utc;
use mace_connectors::InputGenerator;
use mace_core::error::{MaceError, MaceResult};
use mace_core::model::{CalcKind, CalcType, Calculation, CalculationStatus, ErrorKind};
use mace_core::store::Store;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The dependency fan-out table (spec §4.1), expressed as a pure function
/// of the completed calculation type rather than a lookup table: `OPTn`
/// always fans out to `SPn`/`FREQn`, `SPn` always fans out to
/// `BANDn`/`DOSSn`/`OPT(n+1)`, for every `n` — the rule does not change
/// with `n` even though it reads as two separate cases at `n=1` and `n>=2`.
pub fn fan_out(completed: CalcType) -> Vec<CalcType> {
    match completed.kind {
        CalcKind::Opt => vec![
            CalcType::new(CalcKind::Sp, completed.index),
            CalcType::new(CalcKind::Freq, completed.index),
        ],
        CalcKind::Sp => vec![
            CalcType::new(CalcKind::Band, completed.index),
            CalcType::new(CalcKind::Doss, completed.index),
            CalcType::new(CalcKind::Opt, completed.index + 1),
        ],
        // FREQ, BAND, DOSS, TRANSPORT, CHARGE+POTENTIAL are leaves.
        _ => Vec::new(),
    }
}

/// Drives calculation creation and input-file materialization. Holds no
/// state of its own beyond the store handle and generator it was handed
/// — every decision is derived from the store (spec §9's
/// dependency-injection re-architecture note).
pub struct WorkflowEngine<'a> {
    pub store: &'a Store,
    pub generator: &'a dyn InputGenerator,
    pub base_dir: PathBuf,
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(store: &'a Store, generator: &'a dyn InputGenerator, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            generator,
            base_dir: base_dir.into(),
        }
    }

    /// Handle a `(material, workflow, completed_calc_type)` completion
    /// event: create every eligible, not-yet-present successor and
    /// materialize its input files.
    pub async fn on_completion(&self, completed: &Calculation) -> MaceResult<Vec<Calculation>> {
        if completed.status != CalculationStatus::Completed {
            return Err(MaceError::Dependency(
                "workflow engine invoked with a non-completed row".into(),
            ));
        }
        let workflow = self
            .store
            .get_workflow(completed.workflow_id)
            .await?
            .ok_or_else(|| MaceError::Dependency("workflow instance not found".into()))?;
        let plan = self
            .store
            .get_plan(workflow.plan_id)
            .await?
            .ok_or_else(|| MaceError::Dependency("workflow plan not found".into()))?;

        let mut created = Vec::new();
        for candidate in fan_out(completed.calc_type) {
            if !plan.contains(candidate) {
                continue;
            }
            // Idempotent emission: a successor already present in any
            // attempt is never re-created (spec §5 idempotency rule (c)).
            let existing = self
                .store
                .find_calculations_any_attempt(&completed.material_id, completed.workflow_id, candidate)
                .await?;
            if !existing.is_empty() {
                continue;
            }
            let step = plan
                .step_for(candidate)
                .expect("plan.contains(candidate) implies step_for(candidate) is Some");

            let calc = Calculation {
                id: Uuid::new_v4(),
                material_id: completed.material_id.clone(),
                workflow_id: completed.workflow_id,
                step_index: step.step_index,
                calc_type: candidate,
                status: CalculationStatus::Pending,
                job_id: None,
                attempt: 1,
                config: step.config_handle.clone(),
                parents: vec![completed.id],
                created_at: Utc::now(),
                submitted_at: None,
                running_at: None,
                completed_at: None,
                failed_at: None,
                error_kind: None,
            };
            self.store.insert_calculation(&calc).await?;
            self.store
                .bump_max_step(completed.workflow_id, &completed.material_id, step.step_index)
                .await?;
            // BAND/DOSS after SP (and FREQ/SP after OPT) inherit method,
            // functional, basis, and formula from their parent rather than
            // re-deriving them (spec §4.6).
            self.store.propagate_inherited(completed.id, calc.id).await?;

            let timeout_secs = workflow_generator_timeout(&plan);
            if let Err(_err) = self.materialize_inputs(&calc, timeout_secs).await {
                self.store
                    .mark_failed(calc.id, ErrorKind::InputGenerationFailed)
                    .await?;
            }
            created.push(calc);
        }
        Ok(created)
    }

    async fn materialize_inputs(&self, calc: &Calculation, timeout_secs: u64) -> MaceResult<()> {
        let out_dir = self.step_dir(calc);
        tokio::fs::create_dir_all(&out_dir).await?;
        let config_path = out_dir.join("generator_config.json");
        let bytes = serde_json::to_vec_pretty(&calc.config)?;
        tokio::fs::write(&config_path, bytes).await?;
        self.generator.generate(&config_path, &out_dir, timeout_secs).await?;
        Ok(())
    }

    fn step_dir(&self, calc: &Calculation) -> PathBuf {
        mace_core::layout::step_dir(
            &self.base_dir,
            &calc.workflow_id.to_string(),
            calc.step_index,
            &calc.calc_type.label(),
            &calc.material_id,
        )
    }
}

fn workflow_generator_timeout(plan: &mace_core::model::WorkflowPlan) -> u64 {
    plan.execution_settings.generator_timeout_secs
}

/// The pending-trigger scan (spec §4.5): for every active workflow and
/// every material it governs, find the highest-index completed
/// calculation and re-run the engine against it. `on_completion`'s own
/// idempotency check means this only ever materializes calculations that
/// are genuinely missing — it never raises an attempt counter and never
/// duplicates an existing successor.
pub async fn scan_pending_triggers(
    store: &Store,
    generator: &dyn InputGenerator,
    base_dir: &Path,
) -> MaceResult<Vec<Calculation>> {
    let engine = WorkflowEngine::new(store, generator, base_dir.to_path_buf());
    let mut all_created = Vec::new();
    for workflow in store.list_active_workflows().await? {
        for material_id in &workflow.materials {
            if let Some(highest) = store.highest_completed(material_id, workflow.id).await? {
                let created = engine.on_completion(&highest).await?;
                all_created.extend(created);
            }
        }
    }
    Ok(all_created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mace_core::model::CalcKind;

    #[test]
    fn opt_fans_out_to_sp_and_freq() {
        let next = fan_out(CalcType::first(CalcKind::Opt));
        assert_eq!(next, vec![CalcType::first(CalcKind::Sp), CalcType::first(CalcKind::Freq)]);
    }

    #[test]
    fn sp_fans_out_to_band_doss_and_next_opt() {
        let next = fan_out(CalcType::new(CalcKind::Sp, 2));
        assert_eq!(
            next,
            vec![
                CalcType::new(CalcKind::Band, 2),
                CalcType::new(CalcKind::Doss, 2),
                CalcType::new(CalcKind::Opt, 3),
            ]
        );
    }

    #[test]
    fn leaves_fan_out_to_nothing() {
        for kind in [CalcKind::Freq, CalcKind::Band, CalcKind::Doss, CalcKind::Transport, CalcKind::ChargePotential] {
            assert!(fan_out(CalcType::first(kind)).is_empty());
        }
    }

    struct NoopGenerator;

    #[async_trait::async_trait]
    impl InputGenerator for NoopGenerator {
        async fn generate(&self, _config_path: &Path, _output_dir: &Path, _timeout_secs: u64) -> MaceResult<Vec<PathBuf>> {
            Ok(vec![])
        }
    }

    fn sp_plan() -> mace_core::model::WorkflowPlan {
        use mace_core::model::{ExecutionSettings, InputType, PlanStep, ResourceProfile};
        let profile = ResourceProfile { cores: 4, memory_gb: 8, walltime_min: 60, account: None };
        mace_core::model::WorkflowPlan {
            id: 1,
            input_type: InputType::D12,
            sequence: vec![
                PlanStep {
                    step_index: 1,
                    calc_type: CalcType::first(CalcKind::Sp),
                    resource_profile: profile.clone(),
                    config_handle: serde_json::json!({}),
                },
                PlanStep {
                    step_index: 2,
                    calc_type: CalcType::first(CalcKind::Band),
                    resource_profile: profile.clone(),
                    config_handle: serde_json::json!({"k_path_segments": [["X","G"],["G","L"]]}),
                },
                PlanStep {
                    step_index: 3,
                    calc_type: CalcType::first(CalcKind::Doss),
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
        }
    }

    #[tokio::test]
    async fn successors_inherit_method_functional_and_formula_from_parent() {
        use mace_core::model::{InputSettings, Property, PropertyValue, WorkflowInstance, WorkflowStatus};

        let store = Store::in_memory().await.unwrap();
        let plan = sp_plan();
        store.insert_plan(&plan).await.unwrap();
        let workflow = WorkflowInstance {
            id: Uuid::new_v4(),
            plan_id: plan.id,
            materials: vec!["diamond".into()],
            status: WorkflowStatus::Active,
            max_step_reached: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_workflow(&workflow).await.unwrap();

        let sp = Calculation {
            id: Uuid::new_v4(),
            material_id: "diamond".into(),
            workflow_id: workflow.id,
            step_index: 1,
            calc_type: CalcType::first(CalcKind::Sp),
            status: CalculationStatus::Completed,
            job_id: None,
            attempt: 1,
            config: serde_json::json!({}),
            parents: vec![],
            created_at: Utc::now(),
            submitted_at: None,
            running_at: None,
            completed_at: Some(Utc::now()),
            failed_at: None,
            error_kind: None,
        };
        store.insert_calculation(&sp).await.unwrap();
        store
            .upsert_input_settings(&InputSettings {
                calc_id: sp.id,
                method: Some("HF".into()),
                functional: Some("B3LYP".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .upsert_property(&Property {
                id: Uuid::new_v4(),
                calc_id: sp.id,
                name: "formula".into(),
                value: PropertyValue::Text("C2".into()),
                unit: None,
                category: "identity".into(),
                inherited: false,
            })
            .await
            .unwrap();

        let generator = NoopGenerator;
        let base = tempfile::tempdir().unwrap();
        let engine = WorkflowEngine::new(&store, &generator, base.path().to_path_buf());
        let created = engine.on_completion(&sp).await.unwrap();
        assert_eq!(created.len(), 2, "BAND and DOSS both emitted after SP");

        let band = created
            .iter()
            .find(|c| c.calc_type.kind == CalcKind::Band)
            .expect("band emitted");
        let settings = store.get_input_settings(band.id).await.unwrap().expect("settings inherited");
        assert_eq!(settings.method.as_deref(), Some("HF"));
        assert_eq!(settings.functional.as_deref(), Some("B3LYP"));

        let props = store.list_properties_for_calc(band.id).await.unwrap();
        let formula = props.iter().find(|p| p.name == "formula").expect("formula inherited");
        assert!(formula.inherited);
        assert_eq!(formula.value, PropertyValue::Text("C2".into()));
    }
}
