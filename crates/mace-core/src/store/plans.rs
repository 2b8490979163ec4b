use super::Store;
use crate::error::MaceResult;
use crate::model::WorkflowPlan;
use chrono::Utc;
use sqlx::Row;

impl Store {
    /// Plan records are append-only (invariant 6): this always inserts a
    /// new row, never updates an existing plan id.
    pub async fn insert_plan(&self, plan: &WorkflowPlan) -> MaceResult<()> {
        let sequence_json = serde_json::to_string(&plan.sequence)?;
        let settings_json = serde_json::to_string(&plan.execution_settings)?;
        sqlx::query(
            "INSERT INTO workflow_plans (id, input_type, sequence_json, execution_settings, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(plan.id)
        .bind(plan.input_type.to_string())
        .bind(sequence_json)
        .bind(settings_json)
        .bind(plan.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_plan(&self, id: i64) -> MaceResult<Option<WorkflowPlan>> {
        let row = sqlx::query("SELECT * FROM workflow_plans WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_plan(&r)).transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CalcKind, CalcType, ExecutionSettings, InputType, PlanStep, ResourceProfile};

    fn plan(id: i64) -> WorkflowPlan {
        WorkflowPlan {
            id,
            input_type: InputType::D12,
            sequence: vec![PlanStep {
                step_index: 1,
                calc_type: CalcType::first(CalcKind::Opt),
                resource_profile: ResourceProfile { cores: 4, memory_gb: 8, walltime_min: 60, account: None },
                config_handle: serde_json::json!({}),
            }],
            execution_settings: ExecutionSettings {
                max_concurrent_jobs: 10,
                enable_material_tracking: true,
                generator_timeout_secs: 300,
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_plan_through_json_columns() {
        let store = Store::in_memory().await.unwrap();
        let p = plan(1);
        store.insert_plan(&p).await.unwrap();

        let fetched = store.get_plan(1).await.unwrap().expect("plan inserted");
        assert_eq!(fetched.sequence.len(), 1);
        assert_eq!(fetched.execution_settings.max_concurrent_jobs, 10);
    }

    #[tokio::test]
    async fn reinserting_the_same_plan_id_is_rejected() {
        let store = Store::in_memory().await.unwrap();
        store.insert_plan(&plan(1)).await.unwrap();
        assert!(store.insert_plan(&plan(1)).await.is_err(), "plans are append-only, id collisions must fail");
    }
}

fn row_to_plan(row: &sqlx::sqlite::SqliteRow) -> MaceResult<WorkflowPlan> {
    let input_type_str: String = row.get("input_type");
    let input_type = match input_type_str.as_str() {
        "cif" => crate::model::InputType::Cif,
        "d12" => crate::model::InputType::D12,
        _ => crate::model::InputType::Mixed,
    };
    Ok(WorkflowPlan {
        id: row.get("id"),
        input_type,
        sequence: serde_json::from_str(row.get("sequence_json"))?,
        execution_settings: serde_json::from_str(row.get("execution_settings"))?,
        created_at: chrono::DateTime::parse_from_rfc3339(row.get("created_at"))
            .unwrap()
            .with_timezone(&Utc),
    })
}
