use super::Store;
use crate::error::MaceResult;
use crate::model::{WorkflowInstance, WorkflowStatus};
use chrono::Utc;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

impl Store {
    pub async fn insert_workflow(&self, wf: &WorkflowInstance) -> MaceResult<()> {
        let materials_json = serde_json::to_string(&wf.materials)?;
        sqlx::query(
            "INSERT INTO workflows (id, plan_id, materials_json, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(wf.id.to_string())
        .bind(wf.plan_id)
        .bind(materials_json)
        .bind(wf.status.to_string())
        .bind(wf.created_at.to_rfc3339())
        .bind(wf.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_workflow_status(&self, id: Uuid, status: WorkflowStatus) -> MaceResult<()> {
        sqlx::query("UPDATE workflows SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(status.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_workflow(&self, id: Uuid) -> MaceResult<Option<WorkflowInstance>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(r) => Ok(Some(self.hydrate_workflow(&r).await?)),
        }
    }

    pub async fn list_active_workflows(&self) -> MaceResult<Vec<WorkflowInstance>> {
        let rows = sqlx::query("SELECT * FROM workflows WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(self.hydrate_workflow(r).await?);
        }
        Ok(out)
    }

    pub async fn list_workflows(&self) -> MaceResult<Vec<WorkflowInstance>> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(self.hydrate_workflow(r).await?);
        }
        Ok(out)
    }

    async fn hydrate_workflow(&self, row: &sqlx::sqlite::SqliteRow) -> MaceResult<WorkflowInstance> {
        let id: Uuid = row.get::<String, _>("id").parse().unwrap();
        let status_str: String = row.get("status");
        let materials: Vec<String> = serde_json::from_str(row.get("materials_json"))?;
        let state_rows = sqlx::query(
            "SELECT material_id, max_step_index FROM workflow_states WHERE workflow_id = ?1",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        let mut max_step_reached = HashMap::new();
        for sr in state_rows {
            let mat: String = sr.get("material_id");
            let step: i64 = sr.get("max_step_index");
            max_step_reached.insert(mat, step as u32);
        }
        Ok(WorkflowInstance {
            id,
            plan_id: row.get("plan_id"),
            materials,
            status: status_str.parse().unwrap(),
            max_step_reached,
            created_at: chrono::DateTime::parse_from_rfc3339(row.get("created_at"))
                .unwrap()
                .with_timezone(&Utc),
            updated_at: chrono::DateTime::parse_from_rfc3339(row.get("updated_at"))
                .unwrap()
                .with_timezone(&Utc),
        })
    }

    /// Record the highest plan step index reached for `material_id` in
    /// `workflow_id`, if greater than what is already stored.
    pub async fn bump_max_step(&self, workflow_id: Uuid, material_id: &str, step_index: u32) -> MaceResult<()> {
        sqlx::query(
            "INSERT INTO workflow_states (workflow_id, material_id, max_step_index) VALUES (?1, ?2, ?3) \
             ON CONFLICT(workflow_id, material_id) DO UPDATE SET \
             max_step_index = MAX(max_step_index, excluded.max_step_index)",
        )
        .bind(workflow_id.to_string())
        .bind(material_id)
        .bind(step_index as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: Uuid) -> WorkflowInstance {
        WorkflowInstance {
            id,
            plan_id: 1,
            materials: vec!["diamond".into(), "quartz".into()],
            status: WorkflowStatus::Active,
            max_step_reached: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn bump_max_step_only_ever_increases() {
        let store = Store::in_memory().await.unwrap();
        let id = Uuid::new_v4();
        store.insert_workflow(&instance(id)).await.unwrap();

        store.bump_max_step(id, "diamond", 2).await.unwrap();
        store.bump_max_step(id, "diamond", 1).await.unwrap();

        let wf = store.get_workflow(id).await.unwrap().unwrap();
        assert_eq!(wf.max_step_reached.get("diamond"), Some(&2));
    }

    #[tokio::test]
    async fn list_active_workflows_excludes_completed_ones() {
        let store = Store::in_memory().await.unwrap();
        let active = Uuid::new_v4();
        let done = Uuid::new_v4();
        store.insert_workflow(&instance(active)).await.unwrap();
        store.insert_workflow(&instance(done)).await.unwrap();
        store.set_workflow_status(done, WorkflowStatus::Completed).await.unwrap();

        let actives = store.list_active_workflows().await.unwrap();
        assert_eq!(actives.len(), 1);
        assert_eq!(actives[0].id, active);
    }
}
