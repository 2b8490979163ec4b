use super::Store;
use crate::error::{MaceError, MaceResult};
use crate::model::{CalcType, Calculation, CalculationStatus, ErrorKind};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Store {
    /// Insert a new `pending` calculation row. Enforces invariant 2 (at
    /// most one row per material/workflow/step/attempt) via the unique
    /// index — a duplicate insert is treated as already-present and
    /// silently ignored, which is what makes engine emission idempotent.
    pub async fn insert_calculation(&self, calc: &Calculation) -> MaceResult<bool> {
        let parents_json = serde_json::to_string(&calc.parents)?;
        let config_json = serde_json::to_string(&calc.config)?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO calculations \
             (id, material_id, workflow_id, step_index, calc_type, status, job_id, attempt, \
              config_json, parents_json, created_at, submitted_at, running_at, completed_at, \
              failed_at, error_kind) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, NULL, NULL, NULL, NULL)",
        )
        .bind(calc.id.to_string())
        .bind(&calc.material_id)
        .bind(calc.workflow_id.to_string())
        .bind(calc.step_index as i64)
        .bind(calc.calc_type.label())
        .bind(calc.status.to_string())
        .bind(&calc.job_id)
        .bind(calc.attempt as i64)
        .bind(config_json)
        .bind(parents_json)
        .bind(calc.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_calculation(&self, id: Uuid) -> MaceResult<Option<Calculation>> {
        let row = sqlx::query("SELECT * FROM calculations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_calc(&r)).transpose()?)
    }

    /// Latest-attempt row for (material, workflow, calc_type), if any.
    pub async fn find_calculation(
        &self,
        material_id: &str,
        workflow_id: Uuid,
        calc_type: CalcType,
    ) -> MaceResult<Option<Calculation>> {
        let row = sqlx::query(
            "SELECT * FROM calculations WHERE material_id = ?1 AND workflow_id = ?2 AND calc_type = ?3 \
             ORDER BY attempt DESC LIMIT 1",
        )
        .bind(material_id)
        .bind(workflow_id.to_string())
        .bind(calc_type.label())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_calc(&r)).transpose()?)
    }

    /// Every row (any attempt) for (material, workflow, calc_type) —
    /// used by the pending-trigger scan to tell "absent" from "present in
    /// a non-terminal state".
    pub async fn find_calculations_any_attempt(
        &self,
        material_id: &str,
        workflow_id: Uuid,
        calc_type: CalcType,
    ) -> MaceResult<Vec<Calculation>> {
        let rows = sqlx::query(
            "SELECT * FROM calculations WHERE material_id = ?1 AND workflow_id = ?2 AND calc_type = ?3",
        )
        .bind(material_id)
        .bind(workflow_id.to_string())
        .bind(calc_type.label())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_calc).collect()
    }

    /// Highest-index completed calculation for a material within a
    /// workflow (used by the pending-trigger scan, spec §4.5).
    pub async fn highest_completed(
        &self,
        material_id: &str,
        workflow_id: Uuid,
    ) -> MaceResult<Option<Calculation>> {
        let row = sqlx::query(
            "SELECT * FROM calculations WHERE material_id = ?1 AND workflow_id = ?2 AND status = 'completed' \
             ORDER BY step_index DESC LIMIT 1",
        )
        .bind(material_id)
        .bind(workflow_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_calc(&r)).transpose()?)
    }

    /// Pending rows ordered for admission: dependency-met first (all
    /// parents completed), then FIFO by creation timestamp (spec §4.3).
    pub async fn list_eligible_pending(&self, limit: u32) -> MaceResult<Vec<Calculation>> {
        let rows = sqlx::query(
            "SELECT * FROM calculations WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::new();
        for r in &rows {
            let calc = row_to_calc(r)?;
            if self.parents_completed(&calc).await? {
                out.push(calc);
                if out.len() as u32 >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Invariant 1: every parent referenced must be `completed`.
    pub async fn parents_completed(&self, calc: &Calculation) -> MaceResult<bool> {
        for parent_id in &calc.parents {
            match self.get_calculation(*parent_id).await? {
                Some(p) if p.status == CalculationStatus::Completed => continue,
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    pub async fn count_active_jobs(&self) -> MaceResult<u32> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM calculations WHERE status IN ('submitted', 'running')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("c") as u32)
    }

    pub async fn mark_submitted(&self, id: Uuid, job_id: &str) -> MaceResult<()> {
        sqlx::query(
            "UPDATE calculations SET status = 'submitted', job_id = ?2, submitted_at = ?3 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(job_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_running(&self, id: Uuid) -> MaceResult<()> {
        sqlx::query("UPDATE calculations SET status = 'running', running_at = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_completed(&self, id: Uuid) -> MaceResult<()> {
        sqlx::query("UPDATE calculations SET status = 'completed', completed_at = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, kind: ErrorKind) -> MaceResult<()> {
        sqlx::query(
            "UPDATE calculations SET status = 'failed', failed_at = ?2, error_kind = ?3 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(kind.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_terminally_failed(&self, id: Uuid) -> MaceResult<()> {
        sqlx::query("UPDATE calculations SET status = 'terminally_failed' WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_cancelled(&self, id: Uuid) -> MaceResult<()> {
        sqlx::query("UPDATE calculations SET status = 'cancelled' WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_by_workflow(&self, workflow_id: Uuid) -> MaceResult<Vec<Calculation>> {
        let rows = sqlx::query("SELECT * FROM calculations WHERE workflow_id = ?1 ORDER BY step_index, attempt")
            .bind(workflow_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_calc).collect()
    }

    pub async fn list_by_status(&self, status: CalculationStatus) -> MaceResult<Vec<Calculation>> {
        let rows = sqlx::query("SELECT * FROM calculations WHERE status = ?1 ORDER BY created_at")
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_calc).collect()
    }

    pub async fn find_by_job_id(&self, job_id: &str) -> MaceResult<Option<Calculation>> {
        let row = sqlx::query("SELECT * FROM calculations WHERE job_id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_calc(&r)).transpose()?)
    }
}

fn row_to_calc(row: &sqlx::sqlite::SqliteRow) -> MaceResult<Calculation> {
    let parents_json: String = row.get("parents_json");
    let parents: Vec<Uuid> = serde_json::from_str(&parents_json)?;
    let status_str: String = row.get("status");
    let calc_type_str: String = row.get("calc_type");
    Ok(Calculation {
        id: row
            .get::<String, _>("id")
            .parse()
            .map_err(|e| MaceError::Database(format!("bad uuid: {e}")))?,
        material_id: row.get("material_id"),
        workflow_id: row
            .get::<String, _>("workflow_id")
            .parse()
            .map_err(|e| MaceError::Database(format!("bad uuid: {e}")))?,
        step_index: row.get::<i64, _>("step_index") as u32,
        calc_type: calc_type_str
            .parse()
            .map_err(MaceError::Database)?,
        status: status_str.parse().map_err(MaceError::Database)?,
        job_id: row.get("job_id"),
        attempt: row.get::<i64, _>("attempt") as u32,
        config: serde_json::from_str(row.get("config_json"))?,
        parents,
        created_at: parse_dt(row.get("created_at")),
        submitted_at: row.get::<Option<String>, _>("submitted_at").map(|s| parse_dt(&s)),
        running_at: row.get::<Option<String>, _>("running_at").map(|s| parse_dt(&s)),
        completed_at: row.get::<Option<String>, _>("completed_at").map(|s| parse_dt(&s)),
        failed_at: row.get::<Option<String>, _>("failed_at").map(|s| parse_dt(&s)),
        error_kind: row
            .get::<Option<String>, _>("error_kind")
            .and_then(|s| s.parse().ok()),
    })
}

fn parse_dt(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .unwrap()
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CalcKind;

    fn sample(workflow_id: Uuid, calc_type: CalcType, attempt: u32, parents: Vec<Uuid>) -> Calculation {
        Calculation {
            id: Uuid::new_v4(),
            material_id: "diamond".into(),
            workflow_id,
            step_index: 1,
            calc_type,
            status: CalculationStatus::Pending,
            job_id: None,
            attempt,
            config: serde_json::json!({}),
            parents,
            created_at: Utc::now(),
            submitted_at: None,
            running_at: None,
            completed_at: None,
            failed_at: None,
            error_kind: None,
        }
    }

    #[tokio::test]
    async fn reinserting_the_same_id_is_ignored() {
        let store = Store::in_memory().await.unwrap();
        let calc = sample(Uuid::new_v4(), CalcType::first(CalcKind::Opt), 1, vec![]);
        assert!(store.insert_calculation(&calc).await.unwrap());
        assert!(!store.insert_calculation(&calc).await.unwrap());
        assert!(store.get_calculation(calc.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn parents_completed_is_false_until_every_parent_is_completed() {
        let store = Store::in_memory().await.unwrap();
        let workflow_id = Uuid::new_v4();
        let p1 = sample(workflow_id, CalcType::first(CalcKind::Opt), 1, vec![]);
        let p2 = sample(workflow_id, CalcType::first(CalcKind::Sp), 1, vec![]);
        store.insert_calculation(&p1).await.unwrap();
        store.insert_calculation(&p2).await.unwrap();

        let child = sample(workflow_id, CalcType::first(CalcKind::Band), 1, vec![p1.id, p2.id]);
        store.insert_calculation(&child).await.unwrap();
        assert!(!store.parents_completed(&child).await.unwrap());

        store.mark_completed(p1.id).await.unwrap();
        assert!(!store.parents_completed(&child).await.unwrap());

        store.mark_completed(p2.id).await.unwrap();
        assert!(store.parents_completed(&child).await.unwrap());
    }

    #[tokio::test]
    async fn list_eligible_pending_excludes_rows_with_incomplete_parents() {
        let store = Store::in_memory().await.unwrap();
        let workflow_id = Uuid::new_v4();
        let parent = sample(workflow_id, CalcType::first(CalcKind::Opt), 1, vec![]);
        store.insert_calculation(&parent).await.unwrap();
        let blocked = sample(workflow_id, CalcType::first(CalcKind::Sp), 1, vec![parent.id]);
        store.insert_calculation(&blocked).await.unwrap();

        let eligible = store.list_eligible_pending(10).await.unwrap();
        assert_eq!(eligible.iter().map(|c| c.id).collect::<Vec<_>>(), vec![parent.id]);

        store.mark_completed(parent.id).await.unwrap();
        let eligible = store.list_eligible_pending(10).await.unwrap();
        assert!(eligible.iter().any(|c| c.id == blocked.id));
    }

    #[tokio::test]
    async fn find_by_job_id_sees_status_set_by_mark_submitted() {
        let store = Store::in_memory().await.unwrap();
        let calc = sample(Uuid::new_v4(), CalcType::first(CalcKind::Opt), 1, vec![]);
        store.insert_calculation(&calc).await.unwrap();
        store.mark_submitted(calc.id, "999").await.unwrap();

        let found = store.find_by_job_id("999").await.unwrap().expect("job tracked");
        assert_eq!(found.status, CalculationStatus::Submitted);
        assert_eq!(found.job_id.as_deref(), Some("999"));
    }
}
