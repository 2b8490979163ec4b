use super::Store;
use crate::error::MaceResult;
use crate::model::Material;
use chrono::Utc;
use sqlx::Row;

impl Store {
    /// Create the material row on first use only; a pre-existing row with
    /// the same id is left untouched (Material invariant: "created once,
    /// never mutated").
    pub async fn ensure_material(&self, id: &str) -> MaceResult<Material> {
        if let Some(existing) = self.get_material(id).await? {
            return Ok(existing);
        }
        let created_at = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO materials (id, formula, space_group, dimensionality, created_at) \
             VALUES (?1, NULL, NULL, NULL, ?2)",
        )
        .bind(id)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_material(id)
            .await?
            .ok_or_else(|| crate::error::MaceError::Database("material disappeared after insert".into()))
    }

    /// Populate formula/space-group/dimensionality once they become known
    /// from extraction — still a one-time fill, not a general update.
    pub async fn fill_material_metadata(
        &self,
        id: &str,
        formula: Option<&str>,
        space_group: Option<u32>,
        dimensionality: Option<u8>,
    ) -> MaceResult<()> {
        sqlx::query(
            "UPDATE materials SET \
               formula = COALESCE(formula, ?2), \
               space_group = COALESCE(space_group, ?3), \
               dimensionality = COALESCE(dimensionality, ?4) \
             WHERE id = ?1",
        )
        .bind(id)
        .bind(formula)
        .bind(space_group.map(|v| v as i64))
        .bind(dimensionality.map(|v| v as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_material(&self, id: &str) -> MaceResult<Option<Material>> {
        let row = sqlx::query("SELECT * FROM materials WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_material(&r)))
    }

    pub async fn list_materials(&self) -> MaceResult<Vec<Material>> {
        let rows = sqlx::query("SELECT * FROM materials ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_material).collect())
    }
}


fn row_to_material(row: &sqlx::sqlite::SqliteRow) -> Material {
    Material {
        id: row.get("id"),
        formula: row.get("formula"),
        space_group: row.get::<Option<i64>, _>("space_group").map(|v| v as u32),
        dimensionality: row
            .get::<Option<i64>, _>("dimensionality")
            .map(|v| v as u8),
        created_at: chrono::DateTime::parse_from_rfc3339(row.get("created_at"))
            .unwrap()
            .with_timezone(&Utc),
    }
}
