use super::Store;
use crate::error::MaceResult;
use crate::model::{FileArtifact, FileKind};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Store {
    /// Register a file artifact, keyed on `(path, content_hash)` so that
    /// re-registering an unchanged file is a no-op (spec §5 idempotency
    /// rule (b)) — a changed hash at the same path is a distinct row.
    pub async fn register_file(&self, file: &FileArtifact) -> MaceResult<bool> {
        if let Some(existing) = self.find_file(&file.path, &file.content_hash).await? {
            let _ = existing;
            return Ok(false);
        }
        sqlx::query(
            "INSERT OR IGNORE INTO files (id, calc_id, path, kind, content_hash, size, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(file.id.to_string())
        .bind(file.calc_id.to_string())
        .bind(&file.path)
        .bind(file.kind.to_string())
        .bind(&file.content_hash)
        .bind(file.size as i64)
        .bind(file.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    pub async fn find_file(&self, path: &str, content_hash: &str) -> MaceResult<Option<FileArtifact>> {
        let row = sqlx::query("SELECT * FROM files WHERE path = ?1 AND content_hash = ?2")
            .bind(path)
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_file(&r)).transpose()?)
    }

    pub async fn list_files_for_calc(&self, calc_id: Uuid) -> MaceResult<Vec<FileArtifact>> {
        let rows = sqlx::query("SELECT * FROM files WHERE calc_id = ?1 ORDER BY created_at")
            .bind(calc_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_file).collect()
    }

    pub async fn find_files_by_kind(&self, calc_id: Uuid, kind: FileKind) -> MaceResult<Vec<FileArtifact>> {
        let rows = sqlx::query("SELECT * FROM files WHERE calc_id = ?1 AND kind = ?2 ORDER BY created_at")
            .bind(calc_id.to_string())
            .bind(kind.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_file).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(calc_id: Uuid, path: &str, hash: &str) -> FileArtifact {
        FileArtifact {
            id: Uuid::new_v4(),
            calc_id,
            path: path.into(),
            kind: FileKind::SolverOutput,
            content_hash: hash.into(),
            size: 42,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reregistering_the_same_path_and_hash_is_a_no_op() {
        let store = Store::in_memory().await.unwrap();
        let calc_id = Uuid::new_v4();
        let a = artifact(calc_id, "diamond.out", "abc123");
        assert!(store.register_file(&a).await.unwrap());
        assert!(!store.register_file(&artifact(calc_id, "diamond.out", "abc123")).await.unwrap());

        let files = store.list_files_for_calc(calc_id).await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn a_changed_hash_at_the_same_path_registers_a_distinct_row() {
        let store = Store::in_memory().await.unwrap();
        let calc_id = Uuid::new_v4();
        store.register_file(&artifact(calc_id, "diamond.out", "abc123")).await.unwrap();
        store.register_file(&artifact(calc_id, "diamond.out", "def456")).await.unwrap();

        let files = store.list_files_for_calc(calc_id).await.unwrap();
        assert_eq!(files.len(), 2);
    }
}

fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> MaceResult<FileArtifact> {
    use crate::error::MaceError;
    let kind_str: String = row.get("kind");
    Ok(FileArtifact {
        id: row
            .get::<String, _>("id")
            .parse()
            .map_err(|e| MaceError::Database(format!("bad uuid: {e}")))?,
        calc_id: row
            .get::<String, _>("calc_id")
            .parse()
            .map_err(|e| MaceError::Database(format!("bad uuid: {e}")))?,
        path: row.get("path"),
        kind: kind_str.parse().map_err(MaceError::Database)?,
        content_hash: row.get("content_hash"),
        size: row.get::<i64, _>("size") as u64,
        created_at: chrono::DateTime::parse_from_rfc3339(row.get("created_at"))
            .unwrap()
            .with_timezone(&Utc),
    })
}
