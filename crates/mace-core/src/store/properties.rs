use super::Store;
use crate::error::MaceResult;
use crate::model::{InputSettings, Property, PropertyValue};
use sqlx::Row;
use uuid::Uuid;

impl Store {
    /// Insert a property row, or update its value in place if a row for
    /// the same (calc_id, name) already exists — inheritance propagation
    /// re-runs this for every descendant, so it must not accumulate
    /// duplicate rows per generation.
    pub async fn upsert_property(&self, prop: &Property) -> MaceResult<()> {
        let value_json = serde_json::to_string(&prop.value)?;
        if let Some(existing) = self.get_property(prop.calc_id, &prop.name).await? {
            sqlx::query(
                "UPDATE properties SET value_json = ?2, unit = ?3, category = ?4, inherited = ?5 WHERE id = ?1",
            )
            .bind(existing.id.to_string())
            .bind(value_json)
            .bind(&prop.unit)
            .bind(&prop.category)
            .bind(prop.inherited as i64)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO properties (id, calc_id, name, value_json, unit, category, inherited) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(prop.id.to_string())
            .bind(prop.calc_id.to_string())
            .bind(&prop.name)
            .bind(value_json)
            .bind(&prop.unit)
            .bind(&prop.category)
            .bind(prop.inherited as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_property(&self, calc_id: Uuid, name: &str) -> MaceResult<Option<Property>> {
        let row = sqlx::query("SELECT * FROM properties WHERE calc_id = ?1 AND name = ?2")
            .bind(calc_id.to_string())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_property(&r)).transpose()?)
    }

    pub async fn list_properties_for_calc(&self, calc_id: Uuid) -> MaceResult<Vec<Property>> {
        let rows = sqlx::query("SELECT * FROM properties WHERE calc_id = ?1")
            .bind(calc_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_property).collect()
    }

    pub async fn list_properties_by_category(&self, calc_id: Uuid, category: &str) -> MaceResult<Vec<Property>> {
        let rows = sqlx::query("SELECT * FROM properties WHERE calc_id = ?1 AND category = ?2")
            .bind(calc_id.to_string())
            .bind(category)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_property).collect()
    }

    /// Insert the settings row for a calculation, or fill in only the
    /// fields that are still NULL. `method` and `functional` in
    /// particular must never be overwritten once set directly by the
    /// calculation itself — inherited propagation only fills gaps.
    pub async fn upsert_input_settings(&self, settings: &InputSettings) -> MaceResult<()> {
        sqlx::query(
            "INSERT INTO input_settings \
             (calc_id, method, basis, tolerances, k_points, functional, dispersion, opt_flags, k_path) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(calc_id) DO UPDATE SET \
               method = COALESCE(input_settings.method, excluded.method), \
               basis = COALESCE(input_settings.basis, excluded.basis), \
               tolerances = COALESCE(input_settings.tolerances, excluded.tolerances), \
               k_points = COALESCE(input_settings.k_points, excluded.k_points), \
               functional = COALESCE(input_settings.functional, excluded.functional), \
               opt_flags = COALESCE(input_settings.opt_flags, excluded.opt_flags), \
               k_path = COALESCE(input_settings.k_path, excluded.k_path)",
        )
        .bind(settings.calc_id.to_string())
        .bind(&settings.method)
        .bind(&settings.basis)
        .bind(&settings.tolerances)
        .bind(&settings.k_points)
        .bind(&settings.functional)
        .bind(settings.dispersion as i64)
        .bind(&settings.opt_flags)
        .bind(&settings.k_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_input_settings(&self, calc_id: Uuid) -> MaceResult<Option<InputSettings>> {
        let row = sqlx::query("SELECT * FROM input_settings WHERE calc_id = ?1")
            .bind(calc_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_settings(&r)).transpose()?)
    }

    /// Seed a new successor's settings and identity properties from its
    /// parent (spec §4.6: BAND/DOSS after SP typically inherit rather than
    /// re-derive method/functional/formula). Run once at successor creation,
    /// before the successor's own calculation has produced any output, so
    /// the later COALESCE-based upsert from its own parse only fills gaps.
    pub async fn propagate_inherited(&self, parent_id: Uuid, child_id: Uuid) -> MaceResult<()> {
        if let Some(parent_settings) = self.get_input_settings(parent_id).await? {
            self.upsert_input_settings(&InputSettings { calc_id: child_id, ..parent_settings }).await?;
        }
        for prop in self.list_properties_by_category(parent_id, "identity").await? {
            self.upsert_property(&Property {
                id: Uuid::new_v4(),
                calc_id: child_id,
                name: prop.name,
                value: prop.value,
                unit: prop.unit,
                category: prop.category,
                inherited: true,
            })
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(calc_id: Uuid, name: &str, value: PropertyValue, category: &str) -> Property {
        Property { id: Uuid::new_v4(), calc_id, name: name.into(), value, unit: None, category: category.into(), inherited: false }
    }

    #[tokio::test]
    async fn upserting_the_same_name_twice_updates_in_place() {
        let store = Store::in_memory().await.unwrap();
        let calc_id = Uuid::new_v4();
        store.upsert_property(&prop(calc_id, "band_gap", PropertyValue::Scalar(1.0), "electronic")).await.unwrap();
        store.upsert_property(&prop(calc_id, "band_gap", PropertyValue::Scalar(2.5), "electronic")).await.unwrap();

        let props = store.list_properties_for_calc(calc_id).await.unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value, PropertyValue::Scalar(2.5));
    }

    #[tokio::test]
    async fn propagate_inherited_copies_identity_properties_and_fills_settings_gaps() {
        let store = Store::in_memory().await.unwrap();
        let parent = Uuid::new_v4();
        let child = Uuid::new_v4();
        store
            .upsert_property(&prop(parent, "formula", PropertyValue::Text("C2".into()), "identity"))
            .await
            .unwrap();
        store
            .upsert_input_settings(&InputSettings {
                calc_id: parent,
                method: Some("HF".into()),
                basis: Some("POB-TZVP".into()),
                tolerances: None,
                k_points: None,
                functional: None,
                dispersion: false,
                opt_flags: None,
                k_path: None,
            })
            .await
            .unwrap();

        store.propagate_inherited(parent, child).await.unwrap();

        let child_props = store.list_properties_by_category(child, "identity").await.unwrap();
        assert_eq!(child_props.len(), 1);
        assert!(child_props[0].inherited);

        let child_settings = store.get_input_settings(child).await.unwrap().expect("inherited settings seeded");
        assert_eq!(child_settings.method.as_deref(), Some("HF"));
    }

    #[tokio::test]
    async fn upsert_input_settings_never_overwrites_a_value_already_set() {
        let store = Store::in_memory().await.unwrap();
        let calc_id = Uuid::new_v4();
        store
            .upsert_input_settings(&InputSettings {
                calc_id,
                method: Some("HF".into()),
                basis: None,
                tolerances: None,
                k_points: None,
                functional: None,
                dispersion: false,
                opt_flags: None,
                k_path: None,
            })
            .await
            .unwrap();
        store
            .upsert_input_settings(&InputSettings {
                calc_id,
                method: Some("DFT".into()),
                basis: Some("POB-TZVP".into()),
                tolerances: None,
                k_points: None,
                functional: None,
                dispersion: false,
                opt_flags: None,
                k_path: None,
            })
            .await
            .unwrap();

        let settings = store.get_input_settings(calc_id).await.unwrap().unwrap();
        assert_eq!(settings.method.as_deref(), Some("HF"), "already-set method must survive the second upsert");
        assert_eq!(settings.basis.as_deref(), Some("POB-TZVP"), "gap filled by the second upsert");
    }
}

fn row_to_property(row: &sqlx::sqlite::SqliteRow) -> MaceResult<Property> {
    use crate::error::MaceError;
    let value: PropertyValue = serde_json::from_str(row.get("value_json"))?;
    Ok(Property {
        id: row
            .get::<String, _>("id")
            .parse()
            .map_err(|e| MaceError::Database(format!("bad uuid: {e}")))?,
        calc_id: row
            .get::<String, _>("calc_id")
            .parse()
            .map_err(|e| MaceError::Database(format!("bad uuid: {e}")))?,
        name: row.get("name"),
        value,
        unit: row.get("unit"),
        category: row.get("category"),
        inherited: row.get::<i64, _>("inherited") != 0,
    })
}

fn row_to_settings(row: &sqlx::sqlite::SqliteRow) -> MaceResult<InputSettings> {
    use crate::error::MaceError;
    Ok(InputSettings {
        calc_id: row
            .get::<String, _>("calc_id")
            .parse()
            .map_err(|e| MaceError::Database(format!("bad uuid: {e}")))?,
        method: row.get("method"),
        basis: row.get("basis"),
        tolerances: row.get("tolerances"),
        k_points: row.get("k_points"),
        functional: row.get("functional"),
        dispersion: row.get::<i64, _>("dispersion") != 0,
        opt_flags: row.get("opt_flags"),
        k_path: row.get("k_path"),
    })
}
