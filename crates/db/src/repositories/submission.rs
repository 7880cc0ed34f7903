use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite};

use assetmap_core::domain::asset::AssetBlock;
use assetmap_core::domain::submission::{StoredSubmission, SubmissionId, SubmissionRecord};
use assetmap_core::storage::{StoreError, SubmissionQuery, SubmissionStore};

use super::{decode_err, parse_timestamp, timestamp, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, employee_name, employee_id, employee_number, employee_email,
        company, department, designation, selected_assets, asset_details, confirmed, created_at
 FROM submissions";

pub struct SqlSubmissionStore {
    pool: DbPool,
}

impl SqlSubmissionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_row(&self, stored: &StoredSubmission) -> Result<(), RepositoryError> {
        let record = &stored.record;
        let selected_assets = serde_json::to_string(&record.selected_assets).map_err(decode_err)?;
        let asset_details = serde_json::to_string(&record.asset_details).map_err(decode_err)?;

        sqlx::query(
            "INSERT INTO submissions (id, employee_name, employee_id, employee_number,
                                      employee_email, company, department, designation,
                                      selected_assets, asset_details, confirmed, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&stored.id.0)
        .bind(&record.employee_name)
        .bind(&record.employee_id)
        .bind(&record.employee_number)
        .bind(&record.employee_email)
        .bind(&record.company)
        .bind(&record.department)
        .bind(&record.designation)
        .bind(selected_assets)
        .bind(asset_details)
        .bind(record.confirmed)
        .bind(timestamp(stored.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn select(
        &self,
        query: &SubmissionQuery,
    ) -> Result<Vec<StoredSubmission>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");

        // SQLite LIKE and LOWER only fold ASCII, so free-text search runs on decoded rows with
        // the same Unicode matching as `SubmissionQuery::matches`.
        let searching = non_blank(&query.search).is_some();
        if let Some(company) = non_blank(&query.company) {
            builder.push(" AND company = ");
            builder.push_bind(company.to_string());
        }
        if let Some(department) = non_blank(&query.department) {
            builder.push(" AND department = ");
            builder.push_bind(department.to_string());
        }
        if let Some(asset) = non_blank(&query.asset) {
            builder.push(
                " AND EXISTS (SELECT 1 FROM json_each(submissions.selected_assets) WHERE value = ",
            );
            builder.push_bind(asset.to_string());
            builder.push(")");
        }

        builder.push(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = query.limit.filter(|_| !searching) {
            builder.push(" LIMIT ");
            builder.push_bind(i64::from(limit));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut submissions = rows.iter().map(row_to_submission).collect::<Result<Vec<_>, _>>()?;
        if searching {
            submissions.retain(|submission| query.matches(submission));
            if let Some(limit) = query.limit {
                submissions.truncate(limit as usize);
            }
        }
        Ok(submissions)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn row_to_submission(row: &sqlx::sqlite::SqliteRow) -> Result<StoredSubmission, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let selected_assets: String = row.try_get("selected_assets").map_err(decode_err)?;
    let asset_details: String = row.try_get("asset_details").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    let selected_assets: Vec<String> =
        serde_json::from_str(&selected_assets).map_err(decode_err)?;
    let asset_details: BTreeMap<String, AssetBlock> =
        serde_json::from_str(&asset_details).map_err(decode_err)?;

    Ok(StoredSubmission {
        id: SubmissionId(id),
        record: SubmissionRecord {
            employee_name: row.try_get("employee_name").map_err(decode_err)?,
            employee_id: row.try_get("employee_id").map_err(decode_err)?,
            employee_number: row.try_get("employee_number").map_err(decode_err)?,
            employee_email: row.try_get("employee_email").map_err(decode_err)?,
            company: row.try_get("company").map_err(decode_err)?,
            department: row.try_get("department").map_err(decode_err)?,
            designation: row.try_get("designation").map_err(decode_err)?,
            selected_assets,
            asset_details,
            confirmed: row.try_get("confirmed").map_err(decode_err)?,
        },
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl SubmissionStore for SqlSubmissionStore {
    async fn insert(&self, record: SubmissionRecord) -> Result<StoredSubmission, StoreError> {
        let stored = StoredSubmission { id: SubmissionId::generate(), record, created_at: Utc::now() };
        self.insert_row(&stored).await?;
        Ok(stored)
    }

    async fn list(&self, query: &SubmissionQuery) -> Result<Vec<StoredSubmission>, StoreError> {
        Ok(self.select(query).await?)
    }

    async fn get(&self, id: &SubmissionId) -> Result<Option<StoredSubmission>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        match row {
            Some(ref row) => Ok(Some(row_to_submission(row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &SubmissionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use assetmap_core::domain::asset::{AssetBlock, BrandBlock, ImageRef, MobileBlock};
    use assetmap_core::domain::submission::{SubmissionId, SubmissionRecord};
    use assetmap_core::storage::{InMemorySubmissionStore, SubmissionQuery, SubmissionStore};

    use super::SqlSubmissionStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn record(name: &str, company: &str, assets: &[&str]) -> SubmissionRecord {
        SubmissionRecord {
            employee_name: name.to_string(),
            employee_id: format!("EMP-{}", name.len()),
            employee_number: None,
            employee_email: Some(format!("{}@company.com", name.to_lowercase().replace(' ', "."))),
            company: company.to_string(),
            department: "IT".to_string(),
            designation: "Field Engineer".to_string(),
            selected_assets: assets.iter().map(ToString::to_string).collect(),
            asset_details: BTreeMap::from([
                (
                    "headset".to_string(),
                    AssetBlock::Brand(BrandBlock { brand: "Jabra".to_string() }),
                ),
                (
                    "mobile".to_string(),
                    AssetBlock::Mobile(MobileBlock {
                        brand: "Apple".to_string(),
                        imei_number: "356938035643809".to_string(),
                        accessories: BTreeSet::from(["Charger".to_string()]),
                        images: vec![ImageRef("http://127.0.0.1/files/a.png".to_string())],
                    }),
                ),
            ]),
            confirmed: true,
        }
    }

    #[tokio::test]
    async fn insert_then_get_preserves_nested_details() {
        let store = SqlSubmissionStore::new(setup().await);

        let stored =
            store.insert(record("Jane Roe", "AUTOZONE", &["Headset", "Mobile Phone"])).await.expect("insert");
        let loaded = store.get(&stored.id).await.expect("get").expect("row exists");

        assert_eq!(loaded.record, stored.record);
        assert_eq!(loaded.record.images().count(), 1);
        assert!(store.get(&SubmissionId("missing".to_string())).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let store = SqlSubmissionStore::new(setup().await);
        store.insert(record("Jane Roe", "AUTOZONE", &["Headset"])).await.expect("insert");
        store.insert(record("John Doe", "VERAVITA", &["Laptop", "Headset"])).await.expect("insert");
        store.insert(record("Ann Lee", "AUTOZONE", &["Laptop"])).await.expect("insert");

        let all = store.list(&SubmissionQuery::default()).await.expect("list");
        let names = all.iter().map(|row| row.record.employee_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Ann Lee", "John Doe", "Jane Roe"]);

        let autozone = store
            .list(&SubmissionQuery { company: Some("AUTOZONE".to_string()), ..Default::default() })
            .await
            .expect("company filter");
        assert_eq!(autozone.len(), 2);

        let laptops = store
            .list(&SubmissionQuery { asset: Some("Laptop".to_string()), ..Default::default() })
            .await
            .expect("asset filter");
        assert_eq!(laptops.len(), 2);

        let searched = store
            .list(&SubmissionQuery { search: Some("JOHN.DOE@".to_string()), ..Default::default() })
            .await
            .expect("search");
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].record.company, "VERAVITA");

        let limited = store
            .list(&SubmissionQuery { limit: Some(1), ..Default::default() })
            .await
            .expect("limit");
        assert_eq!(limited[0].record.employee_name, "Ann Lee");
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally_and_folds_unicode_case() {
        let sql = SqlSubmissionStore::new(setup().await);
        let memory = InMemorySubmissionStore::default();
        for name in ["Jane_Roe", "Janet Roe", "Élodie Brun", "Ωmega Ops"] {
            sql.insert(record(name, "AUTOZONE", &["Headset"])).await.expect("sql insert");
            memory.insert(record(name, "AUTOZONE", &["Headset"])).await.expect("memory insert");
        }

        for (needle, expected) in [
            ("_", vec!["Jane_Roe"]),
            ("%", vec![]),
            ("élodie", vec!["Élodie Brun"]),
            ("ΩMEGA", vec!["Ωmega Ops"]),
            ("roe", vec!["Jane_Roe", "Janet Roe"]),
        ] {
            let query = SubmissionQuery { search: Some(needle.to_string()), ..Default::default() };
            let mut from_sql = sql
                .list(&query)
                .await
                .expect("sql search")
                .into_iter()
                .map(|row| row.record.employee_name)
                .collect::<Vec<_>>();
            let mut from_memory = memory
                .list(&query)
                .await
                .expect("memory search")
                .into_iter()
                .map(|row| row.record.employee_name)
                .collect::<Vec<_>>();
            from_sql.sort();
            from_memory.sort();

            assert_eq!(from_sql, expected, "sqlite results for `{needle}`");
            assert_eq!(from_memory, expected, "in-memory results for `{needle}`");
        }

        let limited = sql
            .list(&SubmissionQuery {
                search: Some("roe".to_string()),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .expect("limited search");
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].record.employee_name, "Janet Roe");
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let store = SqlSubmissionStore::new(setup().await);
        let stored = store.insert(record("Jane Roe", "AUTOZONE", &["Headset"])).await.expect("insert");

        assert!(store.delete(&stored.id).await.expect("delete"));
        assert!(!store.delete(&stored.id).await.expect("second delete"));
        assert!(store.list(&SubmissionQuery::default()).await.expect("list").is_empty());
    }
}
