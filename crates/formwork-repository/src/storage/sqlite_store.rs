//! SQLite metadata store
//!
//! sqlx-backed [`TemplateStore`]. The optimistic guard is the
//! `WHERE version = ?` clause on UPDATE and DELETE: zero affected rows
//! means the caller lost the race, and the stored row is re-read to tell a
//! stale version apart from a vanished record.

use std::str::FromStr;

use async_trait::async_trait;
use formwork::{TemplateKey, TemplateRecord, UserRef};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use super::{StoreError, TemplateFilter, TemplateStore};

const COLUMNS: &str = "id, document_name, language, content, model_id, \
     content_mapping, editor, locking_user, version, created_at, edited_at";

/// SQLite-based metadata store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store for the given database URL, e.g.
    /// `sqlite:./data/formwork.db`.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Backend(format!("invalid database url: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect to SQLite: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create a store from the DATABASE_URL environment variable.
    pub async fn from_env() -> Result<Self, StoreError> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./data/formwork.db".to_string());
        Self::new(&database_url).await
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS template_records (
                id TEXT NOT NULL UNIQUE,
                document_name TEXT NOT NULL,
                language TEXT NOT NULL,
                content BLOB NOT NULL,
                model_id TEXT NOT NULL,
                content_mapping TEXT NOT NULL,  -- JSON
                editor TEXT NOT NULL,           -- JSON
                locking_user TEXT,              -- JSON, NULL when unlocked
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                edited_at TEXT NOT NULL,
                PRIMARY KEY (document_name, language)
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("failed to create template_records table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_template_records_language \
             ON template_records(language)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("failed to create language index: {e}")))?;

        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Result<TemplateRecord, StoreError> {
        let backend = |e: &dyn std::fmt::Display| StoreError::Backend(format!("corrupt row: {e}"));

        let id: String = row.try_get("id").map_err(|e| backend(&e))?;
        let id = Uuid::parse_str(&id).map_err(|e| backend(&e))?;

        let content_mapping: String = row.try_get("content_mapping").map_err(|e| backend(&e))?;
        let content_mapping =
            serde_json::from_str(&content_mapping).map_err(|e| backend(&e))?;

        let editor: String = row.try_get("editor").map_err(|e| backend(&e))?;
        let editor: UserRef = serde_json::from_str(&editor).map_err(|e| backend(&e))?;

        let locking_user: Option<String> =
            row.try_get("locking_user").map_err(|e| backend(&e))?;
        let locking_user = locking_user
            .map(|json| serde_json::from_str::<UserRef>(&json))
            .transpose()
            .map_err(|e| backend(&e))?;

        let created_at: String = row.try_get("created_at").map_err(|e| backend(&e))?;
        let created_at =
            OffsetDateTime::parse(&created_at, &Rfc3339).map_err(|e| backend(&e))?;

        let edited_at: String = row.try_get("edited_at").map_err(|e| backend(&e))?;
        let edited_at = OffsetDateTime::parse(&edited_at, &Rfc3339).map_err(|e| backend(&e))?;

        let version: i64 = row.try_get("version").map_err(|e| backend(&e))?;

        Ok(TemplateRecord {
            id: Some(id),
            document_name: row.try_get("document_name").map_err(|e| backend(&e))?,
            language: row.try_get("language").map_err(|e| backend(&e))?,
            content: row.try_get("content").map_err(|e| backend(&e))?,
            model_id: row.try_get("model_id").map_err(|e| backend(&e))?,
            content_mapping,
            created_at,
            edited_at,
            editor,
            version: version as u64,
            locking_user,
        })
    }

    async fn guarded_write_failure(
        &self,
        key: TemplateKey,
        expected: u64,
    ) -> Result<StoreError, StoreError> {
        match self.find(&key).await? {
            Some(stored) => Ok(StoreError::VersionConflict {
                key,
                expected,
                stored: stored.version,
            }),
            None => Ok(StoreError::Missing(key)),
        }
    }
}

#[async_trait]
impl TemplateStore for SqliteStore {
    async fn find(&self, key: &TemplateKey) -> Result<Option<TemplateRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM template_records WHERE document_name = ? AND language = ?"
        ))
        .bind(&key.document_name)
        .bind(&key.language)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("failed to load template: {e}")))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(&self, filter: &TemplateFilter) -> Result<Vec<TemplateRecord>, StoreError> {
        let mut sql = format!("SELECT {COLUMNS} FROM template_records");
        let mut clauses = Vec::new();
        if filter.document_name.is_some() {
            clauses.push("document_name = ?");
        }
        if filter.language.is_some() {
            clauses.push("language = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY document_name, language");

        let mut query = sqlx::query(&sql);
        if let Some(name) = &filter.document_name {
            query = query.bind(name);
        }
        if let Some(language) = &filter.language {
            query = query.bind(language);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to list templates: {e}")))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn save(&self, mut record: TemplateRecord) -> Result<TemplateRecord, StoreError> {
        let key = record.key();
        let content_mapping = serde_json::to_string(&record.content_mapping)
            .map_err(|e| StoreError::Backend(format!("failed to serialize mapping: {e}")))?;
        let editor = serde_json::to_string(&record.editor)
            .map_err(|e| StoreError::Backend(format!("failed to serialize editor: {e}")))?;
        let locking_user = record
            .locking_user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Backend(format!("failed to serialize locking user: {e}")))?;
        let edited_at = record
            .edited_at
            .format(&Rfc3339)
            .map_err(|e| StoreError::Backend(format!("failed to format timestamp: {e}")))?;

        match record.id {
            None => {
                let id = Uuid::new_v4();
                let created_at = record
                    .created_at
                    .format(&Rfc3339)
                    .map_err(|e| StoreError::Backend(format!("failed to format timestamp: {e}")))?;

                let result = sqlx::query(
                    "INSERT INTO template_records \
                     (id, document_name, language, content, model_id, content_mapping, \
                      editor, locking_user, version, created_at, edited_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(id.to_string())
                .bind(&record.document_name)
                .bind(&record.language)
                .bind(record.content.as_slice())
                .bind(&record.model_id)
                .bind(&content_mapping)
                .bind(&editor)
                .bind(locking_user.as_deref())
                .bind(1_i64)
                .bind(&created_at)
                .bind(&edited_at)
                .execute(&self.pool)
                .await;

                match result {
                    Ok(_) => {
                        record.id = Some(id);
                        record.version = 1;
                        Ok(record)
                    }
                    Err(e)
                        if e.as_database_error()
                            .is_some_and(|db| db.is_unique_violation()) =>
                    {
                        Err(StoreError::DuplicateKey(key))
                    }
                    Err(e) => Err(StoreError::Backend(format!(
                        "failed to insert template: {e}"
                    ))),
                }
            }
            Some(_) => {
                let next_version = record.version + 1;
                let result = sqlx::query(
                    "UPDATE template_records \
                     SET content = ?, model_id = ?, content_mapping = ?, editor = ?, \
                         locking_user = ?, version = ?, edited_at = ? \
                     WHERE document_name = ? AND language = ? AND version = ?",
                )
                .bind(record.content.as_slice())
                .bind(&record.model_id)
                .bind(&content_mapping)
                .bind(&editor)
                .bind(locking_user.as_deref())
                .bind(next_version as i64)
                .bind(&edited_at)
                .bind(&record.document_name)
                .bind(&record.language)
                .bind(record.version as i64)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("failed to update template: {e}")))?;

                if result.rows_affected() == 0 {
                    return Err(self.guarded_write_failure(key, record.version).await?);
                }
                record.version = next_version;
                Ok(record)
            }
        }
    }

    async fn delete(&self, key: &TemplateKey, expected_version: u64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM template_records \
             WHERE document_name = ? AND language = ? AND version = ?",
        )
        .bind(&key.document_name)
        .bind(&key.language)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("failed to delete template: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(self
                .guarded_write_failure(key.clone(), expected_version)
                .await?);
        }
        Ok(())
    }
}
