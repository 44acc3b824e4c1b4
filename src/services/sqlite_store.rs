//! SQLite-backed metadata store.
//!
//! Each `save` runs inside one sqlx transaction. Name uniqueness among
//! active rows is enforced by the partial unique indexes declared in
//! `migrations/0001_init.sql`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnection, SqlitePoolOptions},
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    error::{MetadataError, MetadataResult},
    metadata_store::{Change, ChangeSet, MetadataStore, Mutation},
};
use crate::models::{bucket::Bucket, lifecycle::LifecycleState, object::BucketObject};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const BUCKET_COLUMNS: &str = "id, owner_id, name, created_at, modified_at, state";
const OBJECT_COLUMNS: &str = "id, bucket_id, owner_id, name, size_bytes, content_type, etag, \
                              created_at, modified_at, state";

#[derive(Clone)]
pub struct SqliteMetadataStore {
    db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open a private in-memory database with the schema applied.
    ///
    /// Uses a single connection that is never recycled, since every SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> MetadataResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(Arc::new(pool));
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema. Every statement is `IF NOT EXISTS`, so this
    /// is safe to run on every start.
    pub async fn migrate(&self) -> MetadataResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

async fn apply(conn: &mut SqliteConnection, change: Change) -> MetadataResult<()> {
    let (kind, id, rows) = match change {
        Change::Bucket(Mutation::Add(bucket)) => {
            sqlx::query(
                "INSERT INTO buckets (id, owner_id, name, created_at, modified_at, state)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(bucket.id)
            .bind(bucket.owner_id)
            .bind(&bucket.name)
            .bind(bucket.created_at)
            .bind(bucket.modified_at)
            .bind(bucket.state)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
            return Ok(());
        }
        Change::Bucket(Mutation::Update(bucket)) => {
            let result = sqlx::query(
                "UPDATE buckets SET owner_id = ?, name = ?, modified_at = ?, state = ?
                 WHERE id = ?",
            )
            .bind(bucket.owner_id)
            .bind(&bucket.name)
            .bind(bucket.modified_at)
            .bind(bucket.state)
            .bind(bucket.id)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
            ("bucket", bucket.id, result.rows_affected())
        }
        Change::Bucket(Mutation::SoftDelete(id)) => {
            let result = sqlx::query("UPDATE buckets SET state = ?, modified_at = ? WHERE id = ?")
                .bind(LifecycleState::Deleted)
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *conn)
                .await
                .map_err(classify)?;
            ("bucket", id, result.rows_affected())
        }
        Change::Bucket(Mutation::HardDelete(id)) => {
            let result = sqlx::query("DELETE FROM buckets WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await
                .map_err(classify)?;
            ("bucket", id, result.rows_affected())
        }
        Change::Object(Mutation::Add(object)) => {
            sqlx::query(
                "INSERT INTO bucket_objects (
                    id, bucket_id, owner_id, name, size_bytes, content_type, etag,
                    created_at, modified_at, state
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(object.id)
            .bind(object.bucket_id)
            .bind(object.owner_id)
            .bind(&object.name)
            .bind(object.size_bytes)
            .bind(&object.content_type)
            .bind(&object.etag)
            .bind(object.created_at)
            .bind(object.modified_at)
            .bind(object.state)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
            return Ok(());
        }
        Change::Object(Mutation::Update(object)) => {
            let result = sqlx::query(
                "UPDATE bucket_objects
                 SET name = ?, size_bytes = ?, content_type = ?, etag = ?, modified_at = ?, state = ?
                 WHERE id = ?",
            )
            .bind(&object.name)
            .bind(object.size_bytes)
            .bind(&object.content_type)
            .bind(&object.etag)
            .bind(object.modified_at)
            .bind(object.state)
            .bind(object.id)
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
            ("object", object.id, result.rows_affected())
        }
        Change::Object(Mutation::SoftDelete(id)) => {
            let result =
                sqlx::query("UPDATE bucket_objects SET state = ?, modified_at = ? WHERE id = ?")
                    .bind(LifecycleState::Deleted)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .map_err(classify)?;
            ("object", id, result.rows_affected())
        }
        Change::Object(Mutation::HardDelete(id)) => {
            let result = sqlx::query("DELETE FROM bucket_objects WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await
                .map_err(classify)?;
            ("object", id, result.rows_affected())
        }
    };

    if rows == 0 {
        return Err(MetadataError::Missing { kind, id });
    }
    Ok(())
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_bucket(&self, id: Uuid) -> MetadataResult<Option<Bucket>> {
        let sql = format!("SELECT {BUCKET_COLUMNS} FROM buckets WHERE id = ?");
        Ok(sqlx::query_as::<_, Bucket>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?)
    }

    async fn buckets_for_owner(&self, owner_id: Uuid) -> MetadataResult<Vec<Bucket>> {
        let sql = format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets WHERE owner_id = ? ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, Bucket>(&sql)
            .bind(owner_id)
            .fetch_all(&*self.db)
            .await?)
    }

    async fn get_object(&self, id: Uuid) -> MetadataResult<Option<BucketObject>> {
        let sql = format!("SELECT {OBJECT_COLUMNS} FROM bucket_objects WHERE id = ?");
        Ok(sqlx::query_as::<_, BucketObject>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?)
    }

    async fn objects_for_bucket(&self, bucket_id: Uuid) -> MetadataResult<Vec<BucketObject>> {
        let sql = format!(
            "SELECT {OBJECT_COLUMNS} FROM bucket_objects WHERE bucket_id = ? \
             ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, BucketObject>(&sql)
            .bind(bucket_id)
            .fetch_all(&*self.db)
            .await?)
    }

    async fn save(&self, changes: ChangeSet) -> MetadataResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let count = changes.len();
        let mut tx = self.db.begin().await?;
        for change in changes {
            apply(&mut tx, change).await?;
        }
        tx.commit().await?;
        debug!("committed {} metadata changes", count);
        Ok(())
    }

    async fn ping(&self) -> MetadataResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

/// Sort constraint failures out of the generic sqlx error.
fn classify(err: sqlx::Error) -> MetadataError {
    if is_unique_violation(&err) {
        return MetadataError::UniqueViolation(err.to_string());
    }
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return MetadataError::ForeignKey(db_err.message().to_string());
        }
    }
    MetadataError::Sqlx(err)
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
