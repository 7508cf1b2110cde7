//! PostgreSQL primary resource storage
//!
//! Writes take the caller's connection so they can share a transaction with
//! the history write. Concurrency control is optimistic: updates and deletes
//! only match the row at the version the caller read.

use crate::{models::StoredResource, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

const COLUMNS: &str =
    "resource_type, fhir_id, version_id, resource, created_at, updated_at, deleted";

#[derive(Clone)]
pub struct PostgresResourceStore {
    pool: PgPool,
}

impl PostgresResourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Current row, including tombstoned rows.
    pub async fn get(&self, resource_type: &str, id: &str) -> Result<Option<StoredResource>> {
        let row = sqlx::query_as::<_, StoredResource>(&format!(
            "SELECT {} FROM resources WHERE resource_type = $1 AND fhir_id = $2",
            COLUMNS
        ))
        .bind(resource_type)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Insert version 1. `resource` must already carry the server-managed fields.
    pub async fn insert(
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        resource: &JsonValue,
        at: DateTime<Utc>,
    ) -> Result<StoredResource> {
        let row = sqlx::query_as::<_, StoredResource>(&format!(
            "INSERT INTO resources \
                (resource_type, fhir_id, version_id, resource, created_at, updated_at, deleted) \
             VALUES ($1, $2, 1, $3, $4, $4, false) \
             RETURNING {}",
            COLUMNS
        ))
        .bind(resource_type)
        .bind(id)
        .bind(resource)
        .bind(at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Replace the document if the live row is still at `current_version`.
    ///
    /// `None` means another writer got there first (or the row is gone).
    pub async fn update_if_version(
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
        resource: &JsonValue,
        at: DateTime<Utc>,
    ) -> Result<Option<StoredResource>> {
        let row = sqlx::query_as::<_, StoredResource>(&format!(
            "UPDATE resources \
             SET resource = $1, version_id = version_id + 1, updated_at = $2 \
             WHERE resource_type = $3 AND fhir_id = $4 AND version_id = $5 AND NOT deleted \
             RETURNING {}",
            COLUMNS
        ))
        .bind(resource)
        .bind(at)
        .bind(resource_type)
        .bind(id)
        .bind(current_version)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Tombstone the live row at `current_version + 1`.
    pub async fn mark_deleted_if_version(
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
        at: DateTime<Utc>,
    ) -> Result<Option<StoredResource>> {
        let row = sqlx::query_as::<_, StoredResource>(&format!(
            "UPDATE resources \
             SET deleted = true, version_id = version_id + 1, updated_at = $1 \
             WHERE resource_type = $2 AND fhir_id = $3 AND version_id = $4 AND NOT deleted \
             RETURNING {}",
            COLUMNS
        ))
        .bind(at)
        .bind(resource_type)
        .bind(id)
        .bind(current_version)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }
}
