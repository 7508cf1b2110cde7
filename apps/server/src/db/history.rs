//! PostgreSQL version history
//!
//! Versions are allocated through `resource_version_heads`: one row per
//! resource, advanced by a conditional upsert. Concurrent writers for the same
//! resource queue on that row's lock; once the first commits, the others
//! re-check the condition against the new head, match nothing and report a
//! conflict. The primary key of `resource_history` backs this up: a duplicate
//! `(type, id, version)` is also a conflict.

use crate::{db::traits::VersionTracker, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ehr_fhir_rest::{HistoryAction, VersionHistoryEntry};
use serde_json::{json, Value as JsonValue};
use sqlx::{PgConnection, PgPool};

#[derive(Clone)]
pub struct PostgresVersionTracker {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    resource_type: String,
    resource_id: String,
    version_id: i32,
    action: String,
    snapshot: Vec<u8>,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for VersionHistoryEntry {
    type Error = Error;

    fn try_from(row: HistoryRow) -> Result<Self> {
        let action = row
            .action
            .parse::<HistoryAction>()
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(VersionHistoryEntry {
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            version_id: row.version_id,
            action,
            snapshot: row.snapshot,
            recorded_at: row.recorded_at,
        })
    }
}

impl PostgresVersionTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Move the head from `current_version` to `current_version + 1`.
    ///
    /// Only an exact match advances; a missing head is seeded from
    /// `current_version`.
    async fn advance_head(
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
        operation: &str,
    ) -> Result<i32> {
        let next: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO resource_version_heads (resource_type, resource_id, latest_version)
            VALUES ($1, $2, $3 + 1)
            ON CONFLICT (resource_type, resource_id) DO UPDATE
                SET latest_version = EXCLUDED.latest_version
                WHERE resource_version_heads.latest_version = $3
            RETURNING latest_version
            "#,
        )
        .bind(resource_type)
        .bind(id)
        .bind(current_version)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| conflict_or_db(e, resource_type, id, current_version))?;

        next.ok_or_else(|| {
            tracing::warn!(
                resource_type,
                id,
                expected_version = current_version,
                operation,
                "Version conflict: history head moved past expected version"
            );
            crate::metrics::record_version_conflict(resource_type, operation);
            Error::VersionConflict {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                expected: current_version,
            }
        })
    }

    async fn insert_entry(
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        version_id: i32,
        action: HistoryAction,
        snapshot: Vec<u8>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_history
                (resource_type, resource_id, version_id, action, snapshot, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(resource_type)
        .bind(id)
        .bind(version_id)
        .bind(action.as_str())
        .bind(snapshot)
        .bind(at)
        .execute(&mut *conn)
        .await
        .map_err(|e| conflict_or_db(e, resource_type, id, version_id - 1))?;

        tracing::debug!(
            resource_type,
            id,
            version_id,
            action = %action,
            "Recorded history entry"
        );
        Ok(())
    }
}

fn conflict_or_db(e: sqlx::Error, resource_type: &str, id: &str, expected: i32) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => Error::VersionConflict {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            expected,
        },
        _ => Error::Database(e),
    }
}

fn serialize_snapshot(resource: &JsonValue) -> Result<Vec<u8>> {
    serde_json::to_vec(resource)
        .map_err(|e| Error::Internal(format!("Failed to serialize history snapshot: {}", e)))
}

#[async_trait]
impl VersionTracker for PostgresVersionTracker {
    async fn record_create(
        &self,
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        resource: &JsonValue,
        at: DateTime<Utc>,
    ) -> Result<i32> {
        let snapshot = serialize_snapshot(resource)?;

        sqlx::query(
            "INSERT INTO resource_version_heads (resource_type, resource_id, latest_version) \
             VALUES ($1, $2, 1)",
        )
        .bind(resource_type)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| conflict_or_db(e, resource_type, id, 0))?;

        Self::insert_entry(conn, resource_type, id, 1, HistoryAction::Create, snapshot, at).await?;
        Ok(1)
    }

    async fn record_update(
        &self,
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
        resource: &JsonValue,
        at: DateTime<Utc>,
    ) -> Result<i32> {
        let snapshot = serialize_snapshot(resource)?;
        let next = Self::advance_head(conn, resource_type, id, current_version, "update").await?;
        Self::insert_entry(
            conn,
            resource_type,
            id,
            next,
            HistoryAction::Update,
            snapshot,
            at,
        )
        .await?;
        Ok(next)
    }

    async fn record_delete(
        &self,
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
        at: DateTime<Utc>,
    ) -> Result<i32> {
        let tombstone = serialize_snapshot(&json!({ "resourceType": resource_type, "id": id }))?;
        let next = Self::advance_head(conn, resource_type, id, current_version, "delete").await?;
        Self::insert_entry(
            conn,
            resource_type,
            id,
            next,
            HistoryAction::Delete,
            tombstone,
            at,
        )
        .await?;
        Ok(next)
    }

    async fn sync_head(
        &self,
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE resource_version_heads
            SET latest_version = $3
            WHERE resource_type = $1 AND resource_id = $2 AND latest_version < $3
            "#,
        )
        .bind(resource_type)
        .bind(id)
        .bind(current_version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(
                resource_type,
                id,
                version_id = current_version,
                "History head caught up with untracked writes"
            );
        }
        Ok(())
    }

    async fn get_version(
        &self,
        resource_type: &str,
        id: &str,
        version_id: i32,
    ) -> Result<Option<VersionHistoryEntry>> {
        let row: Option<HistoryRow> = sqlx::query_as(
            r#"
            SELECT resource_type, resource_id, version_id, action, snapshot, recorded_at
            FROM resource_history
            WHERE resource_type = $1 AND resource_id = $2 AND version_id = $3
            "#,
        )
        .bind(resource_type)
        .bind(id)
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VersionHistoryEntry::try_from).transpose()
    }

    async fn list_versions(
        &self,
        resource_type: &str,
        id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<VersionHistoryEntry>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM resource_history WHERE resource_type = $1 AND resource_id = $2",
        )
        .bind(resource_type)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if total == 0 || limit == 0 {
            return Ok((Vec::new(), total));
        }

        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT resource_type, resource_id, version_id, action, snapshot, recorded_at
            FROM resource_history
            WHERE resource_type = $1 AND resource_id = $2
            ORDER BY version_id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(resource_type)
        .bind(id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(VersionHistoryEntry::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((entries, total))
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM resource_history h
            WHERE h.recorded_at < $1
              AND h.version_id < (
                  SELECT MAX(l.version_id)
                  FROM resource_history l
                  WHERE l.resource_type = h.resource_type
                    AND l.resource_id = h.resource_id
              )
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
