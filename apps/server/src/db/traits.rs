//! Storage traits

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ehr_fhir_rest::VersionHistoryEntry;
use serde_json::Value as JsonValue;
use sqlx::PgConnection;

/// Immutable, datastore-enforced version history.
///
/// Writes run on the caller's connection so they commit or roll back together
/// with the primary-resource write. Version numbers are allocated by the
/// datastore; no process-local lock is involved, so several server replicas
/// may write concurrently.
#[async_trait]
pub trait VersionTracker: Send + Sync {
    /// Record version 1 of a new resource.
    ///
    /// # Errors
    /// * `VersionConflict` - history already exists for this resource
    async fn record_create(
        &self,
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        resource: &JsonValue,
        at: DateTime<Utc>,
    ) -> Result<i32>;

    /// Record `current_version + 1`, provided `current_version` is exactly the
    /// latest tracked version. Returns the new version.
    ///
    /// # Errors
    /// * `VersionConflict` - another writer recorded a newer version first;
    ///   nothing is written
    async fn record_update(
        &self,
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
        resource: &JsonValue,
        at: DateTime<Utc>,
    ) -> Result<i32>;

    /// Record a tombstone at `current_version + 1`. Earlier versions stay
    /// readable.
    async fn record_delete(
        &self,
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
        at: DateTime<Utc>,
    ) -> Result<i32>;

    /// Move a head that fell behind the primary row (writes made while
    /// tracking was off) forward to `current_version`. Heads are never moved
    /// backwards, and a missing head is left for `record_update` to seed.
    ///
    /// Only call this while holding the primary row at `current_version`.
    async fn sync_head(
        &self,
        conn: &mut PgConnection,
        resource_type: &str,
        id: &str,
        current_version: i32,
    ) -> Result<()>;

    /// One recorded version, or `None` if it never existed (or was pruned).
    async fn get_version(
        &self,
        resource_type: &str,
        id: &str,
        version_id: i32,
    ) -> Result<Option<VersionHistoryEntry>>;

    /// A page of versions, newest first, plus the total number recorded.
    async fn list_versions(
        &self,
        resource_type: &str,
        id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<VersionHistoryEntry>, i64)>;

    /// Delete entries recorded before `cutoff`, keeping each resource's latest
    /// entry. Returns the number of entries removed.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
