//! Resource service - create, read, update, patch, delete and search
//!
//! Every mutation runs in one transaction: the primary row is written with an
//! optimistic version check, then the version tracker (when configured) records
//! the same version on the same connection. Either both commit or neither does.

use crate::{
    db::{self, PostgresResourceStore, VersionTracker},
    models::{stamp_server_fields, ResourceTypeDef, StoredResource},
    Error, Result,
};
use chrono::Utc;
use ehr_fhir_rest::{PatchDocument, SearchCompiler};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

const SEARCH_COLUMNS: &str =
    "resource_type, fhir_id, version_id, resource, created_at, updated_at, deleted";
const SEARCH_ORDER: &str = "updated_at DESC, fhir_id ASC";

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub resources: Vec<StoredResource>,
    pub total: i64,
}

#[derive(Clone)]
pub struct ResourceService {
    store: PostgresResourceStore,
    tracker: Option<Arc<dyn VersionTracker>>,
}

impl ResourceService {
    pub fn new(store: PostgresResourceStore, tracker: Option<Arc<dyn VersionTracker>>) -> Self {
        Self { store, tracker }
    }

    pub fn tracker(&self) -> Option<&Arc<dyn VersionTracker>> {
        self.tracker.as_ref()
    }

    /// Current row for `resource_type/id`, tombstones included.
    pub async fn find(&self, resource_type: &str, id: &str) -> Result<Option<StoredResource>> {
        self.store.get(resource_type, id).await
    }

    /// Live resource, or `ResourceNotFound` / `ResourceDeleted`.
    pub async fn get_by_fhir_id(&self, resource_type: &str, id: &str) -> Result<StoredResource> {
        let row = self
            .find(resource_type, id)
            .await?
            .ok_or_else(|| not_found(resource_type, id))?;
        ensure_live(row)
    }

    pub async fn create(&self, resource_type: &str, resource: JsonValue) -> Result<StoredResource> {
        let mut doc = resource;
        ensure_resource_type(&doc, resource_type)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        stamp_server_fields(&mut doc, resource_type, &id, 1, now);

        let mut tx = self.store.begin().await?;
        let row = PostgresResourceStore::insert(&mut *tx, resource_type, &id, &doc, now).await?;
        if let Some(tracker) = &self.tracker {
            tracker
                .record_create(&mut *tx, resource_type, &id, &doc, now)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(resource_type, id = %id, version_id = 1, "Created resource");
        Ok(row)
    }

    /// Replace a resource wholesale.
    ///
    /// `expected_version` comes from `If-Match`; a mismatch is a failed
    /// precondition. Losing a race after the check is a version conflict.
    pub async fn update(
        &self,
        resource_type: &str,
        id: &str,
        resource: JsonValue,
        expected_version: Option<i32>,
    ) -> Result<StoredResource> {
        ensure_resource_type(&resource, resource_type)?;

        let current = self.get_by_fhir_id(resource_type, id).await?;
        check_precondition(&current, expected_version)?;

        self.write_update(current, resource, "update").await
    }

    /// Apply a parsed patch to the current canonical document and store the
    /// result as the next version.
    pub async fn patch(
        &self,
        resource_type: &str,
        id: &str,
        patch: &PatchDocument,
        expected_version: Option<i32>,
    ) -> Result<StoredResource> {
        let current = self.get_by_fhir_id(resource_type, id).await?;
        check_precondition(&current, expected_version)?;

        let patched = patch.apply(&current.to_fhir()).map_err(|e| {
            tracing::debug!(
                resource_type,
                id,
                format = patch.format().content_type(),
                error = %e,
                "Patch rejected"
            );
            Error::from(e)
        })?;

        self.write_update(current, patched, "patch").await
    }

    /// Tombstone a resource. Deleting an already deleted resource returns the
    /// existing tombstone.
    pub async fn delete(&self, resource_type: &str, id: &str) -> Result<StoredResource> {
        let current = self
            .find(resource_type, id)
            .await?
            .ok_or_else(|| not_found(resource_type, id))?;
        if current.deleted {
            return Ok(current);
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let row = PostgresResourceStore::mark_deleted_if_version(
            &mut *tx,
            resource_type,
            id,
            current.version_id,
            now,
        )
        .await?
        .ok_or_else(|| conflict(resource_type, id, current.version_id, "delete"))?;

        if let Some(tracker) = &self.tracker {
            tracker
                .sync_head(&mut *tx, resource_type, id, current.version_id)
                .await?;
            tracker
                .record_delete(&mut *tx, resource_type, id, current.version_id, now)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(resource_type, id, version_id = row.version_id, "Deleted resource");
        Ok(row)
    }

    /// Search live resources of one type.
    ///
    /// Parameters not in the type's registry are ignored.
    pub async fn search(
        &self,
        def: &ResourceTypeDef,
        params: &[(String, String)],
        count: usize,
        offset: usize,
    ) -> Result<SearchPage> {
        let mut compiler = SearchCompiler::new("resources", SEARCH_COLUMNS, SEARCH_ORDER);
        compiler
            .filter_eq("resource_type", def.name)
            .filter_static("deleted = false");
        compiler.apply_params(params, &def.search_params);

        let count_query = compiler.count_sql();
        let data_query = compiler.data_sql(to_i64(count)?, to_i64(offset)?);
        tracing::debug!(
            resource_type = def.name,
            sql = %data_query.sql,
            binds = data_query.binds.len(),
            "Compiled search"
        );

        let mut conn = self.store.pool().acquire().await?;
        let total = db::search::count_total(&mut *conn, &count_query).await?;
        let resources = if count == 0 || to_i64(offset)? >= total {
            Vec::new()
        } else {
            db::search::fetch_page(&mut *conn, &data_query).await?
        };

        Ok(SearchPage { resources, total })
    }

    async fn write_update(
        &self,
        current: StoredResource,
        resource: JsonValue,
        operation: &str,
    ) -> Result<StoredResource> {
        let resource_type = current.resource_type.as_str();
        let id = current.fhir_id.as_str();

        let mut doc = resource;
        let now = Utc::now();
        stamp_server_fields(&mut doc, resource_type, id, current.version_id + 1, now);

        let mut tx = self.store.begin().await?;
        let row = PostgresResourceStore::update_if_version(
            &mut *tx,
            resource_type,
            id,
            current.version_id,
            &doc,
            now,
        )
        .await?
        .ok_or_else(|| conflict(resource_type, id, current.version_id, operation))?;

        if let Some(tracker) = &self.tracker {
            tracker
                .sync_head(&mut *tx, resource_type, id, current.version_id)
                .await?;
            tracker
                .record_update(&mut *tx, resource_type, id, current.version_id, &doc, now)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            resource_type,
            id,
            version_id = row.version_id,
            operation,
            "Updated resource"
        );
        Ok(row)
    }
}

fn not_found(resource_type: &str, id: &str) -> Error {
    Error::ResourceNotFound {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
    }
}

fn conflict(resource_type: &str, id: &str, expected: i32, operation: &str) -> Error {
    tracing::warn!(
        resource_type,
        id,
        expected_version = expected,
        operation,
        "Version conflict: resource changed concurrently"
    );
    crate::metrics::record_version_conflict(resource_type, operation);
    Error::VersionConflict {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        expected,
    }
}

fn ensure_live(row: StoredResource) -> Result<StoredResource> {
    if row.deleted {
        return Err(Error::ResourceDeleted {
            resource_type: row.resource_type,
            id: row.fhir_id,
            version_id: row.version_id,
        });
    }
    Ok(row)
}

fn check_precondition(current: &StoredResource, expected_version: Option<i32>) -> Result<()> {
    match expected_version {
        Some(expected) if expected != current.version_id => Err(Error::PreconditionFailed(
            format!(
                "If-Match version {} does not match current version {}",
                expected, current.version_id
            ),
        )),
        _ => Ok(()),
    }
}

/// The body must be a JSON object whose `resourceType`, when present, names
/// the target type.
fn ensure_resource_type(resource: &JsonValue, resource_type: &str) -> Result<()> {
    let obj = resource
        .as_object()
        .ok_or_else(|| Error::InvalidResource("Resource must be a JSON object".to_string()))?;

    match obj.get("resourceType") {
        None => Ok(()),
        Some(JsonValue::String(rt)) if rt == resource_type => Ok(()),
        Some(other) => Err(Error::InvalidResource(format!(
            "resourceType {} does not match endpoint type {}",
            other, resource_type
        ))),
    }
}

fn to_i64(n: usize) -> Result<i64> {
    i64::try_from(n).map_err(|_| Error::Validation(format!("Paging value {} is too large", n)))
}
