//! History service - `_history` and `vread`
//!
//! Reads go to the version tracker. When tracking is off, or the resource was
//! written before tracking was enabled, the current row stands in as a single
//! `create` version so both interactions still answer.

use crate::{models::StoredResource, services::ResourceService, Error, Result};
use ehr_fhir_rest::VersionHistoryEntry;

/// One page of history, newest version first.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub entries: Vec<VersionHistoryEntry>,
    pub total: i64,
}

#[derive(Clone)]
pub struct HistoryService {
    resources: ResourceService,
}

impl HistoryService {
    pub fn new(resources: ResourceService) -> Self {
        Self { resources }
    }

    pub async fn history(
        &self,
        resource_type: &str,
        id: &str,
        count: usize,
        offset: usize,
    ) -> Result<HistoryPage> {
        if let Some(tracker) = self.resources.tracker() {
            let (entries, total) = tracker
                .list_versions(resource_type, id, to_i64(count)?, to_i64(offset)?)
                .await?;
            if total > 0 {
                return Ok(HistoryPage { entries, total });
            }
        }

        let current = self.current(resource_type, id).await?;
        tracing::debug!(
            resource_type,
            id,
            version_id = current.version_id,
            "No recorded history, reporting current version"
        );

        let entries = if offset == 0 && count > 0 {
            vec![synthetic_entry(&current)?]
        } else {
            Vec::new()
        };
        Ok(HistoryPage { entries, total: 1 })
    }

    /// One version. Tombstones answer `ResourceDeleted`.
    pub async fn vread(
        &self,
        resource_type: &str,
        id: &str,
        version_id: i32,
    ) -> Result<VersionHistoryEntry> {
        if let Some(tracker) = self.resources.tracker() {
            if let Some(entry) = tracker.get_version(resource_type, id, version_id).await? {
                if entry.is_delete() {
                    return Err(Error::ResourceDeleted {
                        resource_type: entry.resource_type,
                        id: entry.resource_id,
                        version_id: entry.version_id,
                    });
                }
                return Ok(entry);
            }

            let (_, total) = tracker.list_versions(resource_type, id, 0, 0).await?;
            if total > 0 {
                return Err(version_not_found(resource_type, id, version_id));
            }
        }

        let current = self.current(resource_type, id).await?;
        if current.version_id != version_id {
            return Err(version_not_found(resource_type, id, version_id));
        }
        if current.deleted {
            return Err(Error::ResourceDeleted {
                resource_type: current.resource_type,
                id: current.fhir_id,
                version_id: current.version_id,
            });
        }
        synthetic_entry(&current)
    }

    async fn current(&self, resource_type: &str, id: &str) -> Result<StoredResource> {
        self.resources
            .find(resource_type, id)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })
    }
}

fn synthetic_entry(current: &StoredResource) -> Result<VersionHistoryEntry> {
    VersionHistoryEntry::synthetic_create(
        current.resource_type.as_str(),
        current.fhir_id.as_str(),
        current.version_id,
        &current.to_fhir(),
        current.updated_at,
    )
    .map_err(|e| Error::Internal(format!("Failed to serialize current resource: {}", e)))
}

fn version_not_found(resource_type: &str, id: &str, version_id: i32) -> Error {
    Error::VersionNotFound {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        version_id,
    }
}

fn to_i64(n: usize) -> Result<i64> {
    i64::try_from(n).map_err(|_| Error::Validation(format!("Paging value {} is too large", n)))
}
