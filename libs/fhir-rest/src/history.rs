//! Version history value types.
//!
//! A [`VersionHistoryEntry`] is written once per primary-resource mutation and
//! never updated afterwards. The snapshot is kept as the raw serialized bytes
//! so a `vread` returns exactly what was captured.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Mutation recorded by a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown history action '{0}'")]
pub struct UnknownHistoryAction(pub String);

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Create => "create",
            HistoryAction::Update => "update",
            HistoryAction::Delete => "delete",
        }
    }

    /// HTTP method reported in `Bundle.entry.request.method` of a history bundle.
    pub fn http_method(&self) -> &'static str {
        match self {
            HistoryAction::Create => "POST",
            HistoryAction::Update => "PUT",
            HistoryAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = UnknownHistoryAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(HistoryAction::Create),
            "update" => Ok(HistoryAction::Update),
            "delete" => Ok(HistoryAction::Delete),
            other => Err(UnknownHistoryAction(other.to_string())),
        }
    }
}

/// One immutable version of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHistoryEntry {
    pub resource_type: String,
    pub resource_id: String,
    /// Starts at 1 and increases by exactly one per recorded mutation.
    pub version_id: i32,
    pub action: HistoryAction,
    /// Raw serialized resource as captured at write time.
    pub snapshot: Vec<u8>,
    pub recorded_at: DateTime<Utc>,
}

impl VersionHistoryEntry {
    /// Build the single `create` entry reported when no history exists for a
    /// resource (tracking disabled or enabled after the resource was written).
    pub fn synthetic_create(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        version_id: i32,
        resource: &JsonValue,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            version_id,
            action: HistoryAction::Create,
            snapshot: serde_json::to_vec(resource)?,
            recorded_at,
        })
    }

    /// Parse the captured snapshot back into JSON.
    pub fn resource(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::from_slice(&self.snapshot)
    }

    pub fn is_delete(&self) -> bool {
        self.action == HistoryAction::Delete
    }
}
