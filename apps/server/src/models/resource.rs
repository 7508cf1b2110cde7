//! Stored resource row and its canonical FHIR projection

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value as JsonValue};

/// One row of the `resources` table.
///
/// `resource` holds the full canonical document; `id`, `meta.versionId` and
/// `meta.lastUpdated` inside it are server-managed and rewritten on every write.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredResource {
    pub resource_type: String,
    pub fhir_id: String,
    pub version_id: i32,
    pub resource: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

impl StoredResource {
    /// Canonical FHIR JSON with server-managed elements filled from the row.
    pub fn to_fhir(&self) -> JsonValue {
        let mut doc = self.resource.clone();
        stamp_server_fields(
            &mut doc,
            &self.resource_type,
            &self.fhir_id,
            self.version_id,
            self.updated_at,
        );
        doc
    }
}

/// Format a FHIR `instant` (UTC, millisecond precision).
pub fn fhir_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Overwrite `resourceType`, `id`, `meta.versionId` and `meta.lastUpdated`.
///
/// Non-object documents are replaced by an empty object first.
pub fn stamp_server_fields(
    doc: &mut JsonValue,
    resource_type: &str,
    id: &str,
    version_id: i32,
    last_updated: DateTime<Utc>,
) {
    if !doc.is_object() {
        *doc = JsonValue::Object(Map::new());
    }
    let Some(obj) = doc.as_object_mut() else {
        return;
    };

    obj.insert("resourceType".to_string(), json!(resource_type));
    obj.insert("id".to_string(), json!(id));

    let meta = obj
        .entry("meta")
        .or_insert_with(|| JsonValue::Object(Map::new()));
    if !meta.is_object() {
        *meta = JsonValue::Object(Map::new());
    }
    if let Some(meta) = meta.as_object_mut() {
        meta.insert("versionId".to_string(), json!(version_id.to_string()));
        meta.insert("lastUpdated".to_string(), json!(fhir_instant(last_updated)));
    }
}
