//! PATCH support for canonical FHIR JSON.
//!
//! The patch format is chosen purely by `Content-Type`:
//! - `application/json-patch+json` → JSON Patch (RFC 6902)
//! - `application/merge-patch+json` → JSON Merge Patch (RFC 7396)
//!
//! Anything else is rejected before the body is looked at. Application never
//! mutates the caller's document: operations run against a copy, and a failing
//! operation (including a failed `test`) discards the whole copy.

use json_patch::PatchErrorKind;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";
pub const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";

const JSON_PATCH_OPS: [&str; 6] = ["add", "remove", "replace", "move", "copy", "test"];

/// Elements a PATCH may never change.
const IMMUTABLE_ELEMENTS: [&str; 2] = ["resourceType", "id"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error(
        "Unsupported PATCH Content-Type '{0}'. Supported: application/json-patch+json, application/merge-patch+json"
    )]
    UnsupportedMediaType(String),

    #[error("Invalid patch document: {0}")]
    Parse(String),

    #[error("Patch could not be applied: {0}")]
    Application(String),

    #[error("Patch would change immutable element: {0}")]
    Invariant(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    JsonPatch,
    MergePatch,
}

impl PatchFormat {
    /// Select the patch format from a raw `Content-Type` header value.
    ///
    /// Media type parameters (`; charset=utf-8`) are ignored and matching is
    /// case-insensitive. A missing header is unsupported.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, PatchError> {
        let media_type = content_type
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match media_type.as_str() {
            JSON_PATCH_CONTENT_TYPE => Ok(PatchFormat::JsonPatch),
            MERGE_PATCH_CONTENT_TYPE => Ok(PatchFormat::MergePatch),
            "" => Err(PatchError::UnsupportedMediaType(
                "<missing>".to_string(),
            )),
            other => Err(PatchError::UnsupportedMediaType(other.to_string())),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            PatchFormat::JsonPatch => JSON_PATCH_CONTENT_TYPE,
            PatchFormat::MergePatch => MERGE_PATCH_CONTENT_TYPE,
        }
    }
}

/// A parsed patch body, ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchDocument {
    Json(json_patch::Patch),
    Merge(JsonValue),
}

impl PatchDocument {
    pub fn parse(format: PatchFormat, body: &[u8]) -> Result<Self, PatchError> {
        match format {
            PatchFormat::JsonPatch => parse_json_patch(body).map(PatchDocument::Json),
            PatchFormat::MergePatch => parse_merge_patch(body).map(PatchDocument::Merge),
        }
    }

    pub fn format(&self) -> PatchFormat {
        match self {
            PatchDocument::Json(_) => PatchFormat::JsonPatch,
            PatchDocument::Merge(_) => PatchFormat::MergePatch,
        }
    }

    /// Apply the patch to `current` and check that `resourceType` and `id`
    /// survived unchanged.
    pub fn apply(&self, current: &JsonValue) -> Result<JsonValue, PatchError> {
        let patched = match self {
            PatchDocument::Json(ops) => apply_json_patch(current, ops)?,
            PatchDocument::Merge(patch) => apply_merge_patch(current, patch),
        };
        ensure_identity_preserved(current, &patched)?;
        Ok(patched)
    }
}

/// Parse a JSON Patch body: an ordered array of operations, each with a known
/// `op` and a non-empty `path`.
pub fn parse_json_patch(body: &[u8]) -> Result<json_patch::Patch, PatchError> {
    let raw: JsonValue =
        serde_json::from_slice(body).map_err(|e| PatchError::Parse(e.to_string()))?;

    let ops = raw.as_array().ok_or_else(|| {
        PatchError::Parse("JSON Patch document must be an array of operations".to_string())
    })?;

    for (index, op) in ops.iter().enumerate() {
        let name = op.get("op").and_then(JsonValue::as_str).ok_or_else(|| {
            PatchError::Parse(format!("operation {}: missing 'op'", index))
        })?;
        if !JSON_PATCH_OPS.contains(&name) {
            return Err(PatchError::Parse(format!(
                "operation {}: unknown op '{}'",
                index, name
            )));
        }
        match op.get("path").and_then(JsonValue::as_str) {
            Some(path) if !path.is_empty() => {}
            _ => {
                return Err(PatchError::Parse(format!(
                    "operation {}: 'path' must be a non-empty JSON Pointer",
                    index
                )))
            }
        }
    }

    serde_json::from_value(raw).map_err(|e| PatchError::Parse(e.to_string()))
}

/// Parse a JSON Merge Patch body. Any JSON value is a valid merge patch.
pub fn parse_merge_patch(body: &[u8]) -> Result<JsonValue, PatchError> {
    serde_json::from_slice(body).map_err(|e| PatchError::Parse(e.to_string()))
}

/// Apply JSON Patch operations strictly in order against a copy of `current`.
///
/// On any failure the copy is dropped and `current` is untouched.
pub fn apply_json_patch(
    current: &JsonValue,
    ops: &json_patch::Patch,
) -> Result<JsonValue, PatchError> {
    let mut patched = current.clone();
    json_patch::patch(&mut patched, &ops.0).map_err(|e| {
        let message = match e.kind {
            PatchErrorKind::TestFailed => format!("test operation failed: {}", e),
            _ => e.to_string(),
        };
        PatchError::Application(message)
    })?;
    Ok(patched)
}

/// Apply a JSON Merge Patch: `null` deletes a key, objects merge recursively,
/// every other value (arrays included) replaces the target wholesale.
pub fn apply_merge_patch(current: &JsonValue, patch: &JsonValue) -> JsonValue {
    let mut merged = current.clone();
    json_patch::merge(&mut merged, patch);
    merged
}

/// Reject a patched document whose `resourceType` or `id` differs from the
/// document it was derived from.
pub fn ensure_identity_preserved(
    before: &JsonValue,
    after: &JsonValue,
) -> Result<(), PatchError> {
    let after_obj = after.as_object().ok_or_else(|| {
        PatchError::Invariant("patched resource must be a JSON object".to_string())
    })?;

    for element in IMMUTABLE_ELEMENTS {
        if before.get(element) != after_obj.get(element) {
            return Err(PatchError::Invariant(format!(
                "'{}' cannot be changed by PATCH",
                element
            )));
        }
    }

    Ok(())
}
