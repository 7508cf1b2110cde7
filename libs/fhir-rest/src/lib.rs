//! FHIR REST engine
//!
//! Datastore-free building blocks that make a resource API FHIR-compliant:
//!
//! - [`patch`]: JSON Patch (RFC 6902) and JSON Merge Patch (RFC 7396) dispatch,
//!   parsing and application against a resource's canonical JSON
//! - [`search`]: compilation of FHIR search parameters into parameterized SQL
//! - [`bundle`]: searchset and history `Bundle` assembly with paging links
//! - [`history`]: immutable version history entries shared by the datastore
//!   layer and the bundle builder
//!
//! Everything here is a pure function of its inputs and is safe to call
//! concurrently without synchronization.
//!
//! # Example
//!
//! ```rust
//! use ehr_fhir_rest::patch::{apply_merge_patch, PatchFormat};
//! use serde_json::json;
//!
//! let format = PatchFormat::from_content_type(Some("application/merge-patch+json")).unwrap();
//! assert_eq!(format, PatchFormat::MergePatch);
//!
//! let merged = apply_merge_patch(&json!({"a": 1, "b": 2}), &json!({"b": null}));
//! assert_eq!(merged, json!({"a": 1}));
//! ```

pub mod bundle;
pub mod history;
pub mod patch;
pub mod search;

pub use bundle::{history_bundle, search_bundle_with_links, Bundle, BundleError, SearchBundleLinks};
pub use history::{HistoryAction, VersionHistoryEntry};
pub use patch::{PatchDocument, PatchError, PatchFormat};
pub use search::{
    BindValue, CompiledQuery, SearchCompiler, SearchParamConfig, SearchParamRegistry,
    SearchParamType,
};
