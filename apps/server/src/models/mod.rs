//! Domain models for the EHR FHIR server

pub mod resource;
pub mod resource_types;

pub use resource::{fhir_instant, stamp_server_fields, StoredResource};
pub use resource_types::{lookup as lookup_resource_type, ResourceTypeDef, RESOURCE_TYPES};
