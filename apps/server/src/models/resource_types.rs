//! Supported resource types and their search parameter registries
//!
//! Columns are SQL expressions over the `resources.resource` JSONB document.
//! Reference columns are normalized to the bare target id so that a query
//! value such as `Patient/123` (reduced to `123`) compares equal.

use ehr_fhir_rest::{SearchParamConfig, SearchParamRegistry};

/// Bare id of a reference stored at `$path`, with any `Type/`, base URL or
/// `/_history/n` suffix removed.
macro_rules! reference_id {
    ($path:literal) => {
        concat!(
            "regexp_replace(regexp_replace(",
            $path,
            ", '/_history/.*$', ''), '^.*/', '')"
        )
    };
}

const ID: SearchParamConfig = SearchParamConfig::token("_id", "fhir_id");
const STATUS: SearchParamConfig = SearchParamConfig::token("status", "resource->>'status'");
const SUBJECT: SearchParamConfig =
    SearchParamConfig::reference("subject", reference_id!("resource->'subject'->>'reference'"));
const PATIENT: SearchParamConfig =
    SearchParamConfig::reference("patient", reference_id!("resource->'subject'->>'reference'"));
const CATEGORY: SearchParamConfig = SearchParamConfig::token(
    "category",
    "resource->'category'->0->'coding'->0->>'code'",
);

const DOCUMENT_REFERENCE_PARAMS: [SearchParamConfig; 7] = [
    ID,
    STATUS,
    SUBJECT,
    PATIENT,
    CATEGORY,
    SearchParamConfig::token("type", "resource->'type'->'coding'->0->>'code'"),
    SearchParamConfig::string("description", "resource->>'description'"),
];

const COMMUNICATION_PARAMS: [SearchParamConfig; 7] = [
    ID,
    STATUS,
    SUBJECT,
    PATIENT,
    CATEGORY,
    SearchParamConfig::reference("sender", reference_id!("resource->'sender'->>'reference'")),
    SearchParamConfig::reference(
        "recipient",
        reference_id!("resource->'recipient'->0->>'reference'"),
    ),
];

const CARE_PLAN_PARAMS: [SearchParamConfig; 7] = [
    ID,
    STATUS,
    SUBJECT,
    PATIENT,
    CATEGORY,
    SearchParamConfig::token("intent", "resource->>'intent'"),
    SearchParamConfig::string("title", "resource->>'title'"),
];

const VERIFICATION_RESULT_PARAMS: [SearchParamConfig; 3] = [
    ID,
    STATUS,
    SearchParamConfig::reference("target", reference_id!("resource->'target'->0->>'reference'")),
];

const OBSERVATION_PARAMS: [SearchParamConfig; 6] = [
    ID,
    STATUS,
    SUBJECT,
    PATIENT,
    CATEGORY,
    SearchParamConfig::token("code", "resource->'code'->'coding'->0->>'code'"),
];

/// A resource type served under `/fhir/{name}`.
#[derive(Debug, Clone, Copy)]
pub struct ResourceTypeDef {
    pub name: &'static str,
    pub search_params: SearchParamRegistry,
}

pub static RESOURCE_TYPES: [ResourceTypeDef; 5] = [
    ResourceTypeDef {
        name: "DocumentReference",
        search_params: SearchParamRegistry::new(&DOCUMENT_REFERENCE_PARAMS),
    },
    ResourceTypeDef {
        name: "Communication",
        search_params: SearchParamRegistry::new(&COMMUNICATION_PARAMS),
    },
    ResourceTypeDef {
        name: "CarePlan",
        search_params: SearchParamRegistry::new(&CARE_PLAN_PARAMS),
    },
    ResourceTypeDef {
        name: "VerificationResult",
        search_params: SearchParamRegistry::new(&VERIFICATION_RESULT_PARAMS),
    },
    ResourceTypeDef {
        name: "Observation",
        search_params: SearchParamRegistry::new(&OBSERVATION_PARAMS),
    },
];

/// Case-sensitive lookup, as FHIR type names are.
pub fn lookup(resource_type: &str) -> Option<&'static ResourceTypeDef> {
    RESOURCE_TYPES.iter().find(|def| def.name == resource_type)
}

/// Resolve a path segment to a supported type or fail with 404.
pub fn require(resource_type: &str) -> crate::Result<&'static ResourceTypeDef> {
    lookup(resource_type)
        .ok_or_else(|| crate::Error::UnsupportedResourceType(resource_type.to_string()))
}
