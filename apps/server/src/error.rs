//! Error types for the EHR FHIR server

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ehr_fhir_rest::{BundleError, PatchError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Resource not found: {resource_type}/{id}")]
    ResourceNotFound { resource_type: String, id: String },

    #[error("Resource deleted: {resource_type}/{id}")]
    ResourceDeleted {
        resource_type: String,
        id: String,
        version_id: i32,
    },

    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Version conflict on {resource_type}/{id}: version {expected} is no longer current")]
    VersionConflict {
        resource_type: String,
        id: String,
        expected: i32,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Version not found: {resource_type}/{id}/_history/{version_id}")]
    VersionNotFound {
        resource_type: String,
        id: String,
        version_id: i32,
    },

    #[error("Search error: {0}")]
    Search(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<PatchError> for Error {
    fn from(e: PatchError) -> Self {
        match e {
            PatchError::UnsupportedMediaType(_) => Error::UnsupportedMediaType(e.to_string()),
            PatchError::Parse(_) => Error::InvalidResource(e.to_string()),
            PatchError::Application(_) | PatchError::Invariant(_) => {
                Error::UnprocessableEntity(e.to_string())
            }
        }
    }
}

impl From<BundleError> for Error {
    fn from(e: BundleError) -> Self {
        Error::Internal(e.to_string())
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::ResourceNotFound { .. }
            | Error::ResourceDeleted { .. }
            | Error::UnsupportedResourceType(_)
            | Error::VersionNotFound { .. }
            | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidResource(_) | Error::Validation(_) | Error::Search(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::VersionConflict { .. } => StatusCode::CONFLICT,
            Error::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Database(_) | Error::Internal(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn issue_code(&self) -> &'static str {
        match self {
            Error::ResourceDeleted { .. } => "deleted",
            _ => status_to_fhir_code(self.status_code()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let diagnostics = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": self.issue_code(),
                "diagnostics": diagnostics
            }]
        }));

        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/fhir+json; charset=utf-8"),
        );

        // A deleted resource still reports the version of its tombstone.
        if let Error::ResourceDeleted { version_id, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&format!("W/\"{}\"", version_id)) {
                response.headers_mut().insert(header::ETAG, value);
            }
        }

        response
    }
}

fn status_to_fhir_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid",
        StatusCode::NOT_FOUND => "not-found",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "not-supported",
        StatusCode::CONFLICT => "conflict",
        StatusCode::PRECONDITION_FAILED => "conflict",
        StatusCode::UNPROCESSABLE_ENTITY => "processing",
        _ => "exception",
    }
}
