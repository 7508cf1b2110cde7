//! Request handlers for API endpoints
//!
//! Handlers resolve the resource type, call the services and shape the FHIR
//! response. Errors are translated to `OperationOutcome` once, by
//! [`crate::Error`]'s `IntoResponse`.

pub mod history;
pub mod resources;
pub mod search;
pub mod system;

pub use history::*;
pub use resources::*;
pub use search::*;
pub use system::*;
