//! FHIR API Routes
//!
//! URL conventions (http://hl7.org/fhir/http.html#url):
//! - **Case Sensitivity**: type names and ids are case-sensitive, as is Axum's
//!   routing. `/careplan/1` is an unsupported type, not `CarePlan/1`.
//! - **Trailing Slashes**: both `/CarePlan` and `/CarePlan/` are served by
//!   registering both forms; no redirects.
//!
//! Unsupported resource types are rejected by the handlers with a 404
//! `OperationOutcome`.

use crate::api::handlers::{history, resources, search};
use crate::state::AppState;
use axum::{
    routing::{get, post, MethodRouter},
    Router,
};

fn type_level() -> MethodRouter<AppState> {
    get(search::search_type).post(resources::create_resource)
}

fn instance_level() -> MethodRouter<AppState> {
    get(resources::read_resource)
        .put(resources::update_resource)
        .patch(resources::patch_resource)
        .delete(resources::delete_resource)
}

pub fn fhir_routes() -> Router<AppState> {
    Router::new()
        // Type-level search (exact segment wins over /:resource_type/:id)
        .route("/:resource_type/_search", post(search::search_type))
        .route("/:resource_type/_search/", post(search::search_type))
        .route("/:resource_type", type_level())
        .route("/:resource_type/", type_level())
        .route("/:resource_type/:id", instance_level())
        .route("/:resource_type/:id/", instance_level())
        .route(
            "/:resource_type/:id/_history",
            get(history::resource_history),
        )
        .route(
            "/:resource_type/:id/_history/",
            get(history::resource_history),
        )
        .route(
            "/:resource_type/:id/_history/:vid",
            get(history::vread_resource),
        )
        .route(
            "/:resource_type/:id/_history/:vid/",
            get(history::vread_resource),
        )
}
