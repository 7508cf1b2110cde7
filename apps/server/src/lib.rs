//! EHR FHIR Server
//!
//! FHIR REST surface for EHR resource families (documents, portal
//! communications, care plans, verification results, observations):
//! - CRUD with optimistic concurrency and `If-Match` preconditions
//! - Immutable version history with `vread` and `_history`
//! - JSON Patch and JSON Merge Patch
//! - Parameterized search with paged searchset bundles
//!
//! The protocol engine lives in `ehr-fhir-rest`; this crate adds storage,
//! HTTP, configuration and telemetry.

#![allow(
    clippy::too_many_arguments, // Trait methods mirror the history contract one-to-one
)]

pub mod api;
pub mod background;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
