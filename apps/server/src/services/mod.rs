//! Business logic services

pub mod history;
pub mod resources;

pub use history::{HistoryPage, HistoryService};
pub use resources::{ResourceService, SearchPage};
