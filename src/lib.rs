// ABOUTME: Library root for sitepub - exposes the pipeline and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod build;
pub mod cdn;
pub mod config;
pub mod contract;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod store;
pub mod types;
