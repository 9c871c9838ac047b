//! Service Module
//!
//! Business logic layer for the relay.
//! Services orchestrate between repositories, the bus and observers.

pub mod dispatcher;
pub mod ingest;
pub mod pipeline;
pub mod project;
pub mod sink;
pub mod trigger;
pub mod webhook;

// Re-export for convenience
pub use pipeline as pipeline_service;
pub use project as project_service;
