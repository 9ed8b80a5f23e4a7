//! Extraction pipeline: collaborator traits, the HTTP service client, and
//! the orchestrator that fans file units out concurrently.

pub mod orchestrator;
pub mod service;

pub use orchestrator::{ExtractionOrchestrator, ExtractionReport};
pub use service::{
    DocumentCollaborator, DocumentMessage, ExtractionServiceClient, TabularCollaborator,
};
