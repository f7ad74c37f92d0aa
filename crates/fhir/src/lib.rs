//! FHIR wire/boundary support for the EHR resource viewer.
//!
//! This crate provides the **wire model** of a stored clinical resource wrapper and the
//! translation helpers between the JSON document held by the document store and the
//! domain-level [`ResourceRecord`] consumed by the view layer.
//!
//! This crate focuses on:
//! - FHIR-aligned metadata (resource type, FHIR version, processing state)
//! - serialisation/deserialisation of the stored JSON document
//! - lenient decoding of timestamps, so bad values degrade at display time instead of
//!   failing the whole document

pub mod resource;

// Re-export facade
pub use resource::Resource;

// Re-export public domain-level types
pub use resource::{
    FhirVersion, Identifier, ProcessingState, ResourceData, ResourceMetadata, ResourceRecord,
    Timestamp,
};

pub use ehrview_types::DocumentId;

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid document id: {0}")]
    InvalidId(#[from] ehrview_types::TextError),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
