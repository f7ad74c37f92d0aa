//! FHIR-aligned resource wrapper wire models and translation helpers.
//!
//! A stored document wraps one clinical resource together with ingestion metadata
//! written by an external processing pipeline. This module provides both domain-level
//! types and the wire model for that document.
//!
//! Responsibilities:
//! - Define public domain-level types for the view layer
//! - Define a lenient wire model for serialisation/deserialisation
//! - Provide translation helpers between domain primitives and the wire model
//!
//! Notes:
//! - Only the `metadata` object is mandatory. Every field inside it falls back to a
//!   default so a partially written document still shows up in the table.
//! - Timestamps stay as the raw stored text. Parsing happens on demand so that a bad
//!   value affects one cell, not the whole record.
//! - The backend-assigned id is attached at read time and never serialised.

use crate::{FhirError, FhirResult};
use chrono::{DateTime, SecondsFormat, Utc};
use ehrview_types::DocumentId;
use serde::{Deserialize, Deserializer, Serialize};

const STATE_PREFIX: &str = "PROCESSING_STATE_";
const VERSION_PREFIX: &str = "FHIR_VERSION_";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Lifecycle stage of a resource in the external ingestion/analysis pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProcessingState {
    NotStarted,
    Processing,
    Completed,
    Failed,
    /// Default for absent or unrecognised values.
    #[default]
    Unspecified,
}

impl ProcessingState {
    /// Every state, in pipeline order.
    pub const ALL: [ProcessingState; 5] = [
        ProcessingState::NotStarted,
        ProcessingState::Processing,
        ProcessingState::Completed,
        ProcessingState::Failed,
        ProcessingState::Unspecified,
    ];

    /// Short label shown to users, e.g. `COMPLETED`.
    pub fn label(self) -> &'static str {
        match self {
            ProcessingState::NotStarted => "NOT_STARTED",
            ProcessingState::Processing => "PROCESSING",
            ProcessingState::Completed => "COMPLETED",
            ProcessingState::Failed => "FAILED",
            ProcessingState::Unspecified => "UNSPECIFIED",
        }
    }

    /// Stored representation, e.g. `PROCESSING_STATE_COMPLETED`.
    pub fn wire_name(self) -> String {
        format!("{STATE_PREFIX}{}", self.label())
    }

    /// Parse a stored value. Accepts both the prefixed and the bare form; anything
    /// else maps to [`ProcessingState::Unspecified`].
    pub fn from_wire(s: &str) -> Self {
        let bare = s.trim();
        let bare = bare.strip_prefix(STATE_PREFIX).unwrap_or(bare);
        match bare {
            "NOT_STARTED" => ProcessingState::NotStarted,
            "PROCESSING" => ProcessingState::Processing,
            "COMPLETED" => ProcessingState::Completed,
            "FAILED" => ProcessingState::Failed,
            _ => ProcessingState::Unspecified,
        }
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// FHIR release the resource was fetched as.
///
/// The set is open: unknown stored values are preserved verbatim in [`FhirVersion::Other`]
/// and written back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum FhirVersion {
    R4,
    R4B,
    #[default]
    Unspecified,
    Other(String),
}

impl FhirVersion {
    pub fn label(&self) -> &str {
        match self {
            FhirVersion::R4 => "R4",
            FhirVersion::R4B => "R4B",
            FhirVersion::Unspecified => "UNSPECIFIED",
            FhirVersion::Other(raw) => raw,
        }
    }

    pub fn wire_name(&self) -> String {
        match self {
            FhirVersion::Other(raw) => raw.clone(),
            known => format!("{VERSION_PREFIX}{}", known.label()),
        }
    }

    pub fn from_wire(s: &str) -> Self {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix(VERSION_PREFIX).unwrap_or(trimmed);
        match bare {
            "R4" => FhirVersion::R4,
            "R4B" => FhirVersion::R4B,
            "" | "UNSPECIFIED" => FhirVersion::Unspecified,
            _ => FhirVersion::Other(trimmed.to_owned()),
        }
    }
}

impl std::fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A stored timestamp, kept exactly as written.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Formats `at` the way writers of this collection do (RFC 3339, millisecond
    /// precision, `Z` suffix).
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// The raw stored text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse as RFC 3339. Returns `None` for malformed values.
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.0.trim())
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiers linking the wrapper back to its source system.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identifier {
    pub key: String,
    pub uid: String,
    pub patient_id: String,
}

/// Ingestion metadata for one wrapped resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceMetadata {
    /// FHIR resource type, e.g. `Observation`.
    pub resource_type: String,
    pub state: ProcessingState,
    pub version: FhirVersion,
    pub created_time: Option<Timestamp>,
    /// Ordering field of the live query.
    pub fetch_time: Option<Timestamp>,
    pub processed_time: Option<Timestamp>,
    pub identifier: Identifier,
}

/// The stored payload of one resource document (no id).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceData {
    pub metadata: ResourceMetadata,
    /// Free-text clinical narrative.
    pub human_readable: String,
    /// Optional generated summary.
    pub ai_summary: Option<String>,
}

/// A resource document as read back from the store: payload plus its document id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: DocumentId,
    pub data: ResourceData,
}

impl ResourceRecord {
    pub fn new(id: DocumentId, data: ResourceData) -> Self {
        Self { id, data }
    }

    pub fn metadata(&self) -> &ResourceMetadata {
        &self.data.metadata
    }

    pub fn resource_type(&self) -> &str {
        &self.data.metadata.resource_type
    }

    pub fn state(&self) -> ProcessingState {
        self.data.metadata.state
    }
}

// ============================================================================
// Public Resource operations
// ============================================================================

/// Resource document operations.
///
/// Zero-sized namespace for parsing and rendering stored resource documents.
pub struct Resource;

impl Resource {
    /// Decode a stored JSON document and attach its id.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] naming the failing field path (for example
    /// `metadata.identifier`) when the document shape cannot be decoded.
    pub fn parse_value(id: DocumentId, value: serde_json::Value) -> FhirResult<ResourceRecord> {
        let wire = serde_path_to_error::deserialize::<_, ResourceWire>(value)
            .map_err(schema_mismatch)?;
        Ok(ResourceRecord::new(id, wire_to_domain(wire)))
    }

    /// Decode a stored document from JSON text and attach its id.
    pub fn parse(id: DocumentId, json_text: &str) -> FhirResult<ResourceRecord> {
        let mut deserializer = serde_json::Deserializer::from_str(json_text);
        let wire = serde_path_to_error::deserialize::<_, ResourceWire>(&mut deserializer)
            .map_err(schema_mismatch)?;
        Ok(ResourceRecord::new(id, wire_to_domain(wire)))
    }

    /// Encode a payload as the JSON document to store.
    pub fn to_value(data: &ResourceData) -> FhirResult<serde_json::Value> {
        serde_json::to_value(domain_to_wire(data)).map_err(|e| {
            FhirError::Translation(format!("Failed to serialize resource document: {e}"))
        })
    }

    /// Encode a payload as pretty-printed JSON text.
    pub fn render(data: &ResourceData) -> FhirResult<String> {
        serde_json::to_string_pretty(&domain_to_wire(data)).map_err(|e| {
            FhirError::Translation(format!("Failed to serialize resource document: {e}"))
        })
    }
}

fn schema_mismatch(err: serde_path_to_error::Error<serde_json::Error>) -> FhirError {
    let path = err.path().to_string();
    let source = err.into_inner();
    let path = if path.is_empty() || path == "." {
        "<root>"
    } else {
        path.as_str()
    };
    FhirError::Translation(format!(
        "Resource document schema mismatch at {path}: {source}"
    ))
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ResourceWire {
    metadata: MetadataWire,
    #[serde(default, deserialize_with = "loose_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    human_readable_str: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    ai_summary: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct MetadataWire {
    #[serde(default, deserialize_with = "loose_string")]
    resource_type: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    state: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    version: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    created_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    fetch_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    #[serde(skip_serializing_if = "Option::is_none")]
    processed_time: Option<String>,
    #[serde(default)]
    identifier: IdentifierWire,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct IdentifierWire {
    #[serde(default, deserialize_with = "loose_string")]
    key: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    uid: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    patient_id: Option<String>,
}

/// Accept any scalar where text is expected: strings pass through, `null` is absent
/// and other values keep their JSON text.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn wire_to_domain(wire: ResourceWire) -> ResourceData {
    let m = wire.metadata;
    ResourceData {
        metadata: ResourceMetadata {
            resource_type: m.resource_type.unwrap_or_default(),
            state: m
                .state
                .as_deref()
                .map(ProcessingState::from_wire)
                .unwrap_or_default(),
            version: m
                .version
                .as_deref()
                .map(FhirVersion::from_wire)
                .unwrap_or_default(),
            created_time: m.created_time.map(Timestamp),
            fetch_time: m.fetch_time.map(Timestamp),
            processed_time: m.processed_time.map(Timestamp),
            identifier: Identifier {
                key: m.identifier.key.unwrap_or_default(),
                uid: m.identifier.uid.unwrap_or_default(),
                patient_id: m.identifier.patient_id.unwrap_or_default(),
            },
        },
        human_readable: wire.human_readable_str.unwrap_or_default(),
        ai_summary: wire.ai_summary,
    }
}

fn domain_to_wire(data: &ResourceData) -> ResourceWire {
    let m = &data.metadata;
    ResourceWire {
        metadata: MetadataWire {
            resource_type: Some(m.resource_type.clone()),
            state: Some(m.state.wire_name()),
            version: Some(m.version.wire_name()),
            created_time: m.created_time.as_ref().map(|t| t.0.clone()),
            fetch_time: m.fetch_time.as_ref().map(|t| t.0.clone()),
            processed_time: m.processed_time.as_ref().map(|t| t.0.clone()),
            identifier: IdentifierWire {
                key: Some(m.identifier.key.clone()),
                uid: Some(m.identifier.uid.clone()),
                patient_id: Some(m.identifier.patient_id.clone()),
            },
        },
        human_readable_str: Some(data.human_readable.clone()),
        ai_summary: data.ai_summary.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_id() -> DocumentId {
        DocumentId::new("doc1").expect("valid id")
    }

    fn sample() -> serde_json::Value {
        json!({
            "metadata": {
                "resourceType": "Observation",
                "state": "PROCESSING_STATE_COMPLETED",
                "version": "FHIR_VERSION_R4",
                "createdTime": "2025-01-01T10:00:00.000Z",
                "fetchTime": "2025-01-01T10:20:00.000Z",
                "identifier": { "key": "res_ab12cd", "uid": "u_ef34gh", "patientId": "p_123456" }
            },
            "humanReadableStr": "Patient presented with mild symptoms.",
        })
    }

    #[test]
    fn parses_sample_document() {
        let record = Resource::parse_value(doc_id(), sample()).expect("parse document");

        assert_eq!(record.id.as_str(), "doc1");
        assert_eq!(record.resource_type(), "Observation");
        assert_eq!(record.state(), ProcessingState::Completed);
        assert_eq!(record.metadata().version, FhirVersion::R4);
        assert_eq!(record.metadata().identifier.patient_id, "p_123456");
        assert!(record.metadata().processed_time.is_none());
        assert!(record.data.ai_summary.is_none());

        let fetched = record
            .metadata()
            .fetch_time
            .as_ref()
            .and_then(Timestamp::parse)
            .expect("valid fetch time");
        assert_eq!(fetched.to_rfc3339(), "2025-01-01T10:20:00+00:00");
    }

    #[test]
    fn render_then_parse_preserves_payload() {
        let record = Resource::parse_value(doc_id(), sample()).expect("parse document");
        let text = Resource::render(&record.data).expect("render document");
        let reparsed = Resource::parse(doc_id(), &text).expect("reparse document");
        assert_eq!(record, reparsed);
    }

    #[test]
    fn render_omits_absent_optional_fields() {
        let record = Resource::parse_value(doc_id(), sample()).expect("parse document");
        let value = Resource::to_value(&record.data).expect("encode document");
        assert!(value["metadata"].get("processedTime").is_none());
        assert!(value.get("aiSummary").is_none());
        assert!(value.get("__id").is_none());
        assert_eq!(value["metadata"]["state"], "PROCESSING_STATE_COMPLETED");
    }

    #[test]
    fn unknown_state_decodes_as_unspecified() {
        let mut doc = sample();
        doc["metadata"]["state"] = json!("PROCESSING_STATE_ARCHIVED");
        let record = Resource::parse_value(doc_id(), doc).expect("parse document");
        assert_eq!(record.state(), ProcessingState::Unspecified);
    }

    #[test]
    fn bare_state_names_are_accepted() {
        for state in ProcessingState::ALL {
            assert_eq!(ProcessingState::from_wire(state.label()), state);
            assert_eq!(ProcessingState::from_wire(&state.wire_name()), state);
        }
    }

    #[test]
    fn unknown_version_is_preserved() {
        let mut doc = sample();
        doc["metadata"]["version"] = json!("FHIR_VERSION_R5");
        let record = Resource::parse_value(doc_id(), doc).expect("parse document");
        assert_eq!(
            record.metadata().version,
            FhirVersion::Other("FHIR_VERSION_R5".into())
        );

        let value = Resource::to_value(&record.data).expect("encode document");
        assert_eq!(value["metadata"]["version"], "FHIR_VERSION_R5");
    }

    #[test]
    fn malformed_timestamps_do_not_fail_decoding() {
        let mut doc = sample();
        doc["metadata"]["createdTime"] = json!("yesterday-ish");
        doc["metadata"]["fetchTime"] = json!(1735725600);
        let record = Resource::parse_value(doc_id(), doc).expect("parse document");

        let created = record.metadata().created_time.as_ref().expect("kept raw");
        assert_eq!(created.as_str(), "yesterday-ish");
        assert!(created.parse().is_none());

        let fetched = record.metadata().fetch_time.as_ref().expect("kept raw");
        assert_eq!(fetched.as_str(), "1735725600");
        assert!(fetched.parse().is_none());
    }

    #[test]
    fn missing_inner_fields_fall_back_to_defaults() {
        let record = Resource::parse_value(doc_id(), json!({ "metadata": {} }))
            .expect("parse sparse document");
        assert_eq!(record.resource_type(), "");
        assert_eq!(record.state(), ProcessingState::Unspecified);
        assert_eq!(record.metadata().version, FhirVersion::Unspecified);
        assert!(record.metadata().fetch_time.is_none());
        assert_eq!(record.metadata().identifier, Identifier::default());
        assert_eq!(record.data.human_readable, "");
    }

    #[test]
    fn missing_metadata_is_rejected() {
        let err = Resource::parse_value(doc_id(), json!({ "humanReadableStr": "x" }))
            .expect_err("metadata is required");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("metadata")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_identifier_shape_reports_path() {
        let mut doc = sample();
        doc["metadata"]["identifier"] = json!("res_ab12cd");
        let err = Resource::parse_value(doc_id(), doc).expect_err("identifier must be a map");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("metadata.identifier")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn timestamp_from_datetime_uses_millisecond_precision() {
        let at = DateTime::parse_from_rfc3339("2025-03-04T05:06:07.089Z")
            .expect("valid")
            .with_timezone(&Utc);
        let ts = Timestamp::from_datetime(at);
        assert_eq!(ts.as_str(), "2025-03-04T05:06:07.089Z");
        assert_eq!(ts.parse(), Some(at));
    }
}
