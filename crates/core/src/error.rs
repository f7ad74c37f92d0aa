use ehrview_types::DocumentId;

/// Required connection configuration is missing or malformed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to build backend client: {0}")]
    Client(String),
}

/// The anonymous session could not be established.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("sign-in rejected by backend: {0}")]
    Rejected(String),
    #[error("sign-in request failed: {0}")]
    Transport(String),
}

/// A single read or write against the document store failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("backend rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("document must be a JSON object")]
    NotAnObject,
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("invalid document id: {0}")]
    InvalidId(#[from] ehrview_types::TextError),
    #[error("session could not be renewed: {0}")]
    Session(#[from] AuthError),
}

/// The live query terminated abnormally. No further snapshots follow.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("live query failed: {0}")]
    Backend(#[from] StoreError),
    #[error("live query closed by backend")]
    Closed,
}

/// Demo seeding stopped before writing every requested document.
///
/// Documents written before the failure are not rolled back.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("could not establish session for seeding: {0}")]
    Session(#[from] AuthError),
    #[error("failed to encode demo document: {0}")]
    Encode(#[from] fhir::FhirError),
    #[error("seed write {failed_at} of {requested} failed after {written} succeeded: {source}")]
    Write {
        failed_at: usize,
        written: usize,
        requested: usize,
        #[source]
        source: StoreError,
    },
    #[error("seed task ended unexpectedly: {0}")]
    Aborted(String),
}

impl SeedError {
    /// Number of documents that were persisted before the failure.
    pub fn written(&self) -> usize {
        match self {
            SeedError::Write { written, .. } => *written,
            _ => 0,
        }
    }
}

/// A user intent referred to state the view does not hold.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("no record with id {0} in the current snapshot")]
    UnknownRecord(DocumentId),
}
