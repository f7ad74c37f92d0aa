//! Firestore-backed document store over the public REST API.
//!
//! - Sessions come from Identity Toolkit `accounts:signUp` (anonymous sign-up). ID
//!   tokens are renewed through the Secure Token `token` endpoint shortly before they
//!   expire, ahead of any poll or insert that would use them.
//! - Inserts use the collection `createDocument` endpoint with an auto-generated id.
//! - Firestore REST has no push channel, so a listener re-runs the structured query at a
//!   fixed interval and emits a full snapshot whenever the result changed. The first
//!   result is always emitted. A failed poll ends the listener with an error.

use super::firestore_value::{decode_fields, encode_fields};
use super::{
    DocumentStore, IdToken, RawDocument, RawSnapshot, Session, SnapshotFeed, SnapshotSink,
};
use crate::config::{Endpoints, ProjectIdentity};
use crate::constants::DEFAULT_TOKEN_LIFETIME;
use crate::query::CollectionQuery;
use crate::{AuthError, ConfigError, StoreError};
use async_trait::async_trait;
use ehrview_types::DocumentId;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

/// HTTP client timeout for backend requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Document store talking to Firestore (or its emulator) over HTTPS.
#[derive(Clone, Debug)]
pub struct FirestoreRestStore {
    http: reqwest::Client,
    tokens: TokenRefresher,
    identity: ProjectIdentity,
    endpoints: Endpoints,
    poll_interval: Duration,
}

impl FirestoreRestStore {
    pub fn new(
        identity: ProjectIdentity,
        endpoints: Endpoints,
        poll_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        let tokens = TokenRefresher {
            http: http.clone(),
            url: refresh_url(&endpoints, &identity),
        };

        Ok(Self {
            http,
            tokens,
            identity,
            endpoints,
            poll_interval,
        })
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.endpoints.firestore, self.identity.project_id
        )
    }

    fn sign_up_url(&self) -> String {
        format!(
            "{}/accounts:signUp?key={}",
            self.endpoints.auth, self.identity.api_key
        )
    }
}

#[async_trait]
impl DocumentStore for FirestoreRestStore {
    async fn sign_in_anonymously(&self) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.sign_up_url())
            .json(&json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected(error_message(&body)));
        }

        parse_sign_up(&body)
    }

    async fn add_document(
        &self,
        session: &Session,
        collection: &str,
        document: Value,
    ) -> Result<DocumentId, StoreError> {
        let url = format!("{}/{}", self.documents_root(), collection);
        let body = json!({ "fields": encode_fields(&document)? });

        let mut request = self.http.post(url).json(&body);
        if let Some(token) = self.tokens.bearer(session).await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }

        let created: FirestoreDocument =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(DocumentId::from_resource_name(&created.name)?)
    }

    fn listen(&self, session: &Session, query: &CollectionQuery) -> SnapshotFeed {
        let (sink, feed) = SnapshotFeed::channel();
        let poller = Poller {
            http: self.http.clone(),
            url: format!("{}:runQuery", self.documents_root()),
            tokens: self.tokens.clone(),
            session: session.clone(),
            body: run_query_body(query),
            interval: self.poll_interval,
        };
        tokio::spawn(poller.run(sink));
        feed
    }

    fn describe(&self) -> &'static str {
        if self.endpoints.emulated {
            "firestore-emulator"
        } else {
            "firestore"
        }
    }
}

/// Renews ID tokens held by sessions.
#[derive(Clone, Debug)]
struct TokenRefresher {
    http: reqwest::Client,
    url: String,
}

impl TokenRefresher {
    /// Current bearer token for `session`, renewed first when it is close to expiry.
    ///
    /// Holding the session's token lock across the renewal makes concurrent callers
    /// wait for one refresh instead of each issuing their own.
    async fn bearer(&self, session: &Session) -> Result<Option<String>, StoreError> {
        let Some(slot) = session.token_slot() else {
            return Ok(None);
        };
        let mut token = slot.lock().await;
        if token.needs_refresh(Instant::now()) {
            let renewed = self.refresh(token.refresh_token()).await?;
            *token = renewed;
            tracing::debug!(uid = session.uid(), "id token refreshed");
        }
        Ok(Some(token.value().to_owned()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IdToken, AuthError> {
        let response = self
            .http
            .post(&self.url)
            .json(&refresh_body(refresh_token))
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected(error_message(&body)));
        }
        parse_refresh(&body)
    }
}

/// One listener's polling loop.
struct Poller {
    http: reqwest::Client,
    url: String,
    tokens: TokenRefresher,
    session: Session,
    body: Value,
    interval: Duration,
}

impl Poller {
    async fn run(self, sink: SnapshotSink) {
        let mut last_seen: Option<Vec<(String, Option<String>)>> = None;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = sink.cancelled() => return,
                fetched = self.fetch() => fetched,
            };

            match fetched {
                Ok(documents) => {
                    let signature = change_signature(&documents);
                    if last_seen.as_ref() != Some(&signature) {
                        let snapshot = match into_snapshot(documents) {
                            Ok(snapshot) => snapshot,
                            Err(err) => {
                                tracing::error!("firestore listener stopped: {err}");
                                sink.deliver(Err(err)).await;
                                return;
                            }
                        };
                        tracing::debug!(documents = snapshot.len(), "firestore result changed");
                        if !sink.deliver(Ok(snapshot)).await {
                            return;
                        }
                        last_seen = Some(signature);
                    }
                }
                Err(err) => {
                    tracing::error!("firestore listener stopped: {err}");
                    sink.deliver(Err(err)).await;
                    return;
                }
            }

            tokio::select! {
                _ = sink.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<FirestoreDocument>, StoreError> {
        let mut request = self.http.post(&self.url).json(&self.body);
        if let Some(token) = self.tokens.bearer(&self.session).await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }
        parse_run_query(&text)
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    local_id: String,
    #[serde(default)]
    expires_in: Option<String>,
}

/// Secure Token answers in snake_case, unlike Identity Toolkit.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn refresh_url(endpoints: &Endpoints, identity: &ProjectIdentity) -> String {
    format!("{}/token?key={}", endpoints.secure_token, identity.api_key)
}

fn refresh_body(refresh_token: &str) -> Value {
    json!({ "grant_type": "refresh_token", "refresh_token": refresh_token })
}

/// `expiresIn` is a decimal string of seconds.
fn token_lifetime(expires_in: Option<&str>) -> Duration {
    expires_in
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs)
}

fn parse_sign_up(body: &str) -> Result<Session, AuthError> {
    let parsed: SignUpResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::Rejected(format!("unexpected sign-up response: {e}")))?;
    let token = IdToken::new(
        parsed.id_token,
        parsed.refresh_token,
        token_lifetime(parsed.expires_in.as_deref()),
    );
    Ok(Session::new(parsed.local_id, Some(token)))
}

fn parse_refresh(body: &str) -> Result<IdToken, AuthError> {
    let parsed: RefreshResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::Rejected(format!("unexpected token refresh response: {e}")))?;
    Ok(IdToken::new(
        parsed.id_token,
        parsed.refresh_token,
        token_lifetime(parsed.expires_in.as_deref()),
    ))
}

fn run_query_body(query: &CollectionQuery) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": query.collection }],
            "orderBy": [{
                "field": { "fieldPath": query.order_by },
                "direction": query.direction.firestore_name(),
            }],
        }
    })
}

/// `runQuery` answers with one item per result plus items that only carry a read time.
fn parse_run_query(body: &str) -> Result<Vec<FirestoreDocument>, StoreError> {
    let items: Vec<RunQueryItem> =
        serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(items.into_iter().filter_map(|item| item.document).collect())
}

fn change_signature(documents: &[FirestoreDocument]) -> Vec<(String, Option<String>)> {
    documents
        .iter()
        .map(|doc| (doc.name.clone(), doc.update_time.clone()))
        .collect()
}

fn into_snapshot(documents: Vec<FirestoreDocument>) -> Result<RawSnapshot, StoreError> {
    documents
        .into_iter()
        .map(|doc| {
            Ok(RawDocument {
                id: DocumentId::from_resource_name(&doc.name)?,
                data: decode_fields(&doc.fields),
            })
        })
        .collect()
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

fn classify_failure(status: u16, body: &str) -> StoreError {
    let message = error_message(body);
    match status {
        401 | 403 => StoreError::PermissionDenied(message),
        _ => StoreError::Rejected { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::resources_query;
    use ehrview_types::NonEmptyText;

    fn store(endpoints: Endpoints) -> FirestoreRestStore {
        let identity = ProjectIdentity {
            api_key: NonEmptyText::new("key-123").expect("text"),
            auth_domain: NonEmptyText::new("demo.firebaseapp.com").expect("text"),
            project_id: NonEmptyText::new("demo-project").expect("text"),
            storage_bucket: None,
            messaging_sender_id: None,
            app_id: None,
        };
        FirestoreRestStore::new(identity, endpoints, Duration::from_millis(50)).expect("client")
    }

    #[test]
    fn urls_follow_selected_endpoints() {
        let managed = store(Endpoints::managed());
        assert_eq!(
            managed.documents_root(),
            concat!(
                "https://firestore.googleapis.com/v1/projects/demo-project",
                "/databases/(default)/documents"
            )
        );
        assert_eq!(
            managed.sign_up_url(),
            "https://identitytoolkit.googleapis.com/v1/accounts:signUp?key=key-123"
        );
        assert_eq!(managed.describe(), "firestore");

        let emulated = store(Endpoints::emulator());
        assert!(emulated
            .documents_root()
            .starts_with("http://127.0.0.1:8080/v1/projects/demo-project"));
        assert!(emulated
            .sign_up_url()
            .starts_with("http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1/"));
        assert_eq!(emulated.describe(), "firestore-emulator");

        assert_eq!(
            managed.tokens.url,
            "https://securetoken.googleapis.com/v1/token?key=key-123"
        );
        assert_eq!(
            emulated.tokens.url,
            "http://127.0.0.1:9099/securetoken.googleapis.com/v1/token?key=key-123"
        );
    }

    #[tokio::test]
    async fn sign_up_keeps_refresh_token_and_expiry() {
        let session = parse_sign_up(
            r#"{"kind": "identitytoolkit#SignupNewUserResponse", "idToken": "id-1",
                "refreshToken": "refresh-1", "expiresIn": "3600", "localId": "uid-1"}"#,
        )
        .expect("sign-up");
        assert_eq!(session.uid(), "uid-1");

        let token = session.token_slot().expect("token").lock().await.clone();
        assert_eq!(token.value(), "id-1");
        assert_eq!(token.refresh_token(), "refresh-1");
        assert!(!token.needs_refresh(Instant::now()));
        assert!(token.needs_refresh(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn sign_up_without_refresh_token_is_rejected() {
        let err = parse_sign_up(r#"{"idToken": "id-1", "localId": "uid-1"}"#).expect_err("missing");
        assert!(matches!(err, AuthError::Rejected(msg) if msg.contains("refreshToken")));
    }

    #[test]
    fn refresh_exchange_uses_secure_token_shapes() {
        let body = refresh_body("refresh-1");
        assert_eq!(body["grant_type"], "refresh_token");
        assert_eq!(body["refresh_token"], "refresh-1");

        let renewed = parse_refresh(
            r#"{"expires_in": "1800", "token_type": "Bearer", "refresh_token": "refresh-2",
                "id_token": "id-2", "user_id": "uid-1", "project_id": "123"}"#,
        )
        .expect("refresh");
        assert_eq!(renewed.value(), "id-2");
        assert_eq!(renewed.refresh_token(), "refresh-2");
        assert!(!renewed.needs_refresh(Instant::now() + Duration::from_secs(1000)));
        assert!(renewed.needs_refresh(Instant::now() + Duration::from_secs(1800)));
    }

    #[test]
    fn token_lifetime_falls_back_to_default() {
        assert_eq!(token_lifetime(Some("120")), Duration::from_secs(120));
        assert_eq!(token_lifetime(Some("soon")), DEFAULT_TOKEN_LIFETIME);
        assert_eq!(token_lifetime(None), DEFAULT_TOKEN_LIFETIME);
    }

    #[tokio::test]
    async fn fresh_token_is_used_without_refreshing() {
        let firestore = store(Endpoints::managed());
        let session = Session::new(
            "uid-1",
            Some(IdToken::new("id-1", "refresh-1", Duration::from_secs(3600))),
        );
        let bearer = firestore.tokens.bearer(&session).await.expect("bearer");
        assert_eq!(bearer.as_deref(), Some("id-1"));

        let anonymous = Session::new("local", None);
        assert_eq!(firestore.tokens.bearer(&anonymous).await.expect("bearer"), None);
    }

    #[test]
    fn run_query_orders_by_fetch_time_descending() {
        let body = run_query_body(&resources_query());
        let structured = &body["structuredQuery"];
        assert_eq!(structured["from"][0]["collectionId"], "ehrResources");
        assert_eq!(
            structured["orderBy"][0]["field"]["fieldPath"],
            "metadata.fetchTime"
        );
        assert_eq!(structured["orderBy"][0]["direction"], "DESCENDING");
    }

    #[test]
    fn parses_run_query_results_in_order() {
        let body = r#"[
            {"document": {
                "name": "projects/demo-project/databases/(default)/documents/ehrResources/B",
                "fields": {"metadata": {"mapValue": {"fields": {
                    "resourceType": {"stringValue": "Condition"}
                }}}},
                "updateTime": "2025-01-02T00:00:00Z"
            }, "readTime": "2025-01-03T00:00:00Z"},
            {"document": {
                "name": "projects/demo-project/databases/(default)/documents/ehrResources/A",
                "fields": {},
                "updateTime": "2025-01-01T00:00:00Z"
            }}
        ]"#;

        let documents = parse_run_query(body).expect("parse");
        let snapshot = into_snapshot(documents).expect("snapshot");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id.as_str(), "B");
        assert_eq!(snapshot[0].data["metadata"]["resourceType"], "Condition");
        assert_eq!(snapshot[1].id.as_str(), "A");
    }

    #[test]
    fn empty_collection_yields_empty_snapshot() {
        let documents =
            parse_run_query(r#"[{"readTime": "2025-01-03T00:00:00Z"}]"#).expect("parse");
        assert!(documents.is_empty());
    }

    #[test]
    fn signature_changes_when_a_document_is_updated() {
        let doc = |time: &str| FirestoreDocument {
            name: "projects/p/databases/(default)/documents/ehrResources/A".into(),
            fields: Map::new(),
            update_time: Some(time.into()),
        };
        assert_ne!(
            change_signature(&[doc("2025-01-01T00:00:00Z")]),
            change_signature(&[doc("2025-01-02T00:00:00Z")])
        );
        assert_eq!(
            change_signature(&[doc("2025-01-01T00:00:00Z")]),
            change_signature(&[doc("2025-01-01T00:00:00Z")])
        );
    }

    #[test]
    fn classifies_backend_failures() {
        let denied = classify_failure(
            403,
            r#"{"error": {"code": 403, "status": "PERMISSION_DENIED",
                "message": "Missing or insufficient permissions."}}"#,
        );
        assert!(
            matches!(denied, StoreError::PermissionDenied(ref msg) if msg.starts_with("Missing"))
        );

        let unavailable = classify_failure(503, "upstream unavailable");
        assert!(matches!(
            unavailable,
            StoreError::Rejected { status: 503, message } if message == "upstream unavailable"
        ));
    }
}
