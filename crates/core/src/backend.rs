//! Backend client adapter.
//!
//! A [`Connector`] is created once by the binary and handed to whatever needs a
//! connection. It hands out the same [`Connection`] for the lifetime of the process;
//! connections are never torn down within a session.
//!
//! [`Connection::ensure_session`] establishes the anonymous identity at most once and
//! every caller (subscription, seeding) waits on the same establishment.

use crate::config::{Endpoints, FirebaseOptions, ProjectIdentity};
use crate::store::{DocumentStore, FirestoreRestStore, MemoryStore, Session};
use crate::{AuthError, ConfigError};
use std::sync::{Arc, Mutex, PoisonError};

/// Hands out the process-wide connection.
#[derive(Debug, Default)]
pub struct Connector {
    slot: Mutex<Option<Connection>>,
}

impl Connector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing connection, or create one from `options`.
    ///
    /// The emulator redirect is applied here, before any query can be issued.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingField`] if a required identity field is absent, or
    /// [`ConfigError::Client`] if the HTTP client cannot be built.
    pub fn connect(&self, options: &FirebaseOptions) -> Result<Connection, ConfigError> {
        self.connect_inner(options, None)
    }

    /// Like [`Connector::connect`], but backed by a caller-provided store.
    pub fn connect_with_store(
        &self,
        options: &FirebaseOptions,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Connection, ConfigError> {
        self.connect_inner(options, Some(store))
    }

    fn connect_inner(
        &self,
        options: &FirebaseOptions,
        store: Option<Arc<dyn DocumentStore>>,
    ) -> Result<Connection, ConfigError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            tracing::debug!("reusing existing backend connection");
            return Ok(existing.clone());
        }

        let identity = ProjectIdentity::from_options(options)?;
        let endpoints = options.endpoints();
        let store: Arc<dyn DocumentStore> = match store {
            Some(store) => store,
            None if options.in_memory => Arc::new(MemoryStore::new()),
            None => Arc::new(FirestoreRestStore::new(
                identity.clone(),
                endpoints.clone(),
                options.poll_interval,
            )?),
        };

        tracing::info!(
            project = %identity.project_id,
            store = store.describe(),
            emulated = endpoints.emulated,
            "backend connection created"
        );

        let connection = Connection {
            inner: Arc::new(ConnectionInner {
                identity,
                endpoints,
                store,
                session: tokio::sync::Mutex::new(None),
            }),
        };
        *slot = Some(connection.clone());
        Ok(connection)
    }
}

/// Shared handle to the backend. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    identity: ProjectIdentity,
    endpoints: Endpoints,
    store: Arc<dyn DocumentStore>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("project_id", &self.inner.identity.project_id)
            .field("store", &self.inner.store.describe())
            .field("emulated", &self.inner.endpoints.emulated)
            .finish()
    }
}

impl Connection {
    pub fn identity(&self) -> &ProjectIdentity {
        &self.inner.identity
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    /// Whether two handles refer to the same underlying connection.
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The identity established so far, if any.
    pub async fn current_user(&self) -> Option<Session> {
        self.inner.session.lock().await.clone()
    }

    /// Establish an anonymous identity unless one already exists.
    ///
    /// Concurrent callers wait for the same sign-in. A failed sign-in leaves no
    /// identity behind, so a later call tries again.
    pub async fn ensure_session(&self) -> Result<Session, AuthError> {
        let mut current = self.inner.session.lock().await;
        if let Some(session) = current.as_ref() {
            return Ok(session.clone());
        }

        let session = self.inner.store.sign_in_anonymously().await.map_err(|err| {
            tracing::warn!("anonymous sign-in failed: {err}");
            err
        })?;
        tracing::info!(uid = session.uid(), "anonymous session established");
        *current = Some(session.clone());
        Ok(session)
    }
}
