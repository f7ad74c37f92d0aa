//! Constants used throughout the ehrview core crate.
//!
//! Collection paths, field paths and endpoint defaults live here so the store
//! implementations and the query builder agree on them.

use std::time::Duration;

/// Logical path of the resource collection.
pub const RESOURCES_COLLECTION: &str = "ehrResources";

/// Field path the live query orders by. Renaming it needs a data migration.
pub const FETCH_TIME_FIELD: &str = "metadata.fetchTime";

/// Managed Firestore REST base URL.
pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Managed Identity Toolkit (auth) REST base URL.
pub const AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Managed Secure Token (ID token refresh) REST base URL.
pub const SECURE_TOKEN_BASE_URL: &str = "https://securetoken.googleapis.com/v1";

/// Firestore emulator REST base URL.
pub const FIRESTORE_EMULATOR_URL: &str = "http://127.0.0.1:8080/v1";

/// Auth emulator REST base URL.
pub const AUTH_EMULATOR_URL: &str = "http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1";

/// Secure Token emulator REST base URL.
pub const SECURE_TOKEN_EMULATOR_URL: &str = "http://127.0.0.1:9099/securetoken.googleapis.com/v1";

/// ID tokens are renewed this long before they expire.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Lifetime assumed when the auth backend does not state one.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3_600);

/// Default refresh interval of the Firestore REST listener.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

/// Number of documents the demo seed control writes.
pub const DEFAULT_SEED_COUNT: usize = 24;

/// Capacity of the snapshot channel between a store listener and its subscriber.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Environment variable names.
pub mod env {
    pub const API_KEY: &str = "FIREBASE_API_KEY";
    pub const AUTH_DOMAIN: &str = "FIREBASE_AUTH_DOMAIN";
    pub const PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
    pub const STORAGE_BUCKET: &str = "FIREBASE_STORAGE_BUCKET";
    pub const SENDER_ID: &str = "FIREBASE_SENDER_ID";
    pub const APP_ID: &str = "FIREBASE_APP_ID";
    pub const USE_EMULATORS: &str = "EHRVIEW_USE_EMULATORS";
    pub const ALLOW_DEMO_SEED: &str = "EHRVIEW_ALLOW_DEMO_SEED";
    pub const IN_MEMORY: &str = "EHRVIEW_IN_MEMORY";
    pub const POLL_INTERVAL_MS: &str = "EHRVIEW_POLL_INTERVAL_MS";
}
