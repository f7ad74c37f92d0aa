//! Backend configuration.
//!
//! Configuration is resolved once at process startup and then passed into the
//! connector and the page. Nothing below the binaries reads process environment
//! variables; use [`FirebaseOptions::from_lookup`] to supply values from anywhere else.

use crate::constants::{
    env, AUTH_BASE_URL, AUTH_EMULATOR_URL, DEFAULT_POLL_INTERVAL, FIRESTORE_BASE_URL,
    FIRESTORE_EMULATOR_URL, SECURE_TOKEN_BASE_URL, SECURE_TOKEN_EMULATOR_URL,
};
use crate::ConfigError;
use ehrview_types::NonEmptyText;
use std::time::Duration;

/// Raw configuration bundle as provided by the environment.
///
/// Identity fields are optional here; [`ProjectIdentity::from_options`] decides whether
/// the bundle is complete when a connection is created.
#[derive(Clone, Debug)]
pub struct FirebaseOptions {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    /// Redirect to the local emulators instead of the managed service.
    pub use_emulators: bool,
    /// Expose the demo seed control.
    pub allow_demo_seed: bool,
    /// Use the in-process store instead of Firestore.
    pub in_memory: bool,
    /// Refresh interval of the Firestore REST listener.
    pub poll_interval: Duration,
}

impl Default for FirebaseOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_domain: None,
            project_id: None,
            storage_bucket: None,
            messaging_sender_id: None,
            app_id: None,
            use_emulators: false,
            allow_demo_seed: false,
            in_memory: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl FirebaseOptions {
    /// Read options from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read options through `lookup`, which maps a variable name to its value.
    ///
    /// Blank values count as absent. Flags accept `true`/`false`/`1`/`0`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let poll_interval = match text(env::POLL_INTERVAL_MS) {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .ok_or(ConfigError::InvalidValue {
                    key: env::POLL_INTERVAL_MS,
                    value: raw,
                })?,
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            api_key: text(env::API_KEY),
            auth_domain: text(env::AUTH_DOMAIN),
            project_id: text(env::PROJECT_ID),
            storage_bucket: text(env::STORAGE_BUCKET),
            messaging_sender_id: text(env::SENDER_ID),
            app_id: text(env::APP_ID),
            use_emulators: flag_from_env_value(env::USE_EMULATORS, text(env::USE_EMULATORS))?,
            allow_demo_seed: flag_from_env_value(
                env::ALLOW_DEMO_SEED,
                text(env::ALLOW_DEMO_SEED),
            )?,
            in_memory: flag_from_env_value(env::IN_MEMORY, text(env::IN_MEMORY))?,
            poll_interval,
        })
    }

    /// Endpoints selected by the emulator flag.
    pub fn endpoints(&self) -> Endpoints {
        if self.use_emulators {
            Endpoints::emulator()
        } else {
            Endpoints::managed()
        }
    }
}

/// Parse a boolean flag from an optional string value.
///
/// `None` is `false`.
pub fn flag_from_env_value(key: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

/// Validated project identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectIdentity {
    pub api_key: NonEmptyText,
    pub auth_domain: NonEmptyText,
    pub project_id: NonEmptyText,
    pub storage_bucket: Option<NonEmptyText>,
    pub messaging_sender_id: Option<NonEmptyText>,
    pub app_id: Option<NonEmptyText>,
}

impl ProjectIdentity {
    /// Build the identity, failing on the first missing required field.
    pub fn from_options(options: &FirebaseOptions) -> Result<Self, ConfigError> {
        let required = |value: &Option<String>, key: &'static str| {
            NonEmptyText::from_optional(value.as_deref()).ok_or(ConfigError::MissingField(key))
        };

        Ok(Self {
            api_key: required(&options.api_key, env::API_KEY)?,
            auth_domain: required(&options.auth_domain, env::AUTH_DOMAIN)?,
            project_id: required(&options.project_id, env::PROJECT_ID)?,
            storage_bucket: NonEmptyText::from_optional(options.storage_bucket.as_deref()),
            messaging_sender_id: NonEmptyText::from_optional(
                options.messaging_sender_id.as_deref(),
            ),
            app_id: NonEmptyText::from_optional(options.app_id.as_deref()),
        })
    }
}

/// REST base URLs for the document database and the auth services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub firestore: String,
    pub auth: String,
    /// ID token refresh.
    pub secure_token: String,
    pub emulated: bool,
}

impl Endpoints {
    pub fn managed() -> Self {
        Self {
            firestore: FIRESTORE_BASE_URL.into(),
            auth: AUTH_BASE_URL.into(),
            secure_token: SECURE_TOKEN_BASE_URL.into(),
            emulated: false,
        }
    }

    pub fn emulator() -> Self {
        Self {
            firestore: FIRESTORE_EMULATOR_URL.into(),
            auth: AUTH_EMULATOR_URL.into(),
            secure_token: SECURE_TOKEN_EMULATOR_URL.into(),
            emulated: true,
        }
    }
}
