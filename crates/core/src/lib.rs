//! # EHRView Core
//!
//! Live view synchronisation for the clinical resource dashboard.
//!
//! This crate owns everything between the document database and the page:
//! - Backend connection and anonymous session ([`backend`])
//! - Full-snapshot live query over the resource collection ([`subscription`])
//! - Client-side view state with filter, sort and detail selection ([`view`],
//!   [`projection`])
//! - Environment-gated demo seeding ([`seed`])
//! - Document stores: Firestore over REST and an in-process store ([`store`])
//!
//! **No presentation concerns**: table, detail panel and page rendering belong in
//! `ehrview-dashboard`.

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod projection;
pub mod query;
pub mod seed;
pub mod store;
pub mod subscription;
pub mod view;

pub use backend::{Connection, Connector};
pub use config::{Endpoints, FirebaseOptions, ProjectIdentity};
pub use error::{AuthError, ConfigError, SeedError, StoreError, SubscriptionError, ViewError};
pub use projection::{project, SortKey, SortSpec};
pub use query::{resources_query, CollectionQuery, SortDirection};
pub use seed::{seed, SeedReport};
pub use store::{DocumentStore, IdToken, Session};
pub use subscription::{subscribe, Subscription};
pub use view::{DetailRef, Intent, LoadPhase, StreamStatus, ViewState};
