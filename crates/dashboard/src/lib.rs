//! # EHRView Dashboard
//!
//! Presentation layer for the clinical resource dashboard.
//!
//! - [`table`] and [`detail`] turn view state into row, cell and field models and
//!   express clicks as intents; they never mutate state.
//! - [`page`] composes header, seed control, filter, table and detail panel.
//! - [`text`] renders a page for the terminal.
//! - [`session`] drives one mounted page: session, live query, commands, seeding.

pub mod detail;
pub mod format;
pub mod input;
pub mod page;
pub mod session;
pub mod table;
pub mod text;

pub use detail::DetailView;
pub use format::{RenderContext, TimeCell, PLACEHOLDER};
pub use input::{Command, CommandError, RecordRef, HELP};
pub use page::{PageBody, PageConfig, PageView, SeedStatus};
pub use session::{Outcome, PageSession, SessionEvent};
pub use table::{StateBadge, TableView, Tone};
