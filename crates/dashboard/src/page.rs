//! Page composition: header, seed control, filter, table and detail panel.

use crate::detail::DetailView;
use crate::format::RenderContext;
use crate::table::TableView;
use ehrview_core::constants::DEFAULT_SEED_COUNT;
use ehrview_core::{FirebaseOptions, SeedError, SeedReport, StreamStatus, ViewState};

pub const PAGE_TITLE: &str = "EHR Resources";

/// Page-level settings resolved once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageConfig {
    pub title: String,
    /// Shows the seed control.
    pub allow_demo_seed: bool,
    pub seed_count: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            title: PAGE_TITLE.to_string(),
            allow_demo_seed: false,
            seed_count: DEFAULT_SEED_COUNT,
        }
    }
}

impl PageConfig {
    pub fn from_options(options: &FirebaseOptions) -> Self {
        Self {
            allow_demo_seed: options.allow_demo_seed,
            ..Self::default()
        }
    }
}

/// Lifecycle of the seed control.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SeedStatus {
    #[default]
    Ready,
    Pending,
    /// Finished successfully; the control stays disabled.
    Seeded(usize),
    /// Stopped early; the control is enabled again.
    Failed {
        written: usize,
        requested: usize,
        message: String,
    },
}

impl SeedStatus {
    /// Status after a seeding run, whatever its outcome.
    pub fn finished(result: &Result<SeedReport, SeedError>, requested: usize) -> Self {
        match result {
            Ok(report) => SeedStatus::Seeded(report.written),
            Err(err) => SeedStatus::Failed {
                written: err.written(),
                requested,
                message: err.to_string(),
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, SeedStatus::Ready | SeedStatus::Failed { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SeedStatus::Pending)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedControl {
    pub label: &'static str,
    pub enabled: bool,
    pub note: String,
}

impl SeedControl {
    pub fn for_status(status: &SeedStatus) -> Self {
        let (label, note) = match status {
            SeedStatus::Ready => (
                "Seed demo data",
                "Populates the collection with example docs.".to_string(),
            ),
            SeedStatus::Pending => ("Seeding…", "Writing example docs.".to_string()),
            SeedStatus::Seeded(n) => ("Seeded!", format!("Wrote {n} example docs.")),
            SeedStatus::Failed {
                written,
                requested,
                message,
            } => (
                "Seed demo data",
                format!("Seeding stopped after {written} of {requested} docs: {message}"),
            ),
        };
        Self {
            label,
            enabled: status.is_enabled(),
            note,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    /// Absent unless demo seeding is allowed.
    pub seed: Option<SeedControl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyView {
    pub filter: String,
    pub table: TableView,
    pub detail: Option<DetailView>,
    /// Set when the live query has stopped; the table shows the last good snapshot.
    pub stream_notice: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageBody {
    /// Configuration or session failure. Nothing else is rendered.
    Failed { heading: String, message: String },
    /// No snapshot yet. `interrupted` is set when the stream failed before the first one.
    Loading { interrupted: Option<String> },
    Ready(ReadyView),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageView {
    pub header: Header,
    pub body: PageBody,
}

impl PageView {
    pub fn build(
        config: &PageConfig,
        view: &ViewState,
        seed: &SeedStatus,
        ctx: &RenderContext,
    ) -> Self {
        let header = Header {
            title: config.title.clone(),
            seed: config
                .allow_demo_seed
                .then(|| SeedControl::for_status(seed)),
        };

        let notice = match view.stream() {
            StreamStatus::Live => None,
            StreamStatus::Broken(message) => Some(format!("Data stream interrupted: {message}")),
        };

        let body = if view.is_loading() {
            PageBody::Loading {
                interrupted: notice,
            }
        } else {
            PageBody::Ready(ReadyView {
                filter: view.filter().to_string(),
                table: TableView::from_view(view, ctx),
                detail: view.detail().map(|detail| DetailView::build(detail, ctx)),
                stream_notice: notice,
            })
        };

        Self { header, body }
    }

    /// A page that shows only the error, used when startup cannot complete.
    pub fn failed(
        config: &PageConfig,
        heading: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self {
            header: Header {
                title: config.title.clone(),
                seed: None,
            },
            body: PageBody::Failed {
                heading: heading.into(),
                message: message.to_string(),
            },
        }
    }

    pub fn ready(&self) -> Option<&ReadyView> {
        match &self.body {
            PageBody::Ready(ready) => Some(ready),
            _ => None,
        }
    }
}
