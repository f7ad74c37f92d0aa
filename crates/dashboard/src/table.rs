//! Table renderer.
//!
//! Maps a projection to header, row and cell models. Nothing here mutates view
//! state: clicks are expressed as [`Intent`]s for the caller to apply.

use crate::format::{RenderContext, TimeCell};
use ehrview_core::{Intent, SortDirection, SortKey, SortSpec, ViewState};
use ehrview_types::DocumentId;
use fhir::{ProcessingState, ResourceRecord};

/// Visual category of a state badge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tone {
    Positive,
    Neutral,
    Informational,
    Negative,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateBadge {
    pub label: &'static str,
    pub tone: Tone,
}

impl StateBadge {
    pub fn for_state(state: ProcessingState) -> Self {
        let tone = match state {
            ProcessingState::Completed => Tone::Positive,
            ProcessingState::Processing => Tone::Informational,
            ProcessingState::Failed => Tone::Negative,
            ProcessingState::NotStarted | ProcessingState::Unspecified => Tone::Neutral,
        };
        Self {
            label: state.label(),
            tone,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderCell {
    pub title: &'static str,
    /// Set for sortable columns.
    pub sort_key: Option<SortKey>,
    /// Set on the column the table is currently sorted by.
    pub indicator: Option<SortDirection>,
}

impl HeaderCell {
    /// The intent raised by clicking this header, if it is sortable.
    pub fn intent(&self) -> Option<Intent> {
        self.sort_key.map(Intent::ToggleSort)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRow {
    /// 1-based position in the projection.
    pub number: usize,
    pub id: DocumentId,
    pub resource_type: String,
    /// Absolute local date-time.
    pub created: TimeCell,
    /// Relative to now.
    pub fetched: TimeCell,
    pub state: StateBadge,
}

impl TableRow {
    /// The intent raised by clicking the row or its resource type.
    pub fn intent(&self) -> Intent {
        Intent::SelectRecord(self.id.clone())
    }
}

/// Why the table has no rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmptyReason {
    NoRecords,
    NoMatches,
}

impl EmptyReason {
    pub fn message(self) -> &'static str {
        match self {
            EmptyReason::NoRecords => "No resources yet.",
            EmptyReason::NoMatches => "No resources match the filter.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableBody {
    Rows(Vec<TableRow>),
    Empty(EmptyReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableView {
    pub headers: Vec<HeaderCell>,
    pub body: TableBody,
}

impl TableView {
    pub fn from_view(view: &ViewState, ctx: &RenderContext) -> Self {
        Self::build(&view.projection(), view.records().len(), view.sort(), ctx)
    }

    /// `total` is the unfiltered record count, used to pick the empty message.
    pub fn build(
        projection: &[&ResourceRecord],
        total: usize,
        sort: SortSpec,
        ctx: &RenderContext,
    ) -> Self {
        let headers = vec![
            header("Resource Type", None, sort),
            header("Created", Some(SortKey::CreatedTime), sort),
            header("Fetched", Some(SortKey::FetchTime), sort),
            header("State", None, sort),
        ];

        let body = if projection.is_empty() {
            TableBody::Empty(if total == 0 {
                EmptyReason::NoRecords
            } else {
                EmptyReason::NoMatches
            })
        } else {
            TableBody::Rows(
                projection
                    .iter()
                    .enumerate()
                    .map(|(index, record)| row(index + 1, record, ctx))
                    .collect(),
            )
        };

        Self { headers, body }
    }

    pub fn rows(&self) -> &[TableRow] {
        match &self.body {
            TableBody::Rows(rows) => rows,
            TableBody::Empty(_) => &[],
        }
    }

    /// Row by its 1-based number.
    pub fn row(&self, number: usize) -> Option<&TableRow> {
        number.checked_sub(1).and_then(|i| self.rows().get(i))
    }
}

fn header(title: &'static str, sort_key: Option<SortKey>, sort: SortSpec) -> HeaderCell {
    HeaderCell {
        title,
        sort_key,
        indicator: sort_key
            .filter(|key| *key == sort.key)
            .map(|_| sort.direction),
    }
}

fn row(number: usize, record: &ResourceRecord, ctx: &RenderContext) -> TableRow {
    let metadata = record.metadata();
    TableRow {
        number,
        id: record.id.clone(),
        resource_type: record.resource_type().to_string(),
        created: TimeCell::absolute(metadata.created_time.as_ref(), ctx),
        fetched: TimeCell::relative(metadata.fetch_time.as_ref(), ctx),
        state: StateBadge::for_state(record.state()),
    }
}
