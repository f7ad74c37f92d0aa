//! Local view state machine.
//!
//! Holds everything the page shows: the latest snapshot, the filter text, the sort
//! column and the detail selection. The projection is derived on every read from
//! `(records, filter, sort)`; nothing is cached.
//!
//! ```text
//! Loading --on_snapshot--> Ready
//!                            |-- DetailClosed <--close_detail-- DetailOpen(id)
//!                            '-- select_record(id) ------------------^
//! ```
//!
//! All transitions are applied from a single task, so the state needs no locking.

use crate::projection::{project, SortKey, SortSpec};
use crate::ViewError;
use ehrview_types::DocumentId;
use fhir::ResourceRecord;

/// Whether any snapshot has arrived yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadPhase {
    #[default]
    Loading,
    Ready,
}

/// Health of the live query feeding this view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StreamStatus {
    #[default]
    Live,
    /// The subscription ended with an error. Holds the message shown to the user.
    Broken(String),
}

/// A user intent raised by the table or the detail panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    SetFilter(String),
    ToggleSort(SortKey),
    SelectRecord(DocumentId),
    CloseDetail,
}

/// The open detail selection.
///
/// `last_seen` is refreshed on every snapshot that still contains the id, so the panel
/// can keep showing consistent data after the record disappears.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub id: DocumentId,
    pub last_seen: ResourceRecord,
}

/// The record bound to the detail panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetailRef<'a> {
    pub record: &'a ResourceRecord,
    /// The record is no longer in the latest snapshot.
    pub stale: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ViewState {
    phase: LoadPhase,
    stream: StreamStatus,
    records: Vec<ResourceRecord>,
    filter: String,
    sort: SortSpec,
    selection: Option<Selection>,
    snapshots: u64,
}

impl ViewState {
    /// A fresh view in `Loading`, sorted by fetch time descending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record list with `records`.
    ///
    /// The first call moves the view to `Ready`. Filter, sort and selection survive,
    /// including a selection whose record is no longer present.
    pub fn on_snapshot(&mut self, records: Vec<ResourceRecord>) {
        if let Some(selection) = self.selection.as_mut() {
            if let Some(current) = records.iter().find(|r| r.id == selection.id) {
                selection.last_seen = current.clone();
            }
        }
        self.records = records;
        self.phase = LoadPhase::Ready;
        self.snapshots += 1;
        tracing::debug!(
            records = self.records.len(),
            snapshot = self.snapshots,
            "snapshot applied"
        );
    }

    /// Mark the live query as terminated. The last good snapshot is kept.
    pub fn on_stream_error(&mut self, message: impl Into<String>) {
        self.stream = StreamStatus::Broken(message.into());
    }

    pub fn set_filter(&mut self, text: impl Into<String>) {
        self.filter = text.into();
    }

    pub fn toggle_sort(&mut self, key: SortKey) {
        self.sort = self.sort.toggled(key);
    }

    pub fn set_sort(&mut self, sort: SortSpec) {
        self.sort = sort;
    }

    /// Open (or retarget) the detail panel.
    ///
    /// # Errors
    ///
    /// [`ViewError::UnknownRecord`] if `id` is not in the current snapshot. The
    /// previous selection is left untouched in that case.
    pub fn select_record(&mut self, id: &DocumentId) -> Result<(), ViewError> {
        let record = self
            .records
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| ViewError::UnknownRecord(id.clone()))?;
        self.selection = Some(Selection {
            id: id.clone(),
            last_seen: record.clone(),
        });
        Ok(())
    }

    pub fn close_detail(&mut self) {
        self.selection = None;
    }

    pub fn apply(&mut self, intent: Intent) -> Result<(), ViewError> {
        match intent {
            Intent::SetFilter(text) => self.set_filter(text),
            Intent::ToggleSort(key) => self.toggle_sort(key),
            Intent::SelectRecord(id) => self.select_record(&id)?,
            Intent::CloseDetail => self.close_detail(),
        }
        Ok(())
    }

    /// Filtered and sorted records, recomputed on each call.
    pub fn projection(&self) -> Vec<&ResourceRecord> {
        project(&self.records, &self.filter, self.sort)
    }

    /// The record the detail panel shows, if it is open.
    ///
    /// Resolves against the latest snapshot first and falls back to the last data seen
    /// for the selected id.
    pub fn detail(&self) -> Option<DetailRef<'_>> {
        let selection = self.selection.as_ref()?;
        Some(match self.records.iter().find(|r| r.id == selection.id) {
            Some(record) => DetailRef {
                record,
                stale: false,
            },
            None => DetailRef {
                record: &selection.last_seen,
                stale: true,
            },
        })
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == LoadPhase::Loading
    }

    pub fn stream(&self) -> &StreamStatus {
        &self.stream
    }

    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Number of snapshots applied so far.
    pub fn snapshot_count(&self) -> u64 {
        self.snapshots
    }
}
