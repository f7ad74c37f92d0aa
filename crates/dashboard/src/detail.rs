//! Detail panel for one selected record.

use crate::format::{RenderContext, TimeCell, PLACEHOLDER};
use crate::table::StateBadge;
use ehrview_core::view::DetailRef;
use ehrview_core::Intent;
use ehrview_types::DocumentId;

pub const DETAIL_TITLE: &str = "Resource details";

/// One labelled line in the panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetailField {
    pub label: &'static str,
    pub value: String,
    pub title: Option<String>,
}

impl DetailField {
    fn text(label: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label,
            value: if value.trim().is_empty() {
                PLACEHOLDER.to_string()
            } else {
                value
            },
            title: None,
        }
    }

    fn time(label: &'static str, cell: TimeCell) -> Self {
        Self {
            label,
            value: cell.display,
            title: cell.title,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetailView {
    pub title: &'static str,
    pub id: DocumentId,
    /// The record has left the live snapshot; the panel shows the last data seen.
    pub stale: bool,
    pub fields: Vec<DetailField>,
    pub state: StateBadge,
    pub narrative: String,
    pub ai_summary: String,
}

impl DetailView {
    pub fn build(detail: DetailRef<'_>, ctx: &RenderContext) -> Self {
        let record = detail.record;
        let metadata = record.metadata();

        let mut fields = vec![
            DetailField::text("Type", metadata.resource_type.as_str()),
            DetailField::time(
                "Created",
                TimeCell::relative(metadata.created_time.as_ref(), ctx),
            ),
            DetailField::time(
                "Fetched",
                TimeCell::relative(metadata.fetch_time.as_ref(), ctx),
            ),
        ];
        if let Some(processed) = metadata.processed_time.as_ref() {
            fields.push(DetailField::time(
                "Processed",
                TimeCell::relative(Some(processed), ctx),
            ));
        }
        fields.extend([
            DetailField::text("State", metadata.state.label()),
            DetailField::text("FHIR Version", metadata.version.label()),
            DetailField::text("Identifier.key", metadata.identifier.key.as_str()),
            DetailField::text("Identifier.uid", metadata.identifier.uid.as_str()),
            DetailField::text("Identifier.patientId", metadata.identifier.patient_id.as_str()),
        ]);

        Self {
            title: DETAIL_TITLE,
            id: record.id.clone(),
            stale: detail.stale,
            fields,
            state: StateBadge::for_state(metadata.state),
            narrative: non_empty_or_placeholder(&record.data.human_readable),
            ai_summary: record
                .data
                .ai_summary
                .as_deref()
                .map(non_empty_or_placeholder)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        }
    }

    pub fn field(&self, label: &str) -> Option<&DetailField> {
        self.fields.iter().find(|f| f.label == label)
    }

    /// Dismissing the panel.
    pub fn close_intent(&self) -> Intent {
        Intent::CloseDetail
    }
}

fn non_empty_or_placeholder(text: &str) -> String {
    if text.trim().is_empty() {
        PLACEHOLDER.to_string()
    } else {
        text.to_string()
    }
}
