//! Filtered and sorted view of a snapshot.
//!
//! [`project`] is a pure function of `(records, filter, sort)`: same inputs, same
//! output, no side effects. Sorting is stable so equal timestamps keep their snapshot
//! order. Records whose sort timestamp is missing or unparseable go after every dated
//! record regardless of direction.

use crate::query::SortDirection;
use chrono::{DateTime, Utc};
use fhir::{ResourceRecord, Timestamp};
use std::cmp::Ordering;

/// Timestamp columns the table can be sorted by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortKey {
    CreatedTime,
    FetchTime,
}

impl SortKey {
    pub fn timestamp(self, record: &ResourceRecord) -> Option<&Timestamp> {
        let metadata = record.metadata();
        match self {
            SortKey::CreatedTime => metadata.created_time.as_ref(),
            SortKey::FetchTime => metadata.fetch_time.as_ref(),
        }
    }

    /// Short name accepted by [`std::str::FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            SortKey::CreatedTime => "created",
            SortKey::FetchTime => "fetched",
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "createdtime" | "created_time" => Ok(SortKey::CreatedTime),
            "fetched" | "fetch" | "fetchtime" | "fetch_time" => Ok(SortKey::FetchTime),
            other => Err(format!(
                "unknown sort column {other:?} (expected created or fetched)"
            )),
        }
    }
}

/// Current sort column and direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    /// Newest fetch first, matching the live query order.
    fn default() -> Self {
        Self {
            key: SortKey::FetchTime,
            direction: SortDirection::Desc,
        }
    }
}

impl SortSpec {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Same column flips direction; a new column starts descending.
    pub fn toggled(self, key: SortKey) -> Self {
        if key == self.key {
            Self::new(key, self.direction.flipped())
        } else {
            Self::new(key, SortDirection::Desc)
        }
    }
}

/// Case-insensitive substring match on resource type and state label.
///
/// `needle` must already be lowercased. An empty needle matches everything.
pub fn matches_filter(record: &ResourceRecord, needle: &str) -> bool {
    needle.is_empty()
        || record.resource_type().to_lowercase().contains(needle)
        || record.state().label().to_lowercase().contains(needle)
}

/// Filter then stable-sort `records`.
pub fn project<'a>(
    records: &'a [ResourceRecord],
    filter: &str,
    sort: SortSpec,
) -> Vec<&'a ResourceRecord> {
    let needle = filter.trim().to_lowercase();

    let mut keyed: Vec<(Option<DateTime<Utc>>, &ResourceRecord)> = records
        .iter()
        .filter(|record| matches_filter(record, &needle))
        .map(|record| (sort.key.timestamp(record).and_then(Timestamp::parse), record))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| compare_timestamps(*a, *b, sort.direction));
    keyed.into_iter().map(|(_, record)| record).collect()
}

fn compare_timestamps(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    direction: SortDirection,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            SortDirection::Asc => a.cmp(&b),
            SortDirection::Desc => b.cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrview_types::DocumentId;
    use fhir::{ProcessingState, ResourceData, ResourceMetadata};

    fn record(
        id: &str,
        kind: &str,
        state: ProcessingState,
        created: Option<&str>,
        fetched: Option<&str>,
    ) -> ResourceRecord {
        ResourceRecord::new(
            DocumentId::new(id).expect("id"),
            ResourceData {
                metadata: ResourceMetadata {
                    resource_type: kind.into(),
                    state,
                    created_time: created.map(Timestamp::new),
                    fetch_time: fetched.map(Timestamp::new),
                    ..ResourceMetadata::default()
                },
                ..ResourceData::default()
            },
        )
    }

    fn ids(projection: &[&ResourceRecord]) -> Vec<String> {
        projection.iter().map(|r| r.id.to_string()).collect()
    }

    fn scenario() -> Vec<ResourceRecord> {
        vec![
            record(
                "obs",
                "Observation",
                ProcessingState::Completed,
                Some("2025-01-01T08:00:00Z"),
                Some("2025-01-01T09:00:00Z"),
            ),
            record(
                "cond",
                "Condition",
                ProcessingState::Failed,
                Some("2025-01-01T07:00:00Z"),
                Some("2025-01-01T10:00:00Z"),
            ),
        ]
    }

    #[test]
    fn default_sort_is_newest_fetch_first() {
        let records = scenario();
        let projection = project(&records, "", SortSpec::default());
        assert_eq!(ids(&projection), vec!["cond", "obs"]);
    }

    #[test]
    fn filter_matches_type_case_insensitively() {
        let records = scenario();
        let projection = project(&records, "obs", SortSpec::default());
        assert_eq!(ids(&projection), vec!["obs"]);

        let projection = project(&records, "  CONDI ", SortSpec::default());
        assert_eq!(ids(&projection), vec!["cond"]);
    }

    #[test]
    fn filter_matches_state_label() {
        let records = scenario();
        let projection = project(&records, "failed", SortSpec::default());
        assert_eq!(ids(&projection), vec!["cond"]);

        let projection = project(&records, "complete", SortSpec::default());
        assert_eq!(ids(&projection), vec!["obs"]);
    }

    #[test]
    fn filter_without_matches_is_empty() {
        let records = scenario();
        assert!(project(&records, "medication", SortSpec::default()).is_empty());
        assert!(project(&[], "", SortSpec::default()).is_empty());
    }

    #[test]
    fn filter_membership_is_exact() {
        let records = scenario();
        for needle in ["", "o", "obs", "fail", "x", "tion", "PROC"] {
            let projection = project(&records, needle, SortSpec::default());
            let lowered = needle.trim().to_lowercase();
            for r in &records {
                let expected = matches_filter(r, &lowered);
                let present = projection.iter().any(|p| p.id == r.id);
                assert_eq!(expected, present, "needle {needle:?}, record {}", r.id);
            }
        }
    }

    #[test]
    fn sorts_by_created_in_both_directions() {
        let records = scenario();
        let asc = project(
            &records,
            "",
            SortSpec::new(SortKey::CreatedTime, SortDirection::Asc),
        );
        assert_eq!(ids(&asc), vec!["cond", "obs"]);

        let desc = project(
            &records,
            "",
            SortSpec::new(SortKey::CreatedTime, SortDirection::Desc),
        );
        assert_eq!(ids(&desc), vec!["obs", "cond"]);
    }

    #[test]
    fn equal_timestamps_keep_snapshot_order() {
        let same = Some("2025-01-01T00:00:00Z");
        let records = vec![
            record("a", "Observation", ProcessingState::Completed, same, same),
            record("b", "Observation", ProcessingState::Completed, same, same),
            record("c", "Observation", ProcessingState::Completed, same, same),
        ];
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let projection = project(&records, "", SortSpec::new(SortKey::FetchTime, direction));
            assert_eq!(ids(&projection), vec!["a", "b", "c"]);
        }
    }

    #[test]
    fn equal_instants_in_different_offsets_are_ties() {
        let records = vec![
            record(
                "a",
                "Observation",
                ProcessingState::Completed,
                None,
                Some("2025-01-01T10:00:00+01:00"),
            ),
            record(
                "b",
                "Observation",
                ProcessingState::Completed,
                None,
                Some("2025-01-01T09:00:00Z"),
            ),
        ];
        let projection = project(&records, "", SortSpec::default());
        assert_eq!(ids(&projection), vec!["a", "b"]);
    }

    #[test]
    fn undated_records_sort_last_in_both_directions() {
        let records = vec![
            record("bad", "Observation", ProcessingState::Completed, None, Some("not a date")),
            record(
                "old",
                "Observation",
                ProcessingState::Completed,
                None,
                Some("2025-01-01T00:00:00Z"),
            ),
            record("none", "Observation", ProcessingState::Completed, None, None),
            record(
                "new",
                "Observation",
                ProcessingState::Completed,
                None,
                Some("2025-02-01T00:00:00Z"),
            ),
        ];
        let desc = project(&records, "", SortSpec::new(SortKey::FetchTime, SortDirection::Desc));
        assert_eq!(ids(&desc), vec!["new", "old", "bad", "none"]);
        let asc = project(&records, "", SortSpec::new(SortKey::FetchTime, SortDirection::Asc));
        assert_eq!(ids(&asc), vec!["old", "new", "bad", "none"]);
    }

    #[test]
    fn adjacent_pairs_respect_direction() {
        let records: Vec<ResourceRecord> = (0..12)
            .map(|i| {
                let minute = (i * 7) % 12;
                record(
                    &format!("r{i}"),
                    "Observation",
                    ProcessingState::Completed,
                    None,
                    Some(&format!("2025-01-01T00:{minute:02}:00Z")),
                )
            })
            .collect();

        let desc = project(&records, "", SortSpec::default());
        for pair in desc.windows(2) {
            let a = SortKey::FetchTime.timestamp(pair[0]).and_then(Timestamp::parse);
            let b = SortKey::FetchTime.timestamp(pair[1]).and_then(Timestamp::parse);
            assert!(a >= b);
        }
    }

    #[test]
    fn projection_is_repeatable() {
        let records = scenario();
        let sort = SortSpec::new(SortKey::CreatedTime, SortDirection::Asc);
        let first = ids(&project(&records, "o", sort));
        let second = ids(&project(&records, "o", sort));
        assert_eq!(first, second);
        assert_eq!(records, scenario());
    }

    #[test]
    fn toggling_follows_column_rules() {
        let start = SortSpec::default();
        let created = start.toggled(SortKey::CreatedTime);
        assert_eq!(created, SortSpec::new(SortKey::CreatedTime, SortDirection::Desc));
        let flipped = created.toggled(SortKey::CreatedTime);
        assert_eq!(flipped, SortSpec::new(SortKey::CreatedTime, SortDirection::Asc));
        let back = flipped.toggled(SortKey::FetchTime);
        assert_eq!(back, SortSpec::default());
    }

    #[test]
    fn sort_key_parses_short_names() {
        assert_eq!("created".parse::<SortKey>(), Ok(SortKey::CreatedTime));
        assert_eq!("Fetched".parse::<SortKey>(), Ok(SortKey::FetchTime));
        assert!("state".parse::<SortKey>().is_err());
    }
}
