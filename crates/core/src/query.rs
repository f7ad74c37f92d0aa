//! Query descriptors shared by the stores and the view.

use crate::constants::{FETCH_TIME_FIELD, RESOURCES_COLLECTION};

/// Ordering direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    /// Firestore structured-query spelling.
    pub fn firestore_name(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASCENDING",
            SortDirection::Desc => "DESCENDING",
        }
    }
}

/// A whole-collection query ordered by one field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionQuery {
    pub collection: String,
    /// Dotted field path, e.g. `metadata.fetchTime`.
    pub order_by: String,
    pub direction: SortDirection,
}

impl CollectionQuery {
    pub fn new(
        collection: impl Into<String>,
        order_by: impl Into<String>,
        direction: SortDirection,
    ) -> Self {
        Self {
            collection: collection.into(),
            order_by: order_by.into(),
            direction,
        }
    }
}

/// All resource documents, newest fetch first.
pub fn resources_query() -> CollectionQuery {
    CollectionQuery::new(RESOURCES_COLLECTION, FETCH_TIME_FIELD, SortDirection::Desc)
}
