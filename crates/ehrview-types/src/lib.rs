//! Small validated primitives shared by every ehrview crate.
//!
//! - [`NonEmptyText`] for configuration identity fields and other required text.
//! - [`DocumentId`] for backend-assigned document identifiers.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input contained a character that is not allowed in a document id
    #[error("document id contains an invalid character: {0:?}")]
    InvalidIdCharacter(char),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Like [`NonEmptyText::new`], but treats `None` and blank input alike.
    pub fn from_optional(input: Option<impl AsRef<str>>) -> Option<Self> {
        input.and_then(|s| Self::new(s).ok())
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifier assigned by the document store when a document is inserted.
///
/// It is attached to a record at read time and is never part of the stored payload.
/// Ids are opaque: any non-empty string without `/` or whitespace is accepted, which
/// covers both Firestore auto-ids and ids minted by the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    /// Validates and wraps a document id.
    pub fn new(input: impl Into<String>) -> Result<Self, TextError> {
        let id = input.into();
        if id.is_empty() {
            return Err(TextError::Empty);
        }
        if let Some(bad) = id.chars().find(|c| *c == '/' || c.is_whitespace()) {
            return Err(TextError::InvalidIdCharacter(bad));
        }
        Ok(Self(id))
    }

    /// Extracts the id from a full document resource name such as
    /// `projects/p/databases/(default)/documents/ehrResources/abc123`.
    pub fn from_resource_name(name: &str) -> Result<Self, TextError> {
        let last = name.rsplit('/').next().unwrap_or_default();
        Self::new(last)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for DocumentId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl serde::Serialize for DocumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DocumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DocumentId::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  demo-project ").expect("valid text");
        assert_eq!(text.as_str(), "demo-project");
    }

    #[test]
    fn non_empty_text_rejects_blank() {
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
        assert!(NonEmptyText::from_optional(Some("")).is_none());
        assert!(NonEmptyText::from_optional(None::<&str>).is_none());
    }

    #[test]
    fn document_id_from_resource_name_takes_last_segment() {
        let id = DocumentId::from_resource_name(
            "projects/demo/databases/(default)/documents/ehrResources/Xy12AbCd",
        )
        .expect("valid name");
        assert_eq!(id.as_str(), "Xy12AbCd");
    }

    #[test]
    fn document_id_rejects_separators_and_whitespace() {
        assert_eq!(
            DocumentId::new("a/b"),
            Err(TextError::InvalidIdCharacter('/'))
        );
        assert_eq!(
            DocumentId::new("a b"),
            Err(TextError::InvalidIdCharacter(' '))
        );
        assert_eq!(DocumentId::new(""), Err(TextError::Empty));
    }

    #[test]
    fn document_id_deserialize_validates() {
        let err = serde_json::from_str::<DocumentId>("\"\"").expect_err("empty id");
        assert!(err.to_string().contains("empty"));
    }
}
