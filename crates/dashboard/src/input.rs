//! User commands typed into the terminal page.

use ehrview_core::{SortKey, ViewError};
use ehrview_types::DocumentId;
use std::str::FromStr;

pub const HELP: &str = "\
Commands:
  filter <text>         show rows whose type or state contains <text> (empty clears)
  sort created|fetched  sort by column; repeat to flip direction
  open <row|id>         open the detail panel for a row number or document id
  close                 close the detail panel
  seed                  write demo documents (when enabled)
  help                  show this help
  quit                  leave";

/// How `open` refers to a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordRef {
    /// 1-based row number in the visible table.
    Row(usize),
    Id(DocumentId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Filter(String),
    Sort(SortKey),
    Open(RecordRef),
    Close,
    Seed,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command (type `help` for a list)")]
    Empty,
    #[error("unknown command {0:?} (type `help` for a list)")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error("{0}")]
    InvalidSortKey(String),
    #[error("{0:?} is neither a row number nor a document id")]
    InvalidRecordRef(String),
    #[error("row {row} does not exist ({rows} rows shown)")]
    RowOutOfRange { row: usize, rows: usize },
    #[error("demo seeding is not enabled")]
    SeedDisabled,
    #[error("seed control is not available right now")]
    SeedUnavailable,
    #[error(transparent)]
    View(#[from] ViewError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "" => Err(CommandError::Empty),
            "filter" | "f" => Ok(Command::Filter(rest.to_string())),
            "sort" | "s" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument("sort"));
                }
                rest.parse::<SortKey>()
                    .map(Command::Sort)
                    .map_err(CommandError::InvalidSortKey)
            }
            "open" | "o" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument("open"));
                }
                parse_record_ref(rest).map(Command::Open)
            }
            "close" | "c" => Ok(Command::Close),
            "seed" => Ok(Command::Seed),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_record_ref(arg: &str) -> Result<RecordRef, CommandError> {
    if let Ok(row) = arg.parse::<usize>() {
        return Ok(RecordRef::Row(row));
    }
    DocumentId::from_str(arg)
        .map(RecordRef::Id)
        .map_err(|_| CommandError::InvalidRecordRef(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, CommandError> {
        line.parse()
    }

    #[test]
    fn parses_each_command() {
        assert_eq!(parse("filter obs"), Ok(Command::Filter("obs".into())));
        assert_eq!(parse("filter"), Ok(Command::Filter(String::new())));
        assert_eq!(parse("  sort created "), Ok(Command::Sort(SortKey::CreatedTime)));
        assert_eq!(parse("SORT fetched"), Ok(Command::Sort(SortKey::FetchTime)));
        assert_eq!(parse("open 3"), Ok(Command::Open(RecordRef::Row(3))));
        assert_eq!(
            parse("open AbC123xyz"),
            Ok(Command::Open(RecordRef::Id(
                DocumentId::new("AbC123xyz").expect("id")
            )))
        );
        assert_eq!(parse("close"), Ok(Command::Close));
        assert_eq!(parse("seed"), Ok(Command::Seed));
        assert_eq!(parse("?"), Ok(Command::Help));
        assert_eq!(parse("q"), Ok(Command::Quit));
    }

    #[test]
    fn filter_keeps_inner_spaces() {
        assert_eq!(
            parse("filter not started"),
            Ok(Command::Filter("not started".into()))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse("   "), Err(CommandError::Empty));
        assert!(matches!(parse("delete all"), Err(CommandError::Unknown(v)) if v == "delete"));
        assert_eq!(parse("sort"), Err(CommandError::MissingArgument("sort")));
        assert!(matches!(parse("sort state"), Err(CommandError::InvalidSortKey(_))));
        assert_eq!(parse("open"), Err(CommandError::MissingArgument("open")));
        assert!(matches!(
            parse("open a/b"),
            Err(CommandError::InvalidRecordRef(_))
        ));
    }
}
