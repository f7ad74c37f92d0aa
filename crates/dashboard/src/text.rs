//! Plain-text rendering of the page for terminals.
//!
//! Every string that came from the backend or the user goes through [`terminal_safe`]
//! before it is written, so stored documents cannot emit control sequences or break the
//! table layout. Narrative blocks are split on line breaks and wrapped to
//! [`BLOCK_WIDTH`].

use crate::detail::DetailView;
use crate::page::{PageBody, PageView, ReadyView};
use crate::table::{TableBody, TableView, Tone};
use ehrview_core::SortDirection;
use std::borrow::Cow;
use std::fmt::{self, Write};

const COLUMN_GAP: &str = "  ";

/// Column at which narrative and summary blocks wrap.
pub const BLOCK_WIDTH: usize = 88;

/// Render `page` as lines of text.
pub fn render(page: &PageView) -> String {
    PlainText(page).to_string()
}

/// Render only the table, as printed by one-shot commands.
pub fn render_table(table: &TableView) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_table(&mut out, table);
    out
}

/// Render only the detail panel.
pub fn render_detail(detail: &DetailView) -> String {
    let mut out = String::new();
    let _ = write_detail(&mut out, detail);
    out
}

struct PlainText<'a>(&'a PageView);

impl fmt::Display for PlainText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let page = self.0;
        match &page.header.seed {
            Some(seed) => {
                let state = if seed.enabled { "" } else { " (disabled)" };
                writeln!(f, "{}    [{}]{}", page.header.title, seed.label, state)?;
                writeln!(f, "{}", terminal_safe(&seed.note))?;
            }
            None => writeln!(f, "{}", page.header.title)?,
        }
        writeln!(f)?;

        match &page.body {
            PageBody::Failed { heading, message } => {
                writeln!(f, "{heading}")?;
                write_lines(f, message, "")
            }
            PageBody::Loading { interrupted: None } => writeln!(f, "Loading resources…"),
            PageBody::Loading {
                interrupted: Some(notice),
            } => {
                writeln!(f, "{}", terminal_safe(notice))?;
                writeln!(f, "No data has been received.")
            }
            PageBody::Ready(ready) => write_ready(f, ready),
        }
    }
}

fn write_ready(out: &mut impl Write, ready: &ReadyView) -> fmt::Result {
    if let Some(notice) = &ready.stream_notice {
        writeln!(out, "! {} (showing last received data)", terminal_safe(notice))?;
    }
    if ready.filter.trim().is_empty() {
        writeln!(out, "Filter: (none)")?;
    } else {
        writeln!(out, "Filter: {}", terminal_safe(&ready.filter))?;
    }
    writeln!(out)?;
    write_table(out, &ready.table)?;

    if let Some(detail) = &ready.detail {
        writeln!(out)?;
        write_detail(out, detail)?;
    }
    Ok(())
}

fn write_table(out: &mut impl Write, table: &TableView) -> fmt::Result {
    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut header = vec!["#".to_string()];
    header.extend(table.headers.iter().map(|h| match h.indicator {
        Some(SortDirection::Desc) => format!("{} ▼", h.title),
        Some(SortDirection::Asc) => format!("{} ▲", h.title),
        None => h.title.to_string(),
    }));
    lines.push(header);

    for row in table.rows() {
        lines.push(vec![
            row.number.to_string(),
            terminal_safe(&row.resource_type).into_owned(),
            row.created.display.clone(),
            row.fetched.display.clone(),
            format!("{} {}", tone_marker(row.state.tone), row.state.label),
        ]);
    }

    let widths = column_widths(&lines);
    for line in &lines {
        let mut text = String::new();
        for (cell, width) in line.iter().zip(&widths) {
            let pad = width.saturating_sub(cell.chars().count());
            text.push_str(cell);
            text.extend(std::iter::repeat(' ').take(pad));
            text.push_str(COLUMN_GAP);
        }
        writeln!(out, "{}", text.trim_end())?;
    }

    if let TableBody::Empty(reason) = &table.body {
        writeln!(out, "{}", reason.message())?;
    }
    Ok(())
}

fn write_detail(out: &mut impl Write, detail: &DetailView) -> fmt::Result {
    writeln!(
        out,
        "── {} ({}) ──",
        detail.title,
        terminal_safe(detail.id.as_str())
    )?;
    if detail.stale {
        writeln!(
            out,
            "This record is no longer in the live data; showing the last version seen."
        )?;
    }
    let width = detail
        .fields
        .iter()
        .map(|f| f.label.chars().count())
        .max()
        .unwrap_or(0);
    for field in &detail.fields {
        let value = terminal_safe(&field.value);
        if field.label == "State" {
            write!(out, "{:<width$}  {} {value}", field.label, tone_marker(detail.state.tone))?;
        } else {
            write!(out, "{:<width$}  {value}", field.label)?;
        }
        match &field.title {
            Some(title) if title != &field.value => writeln!(out, "  ({})", terminal_safe(title))?,
            _ => writeln!(out)?,
        }
    }
    writeln!(out)?;
    writeln!(out, "Human Readable")?;
    write_block(out, &detail.narrative)?;
    writeln!(out, "AI Summary")?;
    write_block(out, &detail.ai_summary)
}

fn write_block(out: &mut impl Write, text: &str) -> fmt::Result {
    write_lines(out, text, "  ")
}

/// Write `text` line by line, each line made safe and wrapped.
fn write_lines(out: &mut impl Write, text: &str, indent: &str) -> fmt::Result {
    for line in text.lines() {
        for piece in wrap(&terminal_safe(line), BLOCK_WIDTH) {
            writeln!(out, "{indent}{piece}")?;
        }
    }
    Ok(())
}

/// Replace control characters (ESC, BEL, CR, LF and the rest) with their escaped
/// form. Tabs become a single space.
pub fn terminal_safe(text: &str) -> Cow<'_, str> {
    if !text.chars().any(char::is_control) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\t' => out.push(' '),
            c if c.is_control() => out.extend(c.escape_default()),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Greedy word wrap at `width` characters. Words longer than `width` are split.
fn wrap(line: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in line.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if current_len > 0 && current_len + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }
    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn column_widths(lines: &[Vec<String>]) -> Vec<usize> {
    let columns = lines.iter().map(Vec::len).max().unwrap_or(0);
    (0..columns)
        .map(|i| {
            lines
                .iter()
                .filter_map(|line| line.get(i))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect()
}

fn tone_marker(tone: Tone) -> &'static str {
    match tone {
        Tone::Positive => "[+]",
        Tone::Informational => "[~]",
        Tone::Neutral => "[ ]",
        Tone::Negative => "[!]",
    }
}
