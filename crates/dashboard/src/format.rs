//! Timestamp display.
//!
//! Formatting never fails: an absent or unparseable timestamp renders as
//! [`PLACEHOLDER`].

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use fhir::Timestamp;

/// Shown for any value that is missing or cannot be displayed.
pub const PLACEHOLDER: &str = "—";

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Clock and zone used for one render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderContext {
    pub now: DateTime<Utc>,
    pub zone: FixedOffset,
}

impl RenderContext {
    pub fn new(now: DateTime<Utc>, zone: FixedOffset) -> Self {
        Self { now, zone }
    }

    /// Current time in the machine's local zone.
    pub fn local_now() -> Self {
        let local = Local::now();
        Self {
            now: local.with_timezone(&Utc),
            zone: *local.offset(),
        }
    }

    pub fn utc(now: DateTime<Utc>) -> Self {
        Self {
            now,
            zone: Utc.fix(),
        }
    }
}

/// A formatted timestamp plus the exact stored value for tooltips.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeCell {
    pub display: String,
    /// The raw stored string, when there was one.
    pub title: Option<String>,
}

impl TimeCell {
    pub fn absolute(timestamp: Option<&Timestamp>, ctx: &RenderContext) -> Self {
        Self::with(timestamp, |at| format_absolute(at, ctx.zone))
    }

    pub fn relative(timestamp: Option<&Timestamp>, ctx: &RenderContext) -> Self {
        Self::with(timestamp, |at| format_relative(at, ctx.now))
    }

    fn with(timestamp: Option<&Timestamp>, render: impl FnOnce(DateTime<Utc>) -> String) -> Self {
        let Some(timestamp) = timestamp else {
            return Self {
                display: PLACEHOLDER.to_string(),
                title: None,
            };
        };
        let display = timestamp
            .parse()
            .map(render)
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        Self {
            display,
            title: Some(timestamp.as_str().to_string()),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` in `zone`.
pub fn format_absolute(at: DateTime<Utc>, zone: FixedOffset) -> String {
    at.with_timezone(&zone).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Distance between `at` and `now` in words, e.g. `3 hours ago` or `in 2 days`.
pub fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds();
    let distance = describe_distance(seconds.abs());
    if seconds < 0 {
        format!("in {distance}")
    } else {
        format!("{distance} ago")
    }
}

fn describe_distance(seconds: i64) -> String {
    if seconds < 30 {
        return "less than a minute".to_string();
    }
    let minutes = rounded(seconds, MINUTE);
    if minutes < 45 {
        return plural(minutes, "minute");
    }
    if seconds < DAY {
        return plural(rounded(seconds, HOUR).max(1), "hour");
    }
    if seconds < MONTH {
        return plural(rounded(seconds, DAY).max(1), "day");
    }
    if seconds < YEAR {
        return plural(rounded(seconds, MONTH).clamp(1, 11), "month");
    }
    plural((seconds / YEAR).max(1), "year")
}

fn rounded(value: i64, unit: i64) -> i64 {
    (value + unit / 2) / unit
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
