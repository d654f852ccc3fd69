//! Time utilities for dayrun
//!
//! Wall-clock time is used for display and for log records; session
//! deadlines inside a running process are tracked with tokio's monotonic
//! clock. Durations are written by users as `90s`, `25m`, `1.5h` or a bare
//! number of minutes.

use chrono::{DateTime, Local};
use std::time::Duration;
use thiserror::Error;

/// Error returned when a duration string cannot be understood
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("can't parse duration '{input}': {reason}")]
pub struct DurationParseError {
    pub input: String,
    pub reason: &'static str,
}

/// Get the current local time.
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Parse a user-supplied duration.
///
/// Accepted forms: `<n>s`, `<n>m`, `<n>h` (fractional values allowed) and a
/// bare integer, which counts minutes.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim().to_ascii_lowercase();
    let err = |reason| DurationParseError {
        input: input.to_string(),
        reason,
    };

    if s.is_empty() {
        return Err(err("empty"));
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        let minutes: u64 = s.parse().map_err(|_| err("number too large"))?;
        return minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| err("number too large"));
    }

    let (number, unit_secs) = match s.chars().last() {
        Some('s') => (&s[..s.len() - 1], 1.0),
        Some('m') => (&s[..s.len() - 1], 60.0),
        Some('h') => (&s[..s.len() - 1], 3600.0),
        _ => return Err(err("expected a number followed by s, m or h")),
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| err("expected a number followed by s, m or h"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(err("must be a non-negative number"));
    }

    Ok(Duration::from_secs((value * unit_secs).round() as u64))
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Compact form used in config files and template listings (`90m`, `45s`).
pub fn format_duration_compact(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Longest span `add_duration` will add; keeps chrono arithmetic in range.
const MAX_SPAN: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Wall-clock time `d` after `from`, clamped to a century.
pub fn add_duration(from: DateTime<Local>, d: Duration) -> DateTime<Local> {
    let span = chrono::Duration::from_std(d.min(MAX_SPAN)).unwrap_or(chrono::Duration::zero());
    from.checked_add_signed(span).unwrap_or(from)
}

/// Time left until `deadline` as seen from `at`, zero once passed.
pub fn remaining_until(deadline: DateTime<Local>, at: DateTime<Local>) -> Duration {
    (deadline - at).to_std().unwrap_or(Duration::ZERO)
}
