//! The all-day "work from home" event.
//!
//! - [`WorkFromHomeEvent`]: what gets booked on the calendar
//! - [`render_summary`]: expands the message template with the user name
//! - [`resolve_user`]: picks the user name from the available sources

use std::fmt;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Message template used when the configuration does not provide one.
///
/// `%s` is replaced by the user name.
pub const DEFAULT_MESSAGE: &str = "%s - working from home";

/// Time zone attached to the all-day event dates.
pub const EVENT_TIME_ZONE: &str = "UTC";

/// Placeholder substituted by [`render_summary`].
const USER_PLACEHOLDER: &str = "%s";

/// An all-day event covering a single date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkFromHomeEvent {
    /// Event title shown on the calendar.
    pub summary: String,
    /// The day being booked.
    pub date: NaiveDate,
    /// Time zone sent along with the dates.
    pub time_zone: String,
}

impl WorkFromHomeEvent {
    /// Creates an event for the given date.
    pub fn new(summary: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            summary: summary.into(),
            date,
            time_zone: EVENT_TIME_ZONE.to_string(),
        }
    }

    /// Creates an event for today's date in the local time zone.
    pub fn today(summary: impl Into<String>) -> Self {
        Self::new(summary, Local::now().date_naive())
    }

    /// First day of the event.
    pub fn start_date(&self) -> NaiveDate {
        self.date
    }

    /// Exclusive end date, as calendar APIs expect for all-day events.
    pub fn end_date(&self) -> NaiveDate {
        self.date.succ_opt().unwrap_or(self.date)
    }
}

impl fmt::Display for WorkFromHomeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.summary, self.date.format("%Y-%m-%d"))
    }
}

/// Expands a message template for `user`.
///
/// The first `%s` is replaced by the user name. An empty template falls back
/// to [`DEFAULT_MESSAGE`]; a template without a placeholder is used verbatim.
pub fn render_summary(template: &str, user: &str) -> String {
    let template = if template.trim().is_empty() {
        DEFAULT_MESSAGE
    } else {
        template
    };
    template.replacen(USER_PLACEHOLDER, user, 1)
}

/// Returns the first non-blank candidate, in priority order.
///
/// Callers pass the command line value, the configured value and the
/// environment value, in that order.
pub fn resolve_user<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}
