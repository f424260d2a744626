//! The schedule data as delivered by Campus Dual and as kept by this service.

use std::{collections::HashSet, fmt};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// A user id and hash as accepted by Campus Dual.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub identifier: String,
    pub secret: String,
}

impl CredentialPair {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A single entry of the upstream `room/json` response.
///
/// Only `title`, `start` and `end` are required; all other upstream fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawScheduleRecord {
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub room: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub instructor: String,
    /// Seconds since the unix epoch.
    pub start: i64,
    /// Seconds since the unix epoch.
    pub end: i64,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timestamp {seconds} is out of the representable range")]
pub struct InvalidTimestamp {
    pub seconds: i64,
}

/// A UTC wall-clock time split into year, month, day, hour, minute and second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CalendarParts {
    pub fn from_timestamp(seconds: i64) -> Result<Self, InvalidTimestamp> {
        DateTime::from_timestamp(seconds, 0)
            .map(|date_time| Self::from(date_time.naive_utc()))
            .ok_or(InvalidTimestamp { seconds })
    }

    /// `None` if the parts do not name an existing point in time.
    pub fn to_naive_date_time(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_opt(
            self.hour,
            self.minute,
            self.second,
        )
    }
}

impl From<NaiveDateTime> for CalendarParts {
    fn from(value: NaiveDateTime) -> Self {
        Self {
            year: value.year(),
            month: value.month(),
            day: value.day(),
            hour: value.hour(),
            minute: value.minute(),
            second: value.second(),
        }
    }
}

/// The identity of a schedule entry.
///
/// Room and instructor are not part of it, so a changed room for the same slot is not a new entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub title: String,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventStatus {
    #[default]
    Confirmed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Confirmed => "CONFIRMED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub key: EventKey,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: CalendarParts,
    pub end: CalendarParts,
    pub status: EventStatus,
}

impl NormalizedEvent {
    /// Build an event from already known parts, as read back from storage.
    pub fn from_parts(
        key: EventKey,
        summary: String,
        description: String,
        location: String,
    ) -> Result<Self, InvalidTimestamp> {
        Ok(Self {
            start: CalendarParts::from_timestamp(key.start)?,
            end: CalendarParts::from_timestamp(key.end)?,
            key,
            summary,
            description,
            location,
            status: EventStatus::Confirmed,
        })
    }
}

impl TryFrom<RawScheduleRecord> for NormalizedEvent {
    type Error = InvalidTimestamp;

    fn try_from(record: RawScheduleRecord) -> Result<Self, Self::Error> {
        let summary = summary(&record.title, &record.instructor);
        let key = EventKey {
            title: record.title,
            start: record.start,
            end: record.end,
        };
        Self::from_parts(key, summary, record.description, record.room)
    }
}

/// Normalize a whole upstream response, failing on the first bad timestamp.
pub fn normalize_all(
    records: Vec<RawScheduleRecord>,
) -> Result<Vec<NormalizedEvent>, InvalidTimestamp> {
    records.into_iter().map(NormalizedEvent::try_from).collect()
}

fn summary(title: &str, instructor: &str) -> String {
    if instructor.trim().is_empty() {
        title.to_string()
    } else {
        format!("{title} - {instructor}")
    }
}

/// Add the shared baseline to a user's own events.
///
/// Baseline entries whose key is already among the user's events are dropped.
pub fn merge(own: Vec<NormalizedEvent>, baseline: Vec<NormalizedEvent>) -> Vec<NormalizedEvent> {
    let known: HashSet<EventKey> = own.iter().map(|event| event.key.clone()).collect();
    let mut events = own;
    events.extend(
        baseline
            .into_iter()
            .filter(|event| !known.contains(&event.key)),
    );
    events
}
