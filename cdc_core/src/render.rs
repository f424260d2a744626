//! Turns normalized schedule entries into an iCalendar.
//!
//! The result is serialized with [`ical::generator::Emitter`].

use chrono::{NaiveDateTime, Utc};
use ical::{
    generator::{IcalCalendar, IcalCalendarBuilder, IcalEvent, Property},
    ical_property,
    parser::ical::component::IcalAlarm,
};
use thiserror::Error;

use crate::model::{CalendarParts, EventKey, NormalizedEvent};

pub static TITLE: &str = "BA-Leipzig-Stundenplan";
pub static PROD_ID: &str = "-//BA-Leipzig-Stundenplan-Clone//campus-dual.de";
static FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("timestamp {seconds} is out of the representable range")]
    Timestamp { seconds: i64 },
    #[error("{0:?} is not a valid point in time")]
    CalendarParts(CalendarParts),
}

impl From<crate::model::InvalidTimestamp> for RenderError {
    fn from(value: crate::model::InvalidTimestamp) -> Self {
        RenderError::Timestamp {
            seconds: value.seconds,
        }
    }
}

/// A display reminder some minutes before an event starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSpec {
    pub minutes_before: u32,
    pub description: String,
}

impl Default for ReminderSpec {
    fn default() -> Self {
        Self {
            minutes_before: 5,
            description: String::from("Erinnerung an die Veranstaltung"),
        }
    }
}

impl ReminderSpec {
    fn to_alarm(&self) -> IcalAlarm {
        let mut alarm = IcalAlarm::new();
        alarm.properties = vec![
            ical_property!("ACTION", "DISPLAY"),
            ical_property!("DESCRIPTION", escape(&self.description)),
            ical_property!("TRIGGER", format!("-PT{}M", self.minutes_before)),
        ];
        alarm
    }
}

/// Everything about the feed that is not an event. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMetadata {
    pub title: String,
    pub product_id: String,
    pub reminders: Vec<ReminderSpec>,
}

impl Default for FeedMetadata {
    fn default() -> Self {
        Self {
            title: TITLE.to_string(),
            product_id: PROD_ID.to_string(),
            reminders: vec![ReminderSpec::default()],
        }
    }
}

/// Build the calendar for `events`, as served at `feed_url`.
pub fn render(
    events: &[NormalizedEvent],
    metadata: &FeedMetadata,
    feed_url: &str,
) -> Result<IcalCalendar, RenderError> {
    let stamp = Utc::now().format(FORMAT).to_string();
    let mut calendar = IcalCalendarBuilder::version("2.0")
        .gregorian()
        .prodid(metadata.product_id.clone())
        .build();
    calendar.properties.extend([
        ical_property!("METHOD", "PUBLISH"),
        ical_property!("X-WR-CALNAME", escape(&metadata.title)),
        ical_property!("NAME", escape(&metadata.title)),
    ]);
    if !feed_url.is_empty() {
        calendar.properties.push(ical_property!("URL", feed_url));
    }
    for event in events {
        calendar.events.push(get_event(event, metadata, &stamp)?);
    }
    Ok(calendar)
}

fn get_event(
    event: &NormalizedEvent,
    metadata: &FeedMetadata,
    stamp: &str,
) -> Result<IcalEvent, RenderError> {
    let mut ical_event = IcalEvent::new();
    ical_event.properties = vec![
        ical_property!("UID", uid(&event.key)),
        ical_property!("DTSTAMP", stamp),
        ical_property!("DTSTART", format_utc(&event.start)?),
        ical_property!("DTEND", format_utc(&event.end)?),
        ical_property!("SUMMARY", escape(&event.summary)),
        ical_property!("DESCRIPTION", escape(&event.description)),
        ical_property!("LOCATION", escape(&event.location)),
        ical_property!("STATUS", event.status.as_str()),
    ];
    ical_event.alarms = metadata
        .reminders
        .iter()
        .map(ReminderSpec::to_alarm)
        .collect();
    Ok(ical_event)
}

fn format_utc(parts: &CalendarParts) -> Result<String, RenderError> {
    let date_time: NaiveDateTime = parts
        .to_naive_date_time()
        .ok_or(RenderError::CalendarParts(*parts))?;
    Ok(date_time.format(FORMAT).to_string())
}

/// Get a unique id for a specific class slot.
///
/// Changing this function is a breaking change!
fn uid(key: &EventKey) -> String {
    let title = urlencoding::encode(&key.title);
    format!("Stundenplan_{title}_{}_{}@campus-dual.de", key.start, key.end)
}

/// Escape a TEXT value (RFC 5545, section 3.3.11).
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            _ => escaped.push(character),
        }
    }
    escaped
}
