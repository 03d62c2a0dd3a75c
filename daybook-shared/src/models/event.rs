//! Calendar events and per-year event files
//!
//! Events are loosely shaped JSON objects. The backend relies on a handful of
//! fields (`id`, `date`, `originalDate`, the recurrence markers) and keeps
//! every other field the client sends untouched, so client-side additions
//! such as `color` survive a save/load cycle.
//!
//! # Year bucketing
//!
//! `save_all_split` receives the user's complete event list and writes one
//! file per calendar year. The year is taken from `date`, falling back to
//! `originalDate` (recurrence overrides that only record which occurrence
//! they replace). Entries with neither are skipped, not fatal.
//!
//! ```text
//! [{date: 2024-12-31}, {date: 2025-01-02}, {originalDate: 2025-06-01}, "junk"]
//!        │                    │                      │                  │
//!   2024_events.json     2025_events.json     2025_events.json       skipped
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::store::{FileStore, StoreResult, YearFile};

/// Recurrence rule value meaning "does not repeat"
pub const NO_RECURRENCE: &str = "NONE";

/// A stored calendar event
///
/// Wraps the raw JSON object. Known fields are read through accessors and
/// unknown fields are preserved verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Wraps a JSON value if it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builds a new event from a draft, assigning `id` and a default
    /// recurrence rule
    pub fn from_draft(draft: EventDraft, id: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(id.into()));
        map.insert("title".into(), Value::String(draft.title));
        map.insert("description".into(), Value::String(draft.description));
        map.insert("date".into(), Value::String(draft.date));
        map.insert("startTime".into(), Value::String(draft.start_time));
        map.insert("endTime".into(), Value::String(draft.end_time));
        map.insert("location".into(), Value::String(draft.location));
        map.insert(
            "recurrenceRule".into(),
            Value::String(NO_RECURRENCE.to_string()),
        );
        Self(map)
    }

    /// Raw JSON object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the event into its JSON object
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Sets a field, replacing any existing value
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Non-empty string field
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Event id; numeric ids from older clients are rendered as strings
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.str_field("title")
    }

    /// Calendar date of this event (or of this occurrence, for overrides)
    pub fn date(&self) -> Option<NaiveDate> {
        self.str_field("date").and_then(parse_date)
    }

    /// Date of the recurring occurrence an override replaces
    pub fn original_date(&self) -> Option<NaiveDate> {
        self.str_field("originalDate").and_then(parse_date)
    }

    pub fn start_time(&self) -> Option<&str> {
        self.str_field("startTime")
    }

    pub fn recurrence_rule(&self) -> Option<&str> {
        self.str_field("recurrenceRule")
    }

    pub fn recurrence_id(&self) -> Option<String> {
        match self.0.get("recurrenceId")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_base_event(&self) -> bool {
        self.0.get("isBaseEvent").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn is_deleted(&self) -> bool {
        self.0.get("isDeleted").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Calendar year this event is filed under
    pub fn year(&self) -> Option<i32> {
        self.date().or_else(|| self.original_date()).map(|d| d.year())
    }

    /// Loads every event of a user, year files in ascending order
    ///
    /// Non-object entries found on disk are dropped with a warning.
    pub async fn list_all(store: &FileStore, user_id: &str) -> StoreResult<Vec<Self>> {
        let mut events = Vec::new();

        for year in store.list_years(user_id, YearFile::Events).await? {
            let path = store.year_path(user_id, year, YearFile::Events)?;
            let entries: Vec<Value> = store.read_json_or(&path, Vec::new()).await?;
            for entry in entries {
                match Self::from_value(entry) {
                    Some(event) => events.push(event),
                    None => warn!(user_id, year, "Ignoring non-object entry in events file"),
                }
            }
        }

        Ok(events)
    }

    /// Replaces a user's events with `entries`, split into per-year files
    ///
    /// - non-object entries and entries without a resolvable year are skipped
    /// - entries without an id get a fresh UUID
    /// - year files on disk that receive no events are emptied, so events
    ///   deleted by the client stay deleted
    pub async fn save_all_split(
        store: &FileStore,
        user_id: &str,
        entries: Vec<Value>,
    ) -> StoreResult<SaveSummary> {
        let SplitEvents { buckets, skipped } = split_by_year(entries);

        let mut years: BTreeSet<i32> = buckets.keys().copied().collect();
        years.extend(store.list_years(user_id, YearFile::Events).await?);

        let mut saved = 0;
        for year in &years {
            let path = store.year_path(user_id, *year, YearFile::Events)?;
            let events = buckets.get(year).map(Vec::as_slice).unwrap_or(&[]);
            store.write_json(&path, events).await?;
            saved += events.len();
        }

        debug!(user_id, saved, skipped, years = years.len(), "Saved events");

        Ok(SaveSummary { saved, skipped })
    }
}

/// Outcome of `Event::save_all_split`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub saved: usize,
    pub skipped: usize,
}

/// Events grouped by year plus the number of rejected entries
#[derive(Debug, Default)]
pub struct SplitEvents {
    pub buckets: BTreeMap<i32, Vec<Event>>,
    pub skipped: usize,
}

/// Groups raw entries by calendar year
pub fn split_by_year(entries: Vec<Value>) -> SplitEvents {
    let mut split = SplitEvents::default();

    for (index, entry) in entries.into_iter().enumerate() {
        let Some(mut event) = Event::from_value(entry) else {
            warn!(index, "Skipping event entry that is not an object");
            split.skipped += 1;
            continue;
        };

        let Some(year) = event.year() else {
            warn!(index, id = ?event.id(), "Skipping event entry without a valid date");
            split.skipped += 1;
            continue;
        };

        if event.id().is_none() {
            event.set("id", uuid::Uuid::new_v4().to_string());
        }

        split.buckets.entry(year).or_default().push(event);
    }

    split
}

/// Parses `YYYY-MM-DD`, ignoring any trailing time part
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let day = s.split(|c: char| c == 'T' || c == ' ').next().unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// An event as proposed by the assistant, before it gets an id
///
/// Every field tolerates `null`, numbers and absence so a sloppy model reply
/// still deserializes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,

    /// `YYYY-MM-DD`
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,

    /// `HH:MM`
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_time: String,

    /// `HH:MM`
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_time: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub location: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}
