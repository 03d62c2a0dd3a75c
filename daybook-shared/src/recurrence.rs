//! Recurring event expansion
//!
//! The web client stores a repeating event as one *base* event plus
//! *exceptions* that share its `recurrenceId`:
//!
//! ```text
//! base       {id: "7", recurrenceId: "r1", isBaseEvent: true,
//!             date: "2025-01-06", startTime: "09:00", recurrenceRule: "RRULE:FREQ=WEEKLY"}
//! moved      {recurrenceId: "r1", originalDate: "2025-01-13", date: "2025-01-14", ...}
//! deleted    {recurrenceId: "r1", originalDate: "2025-01-20", isDeleted: true}
//! ```
//!
//! [`expand_range`] turns that into the concrete instances visible between
//! two dates (both inclusive).
//!
//! - Unmodified occurrences get `id = "<baseId>-<YYYY-MM-DD>"`, `date` and
//!   `originalDate` set to the occurrence date.
//! - A modified exception replaces its occurrence (base fields overlaid by
//!   the exception's) and is shown only if its own `date` is in range.
//! - A deleted exception hides its occurrence.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rrule::RRuleSet;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::event::{Event, NO_RECURRENCE};

/// Widest range a single expansion may cover
pub const MAX_RANGE_DAYS: i64 = 366;

/// Upper bound of occurrences generated per base event
const MAX_OCCURRENCES: u16 = 1000;

/// Error type for expansion requests
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecurrenceError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),
}

/// Checks that `start..=end` is a usable expansion window
pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), RecurrenceError> {
    if start > end {
        return Err(RecurrenceError::InvalidRange(
            "start must not be after end".to_string(),
        ));
    }
    if (end - start).num_days() > MAX_RANGE_DAYS {
        return Err(RecurrenceError::InvalidRange(format!(
            "range may span at most {} days",
            MAX_RANGE_DAYS
        )));
    }
    Ok(())
}

/// Expands `events` into the instances visible between `start` and `end`
///
/// Output is ordered by date, then start time.
pub fn expand_range(
    events: &[Event],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Event>, RecurrenceError> {
    validate_range(start, end)?;

    let in_range = |date: Option<NaiveDate>| date.is_some_and(|d| d >= start && d <= end);

    let mut instances = Vec::new();
    let mut bases = Vec::new();
    let mut exceptions: HashMap<String, HashMap<NaiveDate, &Event>> = HashMap::new();

    for event in events {
        match event.recurrence_id() {
            None => {
                if in_range(event.date()) {
                    instances.push(event.clone());
                }
            }
            Some(_) if event.is_base_event() => bases.push(event),
            Some(recurrence_id) => {
                if let Some(original) = event.original_date() {
                    exceptions
                        .entry(recurrence_id)
                        .or_default()
                        .insert(original, event);
                }
            }
        }
    }

    let no_exceptions = HashMap::new();
    for base in bases {
        let overrides = base
            .recurrence_id()
            .and_then(|id| exceptions.get(&id))
            .unwrap_or(&no_exceptions);

        let dates = match occurrence_dates(base, start, end) {
            Ok(dates) => dates,
            Err(reason) => {
                warn!(id = ?base.id(), reason = %reason, "Skipping base event with unusable recurrence rule");
                continue;
            }
        };

        for date in dates {
            match overrides.get(&date) {
                Some(exception) if exception.is_deleted() => {}
                Some(exception) => {
                    if in_range(exception.date()) {
                        instances.push(overlay(base, exception));
                    }
                }
                None => instances.push(plain_instance(base, date)),
            }
        }
    }

    instances.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then_with(|| a.start_time().cmp(&b.start_time()))
    });

    debug!(
        start = %start,
        end = %end,
        stored = events.len(),
        instances = instances.len(),
        "Expanded events"
    );

    Ok(instances)
}

/// Dates on which `base` occurs within `start..=end`
fn occurrence_dates(base: &Event, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, String> {
    let first = base.date().ok_or("base event has no valid date")?;

    let rule = match base.recurrence_rule().and_then(rule_body) {
        Some(rule) => rule,
        // Non-repeating base events occur once
        None => {
            return Ok(if first >= start && first <= end {
                vec![first]
            } else {
                Vec::new()
            })
        }
    };

    let time = base
        .start_time()
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
        .unwrap_or(NaiveTime::MIN);

    let rrule_str = format!(
        "DTSTART:{}\nRRULE:{}",
        first.and_time(time).format("%Y%m%dT%H%M%SZ"),
        rule
    );
    let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| format!("{}", e))?;

    // Window is [start 00:00, end+1 00:00); occurrences are re-filtered by date below
    let tz: rrule::Tz = Utc.into();
    let range_start = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
    let range_end = Utc.from_utc_datetime(&end.and_time(NaiveTime::MIN)) + Duration::days(1);
    let after = (range_start - Duration::seconds(1)).with_timezone(&tz);
    let before = range_end.with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        warn!(id = ?base.id(), limit = MAX_OCCURRENCES, "Recurrence expansion truncated");
    }

    Ok(result
        .dates
        .iter()
        .map(|dt| dt.date_naive())
        .filter(|d| *d >= start && *d <= end)
        .collect())
}

/// Extracts the `FREQ=...` part of a stored rule, `None` for non-repeating
///
/// Accepts `RRULE:FREQ=...`, a bare `FREQ=...`, and multi-line strings that
/// carry their own `DTSTART` line.
fn rule_body(rule: &str) -> Option<&str> {
    let rule = rule.trim();
    if rule.is_empty() || rule.eq_ignore_ascii_case(NO_RECURRENCE) {
        return None;
    }

    rule.lines().map(str::trim).find_map(|line| {
        line.strip_prefix("RRULE:")
            .or_else(|| line.contains("FREQ=").then_some(line))
    })
}

fn plain_instance(base: &Event, date: NaiveDate) -> Event {
    let day = date.format("%Y-%m-%d").to_string();
    let mut instance = base.clone();
    if let Some(id) = base.id() {
        instance.set("id", format!("{}-{}", id, day));
    }
    instance.set("date", day.clone());
    instance.set("originalDate", day);
    instance.set("isInstance", true);
    instance.set("isException", false);
    instance
}

fn overlay(base: &Event, exception: &Event) -> Event {
    let mut merged = base.clone();
    for (key, value) in exception.as_map() {
        merged.set(key, value.clone());
    }
    merged.set("isInstance", Value::Bool(true));
    merged.set("isException", Value::Bool(true));
    merged
}
