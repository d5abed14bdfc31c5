//! Timezone conversion between canonical UTC storage and user display zones.
//!
//! Everything stored is UTC. User-entered times are wall-clock times in the
//! user's zone and must pass through [`to_utc`] before they are persisted;
//! everything shown back to a user passes through [`format`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{ConfigError, Error, Result};

/// Canonical input layout for task due times.
pub const INPUT_FORMAT: &str = "%Y-%m-%d - %H:%M:%S";

/// Display layout, e.g. `2024-01-01 - 09:00:00 - -03`.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d - %H:%M:%S - %Z";

/// Layouts accepted by the free-text preview, tried in order.
const PREVIEW_LAYOUTS: &[&str] = &[
    INPUT_FORMAT,
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parse an IANA zone name.
pub fn parse_zone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimezone(name.to_string()).into())
}

/// Convert a wall-clock time in `zone` to a UTC instant.
///
/// Ambiguous local times (clocks going back) resolve to the earlier instant.
/// Local times skipped by a DST jump do not exist and are rejected.
pub fn to_utc(local: NaiveDateTime, zone: &str) -> Result<DateTime<Utc>> {
    let tz = parse_zone(zone)?;
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            Error::validation(
                "due_on",
                format!("{local} does not exist in timezone {zone}"),
            )
        })
}

/// Convert a UTC instant to wall-clock time in `zone`.
pub fn to_local(utc: DateTime<Utc>, zone: &str) -> Result<NaiveDateTime> {
    let tz = parse_zone(zone)?;
    Ok(utc.with_timezone(&tz).naive_local())
}

/// Human-readable rendering of a UTC instant in `zone`.
pub fn format(utc: DateTime<Utc>, zone: &str) -> Result<String> {
    let tz = parse_zone(zone)?;
    Ok(utc.with_timezone(&tz).format(DISPLAY_FORMAT).to_string())
}

/// Parse the canonical `YYYY-MM-DD - HH:MM:SS` input layout.
pub fn parse_local(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), INPUT_FORMAT).map_err(|e| {
        Error::validation("due_on", format!("expected YYYY-MM-DD - HH:MM:SS ({e})"))
    })
}

/// Best-effort parse of free-text date input, rendered in canonical display form.
///
/// The text is interpreted as wall-clock time in `zone`.
pub fn preview(text: &str, zone: &str) -> Result<String> {
    let local = parse_loose(text)
        .ok_or_else(|| Error::validation("text", format!("could not understand '{}'", text.trim())))?;
    format(to_utc(local, zone)?, zone)
}

fn parse_loose(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    PREVIEW_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
