//! Natural-language time expression parsing for reminders.
//!
//! Two forms are recognized anywhere in the text:
//!
//! - relative durations: `in 5 minutes`, `in 2h`, `in 30 secs`, `in 1 day`
//! - clock times: `at 3pm`, `at 9:30am`, `at 17:45`
//!
//! Relative forms win when both are present. Malformed values (`at 25:00`,
//! `at 13pm`, `in 0 minutes`) are unparseable rather than clamped.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, TimeZone};
use regex::Regex;

static RELATIVE: OnceLock<Option<Regex>> = OnceLock::new();
static CLOCK: OnceLock<Option<Regex>> = OnceLock::new();

fn relative_pattern() -> Option<&'static Regex> {
    RELATIVE
        .get_or_init(|| {
            Regex::new(
                r"(?i)\bin\s+(\d+)\s*(seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h|days?|d)\b",
            )
            .ok()
        })
        .as_ref()
}

fn clock_pattern() -> Option<&'static Regex> {
    CLOCK
        .get_or_init(|| Regex::new(r"(?i)\bat\s+(\d+)(?::(\d+))?\s*(am|pm)?\b").ok())
        .as_ref()
}

/// Resolve the first time expression in `text` to an absolute instant.
///
/// The result is always strictly after `now`. Returns `None` when no
/// recognized phrase is present or the phrase is malformed; callers should
/// ask the user to rephrase.
#[must_use]
pub fn parse_fire_time<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    if let Some(caps) = relative_pattern()?.captures(text) {
        let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str().to_lowercase();
        let offset = relative_offset(amount, &unit)?;
        return now.clone().checked_add_signed(offset);
    }

    let caps = clock_pattern()?.captures(text)?;
    let hour_raw = caps.get(1)?.as_str();
    let minute_raw = caps.get(2).map(|m| m.as_str());
    let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());
    let (hour, minute) = clock_components(hour_raw, minute_raw, meridiem.as_deref())?;
    next_wall_clock(now, hour, minute)
}

fn relative_offset(amount: i64, unit: &str) -> Option<Duration> {
    if amount <= 0 {
        return None;
    }

    let unit_seconds: i64 = match unit.chars().next()? {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => return None,
    };

    Duration::try_seconds(amount.checked_mul(unit_seconds)?)
}

/// Validate and normalise `HH[:MM][am|pm]` into 24-hour components.
fn clock_components(
    hour_raw: &str,
    minute_raw: Option<&str>,
    meridiem: Option<&str>,
) -> Option<(u32, u32)> {
    if hour_raw.len() > 2 {
        return None;
    }
    let mut hour: u32 = hour_raw.parse().ok()?;

    let minute: u32 = match minute_raw {
        Some(raw) if raw.len() == 2 => raw.parse().ok()?,
        Some(_) => return None,
        None => 0,
    };
    if minute > 59 {
        return None;
    }

    match meridiem {
        Some(suffix) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            if suffix == "pm" && hour < 12 {
                hour += 12;
            } else if suffix == "am" && hour == 12 {
                hour = 0;
            }
        }
        None if hour > 23 => return None,
        None => {}
    }

    Some((hour, minute))
}

/// Next occurrence of `hour:minute` in `now`'s timezone: today if still
/// ahead, otherwise tomorrow.
fn next_wall_clock<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();

    let candidate = tz
        .from_local_datetime(&today.and_hms_opt(hour, minute, 0)?)
        .earliest();
    if let Some(at) = candidate {
        if at > *now {
            return Some(at);
        }
    }

    let tomorrow = today.succ_opt()?;
    tz.from_local_datetime(&tomorrow.and_hms_opt(hour, minute, 0)?)
        .earliest()
}
