//! Trigger evaluation: when is an intention due, and when is it due next.
//!
//! Every function here is pure over the intention and the supplied clock.
//! Cron schedules are evaluated in the server's local timezone. Malformed
//! schedules are never due; [`validate`] reports them at creation time.

use chrono::{DateTime, Duration, Local, Utc};
use croner::Cron;

use crate::models::intention::{Intention, Trigger};
use crate::{AppError, Result};

/// Reject triggers that could never fire.
///
/// # Errors
///
/// Returns `AppError::Validation` for an unparseable cron expression or a
/// zero-length interval.
pub fn validate(trigger: &Trigger) -> Result<()> {
    match trigger {
        Trigger::Cron { schedule } => schedule
            .parse::<Cron>()
            .map(|_| ())
            .map_err(|err| AppError::Validation(format!("invalid cron schedule '{schedule}': {err}"))),
        Trigger::Interval { seconds: 0 } => Err(AppError::Validation(
            "interval must be at least one second".into(),
        )),
        Trigger::Interval { .. } | Trigger::Manual {} => Ok(()),
    }
}

/// Whether `intention` should run at `now`.
///
/// True when its scheduled `next_run` is not in the future. The store
/// recomputes `next_run` on creation, after every run, when the trigger
/// changes, and when the intention is re-enabled, so an edit never counts
/// as a missed occurrence. The `enabled` and `running` flags are the
/// caller's concern.
#[must_use]
pub fn due(intention: &Intention, now: DateTime<Utc>) -> bool {
    if matches!(intention.trigger, Trigger::Manual {}) {
        return false;
    }
    intention.next_run.is_some_and(|at| at <= now)
}

/// First occurrence strictly after `now`, or `None` for manual and
/// malformed triggers.
#[must_use]
pub fn next_occurrence(intention: &Intention, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let anchor = intention.last_run.unwrap_or(intention.created_at);
    first_after(&intention.trigger, anchor, now)
}

fn first_after(trigger: &Trigger, anchor: DateTime<Utc>, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match trigger {
        Trigger::Cron { schedule } => {
            let cron: Cron = schedule.parse().ok()?;
            cron.find_next_occurrence(&after.with_timezone(&Local), false)
                .ok()
                .map(|at| at.with_timezone(&Utc))
        }
        Trigger::Interval { seconds } => {
            let period = i64::try_from(*seconds).ok().filter(|s| *s > 0)?;
            let first = anchor.checked_add_signed(Duration::try_seconds(period)?)?;
            if first > after {
                return Some(first);
            }
            let periods = (after - anchor).num_seconds() / period + 1;
            anchor.checked_add_signed(Duration::try_seconds(periods.checked_mul(period)?)?)
        }
        Trigger::Manual {} => None,
    }
}
