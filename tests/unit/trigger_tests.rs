//! Unit tests for trigger validation and due/next evaluation.

use chrono::{DateTime, Duration, TimeZone, Utc};

use proactive_hub::intentions::trigger::{due, next_occurrence, validate};
use proactive_hub::models::intention::{Intention, NewIntention, Trigger};
use proactive_hub::AppError;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0)
        .single()
        .expect("valid instant")
}

fn intention(trigger: Trigger, created_at: DateTime<Utc>) -> Intention {
    let mut item = Intention::new(
        NewIntention {
            name: "check".into(),
            prompt: "summarize inbox".into(),
            trigger,
            context_sources: Vec::new(),
            enabled: true,
        },
        created_at,
    );
    item.next_run = next_occurrence(&item, created_at);
    item
}

/// Record a run at `at` the way the store does.
fn ran_at(item: &mut Intention, at: DateTime<Utc>) {
    item.last_run = Some(at);
    item.next_run = next_occurrence(item, at);
}

fn cron(schedule: &str) -> Trigger {
    Trigger::Cron {
        schedule: schedule.into(),
    }
}

#[test]
fn validate_accepts_well_formed_triggers() {
    assert!(validate(&cron("0 9 * * *")).is_ok());
    assert!(validate(&cron("*/15 * * * 1-5")).is_ok());
    assert!(validate(&Trigger::Interval { seconds: 60 }).is_ok());
    assert!(validate(&Trigger::Manual {}).is_ok());
}

#[test]
fn validate_rejects_malformed_cron() {
    for schedule in ["not a cron", "61 * * * *", ""] {
        let err = validate(&cron(schedule)).expect_err("must be rejected");
        assert!(matches!(err, AppError::Validation(_)), "{schedule}: {err}");
    }
}

#[test]
fn validate_rejects_zero_interval() {
    let err = validate(&Trigger::Interval { seconds: 0 }).expect_err("zero interval");
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn interval_due_measured_from_creation() {
    let item = intention(Trigger::Interval { seconds: 60 }, t0());
    assert!(!due(&item, t0() + Duration::seconds(59)));
    assert!(due(&item, t0() + Duration::seconds(60)));
    assert!(due(&item, t0() + Duration::hours(3)));
}

#[test]
fn interval_due_measured_from_last_run() {
    let mut item = intention(Trigger::Interval { seconds: 60 }, t0());
    ran_at(&mut item, t0() + Duration::seconds(100));
    assert!(!due(&item, t0() + Duration::seconds(150)));
    assert!(due(&item, t0() + Duration::seconds(160)));
}

#[test]
fn interval_next_occurrence_is_strictly_after_now() {
    let item = intention(Trigger::Interval { seconds: 60 }, t0());
    assert_eq!(
        next_occurrence(&item, t0() + Duration::seconds(30)),
        Some(t0() + Duration::seconds(60))
    );
    assert_eq!(
        next_occurrence(&item, t0() + Duration::seconds(130)),
        Some(t0() + Duration::seconds(180))
    );
    assert_eq!(
        next_occurrence(&item, t0() + Duration::seconds(120)),
        Some(t0() + Duration::seconds(180))
    );
}

#[test]
fn manual_is_never_due() {
    let item = intention(Trigger::Manual {}, t0() - Duration::days(30));
    assert!(!due(&item, t0()));
    assert_eq!(next_occurrence(&item, t0()), None);
}

#[test]
fn malformed_schedule_is_never_due() {
    let item = intention(cron("every tuesday"), t0() - Duration::days(30));
    assert!(!due(&item, t0()));
    assert_eq!(next_occurrence(&item, t0()), None);
}

#[test]
fn daily_cron_is_due_after_a_missed_day() {
    let now = Utc::now();
    let item = intention(cron("0 9 * * *"), now - Duration::days(2));
    assert!(due(&item, now));
}

#[test]
fn cron_not_due_right_after_creation() {
    let now = Utc::now();
    let item = intention(cron("0 9 * * *"), now);
    assert!(!due(&item, now));
}

#[test]
fn cron_next_occurrence_is_within_one_period() {
    let now = Utc::now();
    let item = intention(cron("* * * * *"), now - Duration::minutes(5));
    let next = next_occurrence(&item, now).expect("next");
    assert!(next > now);
    assert!(next - now <= Duration::seconds(60));

    let daily = intention(cron("0 9 * * *"), now);
    let next = next_occurrence(&daily, now).expect("next");
    assert!(next > now);
    assert!(next - now <= Duration::hours(25));
}

#[test]
fn every_minute_cron_due_once_a_minute_passed() {
    let now = Utc::now();
    let mut item = intention(cron("* * * * *"), now - Duration::minutes(10));
    assert!(due(&item, now));

    ran_at(&mut item, now);
    assert!(!due(&item, now));
}

#[test]
fn due_follows_scheduled_next_run_not_creation() {
    let created = t0() - Duration::days(2);
    let mut item = intention(cron("0 9 * * *"), created);
    // Rescheduled from t0: no occurrence between t0 and the new next_run.
    item.next_run = next_occurrence(&item, t0());
    assert!(!due(&item, t0()));
    assert!(due(&item, item.next_run.expect("next")));
}

#[test]
fn missing_next_run_is_never_due() {
    let mut item = intention(Trigger::Interval { seconds: 60 }, t0());
    item.next_run = None;
    assert!(!due(&item, t0() + Duration::days(1)));
}
