use chrono::{Duration, TimeZone, Utc};

use proactive_hub::models::reminder::{time_remaining, Reminder, ReminderView};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .expect("valid instant")
}

#[test]
fn new_reminder_is_pending_with_unique_id() {
    let a = Reminder::new("in 5 minutes stretch".into(), now() + Duration::minutes(5), now());
    let b = Reminder::new("in 5 minutes stretch".into(), now() + Duration::minutes(5), now());
    assert!(!a.fired);
    assert_ne!(a.id, b.id);
}

#[test]
fn is_due_at_and_after_fire_time_only() {
    let reminder = Reminder::new("x".into(), now(), now() - Duration::minutes(1));
    assert!(!reminder.is_due(now() - Duration::seconds(1)));
    assert!(reminder.is_due(now()));
    assert!(reminder.is_due(now() + Duration::hours(1)));
}

#[test]
fn fired_reminder_is_never_due() {
    let mut reminder = Reminder::new("x".into(), now(), now());
    reminder.fired = true;
    assert!(!reminder.is_due(now() + Duration::days(1)));
}

#[test]
fn task_strips_time_phrase_and_preamble() {
    let reminder = Reminder::new(
        "Remind me to call mom in 5 minutes".into(),
        now(),
        now(),
    );
    assert_eq!(reminder.task(), "call mom");

    let reminder = Reminder::new("at 3pm water the plants".into(), now(), now());
    assert_eq!(reminder.task(), "water the plants");
}

#[test]
fn task_falls_back_to_full_message() {
    let reminder = Reminder::new("in 10 minutes".into(), now(), now());
    assert_eq!(reminder.task(), "in 10 minutes");
}

#[test]
fn task_is_consistent_across_threads() {
    let handles: Vec<_> = (0..8)
        .map(|i| {
            std::thread::spawn(move || {
                let message = format!("remind me to check build {i} at 9am");
                (0..50)
                    .map(|_| Reminder::new(message.clone(), now(), now()).task())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let tasks = handle.join().expect("thread");
        assert!(tasks.iter().all(|task| *task == format!("check build {i}")), "{tasks:?}");
    }
}

#[test]
fn time_remaining_formats() {
    let base = now();
    assert_eq!(time_remaining(base + Duration::seconds(45), base), "45s");
    assert_eq!(time_remaining(base + Duration::seconds(330), base), "5m 30s");
    assert_eq!(time_remaining(base + Duration::minutes(5), base), "5m");
    assert_eq!(time_remaining(base + Duration::minutes(125), base), "2h 5m");
    assert_eq!(time_remaining(base + Duration::hours(26), base), "1d 2h");
    assert_eq!(time_remaining(base, base), "due");
    assert_eq!(time_remaining(base - Duration::minutes(1), base), "due");
}

#[test]
fn view_serializes_flat_with_derived_fields() {
    let reminder = Reminder::new(
        "remind me to stretch in 2 minutes".into(),
        now() + Duration::minutes(2),
        now(),
    );
    let id = reminder.id.clone();
    let value = serde_json::to_value(ReminderView::at(reminder, now())).expect("serialize");

    assert_eq!(value["id"], id.as_str());
    assert_eq!(value["message"], "remind me to stretch in 2 minutes");
    assert_eq!(value["task"], "stretch");
    assert_eq!(value["time_remaining"], "2m");
    assert_eq!(value["fired"], false);
}
