//! Integration tests for the intention daemon: scheduled firing, run-now
//! exclusion, failure cleanup, and shutdown drain.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Semaphore;

use proactive_hub::intentions::IntentionStore;
use proactive_hub::models::event::OutboundEvent;
use proactive_hub::models::intention::{NewIntention, Trigger};
use proactive_hub::AppError;

use super::test_helpers::{collect_until, harness, is_end_of, ScriptedAgent};

fn fields(name: &str, trigger: Trigger, enabled: bool) -> NewIntention {
    NewIntention {
        name: name.into(),
        prompt: format!("prompt for {name}"),
        trigger,
        context_sources: Vec::new(),
        enabled,
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached within timeout");
}

fn store_of(h: &super::test_helpers::Harness) -> Arc<IntentionStore> {
    Arc::clone(h.state.daemon.store())
}

#[tokio::test]
async fn run_now_rejects_overlap_until_finished() {
    let gate = Arc::new(Semaphore::new(0));
    let agent = ScriptedAgent::gated(Arc::clone(&gate));
    let max_active = Arc::clone(&agent.max_active);
    let mut h = harness(agent);
    let store = store_of(&h);
    let daemon = Arc::clone(&h.state.daemon);

    let created = store
        .create(fields("report", Trigger::Manual {}, true), Utc::now())
        .await
        .expect("created");

    let first = daemon.run_intention_now(&created.id).await.expect("first run");
    assert!(first.running);

    let second = daemon
        .run_intention_now(&created.id)
        .await
        .expect_err("overlap rejected");
    assert!(matches!(second, AppError::AlreadyRunning(_)));
    assert!(store.is_running(&created.id));

    gate.add_permits(1);
    collect_until(&mut h.events, |e| is_end_of(e, &created.id)).await;
    wait_until(|| !store.is_running(&created.id)).await;

    gate.add_permits(1);
    daemon
        .run_intention_now(&created.id)
        .await
        .expect("runs again once finished");
    collect_until(&mut h.events, |e| is_end_of(e, &created.id)).await;

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_now_unknown_is_not_found() {
    let h = harness(ScriptedAgent::default());
    let err = h
        .state
        .daemon
        .run_intention_now("missing")
        .await
        .expect_err("unknown id");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn failing_agent_still_ends_and_clears_running() {
    let mut h = harness(ScriptedAgent::failing());
    let store = store_of(&h);

    let created = store
        .create(fields("fragile", Trigger::Manual {}, true), Utc::now())
        .await
        .expect("created");
    h.state
        .daemon
        .run_intention_now(&created.id)
        .await
        .expect("launched");

    let events = collect_until(&mut h.events, |e| is_end_of(e, &created.id)).await;
    let kinds: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::IntentionEvent { chunk, .. } => Some(chunk.kind.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, ["start", "message", "error", "end"]);

    wait_until(|| !store.is_running(&created.id)).await;
}

#[tokio::test]
async fn scheduled_interval_fires_from_daemon_loop() {
    let agent = ScriptedAgent::default();
    let started = Arc::clone(&agent.started);
    let mut h = harness(agent);
    let store = store_of(&h);

    let created = store
        .create(
            fields("tick", Trigger::Interval { seconds: 1 }, true),
            Utc::now() - ChronoDuration::seconds(5),
        )
        .await
        .expect("created");

    assert!(h.state.daemon.start());
    let events = collect_until(&mut h.events, |e| is_end_of(e, &created.id)).await;
    h.state.daemon.stop().await;

    assert!(matches!(
        &events[0],
        OutboundEvent::IntentionEvent { chunk, .. } if chunk.kind == "start"
    ));
    assert!(started.load(Ordering::SeqCst) >= 1);

    let after = store.get(&created.id).expect("exists");
    assert!(after.last_run.is_some());
    assert!(after.next_run > after.last_run);
}

#[tokio::test]
async fn disabled_and_manual_intentions_never_fire() {
    let agent = ScriptedAgent::default();
    let started = Arc::clone(&agent.started);
    let h = harness(agent);
    let store = store_of(&h);
    let long_ago = Utc::now() - ChronoDuration::hours(1);

    store
        .create(fields("off", Trigger::Interval { seconds: 1 }, false), long_ago)
        .await
        .expect("created");
    store
        .create(fields("manual", Trigger::Manual {}, true), long_ago)
        .await
        .expect("created");

    h.state.daemon.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.state.daemon.stop().await;

    assert_eq!(started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scheduled_and_on_demand_runs_never_overlap() {
    let gate = Arc::new(Semaphore::new(0));
    let agent = ScriptedAgent::gated(Arc::clone(&gate));
    let started = Arc::clone(&agent.started);
    let max_active = Arc::clone(&agent.max_active);
    let h = harness(agent);
    let store = store_of(&h);

    let created = store
        .create(
            fields("busy", Trigger::Interval { seconds: 1 }, true),
            Utc::now() - ChronoDuration::seconds(10),
        )
        .await
        .expect("created");

    h.state.daemon.start();
    wait_until(|| started.load(Ordering::SeqCst) == 1).await;

    for _ in 0..5 {
        let err = h
            .state
            .daemon
            .run_intention_now(&created.id)
            .await
            .expect_err("in flight");
        assert!(matches!(err, AppError::AlreadyRunning(_)));
    }
    // Several poll ticks pass while the run is gated.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);

    gate.add_permits(100);
    h.state.daemon.stop().await;
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn start_is_idempotent_and_stop_is_repeatable() {
    let h = harness(ScriptedAgent::default());
    let daemon = &h.state.daemon;

    assert!(daemon.start());
    assert!(!daemon.start());
    assert!(daemon.is_running());

    daemon.stop().await;
    assert!(!daemon.is_running());
    daemon.stop().await;

    assert!(daemon.start(), "can restart after stop");
    daemon.stop().await;
}

#[tokio::test]
async fn stop_waits_for_in_flight_execution() {
    let gate = Arc::new(Semaphore::new(0));
    let mut h = harness(ScriptedAgent::gated(Arc::clone(&gate)));
    let store = store_of(&h);
    let created = store
        .create(fields("slow", Trigger::Manual {}, true), Utc::now())
        .await
        .expect("created");

    h.state.daemon.start();
    h.state
        .daemon
        .run_intention_now(&created.id)
        .await
        .expect("launched");

    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        gate.add_permits(1);
    });

    h.state.daemon.stop().await;
    releaser.await.expect("releaser");

    assert_eq!(h.state.daemon.in_flight(), 0);
    assert!(!store.is_running(&created.id));
    let events = collect_until(&mut h.events, |e| is_end_of(e, &created.id)).await;
    assert!(!events.is_empty());
}

#[tokio::test]
async fn stop_clears_running_after_grace_expires() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(ScriptedAgent::gated(Arc::clone(&gate)));
    let store = store_of(&h);
    let created = store
        .create(fields("stuck", Trigger::Manual {}, true), Utc::now())
        .await
        .expect("created");

    h.state
        .daemon
        .run_intention_now(&created.id)
        .await
        .expect("launched");
    assert!(store.is_running(&created.id));

    tokio::time::timeout(Duration::from_secs(5), h.state.daemon.stop())
        .await
        .expect("stop bounded by grace");
    assert!(!store.is_running(&created.id));

    gate.close();
}

#[tokio::test]
async fn daemon_loop_survives_panicking_runs_and_closed_event_channel() {
    let agent = ScriptedAgent {
        panics: true,
        ..ScriptedAgent::default()
    };
    let started = Arc::clone(&agent.started);
    let h = harness(agent);
    let store = store_of(&h);
    let daemon = Arc::clone(&h.state.daemon);
    drop(h);

    let created = store
        .create(
            fields("unstable", Trigger::Interval { seconds: 1 }, true),
            Utc::now() - ChronoDuration::seconds(5),
        )
        .await
        .expect("created");

    assert!(daemon.start());
    wait_until(|| started.load(Ordering::SeqCst) >= 2).await;
    assert!(daemon.is_running());
    wait_until(|| !store.is_running(&created.id)).await;

    daemon.stop().await;
    assert!(!daemon.is_running());
}
