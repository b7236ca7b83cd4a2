//! Wire-shape tests for inbound actions and outbound events.

use serde_json::json;

use proactive_hub::models::event::{ExecutionChunk, InboundAction, OutboundEvent};
use proactive_hub::models::intention::{IntentionUpdate, Trigger};

#[test]
fn inbound_actions_parse_by_action_tag() {
    let add: InboundAction =
        serde_json::from_value(json!({"action": "add_reminder", "message": "in 5 minutes"}))
            .expect("add_reminder");
    assert_eq!(
        add,
        InboundAction::AddReminder {
            message: "in 5 minutes".into()
        }
    );

    let list: InboundAction =
        serde_json::from_value(json!({"action": "get_reminders"})).expect("get_reminders");
    assert_eq!(list, InboundAction::GetReminders {});

    let run: InboundAction =
        serde_json::from_value(json!({"action": "run_intention", "id": "abc"})).expect("run");
    assert_eq!(run, InboundAction::RunIntention { id: "abc".into() });
}

#[test]
fn missing_fields_default_to_empty() {
    let delete: InboundAction =
        serde_json::from_value(json!({"action": "delete_reminder"})).expect("delete_reminder");
    assert_eq!(delete, InboundAction::DeleteReminder { id: String::new() });
}

#[test]
fn create_intention_carries_trigger() {
    let action: InboundAction = serde_json::from_value(json!({
        "action": "create_intention",
        "name": "standup",
        "prompt": "summarize yesterday",
        "trigger": {"type": "interval", "seconds": 3600},
        "context_sources": ["calendar"],
        "enabled": false
    }))
    .expect("create_intention");

    let InboundAction::CreateIntention(fields) = action else {
        panic!("wrong variant");
    };
    assert_eq!(fields.name, "standup");
    assert_eq!(fields.trigger, Trigger::Interval { seconds: 3600 });
    assert_eq!(fields.context_sources, ["calendar"]);
    assert!(!fields.enabled);
}

#[test]
fn update_intention_partial_fields() {
    let action: InboundAction = serde_json::from_value(json!({
        "action": "update_intention",
        "id": "i-1",
        "updates": {"enabled": false, "trigger": {"type": "manual"}}
    }))
    .expect("update_intention");

    assert_eq!(
        action,
        InboundAction::UpdateIntention {
            id: "i-1".into(),
            updates: IntentionUpdate {
                enabled: Some(false),
                trigger: Some(Trigger::Manual {}),
                ..IntentionUpdate::default()
            },
        }
    );
}

#[test]
fn unknown_action_is_rejected() {
    let result = serde_json::from_value::<InboundAction>(json!({"action": "format_disk"}));
    assert!(result.is_err());
}

#[test]
fn outbound_events_use_type_tag() {
    let value = serde_json::to_value(OutboundEvent::error("Reminder not found")).expect("json");
    assert_eq!(value, json!({"type": "error", "content": "Reminder not found"}));

    let value = serde_json::to_value(OutboundEvent::StreamStart {}).expect("json");
    assert_eq!(value, json!({"type": "stream_start"}));

    let value =
        serde_json::to_value(OutboundEvent::ReminderDeleted { id: "r-1".into() }).expect("json");
    assert_eq!(value, json!({"type": "reminder_deleted", "id": "r-1"}));
}

#[test]
fn intention_event_flattens_chunk() {
    let event = OutboundEvent::IntentionEvent {
        intention_id: "i-9".into(),
        chunk: ExecutionChunk::with_content("message", "partial output"),
    };
    let value: serde_json::Value =
        serde_json::from_str(&event.to_json().expect("encode")).expect("decode");

    assert_eq!(
        value,
        json!({
            "type": "intention_event",
            "intention_id": "i-9",
            "kind": "message",
            "content": "partial output"
        })
    );
}

#[test]
fn boundary_chunks_shapes() {
    let start = serde_json::to_value(ExecutionChunk::start("digest")).expect("json");
    assert_eq!(start, json!({"kind": "start", "intention_name": "digest"}));

    let end = serde_json::to_value(ExecutionChunk::end()).expect("json");
    assert_eq!(end, json!({"kind": "end"}));
}

#[test]
fn toggle_agent_defaults_to_off() {
    let on: InboundAction =
        serde_json::from_value(json!({"action": "toggle_agent", "active": true})).expect("on");
    assert_eq!(on, InboundAction::ToggleAgent { active: true });

    let bare: InboundAction =
        serde_json::from_value(json!({"action": "toggle_agent"})).expect("bare");
    assert_eq!(bare, InboundAction::ToggleAgent { active: false });
}

#[test]
fn agent_event_flattens_chunk() {
    let event = OutboundEvent::AgentEvent {
        chunk: ExecutionChunk::with_content("message", "thinking"),
    };
    assert_eq!(
        serde_json::to_value(&event).expect("json"),
        json!({"type": "agent_event", "kind": "message", "content": "thinking"})
    );
}
