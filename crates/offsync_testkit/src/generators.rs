//! Property-based test generators using proptest.
//!
//! Provides strategies for generating queued changes and delivery outcomes.

use chrono::{TimeZone, Utc};
use offsync_protocol::{ChangeType, DeliveryOutcome, Payload};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// A change as a caller would queue it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedChange {
    /// Create, update or delete.
    pub change_type: ChangeType,
    /// Entity kind.
    pub resource_kind: String,
    /// Entity id.
    pub resource_id: String,
    /// Mutation body.
    pub payload: Payload,
}

/// Strategy for change types.
pub fn change_type_strategy() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Create),
        Just(ChangeType::Update),
        Just(ChangeType::Delete),
    ]
}

/// Strategy for resource kinds, drawn from a small fixed set so changes
/// collide on the same entities.
pub fn resource_kind_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["order", "comment", "template"]).prop_map(str::to_owned)
}

/// Strategy for resource ids, from a small pool.
pub fn resource_id_strategy() -> impl Strategy<Value = String> {
    (1u8..=4).prop_map(|n| format!("ID-{n}"))
}

/// Strategy for flat JSON object payloads.
pub fn payload_strategy() -> impl Strategy<Value = Payload> {
    let value = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
    ];
    prop::collection::btree_map("_?[a-z]{1,8}", value, 0..6)
        .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>()))
}

/// Strategy for a single queued change.
pub fn queued_change_strategy() -> impl Strategy<Value = QueuedChange> {
    (
        change_type_strategy(),
        resource_kind_strategy(),
        resource_id_strategy(),
        payload_strategy(),
    )
        .prop_map(|(change_type, resource_kind, resource_id, payload)| QueuedChange {
            change_type,
            resource_kind,
            resource_id,
            payload,
        })
}

/// Strategy for a batch of queued changes.
pub fn queued_changes_strategy(max: usize) -> impl Strategy<Value = Vec<QueuedChange>> {
    prop::collection::vec(queued_change_strategy(), 0..=max)
}

/// Strategy for delivery outcomes, weighted towards success.
pub fn delivery_outcome_strategy() -> impl Strategy<Value = DeliveryOutcome> {
    prop_oneof![
        6 => Just(DeliveryOutcome::Success),
        2 => "[a-z ]{1,20}".prop_map(DeliveryOutcome::transient),
        1 => (payload_strategy(), 0i64..2_000_000_000).prop_map(|(snapshot, secs)| {
            let at = Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now);
            DeliveryOutcome::conflict(snapshot, at)
        }),
    ]
}
