//! Queued mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque payload carried by a mutation or entity snapshot.
pub type Payload = serde_json::Value;

/// Unique identifier of a queued mutation, assigned at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifies one entity: its kind plus its id within that kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
    /// Entity family, e.g. `"order"`. Never interpreted by the engine.
    pub resource_kind: String,
    /// Entity id within its kind.
    pub resource_id: String,
}

impl ResourceKey {
    /// Creates a resource key.
    pub fn new(resource_kind: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_kind: resource_kind.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_kind, self.resource_id)
    }
}

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// A new entity.
    Create,
    /// A change to an existing entity.
    Update,
    /// Removal of an entity.
    Delete,
}

impl ChangeType {
    /// Returns the lowercase name used in logs and CLI output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown change type: {other}")),
        }
    }
}

/// Delivery state of a queued mutation.
///
/// ```text
/// Pending -> Syncing -> Completed (row deleted)
///                    -> Failed    (eligible again on the next pass)
///                    -> conflict  (handed to the resolver)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Waiting for the next pass.
    Pending,
    /// A pass is delivering it right now.
    Syncing,
    /// Last delivery attempt failed, or a conflict needs a human.
    Failed,
    /// Delivered. Never persisted; the row is deleted instead.
    Completed,
}

impl ItemStatus {
    /// Returns the lowercase name used in logs and CLI output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable record of one pending mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Unique id.
    pub id: ItemId,
    /// Kind of mutation.
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Entity family.
    pub resource_kind: String,
    /// Entity id within its kind.
    pub resource_id: String,
    /// Data to deliver.
    pub payload: Payload,
    /// When the mutation was queued.
    pub enqueued_at: DateTime<Utc>,
    /// Delivery attempts made so far.
    pub retry_count: u32,
    /// Current state.
    pub status: ItemStatus,
    /// Message from the last failed attempt.
    pub last_error: Option<String>,
    /// Enqueue order within the store.
    pub sequence: u64,
    /// Set while the item waits for manual conflict resolution.
    #[serde(default)]
    pub awaiting_resolution: bool,
}

impl SyncQueueItem {
    /// Creates a `Pending` item with no attempts.
    pub fn new(
        change_type: ChangeType,
        resource_kind: impl Into<String>,
        resource_id: impl Into<String>,
        payload: Payload,
        enqueued_at: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        Self {
            id: ItemId::new(),
            change_type,
            resource_kind: resource_kind.into(),
            resource_id: resource_id.into(),
            payload,
            enqueued_at,
            retry_count: 0,
            status: ItemStatus::Pending,
            last_error: None,
            sequence,
            awaiting_resolution: false,
        }
    }

    /// The entity this mutation targets.
    #[must_use]
    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_kind.clone(), self.resource_id.clone())
    }

    /// Whether a pass should pick this item up.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        matches!(self.status, ItemStatus::Pending | ItemStatus::Failed) && !self.awaiting_resolution
    }

    /// Moves the item into `Syncing` for a delivery attempt.
    pub fn begin_attempt(&mut self) {
        self.status = ItemStatus::Syncing;
    }

    /// Records a failed delivery attempt.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.status = ItemStatus::Failed;
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(message.into());
    }

    /// Parks the item as `Failed` until someone re-queues it.
    pub fn park(&mut self, message: impl Into<String>) {
        self.status = ItemStatus::Failed;
        self.last_error = Some(message.into());
        self.awaiting_resolution = true;
    }

    /// Puts the item back in line with a clean attempt count.
    pub fn requeue(&mut self) {
        self.status = ItemStatus::Pending;
        self.retry_count = 0;
        self.last_error = None;
        self.awaiting_resolution = false;
    }

    /// Reclassifies an item left `Syncing` by an interrupted pass.
    ///
    /// Returns whether anything changed.
    pub fn recover_interrupted(&mut self) -> bool {
        if self.status == ItemStatus::Syncing {
            self.status = ItemStatus::Pending;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn item() -> SyncQueueItem {
        SyncQueueItem::new(
            ChangeType::Update,
            "order",
            "ORD-1",
            json!({"title": "A"}),
            Utc::now(),
            1,
        )
    }

    #[test]
    fn new_item_is_pending() {
        let item = item();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert!(item.is_eligible());
        assert_eq!(item.resource_key().to_string(), "order:ORD-1");
    }

    #[test]
    fn failure_increments_retry_count() {
        let mut item = item();
        item.begin_attempt();
        assert!(!item.is_eligible());

        item.record_failure("timeout");
        item.record_failure("timeout");
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.retry_count, 2);
        assert!(item.is_eligible());
    }

    #[test]
    fn parked_item_is_not_eligible_until_requeued() {
        let mut item = item();
        item.record_failure("boom");
        item.park("requires manual resolution");
        assert!(!item.is_eligible());
        assert_eq!(item.retry_count, 1);

        item.requeue();
        assert!(item.is_eligible());
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.last_error, None);
    }

    #[test]
    fn interrupted_item_recovers() {
        let mut item = item();
        item.begin_attempt();
        assert!(item.recover_interrupted());
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(!item.recover_interrupted());
    }

    #[test]
    fn json_shape_uses_wire_names() {
        let value = serde_json::to_value(item()).unwrap();
        assert_eq!(value["type"], "Update");
        assert_eq!(value["resourceKind"], "order");
        assert_eq!(value["retryCount"], 0);
        assert_eq!(value["status"], "Pending");
    }

    #[test]
    fn survives_cbor() {
        let item = item();
        let mut buf = Vec::new();
        ciborium::into_writer(&item, &mut buf).unwrap();
        let decoded: SyncQueueItem = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn item_id_parses() {
        let id = ItemId::new();
        assert_eq!(id.to_string().parse::<ItemId>().unwrap(), id);
        assert!("not-a-uuid".parse::<ItemId>().is_err());
    }

    #[test]
    fn change_type_parses_case_insensitively() {
        assert_eq!("Delete".parse::<ChangeType>().unwrap(), ChangeType::Delete);
        assert!("upsert".parse::<ChangeType>().is_err());
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Attempt,
        Fail,
        Park,
        Requeue,
        Interrupt,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Attempt),
            Just(Step::Fail),
            Just(Step::Park),
            Just(Step::Requeue),
            Just(Step::Interrupt),
        ]
    }

    proptest! {
        #[test]
        fn lifecycle_keeps_counters_consistent(steps in prop::collection::vec(step(), 0..30)) {
            let mut item = item();
            let mut failures_since_requeue = 0u32;

            for step in steps {
                match step {
                    Step::Attempt => item.begin_attempt(),
                    Step::Fail => {
                        item.record_failure("503");
                        failures_since_requeue += 1;
                    }
                    Step::Park => item.park("requires manual resolution"),
                    Step::Requeue => {
                        item.requeue();
                        failures_since_requeue = 0;
                        prop_assert_eq!(item.status, ItemStatus::Pending);
                        prop_assert_eq!(item.last_error.as_deref(), None);
                        prop_assert!(item.is_eligible());
                    }
                    Step::Interrupt => {
                        let was_syncing = item.status == ItemStatus::Syncing;
                        prop_assert_eq!(item.recover_interrupted(), was_syncing);
                        prop_assert_ne!(item.status, ItemStatus::Syncing);
                    }
                }

                prop_assert_eq!(item.retry_count, failures_since_requeue);
                if item.awaiting_resolution {
                    prop_assert!(!item.is_eligible());
                }
                if item.status == ItemStatus::Syncing {
                    prop_assert!(!item.is_eligible());
                }
            }

            let mut buf = Vec::new();
            ciborium::into_writer(&item, &mut buf).unwrap();
            let decoded: SyncQueueItem = ciborium::from_reader(buf.as_slice()).unwrap();
            prop_assert_eq!(decoded, item);
        }
    }
}
