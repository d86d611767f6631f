//! Conflict resolution seams.

use async_trait::async_trait;
use offsync_protocol::{ConflictInfo, ConflictPolicy, Payload, Resolution};

/// Chooses what happens to a queued mutation that hit a newer remote
/// version.
///
/// A pass waits for the answer before moving on to the next item.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Picks a resolution for one conflict.
    async fn resolve(&self, conflict: &ConflictInfo) -> Resolution;
}

#[async_trait]
impl ConflictResolver for ConflictPolicy {
    async fn resolve(&self, conflict: &ConflictInfo) -> Resolution {
        self.resolution_for(conflict)
    }
}

/// Adapts a plain function into a [`ConflictResolver`].
///
/// ```rust
/// use offsync_engine::resolver_fn;
/// use offsync_protocol::Resolution;
///
/// let resolver = resolver_fn(|conflict| {
///     if conflict.resource_kind == "comment" {
///         Resolution::Remote
///     } else {
///         Resolution::Merge
///     }
/// });
/// # let _ = resolver;
/// ```
pub fn resolver_fn<F>(f: F) -> FnResolver<F>
where
    F: Fn(&ConflictInfo) -> Resolution + Send + Sync,
{
    FnResolver(f)
}

/// See [`resolver_fn`].
#[derive(Debug, Clone)]
pub struct FnResolver<F>(F);

#[async_trait]
impl<F> ConflictResolver for FnResolver<F>
where
    F: Fn(&ConflictInfo) -> Resolution + Send + Sync,
{
    async fn resolve(&self, conflict: &ConflictInfo) -> Resolution {
        (self.0)(conflict)
    }
}

/// Combines local and remote payloads for [`Resolution::Merge`].
pub trait MergeStrategy: Send + Sync {
    /// Returns the payload to re-deliver.
    fn merge(&self, local: &Payload, remote: &Payload) -> Payload;
}

/// Field-level merge over JSON objects.
///
/// Starts from the remote object and copies every local field over it,
/// except fields whose name starts with `reserved_prefix`; those keep the
/// remote value. If either side is not an object the local payload wins
/// whole.
#[derive(Debug, Clone)]
pub struct FieldMerge {
    reserved_prefix: String,
}

impl FieldMerge {
    /// Creates a merge that leaves `reserved_prefix` fields to the remote.
    pub fn new(reserved_prefix: impl Into<String>) -> Self {
        Self {
            reserved_prefix: reserved_prefix.into(),
        }
    }

    /// The reserved field prefix.
    pub fn reserved_prefix(&self) -> &str {
        &self.reserved_prefix
    }

    fn is_reserved(&self, field: &str) -> bool {
        !self.reserved_prefix.is_empty() && field.starts_with(&self.reserved_prefix)
    }
}

impl Default for FieldMerge {
    fn default() -> Self {
        Self::new("_")
    }
}

impl MergeStrategy for FieldMerge {
    fn merge(&self, local: &Payload, remote: &Payload) -> Payload {
        let (Payload::Object(local_fields), Payload::Object(remote_fields)) = (local, remote) else {
            return local.clone();
        };

        let mut merged = remote_fields.clone();
        for (field, value) in local_fields {
            if !self.is_reserved(field) {
                merged.insert(field.clone(), value.clone());
            }
        }
        Payload::Object(merged)
    }
}
