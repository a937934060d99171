//! Bookkeeping shared by every synced record.

use crate::error::ModelResult;
use crate::id::{EntityId, UserId};
use crate::timestamp;
use chrono::{DateTime, Utc};

/// Identity, ownership and sync state common to all entities.
///
/// # Lifecycle
///
/// - Created locally: `needs_sync = true`, `deleted_at = None`
/// - Any local mutation, including soft-delete: `updated_at = now`,
///   `needs_sync = true`
/// - Successful push or any pull-driven write: `needs_sync = false`,
///   `synced_at = Some(..)`
///
/// Deletion is always a tombstone. Rows are never physically removed while
/// a sync is pending.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMeta {
    /// Client-generated primary key.
    pub id: EntityId,
    /// Owner of the record.
    pub user_id: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last local mutation (or the absorbed remote value).
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Time of the last successful reconciliation.
    pub synced_at: Option<DateTime<Utc>>,
    /// Dirty flag.
    pub needs_sync: bool,
}

impl SyncMeta {
    /// Creates metadata for a record created locally at `now`.
    pub fn new_local(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: EntityId::new(),
            user_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            synced_at: None,
            needs_sync: true,
        }
    }

    /// Rebuilds metadata from the base columns of a remote row.
    ///
    /// The result is clean: pulled records never enter the dirty state.
    pub(crate) fn from_columns(
        id: EntityId,
        user_id: &UserId,
        created_at: &str,
        updated_at: &str,
        deleted_at: Option<&str>,
        synced_at: Option<&str>,
    ) -> ModelResult<Self> {
        Ok(Self {
            id,
            user_id: user_id.clone(),
            created_at: timestamp::parse("created_at", created_at)?,
            updated_at: timestamp::parse("updated_at", updated_at)?,
            deleted_at: timestamp::parse_opt("deleted_at", deleted_at)?,
            synced_at: timestamp::parse_opt("synced_at", synced_at)?,
            needs_sync: false,
        })
    }

    /// Copies the remotely mutable bookkeeping (`updated_at`, `deleted_at`).
    pub(crate) fn absorb(&mut self, remote: &SyncMeta) {
        self.updated_at = remote.updated_at;
        self.deleted_at = remote.deleted_at;
    }

    /// Returns true if the record carries a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Records a local mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.needs_sync = true;
    }

    /// Soft-deletes the record. Deleting twice keeps the first tombstone.
    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
        }
        self.touch(now);
    }

    /// Marks the record clean.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.needs_sync = false;
        self.synced_at = Some(at);
    }

    /// Returns true if `remote_updated_at` should overwrite this record.
    ///
    /// Tombstones are sticky and ties favor the local copy.
    pub fn yields_to(&self, remote_updated_at: DateTime<Utc>) -> bool {
        !self.is_deleted() && remote_updated_at > self.updated_at
    }
}
