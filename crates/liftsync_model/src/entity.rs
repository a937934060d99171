//! The contract every synced entity type fulfils.

use crate::error::{ModelResult, ValidationError};
use crate::id::EntityId;
use crate::meta::SyncMeta;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// The synced entity types, in parent-to-child order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// Training plan (root).
    Plan,
    /// Session within a plan.
    Session,
    /// Exercise within a session.
    Exercise,
    /// Set within an exercise.
    Set,
}

impl EntityKind {
    /// Every kind, parents before children.
    pub const SYNC_ORDER: [EntityKind; 4] = [
        EntityKind::Plan,
        EntityKind::Session,
        EntityKind::Exercise,
        EntityKind::Set,
    ];

    /// Short lowercase name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Plan => "plan",
            EntityKind::Session => "session",
            EntityKind::Exercise => "exercise",
            EntityKind::Set => "set",
        }
    }

    /// Remote table holding this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Plan => "training_plans",
            EntityKind::Session => "training_sessions",
            EntityKind::Exercise => "exercises",
            EntityKind::Set => "exercise_sets",
        }
    }

    /// Remote column referencing the parent, or `None` for the root.
    pub fn parent_column(&self) -> Option<&'static str> {
        match self {
            EntityKind::Plan => None,
            EntityKind::Session => Some("plan_id"),
            EntityKind::Exercise => Some("session_id"),
            EntityKind::Set => Some("exercise_id"),
        }
    }

    /// The parent kind, or `None` for the root.
    pub fn parent(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Plan => None,
            EntityKind::Session => Some(EntityKind::Plan),
            EntityKind::Exercise => Some(EntityKind::Session),
            EntityKind::Set => Some(EntityKind::Exercise),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A record type that can be reconciled between the local and remote store.
///
/// Implementations provide the entity-specific pieces of reconciliation:
/// required-field validation, the local → remote field mapping, and the
/// set of mutable fields a newer remote version overwrites.
pub trait SyncEntity: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Which entity this is.
    const KIND: EntityKind;

    /// Remote row shape (snake_case columns, timestamps as ISO-8601 strings).
    type Row: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static;

    /// Shared bookkeeping.
    fn meta(&self) -> &SyncMeta;

    /// Mutable access to the shared bookkeeping.
    fn meta_mut(&mut self) -> &mut SyncMeta;

    /// The referenced parent, or `None` for the root entity.
    fn parent_id(&self) -> Option<EntityId>;

    /// Checks required fields. Only called for records that are not deleted.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Maps the record to its remote row, stamping `synced_at`.
    fn to_row(&self, synced_at: DateTime<Utc>) -> Self::Row;

    /// Builds a clean local record from a remote row.
    fn from_row(row: &Self::Row) -> ModelResult<Self>;

    /// Overwrites every mutable field (including `updated_at` and
    /// `deleted_at`) with the values from `remote`. Identity, ownership and
    /// `created_at` are kept. Sync flags are left to the caller.
    fn absorb(&mut self, remote: &Self);

    /// Shorthand for `self.meta().id`.
    fn id(&self) -> EntityId {
        self.meta().id
    }
}
