//! Training plans, the root of the hierarchy.

use crate::entity::{EntityKind, SyncEntity};
use crate::error::{ModelResult, ValidationError};
use crate::id::{EntityId, UserId};
use crate::meta::SyncMeta;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A training plan owned by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Shared bookkeeping.
    pub meta: SyncMeta,
    /// Display name. Required.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Whether this is the user's current plan.
    pub is_active: bool,
}

impl Plan {
    /// Creates a new, dirty plan.
    pub fn new(user_id: UserId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            meta: SyncMeta::new_local(user_id, now),
            name: name.into(),
            description: None,
            is_active: false,
        }
    }
}

/// Remote row for `training_plans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRow {
    /// Primary key.
    pub id: EntityId,
    /// Owner.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Active flag.
    pub is_active: bool,
    /// ISO-8601 creation time.
    pub created_at: String,
    /// ISO-8601 last update time.
    pub updated_at: String,
    /// ISO-8601 tombstone.
    pub deleted_at: Option<String>,
    /// ISO-8601 reconciliation time.
    pub synced_at: Option<String>,
}

impl SyncEntity for Plan {
    const KIND: EntityKind = EntityKind::Plan;
    type Row = PlanRow;

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn parent_id(&self) -> Option<EntityId> {
        None
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::missing(Self::KIND.name(), self.meta.id, "name"));
        }
        Ok(())
    }

    fn to_row(&self, synced_at: DateTime<Utc>) -> PlanRow {
        PlanRow {
            id: self.meta.id,
            user_id: self.meta.user_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            is_active: self.is_active,
            created_at: timestamp::format(self.meta.created_at),
            updated_at: timestamp::format(self.meta.updated_at),
            deleted_at: timestamp::format_opt(self.meta.deleted_at),
            synced_at: Some(timestamp::format(synced_at)),
        }
    }

    fn from_row(row: &PlanRow) -> ModelResult<Self> {
        Ok(Self {
            meta: SyncMeta::from_columns(
                row.id,
                &row.user_id,
                &row.created_at,
                &row.updated_at,
                row.deleted_at.as_deref(),
                row.synced_at.as_deref(),
            )?,
            name: row.name.clone(),
            description: row.description.clone(),
            is_active: row.is_active,
        })
    }

    fn absorb(&mut self, remote: &Self) {
        self.meta.absorb(&remote.meta);
        self.name = remote.name.clone();
        self.description = remote.description.clone();
        self.is_active = remote.is_active;
    }
}
