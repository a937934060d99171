//! Exercises belong to a session.

use crate::entity::{EntityKind, SyncEntity};
use crate::error::{ModelResult, ValidationError};
use crate::id::{EntityId, UserId};
use crate::meta::SyncMeta;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An exercise performed within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Exercise {
    /// Shared bookkeeping.
    pub meta: SyncMeta,
    /// Owning session.
    pub session_id: EntityId,
    /// Display name. Required.
    pub name: String,
    /// Position within the session. Required.
    pub order_index: Option<i32>,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl Exercise {
    /// Creates a new, dirty exercise under `session_id`.
    pub fn new(
        user_id: UserId,
        session_id: EntityId,
        name: impl Into<String>,
        order_index: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            meta: SyncMeta::new_local(user_id, now),
            session_id,
            name: name.into(),
            order_index: Some(order_index),
            notes: None,
        }
    }
}

/// Remote row for `exercises`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ExerciseRow {
    pub id: EntityId,
    pub user_id: UserId,
    pub session_id: EntityId,
    pub name: String,
    pub order_index: Option<i32>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
    pub synced_at: Option<String>,
}

impl SyncEntity for Exercise {
    const KIND: EntityKind = EntityKind::Exercise;
    type Row = ExerciseRow;

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn parent_id(&self) -> Option<EntityId> {
        Some(self.session_id)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let kind = Self::KIND.name();
        if self.name.trim().is_empty() {
            return Err(ValidationError::missing(kind, self.meta.id, "name"));
        }
        if self.order_index.is_none() {
            return Err(ValidationError::missing(kind, self.meta.id, "order_index"));
        }
        Ok(())
    }

    fn to_row(&self, synced_at: DateTime<Utc>) -> ExerciseRow {
        ExerciseRow {
            id: self.meta.id,
            user_id: self.meta.user_id.clone(),
            session_id: self.session_id,
            name: self.name.clone(),
            order_index: self.order_index,
            notes: self.notes.clone(),
            created_at: timestamp::format(self.meta.created_at),
            updated_at: timestamp::format(self.meta.updated_at),
            deleted_at: timestamp::format_opt(self.meta.deleted_at),
            synced_at: Some(timestamp::format(synced_at)),
        }
    }

    fn from_row(row: &ExerciseRow) -> ModelResult<Self> {
        Ok(Self {
            meta: SyncMeta::from_columns(
                row.id,
                &row.user_id,
                &row.created_at,
                &row.updated_at,
                row.deleted_at.as_deref(),
                row.synced_at.as_deref(),
            )?,
            session_id: row.session_id,
            name: row.name.clone(),
            order_index: row.order_index,
            notes: row.notes.clone(),
        })
    }

    fn absorb(&mut self, remote: &Self) {
        self.meta.absorb(&remote.meta);
        self.session_id = remote.session_id;
        self.name = remote.name.clone();
        self.order_index = remote.order_index;
        self.notes = remote.notes.clone();
    }
}
