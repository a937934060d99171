//! Sessions belong to a plan.

use crate::entity::{EntityKind, SyncEntity};
use crate::error::{ModelError, ModelResult, ValidationError};
use crate::id::{EntityId, UserId};
use crate::meta::SyncMeta;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A workout session inside a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Shared bookkeeping.
    pub meta: SyncMeta,
    /// Owning plan.
    pub plan_id: EntityId,
    /// Display name. Required.
    pub name: String,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: Option<u8>,
    /// Position within the plan. Required.
    pub order_index: Option<i32>,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl Session {
    /// Creates a new, dirty session under `plan_id`.
    pub fn new(
        user_id: UserId,
        plan_id: EntityId,
        name: impl Into<String>,
        order_index: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            meta: SyncMeta::new_local(user_id, now),
            plan_id,
            name: name.into(),
            day_of_week: None,
            order_index: Some(order_index),
            notes: None,
        }
    }
}

/// Remote row for `training_sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct SessionRow {
    pub id: EntityId,
    pub user_id: UserId,
    pub plan_id: EntityId,
    pub name: String,
    pub day_of_week: Option<i16>,
    pub order_index: Option<i32>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
    pub synced_at: Option<String>,
}

impl SyncEntity for Session {
    const KIND: EntityKind = EntityKind::Session;
    type Row = SessionRow;

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn parent_id(&self) -> Option<EntityId> {
        Some(self.plan_id)
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

    fn to_row(&self, synced_at: DateTime<Utc>) -> SessionRow {
        SessionRow {
            id: self.meta.id,
            user_id: self.meta.user_id.clone(),
            plan_id: self.plan_id,
            name: self.name.clone(),
            day_of_week: self.day_of_week.map(i16::from),
            order_index: self.order_index,
            notes: self.notes.clone(),
            created_at: timestamp::format(self.meta.created_at),
            updated_at: timestamp::format(self.meta.updated_at),
            deleted_at: timestamp::format_opt(self.meta.deleted_at),
            synced_at: Some(timestamp::format(synced_at)),
        }
    }

    fn from_row(row: &SessionRow) -> ModelResult<Self> {
        let day_of_week = row
            .day_of_week
            .map(|day| match u8::try_from(day) {
                Ok(day) if day < 7 => Ok(day),
                _ => Err(ModelError::OutOfRange {
                    column: "day_of_week",
                    value: i64::from(day),
                }),
            })
            .transpose()?;

        Ok(Self {
            meta: SyncMeta::from_columns(
                row.id,
                &row.user_id,
                &row.created_at,
                &row.updated_at,
                row.deleted_at.as_deref(),
                row.synced_at.as_deref(),
            )?,
            plan_id: row.plan_id,
            name: row.name.clone(),
            day_of_week,
            order_index: row.order_index,
            notes: row.notes.clone(),
        })
    }

    fn absorb(&mut self, remote: &Self) {
        self.meta.absorb(&remote.meta);
        self.plan_id = remote.plan_id;
        self.name = remote.name.clone();
        self.day_of_week = remote.day_of_week;
        self.order_index = remote.order_index;
        self.notes = remote.notes.clone();
    }
}
