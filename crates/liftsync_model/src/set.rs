//! Sets, the leaves of the hierarchy.

use crate::entity::{EntityKind, SyncEntity};
use crate::error::{ModelResult, ValidationError};
use crate::id::{EntityId, UserId};
use crate::meta::SyncMeta;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One set of an exercise.
///
/// A set is the most frequently edited record: it is usually created from a
/// template with only an order index, filled in while training, and stamped
/// with `completed_at` once done. It is pushable only once `repetitions` and
/// `order_index` are both known.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseSet {
    /// Shared bookkeeping.
    pub meta: SyncMeta,
    /// Owning exercise.
    pub exercise_id: EntityId,
    /// Position within the exercise. Required.
    pub order_index: Option<i32>,
    /// Repetition count. Required.
    pub repetitions: Option<u32>,
    /// Load in kilograms.
    pub weight: Option<f64>,
    /// Rest after the set, in seconds.
    pub rest_time: Option<u32>,
    /// When the set was performed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExerciseSet {
    /// Creates a new, dirty set under `exercise_id`.
    pub fn new(
        user_id: UserId,
        exercise_id: EntityId,
        order_index: i32,
        repetitions: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            meta: SyncMeta::new_local(user_id, now),
            exercise_id,
            order_index: Some(order_index),
            repetitions: Some(repetitions),
            weight: None,
            rest_time: None,
            completed_at: None,
        }
    }

    /// Returns true once the set has been performed.
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Remote row for `exercise_sets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSetRow {
    /// Primary key.
    pub id: EntityId,
    /// Owner.
    pub user_id: UserId,
    /// Owning exercise.
    pub exercise_id: EntityId,
    /// Position within the exercise.
    pub order_index: Option<i32>,
    /// Repetition count.
    pub repetitions: Option<u32>,
    /// Load in kilograms.
    pub weight: Option<f64>,
    /// Rest in seconds.
    pub rest_time: Option<u32>,
    /// ISO-8601 completion time.
    pub completed_at: Option<String>,
    /// ISO-8601 creation time.
    pub created_at: String,
    /// ISO-8601 last update time.
    pub updated_at: String,
    /// ISO-8601 tombstone.
    pub deleted_at: Option<String>,
    /// ISO-8601 reconciliation time.
    pub synced_at: Option<String>,
}

impl SyncEntity for ExerciseSet {
    const KIND: EntityKind = EntityKind::Set;
    type Row = ExerciseSetRow;

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn parent_id(&self) -> Option<EntityId> {
        Some(self.exercise_id)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let kind = Self::KIND.name();
        if self.repetitions.is_none() {
            return Err(ValidationError::missing(kind, self.meta.id, "repetitions"));
        }
        if self.order_index.is_none() {
            return Err(ValidationError::missing(kind, self.meta.id, "order_index"));
        }
        // JSON has no NaN or infinity; serde_json would send null.
        if self.weight.is_some_and(|w| !w.is_finite()) {
            return Err(ValidationError::invalid(
                kind,
                self.meta.id,
                "weight",
                "must be finite",
            ));
        }
        Ok(())
    }

    fn to_row(&self, synced_at: DateTime<Utc>) -> ExerciseSetRow {
        ExerciseSetRow {
            id: self.meta.id,
            user_id: self.meta.user_id.clone(),
            exercise_id: self.exercise_id,
            order_index: self.order_index,
            repetitions: self.repetitions,
            weight: self.weight,
            rest_time: self.rest_time,
            completed_at: timestamp::format_opt(self.completed_at),
            created_at: timestamp::format(self.meta.created_at),
            updated_at: timestamp::format(self.meta.updated_at),
            deleted_at: timestamp::format_opt(self.meta.deleted_at),
            synced_at: Some(timestamp::format(synced_at)),
        }
    }

    fn from_row(row: &ExerciseSetRow) -> ModelResult<Self> {
        Ok(Self {
            meta: SyncMeta::from_columns(
                row.id,
                &row.user_id,
                &row.created_at,
                &row.updated_at,
                row.deleted_at.as_deref(),
                row.synced_at.as_deref(),
            )?,
            exercise_id: row.exercise_id,
            order_index: row.order_index,
            repetitions: row.repetitions,
            weight: row.weight,
            rest_time: row.rest_time,
            completed_at: timestamp::parse_opt("completed_at", row.completed_at.as_deref())?,
        })
    }

    fn absorb(&mut self, remote: &Self) {
        self.meta.absorb(&remote.meta);
        self.exercise_id = remote.exercise_id;
        self.order_index = remote.order_index;
        self.repetitions = remote.repetitions;
        self.weight = remote.weight;
        self.rest_time = remote.rest_time;
        self.completed_at = remote.completed_at;
    }
}
