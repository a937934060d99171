//! Store contracts consumed by the engine.
//!
//! The engine never sees how either store persists data. Both contracts are
//! per entity type, so one backend type usually implements them for all four
//! entities; [`LocalBackend`] and [`RemoteBackend`] name that combination.

use crate::error::{RemoteResult, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use liftsync_model::{EntityId, Exercise, ExerciseSet, Plan, Session, SyncEntity, UserId};

/// A field-level change to a local record.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalUpdate<E> {
    /// A user edit. Mutable fields are taken from the record, which the
    /// caller has already stamped via `SyncMeta::touch` or `soft_delete`.
    /// The record becomes dirty.
    Edit(E),

    /// The record was pushed (or dropped as invalid). It becomes clean only
    /// if it has not been edited since it was read, i.e. its `updated_at`
    /// still equals `seen_updated_at`; otherwise only `synced_at` moves.
    MarkSynced {
        /// Timestamp sent in the upsert payload.
        synced_at: DateTime<Utc>,
        /// `updated_at` of the version that was pushed.
        seen_updated_at: DateTime<Utc>,
    },

    /// A newer remote version wins. Mutable fields are overwritten and the
    /// record becomes clean.
    ApplyRemote {
        /// The remote version.
        remote: E,
        /// Reconciliation time.
        synced_at: DateTime<Utc>,
    },
}

impl<E: SyncEntity> LocalUpdate<E> {
    /// Applies the update to `record` in place.
    pub fn apply_to(&self, record: &mut E) {
        match self {
            LocalUpdate::Edit(edited) => {
                record.absorb(edited);
                record.meta_mut().needs_sync = true;
            }
            LocalUpdate::MarkSynced {
                synced_at,
                seen_updated_at,
            } => {
                let meta = record.meta_mut();
                if meta.updated_at == *seen_updated_at {
                    meta.mark_synced(*synced_at);
                } else {
                    meta.synced_at = Some(*synced_at);
                }
            }
            LocalUpdate::ApplyRemote { remote, synced_at } => {
                record.absorb(remote);
                record.meta_mut().mark_synced(*synced_at);
            }
        }
    }
}

/// Durable device-local storage for one entity type.
#[async_trait]
pub trait LocalStore<E: SyncEntity>: Send + Sync {
    /// All live records of a user.
    async fn get_all(&self, user_id: &UserId) -> Result<Vec<E>, StoreError>;

    /// All records of a user, tombstones included.
    async fn get_all_including_deleted(&self, user_id: &UserId) -> Result<Vec<E>, StoreError>;

    /// A single record by id, tombstones included.
    async fn get_by_id_including_deleted(&self, id: EntityId) -> Result<Option<E>, StoreError>;

    /// Live children of a parent record.
    async fn get_children_of(&self, parent_id: EntityId) -> Result<Vec<E>, StoreError>;

    /// Children of a parent record, tombstones included.
    async fn get_children_of_including_deleted(
        &self,
        parent_id: EntityId,
    ) -> Result<Vec<E>, StoreError>;

    /// Inserts a new record.
    async fn create(&self, record: E) -> Result<E, StoreError>;

    /// Applies a field-level update.
    async fn update(&self, id: EntityId, update: LocalUpdate<E>) -> Result<(), StoreError>;

    /// Dirty records of a user, tombstones included.
    async fn get_dirty(&self, user_id: &UserId) -> Result<Vec<E>, StoreError> {
        let mut records = self.get_all_including_deleted(user_id).await?;
        records.retain(|r| r.meta().needs_sync);
        Ok(records)
    }
}

/// Which remote rows a pull fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullScope {
    /// Rows owned by the user (root entity).
    User(UserId),
    /// Rows whose foreign key `column` is one of `ids` (child entities).
    Parents {
        /// Foreign-key column.
        column: &'static str,
        /// Locally known parent ids.
        ids: Vec<EntityId>,
    },
}

/// Authoritative remote storage for one entity type.
#[async_trait]
pub trait RemoteStore<E: SyncEntity>: Send + Sync {
    /// Inserts or replaces the row with the same id. Must be idempotent.
    async fn upsert(&self, row: E::Row) -> RemoteResult<()>;

    /// Rows owned by a user.
    async fn select_by_user_id(&self, user_id: &UserId) -> RemoteResult<Vec<E::Row>>;

    /// Rows whose `column` is one of `ids`.
    async fn select_by_foreign_key_in(
        &self,
        column: &'static str,
        ids: &[EntityId],
    ) -> RemoteResult<Vec<E::Row>>;

    /// Rows selected by `scope`. An empty parent set selects nothing and
    /// does not contact the store.
    async fn select(&self, scope: &PullScope) -> RemoteResult<Vec<E::Row>> {
        match scope {
            PullScope::User(user_id) => self.select_by_user_id(user_id).await,
            PullScope::Parents { ids, .. } if ids.is_empty() => Ok(Vec::new()),
            PullScope::Parents { column, ids } => self.select_by_foreign_key_in(*column, ids).await,
        }
    }
}

/// A local store for every synced entity.
pub trait LocalBackend:
    LocalStore<Plan> + LocalStore<Session> + LocalStore<Exercise> + LocalStore<ExerciseSet>
{
}

impl<T> LocalBackend for T where
    T: LocalStore<Plan> + LocalStore<Session> + LocalStore<Exercise> + LocalStore<ExerciseSet>
{
}

/// A remote store for every synced entity.
pub trait RemoteBackend:
    RemoteStore<Plan> + RemoteStore<Session> + RemoteStore<Exercise> + RemoteStore<ExerciseSet>
{
}

impl<T> RemoteBackend for T where
    T: RemoteStore<Plan> + RemoteStore<Session> + RemoteStore<Exercise> + RemoteStore<ExerciseSet>
{
}
