//! In-memory stores.
//!
//! Both stores keep every write observable (write counters) and can be told
//! to fail, which makes them the backbone of the engine's tests. They are
//! also usable as real stores for embedding and demos.

use crate::error::{RemoteError, RemoteResult, StoreError};
use crate::store::{LocalStore, LocalUpdate, RemoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use liftsync_model::{
    EntityId, EntityKind, Exercise, ExerciseSet, Plan, Session, SyncEntity, UserId,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// One entity table of the local store.
struct MemoryTable<E> {
    rows: RwLock<BTreeMap<EntityId, E>>,
}

impl<E: SyncEntity> MemoryTable<E> {
    fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn select(&self, include_deleted: bool, predicate: impl Fn(&E) -> bool) -> Vec<E> {
        self.rows
            .read()
            .values()
            .filter(|r| include_deleted || !r.meta().is_deleted())
            .filter(|r| predicate(*r))
            .cloned()
            .collect()
    }

    fn by_id(&self, id: EntityId) -> Option<E> {
        self.rows.read().get(&id).cloned()
    }

    fn create(&self, record: E) -> Result<E, StoreError> {
        let mut rows = self.rows.write();
        let id = record.id();
        if rows.contains_key(&id) {
            return Err(StoreError::AlreadyExists { kind: E::KIND, id });
        }
        rows.insert(id, record.clone());
        Ok(record)
    }

    fn update(&self, id: EntityId, update: &LocalUpdate<E>) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let record = rows
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: E::KIND, id })?;
        update.apply_to(record);
        Ok(())
    }
}

/// A local store holding all four entity tables in memory.
pub struct MemoryLocalStore {
    plans: MemoryTable<Plan>,
    sessions: MemoryTable<Session>,
    exercises: MemoryTable<Exercise>,
    sets: MemoryTable<ExerciseSet>,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            plans: MemoryTable::new(),
            sessions: MemoryTable::new(),
            exercises: MemoryTable::new(),
            sets: MemoryTable::new(),
            writes: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Number of `create` and `update` calls that changed the store.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every operation fail with a backend error while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("local store unavailable".into()));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Edits a record the way the application does: applies `f`, stamps
    /// `updated_at = now` and marks the record dirty.
    pub async fn edit<E, F>(&self, id: EntityId, now: DateTime<Utc>, f: F) -> Result<E, StoreError>
    where
        E: SyncEntity,
        F: FnOnce(&mut E) + Send,
        Self: LocalStore<E>,
    {
        let mut record = <Self as LocalStore<E>>::get_by_id_including_deleted(self, id)
            .await?
            .ok_or(StoreError::NotFound { kind: E::KIND, id })?;
        f(&mut record);
        record.meta_mut().touch(now);
        <Self as LocalStore<E>>::update(self, id, LocalUpdate::Edit(record.clone())).await?;
        Ok(record)
    }

    /// Soft-deletes a record at `now`.
    pub async fn soft_delete<E>(&self, id: EntityId, now: DateTime<Utc>) -> Result<E, StoreError>
    where
        E: SyncEntity,
        Self: LocalStore<E>,
    {
        let mut record = <Self as LocalStore<E>>::get_by_id_including_deleted(self, id)
            .await?
            .ok_or(StoreError::NotFound { kind: E::KIND, id })?;
        record.meta_mut().soft_delete(now);
        <Self as LocalStore<E>>::update(self, id, LocalUpdate::Edit(record.clone())).await?;
        Ok(record)
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryLocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLocalStore")
            .field("plans", &self.plans.rows.read().len())
            .field("sessions", &self.sessions.rows.read().len())
            .field("exercises", &self.exercises.rows.read().len())
            .field("sets", &self.sets.rows.read().len())
            .field("writes", &self.write_count())
            .finish()
    }
}

macro_rules! memory_local_store {
    ($entity:ty, $table:ident) => {
        #[async_trait]
        impl LocalStore<$entity> for MemoryLocalStore {
            async fn get_all(&self, user_id: &UserId) -> Result<Vec<$entity>, StoreError> {
                self.check_available()?;
                Ok(self.$table.select(false, |r| r.meta.user_id == *user_id))
            }

            async fn get_all_including_deleted(
                &self,
                user_id: &UserId,
            ) -> Result<Vec<$entity>, StoreError> {
                self.check_available()?;
                Ok(self.$table.select(true, |r| r.meta.user_id == *user_id))
            }

            async fn get_by_id_including_deleted(
                &self,
                id: EntityId,
            ) -> Result<Option<$entity>, StoreError> {
                self.check_available()?;
                Ok(self.$table.by_id(id))
            }

            async fn get_children_of(&self, parent_id: EntityId) -> Result<Vec<$entity>, StoreError> {
                self.check_available()?;
                Ok(self
                    .$table
                    .select(false, |r| r.parent_id() == Some(parent_id)))
            }

            async fn get_children_of_including_deleted(
                &self,
                parent_id: EntityId,
            ) -> Result<Vec<$entity>, StoreError> {
                self.check_available()?;
                Ok(self
                    .$table
                    .select(true, |r| r.parent_id() == Some(parent_id)))
            }

            async fn create(&self, record: $entity) -> Result<$entity, StoreError> {
                self.check_available()?;
                let created = self.$table.create(record)?;
                self.record_write();
                Ok(created)
            }

            async fn update(
                &self,
                id: EntityId,
                update: LocalUpdate<$entity>,
            ) -> Result<(), StoreError> {
                self.check_available()?;
                self.$table.update(id, &update)?;
                self.record_write();
                Ok(())
            }
        }
    };
}

memory_local_store!(Plan, plans);
memory_local_store!(Session, sessions);
memory_local_store!(Exercise, exercises);
memory_local_store!(ExerciseSet, sets);

/// A remote store keeping rows as JSON objects, one map per table.
///
/// Rows are stored exactly as they would travel over the wire, so the
/// field mapping is exercised on every write and read.
pub struct MemoryRemoteStore {
    tables: RwLock<HashMap<&'static str, BTreeMap<EntityId, Value>>>,
    upserts: AtomicU64,
    requests: AtomicU64,
    failing_ids: RwLock<HashSet<EntityId>>,
    fail_next: AtomicU32,
    offline: AtomicBool,
}

impl MemoryRemoteStore {
    /// Creates an empty remote store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            upserts: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            failing_ids: RwLock::new(HashSet::new()),
            fail_next: AtomicU32::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Number of successful upserts.
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of requests received, failed ones included.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Rejects every upsert of `id` until [`clear_failures`](Self::clear_failures).
    pub fn fail_upserts_for(&self, id: EntityId) {
        self.failing_ids.write().insert(id);
    }

    /// Fails the next `count` requests of any kind as unavailable.
    pub fn fail_next_requests(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Makes every request fail as unavailable while `true`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.failing_ids.write().clear();
        self.fail_next.store(0, Ordering::SeqCst);
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Writes a row directly, as another device would. Not counted as an upsert.
    pub fn put_row<E: SyncEntity>(&self, row: &E::Row) -> RemoteResult<()> {
        let (id, value) = encode_row::<E>(row)?;
        self.tables
            .write()
            .entry(E::KIND.table())
            .or_default()
            .insert(id, value);
        Ok(())
    }

    /// Reads a row by id.
    pub fn row<E: SyncEntity>(&self, id: EntityId) -> Option<E::Row> {
        self.tables
            .read()
            .get(E::KIND.table())
            .and_then(|t| t.get(&id))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Number of rows in the table of `kind`.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.tables
            .read()
            .get(kind.table())
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Returns true if the table of `kind` is empty.
    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }

    fn begin_request(&self) -> RemoteResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("remote offline".into()));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RemoteError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    fn select_rows<E: SyncEntity>(
        &self,
        predicate: impl Fn(&Value) -> bool,
    ) -> RemoteResult<Vec<E::Row>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(E::KIND.table()) else {
            return Ok(Vec::new());
        };
        table
            .values()
            .filter(|v| predicate(*v))
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| RemoteError::Decode(e.to_string()))
            })
            .collect()
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        let sizes: BTreeMap<_, _> = tables.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("MemoryRemoteStore")
            .field("tables", &sizes)
            .field("upserts", &self.upsert_count())
            .field("requests", &self.request_count())
            .finish_non_exhaustive()
    }
}

fn encode_row<E: SyncEntity>(row: &E::Row) -> RemoteResult<(EntityId, Value)> {
    let value = serde_json::to_value(row).map_err(|e| RemoteError::Decode(e.to_string()))?;
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<EntityId>().ok())
        .ok_or_else(|| RemoteError::Rejected {
            table: E::KIND.table(),
            status: Some(400),
            message: "row has no valid id".into(),
        })?;
    Ok((id, value))
}

#[async_trait]
impl<E: SyncEntity> RemoteStore<E> for MemoryRemoteStore {
    async fn upsert(&self, row: E::Row) -> RemoteResult<()> {
        self.begin_request()?;
        let (id, value) = encode_row::<E>(&row)?;
        if self.failing_ids.read().contains(&id) {
            return Err(RemoteError::Rejected {
                table: E::KIND.table(),
                status: Some(409),
                message: format!("upsert of {id} rejected"),
            });
        }
        self.tables
            .write()
            .entry(E::KIND.table())
            .or_default()
            .insert(id, value);
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn select_by_user_id(&self, user_id: &UserId) -> RemoteResult<Vec<E::Row>> {
        self.begin_request()?;
        self.select_rows::<E>(|v| v.get("user_id").and_then(Value::as_str) == Some(user_id.as_str()))
    }

    async fn select_by_foreign_key_in(
        &self,
        column: &'static str,
        ids: &[EntityId],
    ) -> RemoteResult<Vec<E::Row>> {
        self.begin_request()?;
        let wanted: HashSet<String> = ids.iter().map(ToString::to_string).collect();
        self.select_rows::<E>(|v| {
            v.get(column)
                .and_then(Value::as_str)
                .is_some_and(|fk| wanted.contains(fk))
        })
    }
}
