//! Per-entity push and pull.
//!
//! One `Reconciler` is instantiated per entity type. It owns the
//! conflict-resolution rule:
//!
//! - A local tombstone is sticky. Pulls never touch a deleted local record.
//! - Otherwise the remote version wins iff its `updated_at` is strictly
//!   greater. Ties keep the local copy.
//!
//! Failures of a single record are logged and isolated; only failures of
//! the bulk reads (dirty scan, remote select, local lookup) abort the call
//! and are left to the retry executor.

use crate::error::SyncResult;
use crate::store::{LocalStore, LocalUpdate, PullScope, RemoteStore};
use liftsync_model::{Clock, EntityId, SyncEntity, UserId};
use std::marker::PhantomData;
use tracing::{debug, warn};

/// Result of pushing one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Records upserted and marked clean.
    pub pushed: Vec<EntityId>,
    /// Records whose upsert failed. They stay dirty.
    pub failed: Vec<EntityId>,
    /// Live records missing required fields. Marked clean without
    /// contacting the remote store.
    pub invalid: Vec<EntityId>,
}

/// Result of pulling one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOutcome {
    /// Remote records created locally.
    pub created: Vec<EntityId>,
    /// Local records overwritten by a newer remote version.
    pub updated: Vec<EntityId>,
    /// Remote records ignored because the local copy is a tombstone.
    pub tombstoned: Vec<EntityId>,
    /// Remote records not newer than the local copy.
    pub unchanged: usize,
    /// Remote records that could not be applied this cycle.
    pub failed: usize,
}

impl PullOutcome {
    /// Number of local writes performed.
    pub fn writes(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

/// Push/pull logic for entity type `E`.
pub struct Reconciler<'a, E, L: ?Sized, R: ?Sized> {
    local: &'a L,
    remote: &'a R,
    clock: &'a dyn Clock,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E, L, R> Reconciler<'a, E, L, R>
where
    E: SyncEntity,
    L: LocalStore<E> + ?Sized,
    R: RemoteStore<E> + ?Sized,
{
    /// Creates a reconciler over the given stores.
    pub fn new(local: &'a L, remote: &'a R, clock: &'a dyn Clock) -> Self {
        Self {
            local,
            remote,
            clock,
            _entity: PhantomData,
        }
    }

    /// Pushes every dirty record of `user_id`, tombstones included.
    pub async fn push(&self, user_id: &UserId) -> SyncResult<PushOutcome> {
        let kind = E::KIND;
        let dirty = self.local.get_dirty(user_id).await?;
        let mut outcome = PushOutcome::default();

        for record in dirty {
            let id = record.id();
            let seen_updated_at = record.meta().updated_at;

            if !record.meta().is_deleted() {
                if let Err(invalid) = record.validate() {
                    warn!(%kind, %id, "dropping unpushable record: {invalid}");
                    let update = LocalUpdate::MarkSynced {
                        synced_at: self.clock.now(),
                        seen_updated_at,
                    };
                    match self.local.update(id, update).await {
                        Ok(()) => outcome.invalid.push(id),
                        Err(e) => {
                            warn!(%kind, %id, "failed to mark invalid record: {e}");
                            outcome.failed.push(id);
                        }
                    }
                    continue;
                }
            }

            let synced_at = self.clock.now();
            if let Err(e) = self.remote.upsert(record.to_row(synced_at)).await {
                warn!(%kind, %id, "upsert failed, record stays dirty: {e}");
                outcome.failed.push(id);
                continue;
            }

            let update = LocalUpdate::MarkSynced {
                synced_at,
                seen_updated_at,
            };
            match self.local.update(id, update).await {
                Ok(()) => {
                    debug!(%kind, %id, deleted = record.meta().is_deleted(), "pushed");
                    outcome.pushed.push(id);
                }
                Err(e) => {
                    warn!(%kind, %id, "pushed but failed to mark clean: {e}");
                    outcome.failed.push(id);
                }
            }
        }

        Ok(outcome)
    }

    /// Pulls the remote records selected by `scope` and applies them to the
    /// local store with last-write-wins.
    pub async fn pull(&self, user_id: &UserId, scope: &PullScope) -> SyncResult<PullOutcome> {
        let kind = E::KIND;
        let rows = self.remote.select(scope).await?;
        let mut outcome = PullOutcome::default();

        for row in rows {
            let remote = match E::from_row(&row) {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(%kind, "skipping undecodable remote row: {e}");
                    outcome.failed += 1;
                    continue;
                }
            };
            let id = remote.id();

            if remote.meta().user_id != *user_id {
                warn!(%kind, %id, "skipping remote row owned by another user");
                outcome.failed += 1;
                continue;
            }

            match self.local.get_by_id_including_deleted(id).await? {
                Some(local) if local.meta().is_deleted() => {
                    debug!(%kind, %id, "local tombstone wins");
                    outcome.tombstoned.push(id);
                }
                Some(local) if local.meta().yields_to(remote.meta().updated_at) => {
                    let update = LocalUpdate::ApplyRemote {
                        remote,
                        synced_at: self.clock.now(),
                    };
                    match self.local.update(id, update).await {
                        Ok(()) => {
                            debug!(%kind, %id, "applied newer remote version");
                            outcome.updated.push(id);
                        }
                        Err(e) => {
                            warn!(%kind, %id, "failed to apply remote version: {e}");
                            outcome.failed += 1;
                        }
                    }
                }
                Some(_) => outcome.unchanged += 1,
                None => {
                    let mut record = remote;
                    record.meta_mut().mark_synced(self.clock.now());
                    match self.local.create(record).await {
                        Ok(_) => {
                            debug!(%kind, %id, "created from remote");
                            outcome.created.push(id);
                        }
                        Err(e) => {
                            warn!(%kind, %id, "failed to create pulled record: {e}");
                            outcome.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }
}
