//! The sync orchestrator.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconciler::{PullOutcome, PushOutcome, Reconciler};
use crate::retry::{RetryEvent, RetryExecutor, RetryObserver};
use crate::store::{LocalBackend, LocalStore, PullScope, RemoteBackend, RemoteStore};
use liftsync_model::{
    Clock, EntityId, EntityKind, Exercise, ExerciseSet, Plan, Session, SyncEntity, SystemClock,
    UserId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// The sync state of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync has run yet.
    Idle,
    /// Pushing dirty records.
    Pushing,
    /// Pulling remote records.
    Pulling,
    /// A phase failed and is waiting before its next attempt.
    RetryWait,
    /// The last sync completed.
    Synced,
    /// The last sync failed.
    Error,
}

impl SyncState {
    /// Returns true if a sync is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Pushing | SyncState::Pulling | SyncState::RetryWait
        )
    }
}

/// Statistics about sync operations, across all users.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed `sync_all` runs.
    pub cycles_completed: u64,
    /// Failed `sync_all` runs.
    pub cycles_failed: u64,
    /// Records pushed and marked clean.
    pub records_pushed: u64,
    /// Local writes caused by pulls.
    pub records_pulled: u64,
    /// Records whose push failed.
    pub push_failures: u64,
    /// Records dropped as unpushable.
    pub invalid_records: u64,
    /// Phase retries.
    pub retries: u64,
    /// Completion time of the last successful run.
    pub last_sync_time: Option<Instant>,
    /// Last terminal error.
    pub last_error: Option<String>,
}

/// Result of one phase (push then pull of one entity kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    /// Entity kind.
    pub kind: EntityKind,
    /// Push result of the successful attempt.
    pub push: PushOutcome,
    /// Pull result of the successful attempt.
    pub pull: PullOutcome,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Result of a full `sync_all` run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// User synced.
    pub user_id: UserId,
    /// One report per phase, parents first.
    pub phases: Vec<PhaseReport>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl SyncReport {
    /// Report of the phase for `kind`.
    pub fn phase(&self, kind: EntityKind) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.kind == kind)
    }

    /// Records pushed across all phases.
    pub fn pushed(&self) -> usize {
        self.phases.iter().map(|p| p.push.pushed.len()).sum()
    }

    /// Local writes caused by pulls across all phases.
    pub fn pulled(&self) -> usize {
        self.phases.iter().map(|p| p.pull.writes()).sum()
    }

    /// Records whose push failed; they are retried on the next run.
    pub fn failed_pushes(&self) -> Vec<(EntityKind, EntityId)> {
        self.phases
            .iter()
            .flat_map(|p| p.push.failed.iter().map(move |id| (p.kind, *id)))
            .collect()
    }

    /// Records dropped as unpushable. Callers may surface these to the user.
    pub fn invalid_records(&self) -> Vec<(EntityKind, EntityId)> {
        self.phases
            .iter()
            .flat_map(|p| p.push.invalid.iter().map(move |id| (p.kind, *id)))
            .collect()
    }
}

/// Feeds retry events into engine bookkeeping, then forwards them.
struct EngineObserver {
    user_id: UserId,
    states: Arc<RwLock<HashMap<UserId, SyncState>>>,
    stats: Arc<RwLock<SyncStats>>,
    forward: Option<Arc<dyn RetryObserver>>,
}

impl RetryObserver for EngineObserver {
    fn on_event(&self, event: &RetryEvent) {
        if let RetryEvent::AttemptFailed {
            next_delay: Some(_),
            ..
        } = event
        {
            self.stats.write().retries += 1;
            self.states
                .write()
                .insert(self.user_id.clone(), SyncState::RetryWait);
        }
        if let Some(forward) = &self.forward {
            forward.on_event(event);
        }
    }
}

/// The sync engine reconciles one user's records between a local and a
/// remote store.
///
/// Engines are plain values: construct one per process (or per test) and
/// share it by reference or `Arc`. Concurrent `sync_all` calls for the same
/// user are rejected with [`SyncError::SyncInProgress`]; different users
/// sync independently.
///
/// # Example
///
/// ```
/// use liftsync_sync_engine::{MemoryLocalStore, MemoryRemoteStore, SyncConfig, SyncEngine};
/// use liftsync_model::UserId;
/// use std::sync::Arc;
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let engine = SyncEngine::new(
///     SyncConfig::default(),
///     Arc::new(MemoryLocalStore::new()),
///     Arc::new(MemoryRemoteStore::new()),
/// );
///
/// let report = engine.sync_all(&UserId::new("user-1")).await.unwrap();
/// assert_eq!(report.phases.len(), 4);
/// # });
/// ```
pub struct SyncEngine<L, R> {
    config: SyncConfig,
    local: Arc<L>,
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn RetryObserver>>,
    states: Arc<RwLock<HashMap<UserId, SyncState>>>,
    stats: Arc<RwLock<SyncStats>>,
    in_flight: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<L: LocalBackend, R: RemoteBackend> SyncEngine<L, R> {
    /// Creates a new sync engine using the system clock.
    pub fn new(config: SyncConfig, local: Arc<L>, remote: Arc<R>) -> Self {
        Self {
            config,
            local,
            remote,
            clock: Arc::new(SystemClock),
            observer: None,
            states: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(SyncStats::default())),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Uses `clock` for `synced_at` stamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Forwards retry events to `observer`.
    pub fn with_retry_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the local store.
    pub fn local(&self) -> &Arc<L> {
        &self.local
    }

    /// Gets the remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Gets the current state of a user.
    pub fn state(&self, user_id: &UserId) -> SyncState {
        self.states
            .read()
            .get(user_id)
            .copied()
            .unwrap_or(SyncState::Idle)
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, user_id: &UserId, state: SyncState) {
        self.states.write().insert(user_id.clone(), state);
    }

    fn user_guard(&self, user_id: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.in_flight.lock().entry(user_id.clone()).or_default())
    }

    /// Drops the map entry once no caller holds the user's guard.
    fn release_guard(&self, user_id: &UserId, guard: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        drop(guard);
        if in_flight
            .get(user_id)
            .is_some_and(|g| Arc::strong_count(g) == 1)
        {
            in_flight.remove(user_id);
        }
    }

    /// Reconciles every entity kind for `user_id`, parents first.
    ///
    /// Each phase pushes, then pulls, and is retried as a whole. The first
    /// phase that fails terminally aborts the run; records not yet processed
    /// stay dirty and are picked up by the next call.
    pub async fn sync_all(&self, user_id: &UserId) -> SyncResult<SyncReport> {
        let guard = self.user_guard(user_id);
        let result = match guard.try_lock() {
            Ok(_running) => self.run_all(user_id).await,
            Err(_) => Err(SyncError::SyncInProgress {
                user_id: user_id.to_string(),
            }),
        };
        self.release_guard(user_id, guard);
        result
    }

    async fn run_all(&self, user_id: &UserId) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let executor = RetryExecutor::with_observer(
            self.config.retry.clone(),
            Arc::new(EngineObserver {
                user_id: user_id.clone(),
                states: Arc::clone(&self.states),
                stats: Arc::clone(&self.stats),
                forward: self.observer.clone(),
            }),
        );

        let mut phases = Vec::with_capacity(EntityKind::SYNC_ORDER.len());
        for kind in EntityKind::SYNC_ORDER {
            let result = match kind {
                EntityKind::Plan => self.run_phase::<Plan>(&executor, user_id).await,
                EntityKind::Session => self.run_phase::<Session>(&executor, user_id).await,
                EntityKind::Exercise => self.run_phase::<Exercise>(&executor, user_id).await,
                EntityKind::Set => self.run_phase::<ExerciseSet>(&executor, user_id).await,
            };

            match result {
                Ok(phase) => {
                    info!(
                        user = %user_id,
                        %kind,
                        pushed = phase.push.pushed.len(),
                        push_failed = phase.push.failed.len(),
                        invalid = phase.push.invalid.len(),
                        pulled = phase.pull.writes(),
                        attempts = phase.attempts,
                        "phase complete"
                    );
                    phases.push(phase);
                }
                Err(e) => {
                    error!(user = %user_id, %kind, "sync aborted: {e}");
                    self.set_state(user_id, SyncState::Error);
                    let mut stats = self.stats.write();
                    stats.cycles_failed += 1;
                    stats.last_error = Some(e.to_string());
                    return Err(e);
                }
            }
        }

        let report = SyncReport {
            user_id: user_id.clone(),
            phases,
            duration: start.elapsed(),
        };

        self.set_state(user_id, SyncState::Synced);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.records_pushed += report.pushed() as u64;
            stats.records_pulled += report.pulled() as u64;
            stats.push_failures += report.failed_pushes().len() as u64;
            stats.invalid_records += report.invalid_records().len() as u64;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        Ok(report)
    }

    /// Runs push then pull for `E`, retried as one unit.
    async fn run_phase<E>(
        &self,
        executor: &RetryExecutor,
        user_id: &UserId,
    ) -> SyncResult<PhaseReport>
    where
        E: SyncEntity,
        L: LocalStore<E>,
        R: RemoteStore<E>,
    {
        let reconciler = Reconciler::<E, L, R>::new(
            self.local.as_ref(),
            self.remote.as_ref(),
            self.clock.as_ref(),
        );
        let reconciler = &reconciler;

        executor
            .run(E::KIND.name(), |attempt| async move {
                self.set_state(user_id, SyncState::Pushing);
                let push = reconciler.push(user_id).await?;

                self.set_state(user_id, SyncState::Pulling);
                let scope = self.pull_scope(E::KIND, user_id).await?;
                let pull = reconciler.pull(user_id, &scope).await?;

                Ok::<_, SyncError>(PhaseReport {
                    kind: E::KIND,
                    push,
                    pull,
                    attempts: attempt,
                })
            })
            .await
            .map_err(|exhausted| SyncError::PhaseFailed {
                kind: E::KIND,
                attempts: exhausted.attempts,
                source: Box::new(exhausted.error),
            })
    }

    /// Remote rows to pull for `kind`: the user's rows for the root, rows
    /// referencing a locally known parent (tombstones included) otherwise.
    async fn pull_scope(&self, kind: EntityKind, user_id: &UserId) -> SyncResult<PullScope> {
        let Some(column) = kind.parent_column() else {
            return Ok(PullScope::User(user_id.clone()));
        };
        let ids = match kind {
            EntityKind::Session => self.known_ids::<Plan>(user_id).await?,
            EntityKind::Exercise => self.known_ids::<Session>(user_id).await?,
            EntityKind::Set => self.known_ids::<Exercise>(user_id).await?,
            EntityKind::Plan => Vec::new(),
        };
        Ok(PullScope::Parents { column, ids })
    }

    async fn known_ids<P>(&self, user_id: &UserId) -> SyncResult<Vec<EntityId>>
    where
        P: SyncEntity,
        L: LocalStore<P>,
    {
        let parents =
            <L as LocalStore<P>>::get_all_including_deleted(self.local.as_ref(), user_id).await?;
        Ok(parents.iter().map(SyncEntity::id).collect())
    }
}

impl<L, R> std::fmt::Debug for SyncEngine<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
