//! Test fixtures and backend helpers.
//!
//! Provides a ready-to-sync pair of in-memory stores sharing a manual clock,
//! plus helpers for seeding the plan → session → exercise → set hierarchy.

use chrono::{DateTime, Duration, TimeZone, Utc};
use liftsync_model::{
    Exercise, ExerciseSet, ManualClock, Plan, Session, SyncEntity, UserId,
};
use liftsync_sync_engine::{
    LocalStore, MemoryLocalStore, MemoryRemoteStore, SyncConfig, SyncEngine,
};
use std::sync::{Arc, Once};

/// The engine type every fixture builds.
pub type TestEngine = SyncEngine<MemoryLocalStore, MemoryRemoteStore>;

/// Fixed start time of every fixture clock: 2024-06-01T07:00:00Z.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0)
        .single()
        .expect("valid fixture time")
}

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; silent otherwise.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A local and a remote store for one user, sharing a manual clock.
#[derive(Debug)]
pub struct TestBackend {
    /// The device-local store.
    pub local: Arc<MemoryLocalStore>,
    /// The remote store.
    pub remote: Arc<MemoryRemoteStore>,
    /// The clock engines built from this backend stamp with.
    pub clock: Arc<ManualClock>,
    /// The user being synced.
    pub user: UserId,
}

impl TestBackend {
    /// Creates empty stores for user `athlete`, clock at [`t0`].
    pub fn new() -> Self {
        Self::for_user("athlete")
    }

    /// Creates empty stores for `user`.
    pub fn for_user(user: impl Into<UserId>) -> Self {
        init_tracing();
        Self {
            local: Arc::new(MemoryLocalStore::new()),
            remote: Arc::new(MemoryRemoteStore::new()),
            clock: Arc::new(ManualClock::new(t0())),
            user: user.into(),
        }
    }

    /// Current fixture time.
    pub fn now(&self) -> DateTime<Utc> {
        use liftsync_model::Clock;
        self.clock.now()
    }

    /// Moves the clock forward and returns the new time.
    pub fn advance_secs(&self, secs: i64) -> DateTime<Utc> {
        self.clock.advance(Duration::seconds(secs));
        self.now()
    }

    /// Builds an engine with the default configuration.
    pub fn engine(&self) -> TestEngine {
        self.engine_with(SyncConfig::default())
    }

    /// Builds an engine with `config`.
    pub fn engine_with(&self, config: SyncConfig) -> TestEngine {
        SyncEngine::new(config, Arc::clone(&self.local), Arc::clone(&self.remote))
            .with_clock(self.clock.clone())
    }

    /// Stores a record locally as-is.
    pub async fn create<E>(&self, record: E) -> E
    where
        E: SyncEntity,
        MemoryLocalStore: LocalStore<E>,
    {
        <MemoryLocalStore as LocalStore<E>>::create(&self.local, record)
            .await
            .expect("Failed to create local record")
    }

    /// Reads a record from the local store, tombstones included.
    pub async fn get<E>(&self, record: &E) -> Option<E>
    where
        E: SyncEntity,
        MemoryLocalStore: LocalStore<E>,
    {
        <MemoryLocalStore as LocalStore<E>>::get_by_id_including_deleted(&self.local, record.id())
            .await
            .expect("Failed to read local record")
    }

    /// Puts a record's row straight into the remote store, as another
    /// device would after a successful push.
    pub fn put_remote<E: SyncEntity>(&self, record: &E) {
        self.remote
            .put_row::<E>(&record.to_row(self.now()))
            .expect("Failed to put remote row");
    }

    /// Reads a record back from the remote store.
    pub fn get_remote<E: SyncEntity>(&self, record: &E) -> Option<E> {
        self.remote
            .row::<E>(record.id())
            .map(|row| E::from_row(&row).expect("Remote row does not decode"))
    }

    /// Creates a dirty hierarchy in the local store.
    pub async fn seed_hierarchy(&self) -> Hierarchy {
        let tree = Hierarchy::new(&self.user, self.now());
        self.create(tree.plan.clone()).await;
        self.create(tree.session.clone()).await;
        self.create(tree.exercise.clone()).await;
        self.create(tree.set.clone()).await;
        tree
    }

    /// Puts a hierarchy into the remote store only.
    pub fn seed_remote_hierarchy(&self) -> Hierarchy {
        let tree = Hierarchy::new(&self.user, self.now());
        self.put_remote(&tree.plan);
        self.put_remote(&tree.session);
        self.put_remote(&tree.exercise);
        self.put_remote(&tree.set);
        tree
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// One record of every kind, linked parent to child.
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    /// Root.
    pub plan: Plan,
    /// Child of `plan`.
    pub session: Session,
    /// Child of `session`.
    pub exercise: Exercise,
    /// Child of `exercise`.
    pub set: ExerciseSet,
}

impl Hierarchy {
    /// Builds new, dirty, valid records. Nothing is stored.
    pub fn new(user: &UserId, now: DateTime<Utc>) -> Self {
        let plan = Plan::new(user.clone(), "Push Pull Legs", now);
        let session = Session::new(user.clone(), plan.id(), "Push Day", 0, now);
        let exercise = Exercise::new(user.clone(), session.id(), "Bench Press", 0, now);
        let mut set = ExerciseSet::new(user.clone(), exercise.id(), 0, 8, now);
        set.weight = Some(80.0);
        Self {
            plan,
            session,
            exercise,
            set,
        }
    }
}
