//! Integration tests for the sync engine over in-memory stores.

use liftsync_model::{EntityKind, ExerciseSet, Plan, SyncEntity};
use liftsync_sync_engine::{MemoryLocalStore, SyncError};
use liftsync_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn offline_plan_is_pushed_and_left_untouched_by_pull() {
    let backend = TestBackend::new();
    let plan = backend
        .create(Plan::new(backend.user.clone(), "Offline Plan", backend.now()))
        .await;
    let synced_at = backend.advance_secs(60);

    let report = backend.engine().sync_all(&backend.user).await.unwrap();

    let phase = report.phase(EntityKind::Plan).unwrap();
    assert_eq!(phase.push.pushed, vec![plan.id()]);
    assert_eq!(phase.pull.unchanged, 1);
    assert_eq!(phase.pull.writes(), 0);

    let local = backend.get(&plan).await.unwrap();
    assert!(!local.meta.needs_sync);
    assert_eq!(local.meta.synced_at, Some(synced_at));
    assert_eq!(local.name, "Offline Plan");
    assert_eq!(local.meta.updated_at, plan.meta.updated_at);

    let remote = backend.get_remote(&plan).unwrap();
    assert_eq!(remote.name, local.name);
    assert_eq!(remote.meta.updated_at, local.meta.updated_at);
    assert_eq!(remote.meta.synced_at, Some(synced_at));
    assert_eq!(backend.remote.len(EntityKind::Plan), 1);
}

#[tokio::test]
async fn second_sync_writes_nothing() {
    let backend = TestBackend::new();
    backend.seed_hierarchy().await;
    let engine = backend.engine();

    let first = engine.sync_all(&backend.user).await.unwrap();
    assert_eq!(first.pushed(), 4);

    let local_writes = backend.local.write_count();
    let remote_upserts = backend.remote.upsert_count();

    let second = engine.sync_all(&backend.user).await.unwrap();
    assert_eq!(second.pushed(), 0);
    assert_eq!(second.pulled(), 0);
    assert_eq!(backend.local.write_count(), local_writes);
    assert_eq!(backend.remote.upsert_count(), remote_upserts);
}

#[tokio::test]
async fn second_device_materializes_whole_hierarchy() {
    let phone = TestBackend::new();
    let tree = phone.seed_hierarchy().await;
    phone.engine().sync_all(&phone.user).await.unwrap();

    let tablet = TestBackend {
        local: Arc::new(MemoryLocalStore::new()),
        remote: Arc::clone(&phone.remote),
        clock: Arc::clone(&phone.clock),
        user: phone.user.clone(),
    };
    let report = tablet.engine().sync_all(&tablet.user).await.unwrap();

    for kind in EntityKind::SYNC_ORDER {
        assert_eq!(report.phase(kind).unwrap().pull.created.len(), 1, "{kind}");
    }

    let set = tablet.get(&tree.set).await.unwrap();
    assert!(!set.meta.needs_sync);
    assert_eq!(set.exercise_id, tree.exercise.id());
    assert_eq!(set.repetitions, Some(8));
    assert_eq!(set.weight, Some(80.0));
}

#[tokio::test]
async fn other_users_rows_stay_remote() {
    let backend = TestBackend::new();
    let stranger = TestBackend::for_user("someone-else");
    let theirs = stranger.seed_remote_hierarchy();
    backend.remote.put_row::<Plan>(&theirs.plan.to_row(backend.now())).unwrap();

    let report = backend.engine().sync_all(&backend.user).await.unwrap();

    assert_eq!(report.pulled(), 0);
    assert!(backend.get(&theirs.plan).await.is_none());
}

#[tokio::test]
async fn newer_remote_edit_overwrites_clean_copy() {
    let backend = TestBackend::new();
    let tree = backend.seed_hierarchy().await;
    let engine = backend.engine();
    engine.sync_all(&backend.user).await.unwrap();

    let mut remote = tree.session.clone();
    remote.name = "Upper Body".into();
    remote.day_of_week = Some(2);
    remote.meta.touch(backend.advance_secs(10));
    backend.put_remote(&remote);

    let report = engine.sync_all(&backend.user).await.unwrap();
    let phase = report.phase(EntityKind::Session).unwrap();
    assert_eq!(phase.pull.updated, vec![tree.session.id()]);

    let local = backend.get(&tree.session).await.unwrap();
    assert_eq!(local.name, "Upper Body");
    assert_eq!(local.day_of_week, Some(2));
    assert_eq!(local.meta.updated_at, remote.meta.updated_at);
    assert!(!local.meta.needs_sync);
}

#[tokio::test]
async fn local_edit_is_pushed_before_pull_can_clobber_it() {
    let backend = TestBackend::new();
    let tree = backend.seed_hierarchy().await;
    let engine = backend.engine();
    engine.sync_all(&backend.user).await.unwrap();

    let mut remote = tree.plan.clone();
    remote.name = "Remote Name".into();
    remote.meta.touch(backend.advance_secs(10));
    backend.put_remote(&remote);

    let edited_at = backend.advance_secs(10);
    backend
        .local
        .edit::<Plan, _>(tree.plan.id(), edited_at, |p| p.name = "Local Name".into())
        .await
        .unwrap();

    engine.sync_all(&backend.user).await.unwrap();

    let local = backend.get(&tree.plan).await.unwrap();
    let remote = backend.get_remote(&tree.plan).unwrap();
    assert_eq!(local.name, "Local Name");
    assert_eq!(remote.name, "Local Name");
    assert_eq!(remote.meta.updated_at, edited_at);
    assert!(!local.meta.needs_sync);
}

#[tokio::test]
async fn local_tombstone_survives_newer_remote_edit() {
    let backend = TestBackend::new();
    let tree = backend.seed_hierarchy().await;
    let engine = backend.engine();
    engine.sync_all(&backend.user).await.unwrap();

    let deleted_at = backend.advance_secs(5);
    backend
        .local
        .soft_delete::<Plan>(tree.plan.id(), deleted_at)
        .await
        .unwrap();

    let mut remote = tree.plan.clone();
    remote.name = "Revived".into();
    remote.meta.touch(backend.advance_secs(5));
    backend.put_remote(&remote);
    backend.remote.fail_upserts_for(tree.plan.id());

    let report = engine.sync_all(&backend.user).await.unwrap();
    let phase = report.phase(EntityKind::Plan).unwrap();
    assert_eq!(phase.push.failed, vec![tree.plan.id()]);
    assert_eq!(phase.pull.tombstoned, vec![tree.plan.id()]);

    let local = backend.get(&tree.plan).await.unwrap();
    assert_eq!(local.meta.deleted_at, Some(deleted_at));
    assert_eq!(local.name, tree.plan.name);
    assert!(local.meta.needs_sync);

    backend.remote.clear_failures();
    engine.sync_all(&backend.user).await.unwrap();

    let remote = backend.get_remote(&tree.plan).unwrap();
    assert_eq!(remote.meta.deleted_at, Some(deleted_at));
    assert!(!backend.get(&tree.plan).await.unwrap().meta.needs_sync);
}

#[tokio::test]
async fn remote_delete_propagates() {
    let backend = TestBackend::new();
    let tree = backend.seed_hierarchy().await;
    let engine = backend.engine();
    engine.sync_all(&backend.user).await.unwrap();

    let mut remote = tree.exercise.clone();
    let deleted_at = backend.advance_secs(30);
    remote.meta.soft_delete(deleted_at);
    backend.put_remote(&remote);

    engine.sync_all(&backend.user).await.unwrap();

    let local = backend.get(&tree.exercise).await.unwrap();
    assert_eq!(local.meta.deleted_at, Some(deleted_at));
    assert!(!local.meta.needs_sync);

    // The deleted exercise still scopes its sets.
    let set = backend.get(&tree.set).await.unwrap();
    assert!(!set.meta.is_deleted());
}

#[tokio::test]
async fn one_rejected_record_does_not_block_siblings() {
    let backend = TestBackend::new();
    let mut plans = Vec::new();
    for name in ["Week 1", "Week 2", "Week 3"] {
        let plan = Plan::new(backend.user.clone(), name, backend.now());
        plans.push(backend.create(plan).await);
    }
    backend.remote.fail_upserts_for(plans[1].id());
    let engine = backend.engine();

    let report = engine.sync_all(&backend.user).await.unwrap();
    assert_eq!(report.failed_pushes(), vec![(EntityKind::Plan, plans[1].id())]);

    assert!(!backend.get(&plans[0]).await.unwrap().meta.needs_sync);
    assert!(backend.get(&plans[1]).await.unwrap().meta.needs_sync);
    assert!(!backend.get(&plans[2]).await.unwrap().meta.needs_sync);

    backend.remote.clear_failures();
    let report = engine.sync_all(&backend.user).await.unwrap();
    assert_eq!(report.pushed(), 1);
    assert!(!backend.get(&plans[1]).await.unwrap().meta.needs_sync);
}

#[tokio::test]
async fn incomplete_set_is_dropped_and_reported() {
    let backend = TestBackend::new();
    let tree = backend.seed_hierarchy().await;
    let mut draft = ExerciseSet::new(backend.user.clone(), tree.exercise.id(), 1, 0, backend.now());
    draft.repetitions = None;
    backend.create(draft.clone()).await;

    let engine = backend.engine();
    let report = engine.sync_all(&backend.user).await.unwrap();

    assert_eq!(report.invalid_records(), vec![(EntityKind::Set, draft.id())]);
    assert_eq!(report.pushed(), 4);
    assert_eq!(engine.stats().invalid_records, 1);

    let local = backend.get(&draft).await.unwrap();
    assert!(!local.meta.needs_sync);
    assert!(local.meta.synced_at.is_some());
    assert!(backend.get_remote(&draft).is_none());
    assert_eq!(backend.remote.len(EntityKind::Set), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_phase_is_retried_with_backoff() {
    let backend = TestBackend::new();
    let tree = backend.seed_remote_hierarchy();
    backend.remote.fail_next_requests(2);
    let engine = backend.engine();

    let start = Instant::now();
    let report = engine.sync_all(&backend.user).await.unwrap();

    assert_eq!(start.elapsed(), Duration::from_millis(3000));
    assert_eq!(report.phase(EntityKind::Plan).unwrap().attempts, 3);
    assert_eq!(report.phase(EntityKind::Session).unwrap().attempts, 1);
    assert_eq!(engine.stats().retries, 2);
    assert!(backend.get(&tree.set).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn exhausted_phase_aborts_run_and_next_run_resumes() {
    let backend = TestBackend::new();
    let tree = backend.seed_hierarchy().await;
    let engine = backend.engine();
    backend.remote.set_offline(true);

    let err = engine.sync_all(&backend.user).await.unwrap_err();
    match &err {
        SyncError::PhaseFailed { kind, attempts, .. } => {
            assert_eq!(*kind, EntityKind::Plan);
            assert_eq!(*attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(std::error::Error::source(&err).is_some());

    // Three attempts of one upsert plus one select; later phases never ran.
    assert_eq!(backend.remote.request_count(), 6);
    assert!(backend.get(&tree.plan).await.unwrap().meta.needs_sync);
    assert!(backend.get(&tree.set).await.unwrap().meta.needs_sync);

    backend.remote.set_offline(false);
    let report = engine.sync_all(&backend.user).await.unwrap();
    assert_eq!(report.pushed(), 4);
    assert!(!backend.get(&tree.set).await.unwrap().meta.needs_sync);
}

#[tokio::test(start_paused = true)]
async fn overlapping_runs_for_one_user_are_rejected() {
    let backend = TestBackend::new();
    backend.seed_remote_hierarchy();
    backend.remote.fail_next_requests(1);
    let engine = Arc::new(backend.engine());

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        let user = backend.user.clone();
        async move { engine.sync_all(&user).await }
    });
    tokio::task::yield_now().await;

    let second = engine.sync_all(&backend.user).await;
    assert!(matches!(second, Err(SyncError::SyncInProgress { .. })));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.pulled(), 4);
}
