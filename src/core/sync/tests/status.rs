use chrono::{Duration, Utc};

use super::{USER, all_succeed_registry, orchestrator, seeded_store};
use crate::core::sync::types::{JobStatus, SyncOptions, TriggeredBy};

#[tokio::test]
async fn fresh_profile_reports_ready_to_sync() {
    let store = seeded_store(USER).await;
    let orch = orchestrator(store, all_succeed_registry());

    let status = orch.get_sync_status(USER).await.expect("status");
    assert!(!status.is_running);
    assert!(status.can_sync);
    assert_eq!(status.cooldown_remaining_ms, 0);
    assert!(status.current_job.is_none());
    assert!(status.last_sync.is_none());
}

#[tokio::test]
async fn completed_sync_shows_up_as_last_sync_with_cooldown() {
    let store = seeded_store(USER).await;
    let orch = orchestrator(store, all_succeed_registry());

    let outcome = orch
        .trigger_sync_all(USER, SyncOptions::default())
        .await
        .expect("sync succeeds");

    let status = orch.get_sync_status(USER).await.expect("status");
    assert!(!status.is_running);
    assert!(!status.can_sync);
    assert!(status.cooldown_remaining_ms > 0 && status.cooldown_remaining_ms <= 300_000);
    let last = status.last_sync.expect("last sync");
    assert_eq!(last.job_id, outcome.job.job_id);
    assert_eq!(last.status, JobStatus::Completed);
}

#[tokio::test]
async fn running_job_reports_in_progress_without_mutating_anything() {
    let store = seeded_store(USER).await;
    assert!(store.begin_sync(USER).await.expect("lock"));
    let running = store
        .create_job(USER, TriggeredBy::Auto, 5)
        .await
        .expect("running job");
    // Old enough to be stale; a pure read must not auto-fail it.
    store
        .set_job_started_at(&running.job_id, Utc::now() - Duration::seconds(600))
        .await
        .expect("backdate");

    let orch = orchestrator(store.clone(), all_succeed_registry());
    let status = orch.get_sync_status(USER).await.expect("status");
    assert!(status.is_running);
    assert!(!status.can_sync);
    assert_eq!(
        status.current_job.expect("current job").job_id,
        running.job_id
    );

    let unchanged = store
        .get_job(&running.job_id)
        .await
        .expect("read job")
        .expect("job");
    assert_eq!(unchanged.status, JobStatus::InProgress);
}

#[tokio::test]
async fn job_listing_paginates_newest_first() {
    let store = seeded_store(USER).await;
    let orch = orchestrator(store.clone(), all_succeed_registry());

    let mut job_ids = Vec::new();
    for i in 0..3 {
        let outcome = orch
            .trigger_sync_all(
                USER,
                SyncOptions {
                    force: true,
                    ..Default::default()
                },
            )
            .await
            .expect("sync succeeds");
        // Spread the runs out so ordering is unambiguous.
        store
            .set_job_started_at(
                &outcome.job.job_id,
                Utc::now() - Duration::seconds(30 * (3 - i)),
            )
            .await
            .expect("backdate");
        job_ids.push(outcome.job.job_id);
    }

    let page = orch.list_sync_jobs(USER, 2, 0).await.expect("page 1");
    assert_eq!(page.total, 3);
    assert_eq!(page.jobs.len(), 2);
    assert_eq!(page.jobs[0].job_id, job_ids[2]);
    assert_eq!(page.jobs[1].job_id, job_ids[1]);

    let page = orch.list_sync_jobs(USER, 2, 2).await.expect("page 2");
    assert_eq!(page.jobs.len(), 1);
    assert_eq!(page.jobs[0].job_id, job_ids[0]);

    // Lookups are scoped to the owning user.
    let foreign = orch
        .get_sync_job(&job_ids[0], "someone-else")
        .await
        .expect("lookup");
    assert!(foreign.is_none());
    let own = orch.get_sync_job(&job_ids[0], USER).await.expect("lookup");
    assert!(own.is_some());
}
