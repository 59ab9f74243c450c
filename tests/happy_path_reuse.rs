//! End-to-end: a small pool of reusable workers runs several tasks without
//! spawning a fresh process per task.

mod common;

use serde_json::json;
use taskpool::Pool;

#[tokio::test]
async fn single_worker_handles_several_tasks_in_sequence() {
    let config = common::fixture_config().pool_size(1).max_workers(1).build().unwrap();
    let pool = Pool::start(config).await.unwrap();

    for i in 0..5 {
        let result = pool
            .submit_task("echo", json!({ "i": i }), None, None, None, None)
            .await
            .unwrap()
            .await
            .unwrap();
        assert_eq!(result, json!({ "i": i }));
    }

    let workers = pool.all_workers().await;
    assert_eq!(workers.len(), 1, "no extra worker processes should have been spawned");
    assert_eq!(workers[0].tasks_executed, 5, "the one worker should have run every task");
    assert_eq!(workers[0].restart_count, 0);

    pool.shutdown(true).await.unwrap();
}

#[tokio::test]
async fn multiple_workers_each_produce_correct_results() {
    let config = common::fixture_config().pool_size(3).max_workers(3).build().unwrap();
    let pool = Pool::start(config).await.unwrap();

    let mut submissions = Vec::new();
    for i in 0..9 {
        let submission = pool
            .submit_task("echo", json!({ "i": i }), None, None, None, None)
            .await
            .unwrap();
        submissions.push((i, submission));
    }

    for (i, submission) in submissions {
        let result = submission.await.unwrap();
        assert_eq!(result, json!({ "i": i }));
    }

    let metrics = pool.metrics().await.unwrap();
    assert_eq!(metrics.total_workers, 3);
    assert_eq!(metrics.dead_lettered, 0);

    pool.shutdown(true).await.unwrap();
}

/// Spec §8 scenario 1: a 4-worker pool running 100 short tasks should reuse
/// its initial workers rather than spawn a fresh one per task.
#[tokio::test]
async fn hundred_tasks_on_four_workers_reuses_the_initial_pool() {
    let config = common::fixture_config()
        .pool_size(4)
        .max_workers(4)
        .max_task_retries(0)
        .build()
        .unwrap();
    let pool = Pool::start(config).await.unwrap();

    let mut submissions = Vec::new();
    for i in 0..100 {
        let submission = pool
            .submit_task("echo", json!({ "i": i }), None, None, None, None)
            .await
            .unwrap();
        submissions.push((i, submission));
    }

    for (i, submission) in submissions {
        let result = submission.await.unwrap();
        assert_eq!(result, json!({ "i": i }));
    }

    let metrics = pool.metrics().await.unwrap();
    assert_eq!(metrics.workers_spawned, 4, "no worker should have needed replacing");
    assert_eq!(metrics.completed_tasks, 100);
    assert!(
        metrics.reuse_rate >= 0.96,
        "reuse_rate {} fell below the spec's 0.95 target",
        metrics.reuse_rate
    );
    assert_eq!(metrics.dead_lettered, 0);

    pool.shutdown(true).await.unwrap();
}
