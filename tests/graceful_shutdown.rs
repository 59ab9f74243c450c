//! End-to-end: a graceful shutdown called while most of a batch is still
//! queued lets every submitted task run to completion rather than only the
//! handful already in flight (spec §8 scenario 6).

mod common;

use std::time::Duration;

use serde_json::json;
use taskpool::Pool;

#[tokio::test]
async fn graceful_shutdown_drains_the_whole_queue_before_workers_exit() {
    let config = common::fixture_config()
        .pool_size(4)
        .max_workers(4)
        .shutdown_grace_ms(Duration::from_secs(5))
        .build()
        .unwrap();
    let pool = Pool::start(config).await.unwrap();

    let mut submissions = Vec::with_capacity(20);
    for _ in 0..20 {
        submissions.push(
            pool.submit_task("sleep", json!({ "ms": 200 }), None, None, None, None)
                .await
                .unwrap(),
        );
    }

    // Give the first batch (one per worker) time to actually be dispatched
    // before triggering shutdown, so this really exercises draining tasks
    // that were still queued, not just ones already in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let shutdown_pool = pool.clone();
    let shutdown_task = tokio::spawn(async move { shutdown_pool.shutdown(true).await });

    let mut results = Vec::with_capacity(20);
    for submission in submissions {
        results.push(submission.await);
    }

    shutdown_task.await.unwrap().unwrap();

    assert_eq!(results.len(), 20);
    for result in results {
        let value = result.expect("every queued task must resolve with a result, not an error");
        assert_eq!(value, json!({ "slept_ms": 200 }));
    }

    assert!(pool.all_workers().await.is_empty(), "every worker should have exited by shutdown");
}
