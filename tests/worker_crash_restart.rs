//! End-to-end: a worker process that exits mid-task is detected, its task
//! is retried successfully on a replacement worker, and the crashed worker
//! is restarted (spec §8 scenario 4).

mod common;

use serde_json::json;
use taskpool::error::TaskErrorKind;
use taskpool::Pool;

#[tokio::test]
async fn crashed_worker_is_replaced_and_its_task_is_retried_to_success() {
    let marker = std::env::temp_dir().join(format!("taskpool-crash-once-{}", std::process::id()));
    let _ = std::fs::remove_file(&marker);

    let config = common::fixture_config()
        .pool_size(2)
        .max_workers(2)
        .auto_restart(true)
        .max_restart_attempts(3)
        .max_task_retries(1)
        .build()
        .unwrap();
    let pool = Pool::start(config).await.unwrap();

    let result = pool
        .submit_task(
            "crash_once",
            json!({ "marker": marker.to_str().unwrap() }),
            None,
            None,
            None,
            None,
        )
        .await
        .unwrap()
        .await
        .expect("the retried attempt on a replacement worker must succeed");

    assert_eq!(result, json!({ "recovered": true }));

    let metrics = pool.metrics().await.unwrap();
    assert_eq!(metrics.total_restarts, 1, "exactly one crash must have triggered exactly one restart");
    assert_eq!(metrics.dead_lettered, 0);

    let workers = pool.all_workers().await;
    assert_eq!(workers.len(), 2, "the pool is back at its configured size");

    let _ = std::fs::remove_file(&marker);
    pool.shutdown(false).await.unwrap();
}

#[tokio::test]
async fn crash_always_handler_exhausts_retries_and_dead_letters_as_worker_crashed() {
    let config = common::fixture_config()
        .pool_size(2)
        .max_workers(2)
        .auto_restart(true)
        .max_restart_attempts(3)
        .max_task_retries(1)
        .build()
        .unwrap();
    let pool = Pool::start(config).await.unwrap();

    let err = pool
        .submit_task("crash", json!({}), None, None, None, None)
        .await
        .unwrap()
        .await
        .expect_err("a handler that always exits the process can never complete");

    assert!(err.history.iter().all(|a| a.kind == TaskErrorKind::WorkerCrashed));
    assert_eq!(err.attempts, 2);

    let metrics = pool.metrics().await.unwrap();
    assert_eq!(metrics.dead_lettered, 1);
    assert_eq!(metrics.total_restarts, 2);

    pool.shutdown(false).await.unwrap();
}
