//! Back-pressure (spec §8): with `submit_on_overflow=reject`, no submission
//! beyond `max_queue_depth` succeeds.

mod common;

use serde_json::json;
use taskpool::{OverflowPolicy, Pool, PoolError};

#[tokio::test]
async fn reject_policy_refuses_submissions_past_max_queue_depth() {
    let config = common::fixture_config()
        .pool_size(1)
        .max_workers(1)
        .max_queue_depth(2)
        .submit_on_overflow(OverflowPolicy::Reject)
        .build()
        .unwrap();
    let pool = Pool::start(config).await.unwrap();

    // `Pool::start` only spawns the dispatch loop as a background task; on
    // this single-threaded test runtime it doesn't get polled until this
    // task yields. Back-to-back `submit_task` calls that never hit a
    // pending `.await` (the `Reject` path is a synchronous `try_send`)
    // therefore land in the still-full channel deterministically, with no
    // race against the dispatch loop draining it.
    pool.submit_task("echo", json!({}), None, None, None, None).await.unwrap();
    pool.submit_task("echo", json!({}), None, None, None, None).await.unwrap();

    let err = pool
        .submit_task("echo", json!({}), None, None, None, None)
        .await
        .expect_err("a third submission must exceed max_queue_depth=2");
    assert!(matches!(err, PoolError::QueueFull { max_queue_depth: 2 }));

    pool.shutdown(false).await.unwrap();
}
