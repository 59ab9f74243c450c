//! End-to-end: a task that never finishes within its timeout is retried,
//! exhausts its retry budget, and lands in the dead-letter queue — while
//! the pool stays usable for unrelated work.

mod common;

use std::time::Duration;

use serde_json::json;
use taskpool::error::TaskErrorKind;
use taskpool::Pool;

#[tokio::test]
async fn timed_out_task_retries_then_dead_letters() {
    let config = common::fixture_config()
        .pool_size(2)
        .max_workers(2)
        .task_timeout_ms(Duration::from_millis(100))
        .max_task_retries(2)
        .build()
        .unwrap();
    let pool = Pool::start(config).await.unwrap();

    // This handler sleeps far longer than task_timeout_ms. The worker
    // protocol has no cooperative cancellation, so each timeout reclaims
    // its worker by killing and replacing it rather than pretending it's
    // free — leaving the pool's other worker genuinely idle throughout.
    let submission = pool
        .submit_task("sleep", json!({ "ms": 10_000 }), None, None, None, None)
        .await
        .unwrap();

    let err = submission.await.expect_err("task must time out and exhaust its retry budget");
    // max_task_retries=2 permits exactly two retries past the first attempt
    // before the budget is exhausted, so the history always has 3 entries,
    // every one of them a genuine timeout.
    assert_eq!(err.attempts, 3);
    assert_eq!(err.history.len(), 3);
    assert!(err.history.iter().all(|a| a.kind == TaskErrorKind::TaskTimeout));
    assert_eq!(err.last_kind, TaskErrorKind::TaskTimeout);

    let metrics = pool.metrics().await.unwrap();
    assert_eq!(metrics.dead_lettered, 1);
    assert_eq!(metrics.total_restarts, 3, "each of the three timed-out attempts reclaims its worker");

    // The pool as a whole is still usable: only one worker is ever occupied
    // by the doomed task at a time, so the other is free for this.
    let follow_up = pool
        .submit_task("echo", json!({ "ok": true }), None, None, None, None)
        .await
        .unwrap()
        .await
        .unwrap();
    assert_eq!(follow_up, json!({ "ok": true }));

    pool.shutdown(false).await.unwrap();
}
