//! Priority task queue: min-heap by `(priority, enqueue order)`, retry with
//! exponential backoff owned by a single timer, and a dead-letter queue
//! (spec §4.2).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::PoolConfig;
use crate::error::{Attempt, TaskErrorKind};
use crate::task::types::{Task, TaskStatus};
use crate::util::TaskId;

/// One entry in the ready-to-dispatch heap.
///
/// `BinaryHeap` is a max-heap, so `Ord` is implemented in reverse of the
/// natural field order: lower `priority` must sort *greater* so it's popped
/// first, and for equal priority, a lower `sequence` (enqueued earlier) must
/// sort greater so FIFO is preserved within a priority band.
#[derive(Debug, Eq, PartialEq)]
struct QueueEntry {
    priority: i32,
    sequence: u64,
    task_id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One entry in the retry-backoff timer heap: a min-heap by due time.
#[derive(Debug, Eq, PartialEq)]
struct RetryEntry {
    due_at: DateTime<Utc>,
    task_id: TaskId,
}

impl Ord for RetryEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.due_at.cmp(&self.due_at)
    }
}

impl PartialOrd for RetryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of popping the ready heap.
pub enum DequeueOutcome {
    Task(Task),
    Empty,
}

/// Outcome of reporting a task failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Re-enqueued after `delay`.
    Retried { delay: Duration },
    /// Retry budget exhausted; moved to the dead-letter queue.
    DeadLettered,
    /// Unknown task id; nothing happened.
    Unknown,
}

/// Point-in-time statistics for `PoolMetrics`.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub depth: usize,
    pub retry_pending: usize,
    pub dead_lettered: usize,
    pub oldest_task_age: Option<Duration>,
    pub avg_wait_ms: Option<f64>,
    pub avg_duration_ms: Option<f64>,
}

struct TaskRecord {
    task: Task,
    /// When the task reached a terminal status, for the completion grace
    /// window eviction described in spec §4.2.
    terminal_at: Option<DateTime<Utc>>,
    /// Wait time (enqueue -> dequeue) in milliseconds, recorded once known.
    wait_ms: Option<u64>,
    /// Execution time (dequeue -> terminal), recorded once known.
    duration_ms: Option<u64>,
}

/// The priority queue, retry scheduler and dead-letter queue for one pool.
pub struct TaskQueue {
    heap: BinaryHeap<QueueEntry>,
    retry_heap: BinaryHeap<RetryEntry>,
    tasks: HashMap<TaskId, TaskRecord>,
    dead_letter_queue: Vec<Task>,
    next_sequence: u64,
    retry_backoff_base: Duration,
    retry_backoff_max: Duration,
    completed_retention: Duration,
}

impl TaskQueue {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            heap: BinaryHeap::new(),
            retry_heap: BinaryHeap::new(),
            tasks: HashMap::new(),
            dead_letter_queue: Vec::new(),
            next_sequence: 0,
            retry_backoff_base: config.retry_backoff_ms,
            retry_backoff_max: config.max_backoff_ms,
            completed_retention: config.completed_task_retention_ms,
        }
    }

    /// Insert a new task and return its id. The task must already be in the
    /// `Queued` status (as produced by `Task::new`).
    pub fn enqueue(&mut self, task: Task) -> TaskId {
        let id = task.id;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueueEntry {
            priority: task.priority,
            sequence,
            task_id: id,
        });
        self.tasks.insert(
            id,
            TaskRecord {
                task,
                terminal_at: None,
                wait_ms: None,
                duration_ms: None,
            },
        );
        id
    }

    /// Look at the next task to be dispatched without removing it.
    pub fn peek(&self) -> Option<&Task> {
        let entry = self.heap.peek()?;
        self.tasks.get(&entry.task_id).map(|r| &r.task)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pop the highest-priority, earliest-enqueued ready task and mark it
    /// `Dequeued`.
    pub fn dequeue(&mut self) -> DequeueOutcome {
        while let Some(entry) = self.heap.pop() {
            let Some(record) = self.tasks.get_mut(&entry.task_id) else {
                // Stale heap entry (task was cancelled); skip it.
                continue;
            };
            let now = Utc::now();
            record.task.status = TaskStatus::Dequeued;
            record.task.dequeued_at = Some(now);
            record.wait_ms = Some(
                (now - record.task.enqueued_at)
                    .num_milliseconds()
                    .max(0) as u64,
            );
            return DequeueOutcome::Task(record.task.clone());
        }
        DequeueOutcome::Empty
    }

    /// Remove a still-queued task before it is dispatched (cancellation).
    /// The stale heap entry is left in place and skipped lazily by `dequeue`.
    pub fn remove_queued(&mut self, id: TaskId) -> bool {
        match self.tasks.get(&id) {
            Some(record) if record.task.status == TaskStatus::Queued => {
                self.tasks.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Mark a dispatched task as completed. A duplicate or unknown id is a
    /// no-op that logs a warning, per spec §4.2 edge cases.
    pub fn complete_task(&mut self, id: TaskId) -> bool {
        let Some(record) = self.tasks.get_mut(&id) else {
            warn!(task_id = %id, "CompleteTask for unknown task id");
            return false;
        };
        if matches!(record.task.status, TaskStatus::Completed | TaskStatus::Failed) {
            warn!(task_id = %id, "duplicate CompleteTask ignored");
            return false;
        }
        let now = Utc::now();
        record.task.status = TaskStatus::Completed;
        if let Some(dequeued_at) = record.task.dequeued_at {
            record.duration_ms = Some((now - dequeued_at).num_milliseconds().max(0) as u64);
        }
        record.terminal_at = Some(now);
        true
    }

    /// Report a failed attempt. Applies the retry/backoff/DLQ policy from
    /// spec §4.2: if the retry budget remains, schedules a re-enqueue after
    /// `min(retry_backoff_ms * 2^retries, max_backoff_ms)`; otherwise moves
    /// the task to the dead-letter queue with its full attempt history.
    pub fn fail_task(&mut self, id: TaskId, kind: TaskErrorKind, message: String) -> FailOutcome {
        let Some(record) = self.tasks.get_mut(&id) else {
            warn!(task_id = %id, "FailTask for unknown task id");
            return FailOutcome::Unknown;
        };
        if matches!(record.task.status, TaskStatus::Completed | TaskStatus::Failed) {
            warn!(task_id = %id, "FailTask on already-terminal task ignored");
            return FailOutcome::Unknown;
        }

        let now = Utc::now();
        record.task.attempts.push(Attempt {
            timestamp: now,
            kind,
            message,
        });
        if let Some(dequeued_at) = record.task.dequeued_at {
            record.duration_ms = Some((now - dequeued_at).num_milliseconds().max(0) as u64);
        }

        if record.task.retry_budget_exhausted() {
            record.task.status = TaskStatus::Failed;
            record.terminal_at = Some(now);
            let task = record.task.clone();
            self.tasks.remove(&id);
            self.dead_letter_queue.push(task);
            FailOutcome::DeadLettered
        } else {
            record.task.retries += 1;
            record.task.status = TaskStatus::RetryPending;
            record.task.dequeued_at = None;

            let exponent = record.task.retries.min(20);
            let backoff_ms = self
                .retry_backoff_base
                .as_millis()
                .saturating_mul(1u128 << exponent.min(30))
                .min(self.retry_backoff_max.as_millis());
            let delay = Duration::from_millis(backoff_ms as u64);
            let due_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
            self.retry_heap.push(RetryEntry { due_at, task_id: id });
            FailOutcome::Retried { delay }
        }
    }

    /// When the next scheduled retry is due, if any — used by the dispatch
    /// loop to compute how long to sleep before calling
    /// [`TaskQueue::process_due_retries`] again (spec §9's single timer
    /// context for retries).
    pub fn next_retry_due_at(&self) -> Option<DateTime<Utc>> {
        self.retry_heap.peek().map(|e| e.due_at)
    }

    /// Re-enqueue every retry-pending task whose backoff has elapsed as of
    /// `now`. Returns the ids that were re-enqueued.
    pub fn process_due_retries(&mut self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut ready = Vec::new();
        while let Some(entry) = self.retry_heap.peek() {
            if entry.due_at > now {
                break;
            }
            let entry = self.retry_heap.pop().unwrap_or_else(|| unreachable!());
            // The task may have been cancelled while waiting on its backoff.
            if let Some(record) = self.tasks.get_mut(&entry.task_id) {
                if record.task.status == TaskStatus::RetryPending {
                    record.task.status = TaskStatus::Queued;
                    record.task.enqueued_at = now;
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;
                    self.heap.push(QueueEntry {
                        priority: record.task.priority,
                        sequence,
                        task_id: entry.task_id,
                    });
                    ready.push(entry.task_id);
                }
            }
        }
        ready
    }

    /// Tasks whose dispatch deadline (`dequeued_at + timeout`) has passed as
    /// of `now`. The caller (the supervisor) decides whether to also call
    /// `fail_task` — the spec treats a timeout as a failure for retry
    /// accounting.
    pub fn check_timeouts(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|r| r.task.status == TaskStatus::Dequeued)
            .filter_map(|r| {
                let deadline = r.task.deadline()?;
                (now >= deadline).then_some(r.task.id)
            })
            .collect()
    }

    /// Drop terminal tasks whose observation window has elapsed.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<TaskId> = self
            .tasks
            .iter()
            .filter_map(|(id, r)| {
                let terminal_at = r.terminal_at?;
                (now - terminal_at > chrono::Duration::from_std(self.completed_retention).unwrap_or_default())
                    .then_some(*id)
            })
            .collect();
        for id in expired {
            self.tasks.remove(&id);
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id).map(|r| &r.task)
    }

    pub fn dead_letter_queue(&self) -> &[Task] {
        &self.dead_letter_queue
    }

    pub fn stats(&self) -> QueueStats {
        let now = Utc::now();
        let depth = self.heap.len();
        let retry_pending = self
            .tasks
            .values()
            .filter(|r| r.task.status == TaskStatus::RetryPending)
            .count();
        let oldest_task_age = self
            .tasks
            .values()
            .filter(|r| matches!(r.task.status, TaskStatus::Queued | TaskStatus::Dequeued))
            .map(|r| (now - r.task.enqueued_at).num_milliseconds().max(0) as u64)
            .max()
            .map(Duration::from_millis);

        let waits: Vec<u64> = self.tasks.values().filter_map(|r| r.wait_ms).collect();
        let avg_wait_ms = average(&waits);

        let durations: Vec<u64> = self.tasks.values().filter_map(|r| r.duration_ms).collect();
        let avg_duration_ms = average(&durations);

        QueueStats {
            depth,
            retry_pending,
            dead_lettered: self.dead_letter_queue.len(),
            oldest_task_age,
            avg_wait_ms,
            avg_duration_ms,
        }
    }
}

fn average(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<u64>() as f64 / values.len() as f64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn task(priority: i32) -> Task {
        Task::new("echo".into(), Value::Null, priority, Duration::from_secs(5))
    }

    fn queue() -> TaskQueue {
        TaskQueue::new(&PoolConfig::default())
    }

    #[test]
    fn fifo_within_same_priority() {
        let mut q = queue();
        let a = task(10);
        let b = task(10);
        let id_a = a.id;
        let id_b = b.id;
        q.enqueue(a);
        q.enqueue(b);

        let first = match q.dequeue() {
            DequeueOutcome::Task(t) => t.id,
            DequeueOutcome::Empty => panic!("expected a task"),
        };
        let second = match q.dequeue() {
            DequeueOutcome::Task(t) => t.id,
            DequeueOutcome::Empty => panic!("expected a task"),
        };
        assert_eq!(first, id_a);
        assert_eq!(second, id_b);
    }

    #[test]
    fn priority_dominance_lower_number_wins() {
        let mut q = queue();
        let low_priority = task(10); // dispatched later
        let high_priority = task(1); // dispatched first
        q.enqueue(low_priority);
        q.enqueue(high_priority.clone());

        match q.dequeue() {
            DequeueOutcome::Task(t) => assert_eq!(t.id, high_priority.id),
            DequeueOutcome::Empty => panic!("expected a task"),
        }
    }

    #[test]
    fn three_task_priority_scenario_matches_spec_example() {
        // Submit in order: (A, prio=10), (B, prio=10), (C, prio=1).
        // Expected dispatch order: C, A, B.
        let mut q = queue();
        let a = task(10);
        let b = task(10);
        let c = task(1);
        let (id_a, id_b, id_c) = (a.id, b.id, c.id);
        q.enqueue(a);
        q.enqueue(b);
        q.enqueue(c);

        let order: Vec<TaskId> = std::iter::from_fn(|| match q.dequeue() {
            DequeueOutcome::Task(t) => Some(t.id),
            DequeueOutcome::Empty => None,
        })
        .collect();

        assert_eq!(order, vec![id_c, id_a, id_b]);
    }

    #[test]
    fn complete_task_is_idempotent() {
        let mut q = queue();
        let t = task(10);
        let id = t.id;
        q.enqueue(t);
        q.dequeue();

        assert!(q.complete_task(id));
        assert!(!q.complete_task(id)); // duplicate is a no-op
    }

    #[test]
    fn complete_task_unknown_id_is_noop() {
        let mut q = queue();
        assert!(!q.complete_task(TaskId::new()));
    }

    #[test]
    fn fail_task_retries_until_budget_exhausted_then_dead_letters() {
        let mut q = queue();
        let t = task(10).with_max_retries(2);
        let id = t.id;
        q.enqueue(t);
        q.dequeue();

        let outcome1 = q.fail_task(id, TaskErrorKind::HandlerError, "boom".into());
        assert!(matches!(outcome1, FailOutcome::Retried { .. }));

        // Simulate backoff elapsing and re-dispatch.
        let due = q.next_retry_due_at().unwrap();
        let reenqueued = q.process_due_retries(due);
        assert_eq!(reenqueued, vec![id]);
        q.dequeue();

        let outcome2 = q.fail_task(id, TaskErrorKind::HandlerError, "boom again".into());
        assert!(matches!(outcome2, FailOutcome::Retried { .. }));
        let due2 = q.next_retry_due_at().unwrap();
        q.process_due_retries(due2);
        q.dequeue();

        let outcome3 = q.fail_task(id, TaskErrorKind::HandlerError, "final".into());
        assert_eq!(outcome3, FailOutcome::DeadLettered);
        assert_eq!(q.dead_letter_queue().len(), 1);
        assert_eq!(q.dead_letter_queue()[0].attempts.len(), 3);
    }

    #[test]
    fn fail_task_unknown_id_is_noop() {
        let mut q = queue();
        let outcome = q.fail_task(TaskId::new(), TaskErrorKind::HandlerError, "x".into());
        assert_eq!(outcome, FailOutcome::Unknown);
    }

    #[test]
    fn backoff_delay_is_capped_at_max_backoff() {
        let mut config = PoolConfig::default();
        config.retry_backoff_ms = Duration::from_secs(1);
        config.max_backoff_ms = Duration::from_secs(4);
        let mut q = TaskQueue::new(&config);
        let t = task(10).with_max_retries(10);
        let id = t.id;
        q.enqueue(t);
        q.dequeue();

        for _ in 0..5 {
            let outcome = q.fail_task(id, TaskErrorKind::HandlerError, "x".into());
            if let FailOutcome::Retried { delay } = outcome {
                assert!(delay <= Duration::from_secs(4));
            }
            let due = q.next_retry_due_at().unwrap();
            q.process_due_retries(due);
            q.dequeue();
        }
    }

    #[test]
    fn check_timeouts_reports_overdue_dequeued_tasks() {
        let mut q = queue();
        let t = Task::new("slow".into(), Value::Null, 10, Duration::from_millis(1));
        let id = t.id;
        q.enqueue(t);
        q.dequeue();

        std::thread::sleep(Duration::from_millis(10));
        let overdue = q.check_timeouts(Utc::now());
        assert_eq!(overdue, vec![id]);
    }

    proptest::proptest! {
        /// Dispatch order invariant (spec §8): across any sequence of
        /// enqueues, a strictly lower priority number always dequeues
        /// before a higher one, and tasks sharing a priority dequeue in
        /// the order they were enqueued.
        #[test]
        fn dispatch_order_respects_priority_then_fifo(
            priorities in proptest::collection::vec(-5i32..5, 1..50)
        ) {
            let mut q = queue();
            let ids: Vec<TaskId> = priorities
                .iter()
                .map(|&p| {
                    let t = task(p);
                    let id = t.id;
                    q.enqueue(t);
                    id
                })
                .collect();

            let mut dequeued = Vec::with_capacity(ids.len());
            loop {
                match q.dequeue() {
                    DequeueOutcome::Task(t) => dequeued.push(t.id),
                    DequeueOutcome::Empty => break,
                }
            }

            let mut expected: Vec<(i32, usize)> = priorities
                .iter()
                .copied()
                .enumerate()
                .map(|(i, p)| (p, i))
                .collect();
            expected.sort_by_key(|&(p, i)| (p, i));
            let expected_ids: Vec<TaskId> = expected.into_iter().map(|(_, i)| ids[i]).collect();

            proptest::prop_assert_eq!(dequeued, expected_ids);
        }
    }

    #[test]
    fn evict_expired_removes_tasks_past_retention() {
        let mut config = PoolConfig::default();
        config.completed_task_retention_ms = Duration::from_millis(1);
        let mut q = TaskQueue::new(&config);
        let t = task(10);
        let id = t.id;
        q.enqueue(t);
        q.dequeue();
        q.complete_task(id);

        std::thread::sleep(Duration::from_millis(10));
        q.evict_expired(Utc::now());
        assert!(q.get(id).is_none());
    }
}
