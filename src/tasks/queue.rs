//! Priority partitioned task queue.
//!
//! Four FIFO partitions, drained `Urgent > High > Normal > Low`. The queue
//! knows nothing about completion; callers pass a closure that classifies
//! each head-of-line task when draining.

use std::collections::VecDeque;

use jiff::Timestamp;

use crate::error::{AppError, AppResult};
use crate::tasks::model::BatchTask;
use crate::tasks::types::TaskPriority;

/// How a queued task relates to its dependencies at dequeue time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Ready,
    Blocked,
    /// A dependency ended in failure or cancellation
    DependencyFailed(String),
}

/// Result of one [`PriorityQueues::dequeue_eligible`] pass
#[derive(Debug, Default)]
pub struct Drained {
    pub ready: Vec<BatchTask>,
    /// Tasks resolved to `Failed` because a dependency failed
    pub failed: Vec<BatchTask>,
}

#[derive(Debug)]
pub struct PriorityQueues {
    partitions: [VecDeque<BatchTask>; 4],
    max_size: usize,
}

impl PriorityQueues {
    pub fn new(max_size: usize) -> Self {
        Self {
            partitions: Default::default(),
            max_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(VecDeque::is_empty)
    }

    pub fn len_of(&self, priority: TaskPriority) -> usize {
        self.partitions[priority.slot()].len()
    }

    /// Appends a new task to the tail of its partition.
    pub fn enqueue(&mut self, task: BatchTask) -> AppResult<()> {
        if self.len() >= self.max_size {
            return Err(AppError::CapacityExceeded {
                capacity: self.max_size,
            });
        }
        self.partitions[task.priority.slot()].push_back(task);
        Ok(())
    }

    /// Puts a task back at the tail of its partition without a capacity check.
    ///
    /// Used for retries and replay: the task was already admitted once.
    pub fn requeue(&mut self, task: BatchTask) {
        self.partitions[task.priority.slot()].push_back(task);
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.get(task_id).is_some()
    }

    pub fn get(&self, task_id: &str) -> Option<&BatchTask> {
        self.partitions
            .iter()
            .flat_map(|p| p.iter())
            .find(|t| t.task_id == task_id)
    }

    pub fn remove(&mut self, task_id: &str) -> Option<BatchTask> {
        for partition in self.partitions.iter_mut() {
            if let Some(pos) = partition.iter().position(|t| t.task_id == task_id) {
                return partition.remove(pos);
            }
        }
        None
    }

    /// Snapshot of every queued task in service order
    pub fn iter(&self) -> impl Iterator<Item = &BatchTask> {
        self.partitions.iter().flat_map(|p| p.iter())
    }

    /// Hands out up to `max_count` eligible tasks in priority order.
    ///
    /// Per partition, tasks are popped from the front. A blocked task goes
    /// to the back of its partition and ends the scan of that partition, so
    /// a blocked head never starves lower priorities. Tasks whose dependency
    /// failed are resolved here and returned in [`Drained::failed`]; they do
    /// not count against `max_count`.
    pub fn dequeue_eligible<F>(&mut self, max_count: usize, now: Timestamp, check: F) -> Drained
    where
        F: Fn(&BatchTask) -> Eligibility,
    {
        let mut drained = Drained::default();

        for priority in TaskPriority::SERVICE_ORDER {
            if drained.ready.len() >= max_count {
                break;
            }
            let partition = &mut self.partitions[priority.slot()];
            let mut remaining = partition.len();

            while remaining > 0 && drained.ready.len() < max_count {
                remaining -= 1;
                let Some(mut task) = partition.pop_front() else {
                    break;
                };
                match check(&task) {
                    Eligibility::Ready => drained.ready.push(task),
                    Eligibility::DependencyFailed(dep) => {
                        task.mark_failed(format!("Dependency {} failed", dep), now);
                        drained.failed.push(task);
                    }
                    Eligibility::Blocked => {
                        partition.push_back(task);
                        break;
                    }
                }
            }
        }

        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::NewTask;
    use crate::tasks::payload::CacheRefreshPayload;
    use crate::tasks::types::TaskStatus;
    use proptest::prelude::*;

    fn now() -> Timestamp {
        Timestamp::from_second(1_700_000_000).unwrap()
    }

    fn task(id: &str, priority: TaskPriority) -> BatchTask {
        NewTask::new(CacheRefreshPayload::default())
            .with_priority(priority)
            .into_task(id.to_string(), 3, 300, now())
    }

    fn ids(tasks: &[BatchTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.task_id.as_str()).collect()
    }

    #[test]
    fn test_enqueue_rejects_when_full() {
        let mut queues = PriorityQueues::new(2);
        queues.enqueue(task("a", TaskPriority::Low)).unwrap();
        queues.enqueue(task("b", TaskPriority::Urgent)).unwrap();
        let err = queues.enqueue(task("c", TaskPriority::High)).unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded { capacity: 2 }));

        queues.requeue(task("d", TaskPriority::High));
        assert_eq!(queues.len(), 3);
    }

    #[test]
    fn test_drains_in_priority_order() {
        let mut queues = PriorityQueues::new(10);
        queues.enqueue(task("low", TaskPriority::Low)).unwrap();
        queues.enqueue(task("normal", TaskPriority::Normal)).unwrap();
        queues.enqueue(task("urgent", TaskPriority::Urgent)).unwrap();
        queues.enqueue(task("high", TaskPriority::High)).unwrap();

        let drained = queues.dequeue_eligible(10, now(), |_| Eligibility::Ready);
        assert_eq!(ids(&drained.ready), vec!["urgent", "high", "normal", "low"]);
        assert!(queues.is_empty());
    }

    #[test]
    fn test_respects_max_count() {
        let mut queues = PriorityQueues::new(10);
        for id in ["a", "b", "c"] {
            queues.enqueue(task(id, TaskPriority::Normal)).unwrap();
        }
        let drained = queues.dequeue_eligible(2, now(), |_| Eligibility::Ready);
        assert_eq!(ids(&drained.ready), vec!["a", "b"]);
        assert_eq!(queues.len_of(TaskPriority::Normal), 1);
    }

    #[test]
    fn test_blocked_task_moves_to_back_and_stops_partition() {
        let mut queues = PriorityQueues::new(10);
        queues.enqueue(task("blocked", TaskPriority::High)).unwrap();
        queues.enqueue(task("next", TaskPriority::High)).unwrap();
        queues.enqueue(task("low", TaskPriority::Low)).unwrap();

        let drained = queues.dequeue_eligible(10, now(), |t| {
            if t.task_id == "blocked" {
                Eligibility::Blocked
            } else {
                Eligibility::Ready
            }
        });
        assert_eq!(ids(&drained.ready), vec!["low"]);

        let remaining: Vec<&str> = queues.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(remaining, vec!["next", "blocked"]);
    }

    #[test]
    fn test_dependency_failure_resolves_task() {
        let mut queues = PriorityQueues::new(10);
        queues.enqueue(task("child", TaskPriority::Normal)).unwrap();
        queues.enqueue(task("other", TaskPriority::Normal)).unwrap();

        let drained = queues.dequeue_eligible(10, now(), |t| {
            if t.task_id == "child" {
                Eligibility::DependencyFailed("parent".to_string())
            } else {
                Eligibility::Ready
            }
        });
        assert_eq!(ids(&drained.ready), vec!["other"]);
        assert_eq!(drained.failed.len(), 1);
        let failed = &drained.failed[0];
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap().contains("parent"));
        assert!(failed.completed_at.is_some());
    }

    #[test]
    fn test_remove_and_get() {
        let mut queues = PriorityQueues::new(10);
        queues.enqueue(task("a", TaskPriority::Normal)).unwrap();
        queues.enqueue(task("b", TaskPriority::Urgent)).unwrap();
        assert!(queues.contains("a"));
        assert_eq!(queues.remove("a").map(|t| t.task_id), Some("a".to_string()));
        assert!(!queues.contains("a"));
        assert!(queues.remove("a").is_none());
        assert_eq!(queues.get("b").map(|t| t.priority), Some(TaskPriority::Urgent));
    }

    fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
        prop_oneof![
            Just(TaskPriority::Low),
            Just(TaskPriority::Normal),
            Just(TaskPriority::High),
            Just(TaskPriority::Urgent),
        ]
    }

    proptest! {
        #[test]
        fn prop_drain_is_priority_then_fifo(priorities in prop::collection::vec(priority_strategy(), 0..40)) {
            let mut queues = PriorityQueues::new(100);
            for (i, p) in priorities.iter().enumerate() {
                queues.enqueue(task(&format!("t{}", i), *p)).unwrap();
            }

            let drained = queues.dequeue_eligible(100, now(), |_| Eligibility::Ready);
            prop_assert_eq!(drained.ready.len(), priorities.len());

            // Higher priorities first, insertion order within a priority
            for pair in drained.ready.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.priority >= b.priority);
                if a.priority == b.priority {
                    let ai: usize = a.task_id[1..].parse().unwrap();
                    let bi: usize = b.task_id[1..].parse().unwrap();
                    prop_assert!(ai < bi);
                }
            }
        }

        #[test]
        fn prop_never_exceeds_max_count(count in 0usize..30, max in 0usize..10) {
            let mut queues = PriorityQueues::new(100);
            for i in 0..count {
                queues.enqueue(task(&format!("t{}", i), TaskPriority::Normal)).unwrap();
            }
            let drained = queues.dequeue_eligible(max, now(), |_| Eligibility::Ready);
            prop_assert_eq!(drained.ready.len(), count.min(max));
            prop_assert_eq!(queues.len(), count - count.min(max));
        }
    }
}
