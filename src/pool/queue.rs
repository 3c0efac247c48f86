use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::model::TaskSpec;

/// FIFO task queue shared by the worker loops.
///
/// Enqueue never blocks; dequeue parks on a notifier with a deadline so
/// that idle workers stay cancellation-responsive.
pub struct TaskQueue {
    inner: Mutex<VecDeque<TaskSpec>>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn enqueue(&self, task: TaskSpec) {
        self.inner.lock().unwrap().push_back(task);
        self.notify.notify_one();
    }

    /// Pop the oldest task, waiting up to `timeout` for one to arrive.
    pub async fn dequeue(&self, timeout: Duration) -> Option<TaskSpec> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(task) = self.inner.lock().unwrap().pop_front() {
                return Some(task);
            }
            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = sleep_until(deadline) => {
                    return self.inner.lock().unwrap().pop_front();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(task_type: &str) -> TaskSpec {
        TaskSpec::new(task_type, 1, 1.0, json!({}))
    }

    #[tokio::test]
    async fn dequeue_is_fifo() {
        let queue = TaskQueue::new();
        queue.enqueue(task("first"));
        queue.enqueue(task("second"));

        let a = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        let b = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(a.task_type, "first");
        assert_eq!(b.task_type, "second");
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dequeue_times_out_on_empty_queue() {
        let queue = TaskQueue::new();
        assert!(queue.dequeue(Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn waiting_dequeue_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(TaskQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        queue.enqueue(task("wakeup"));

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.task_type, "wakeup");
    }

    #[tokio::test]
    async fn reenqueued_task_goes_to_the_tail() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a"));
        queue.enqueue(task("b"));
        let a = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        queue.enqueue(a);

        let next = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(next.task_type, "b");
        let last = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(last.task_type, "a");
    }
}
