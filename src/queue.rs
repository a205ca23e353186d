//! Per-partition FIFO task serialization.
//!
//! A [`TaskQueue`] is a single consumer loop draining a channel of closures:
//! tasks enqueued with [`execute`](TaskQueue::execute) run strictly one at a
//! time, in enqueue order, on a dedicated worker thread. A failing (or
//! panicking) task is delivered to whoever enqueued it but never stalls the
//! queue; subsequent tasks still run.
//!
//! When constructed with a [`FileMutex`], every task is wrapped as
//! acquire → run → release-on-every-exit-path, extending the queue's
//! ordering across processes: release is a guard drop, never skipped, even
//! when the task panics.

use crate::error::{CrosslockError, Result};
use crate::mutex::FileMutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// FIFO serializer of asynchronous operations for one partition.
///
/// Dropping the queue closes the channel, lets the worker drain what was
/// already enqueued, and joins it.
#[derive(Debug)]
pub struct TaskQueue {
    name: String,
    mutex: Option<Arc<FileMutex>>,
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<thread::JoinHandle<()>>,
}

/// Pending outcome of an enqueued task.
///
/// Resolves with the task's own result once the worker has run it.
#[derive(Debug)]
pub struct TaskHandle<R> {
    queue: String,
    receiver: mpsc::Receiver<Result<R>>,
}

impl<R> TaskHandle<R> {
    /// Block until the task has run and return its outcome.
    ///
    /// Fails with [`CrosslockError::QueueClosed`] if the queue shut down
    /// before the task could run.
    pub fn wait(self) -> Result<R> {
        self.receiver.recv().map_err(|_| {
            CrosslockError::QueueClosed(format!(
                "queue '{}' shut down before the task completed",
                self.queue
            ))
        })?
    }
}

impl TaskQueue {
    /// Create a queue whose ordering holds within this process only.
    pub fn new(name: &str) -> Result<Self> {
        Self::build(name, None)
    }

    /// Create a queue whose tasks additionally hold a cross-process mutex.
    pub fn with_mutex(name: &str, mutex: FileMutex) -> Result<Self> {
        Self::build(name, Some(Arc::new(mutex)))
    }

    fn build(name: &str, mutex: Option<Arc<FileMutex>>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(format!("crosslock-queue-{}", name))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .map_err(|e| {
                CrosslockError::QueueClosed(format!(
                    "failed to spawn worker for queue '{}': {}",
                    name, e
                ))
            })?;

        Ok(Self {
            name: name.to_string(),
            mutex,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// The queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a task and return a handle to its eventual outcome.
    ///
    /// Tasks run in enqueue order; the handle resolves (or errs) with the
    /// task's own result. The error of one task is observable only through
    /// its own handle and never affects later tasks.
    pub fn execute<R, F>(&self, task: F) -> TaskHandle<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let mutex = self.mutex.clone();
        let queue = self.name.clone();

        let job: Job = Box::new(move || {
            let outcome = run_task(mutex.as_deref(), &queue, task);
            // The caller may have dropped its handle; that is not an error.
            let _ = tx.send(outcome);
        });

        if let Some(sender) = &self.sender {
            // A send failure means the worker is gone; the dropped job closes
            // the result channel and the handle reports QueueClosed.
            let _ = sender.send(job);
        }

        TaskHandle {
            queue: self.name.clone(),
            receiver: rx,
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!(queue = %self.name, "queue worker terminated abnormally");
        }
    }
}

/// Run one task, holding the cross-process mutex when configured.
///
/// The guard binding releases the lock on every exit path out of this frame,
/// including the early return when acquisition itself fails and the caught
/// unwind of a panicking task.
fn run_task<R>(
    mutex: Option<&FileMutex>,
    queue: &str,
    task: impl FnOnce() -> Result<R>,
) -> Result<R> {
    let _guard = match mutex {
        Some(mutex) => Some(mutex.acquire("task")?),
        None => None,
    };

    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(result) => result,
        Err(payload) => Err(CrosslockError::Transaction(format!(
            "task on queue '{}' panicked: {}",
            queue,
            panic_message(&*payload)
        ))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::StoreContext;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn task_result_propagates_to_the_handle() {
        let queue = TaskQueue::new("inventory").unwrap();
        let handle = queue.execute(|| Ok(42));
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn tasks_run_in_enqueue_order_without_overlap() {
        let queue = TaskQueue::new("inventory").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_a = Arc::clone(&log);
        let first = queue.execute(move || {
            log_a.lock().unwrap().push("a-start");
            thread::sleep(Duration::from_millis(50));
            log_a.lock().unwrap().push("a-end");
            Ok(())
        });

        let log_b = Arc::clone(&log);
        let second = queue.execute(move || {
            log_b.lock().unwrap().push("b");
            Ok(())
        });

        first.wait().unwrap();
        second.wait().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a-start", "a-end", "b"]);
    }

    #[test]
    fn failing_task_does_not_stall_the_queue() {
        let queue = TaskQueue::new("inventory").unwrap();

        let failing = queue.execute(|| -> Result<()> {
            Err(CrosslockError::Transaction("capacity exceeded".to_string()))
        });
        let following = queue.execute(|| Ok("still running"));

        let err = failing.wait().unwrap_err();
        assert!(err.to_string().contains("capacity exceeded"));
        assert_eq!(following.wait().unwrap(), "still running");
    }

    #[test]
    fn panicking_task_is_reported_and_queue_survives() {
        let queue = TaskQueue::new("inventory").unwrap();

        let panicking = queue.execute(|| -> Result<()> { panic!("modifier bug") });
        let following = queue.execute(|| Ok(1));

        let err = panicking.wait().unwrap_err();
        assert!(matches!(err, CrosslockError::Transaction(_)));
        assert!(err.to_string().contains("modifier bug"));
        assert_eq!(following.wait().unwrap(), 1);
    }

    #[test]
    fn mutex_backed_task_holds_the_marker_while_running() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::resolve(temp_dir.path());
        ctx.ensure_layout().unwrap();
        let config = Config::default();

        let queue =
            TaskQueue::with_mutex("inventory", FileMutex::new(&ctx, "inventory", &config)).unwrap();

        let marker = ctx.lock_path("inventory");
        let marker_inside = marker.clone();
        let held_during_task = queue.execute(move || Ok(marker_inside.exists()));

        assert!(held_during_task.wait().unwrap());
        assert!(!marker.exists());
    }

    #[test]
    fn mutex_is_released_when_the_task_fails() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::resolve(temp_dir.path());
        ctx.ensure_layout().unwrap();
        let config = Config::default();

        let queue =
            TaskQueue::with_mutex("inventory", FileMutex::new(&ctx, "inventory", &config)).unwrap();

        let failing = queue.execute(|| -> Result<()> { panic!("mid-critical-section") });
        assert!(failing.wait().is_err());
        assert!(!ctx.lock_path("inventory").exists());

        // The lock is free again for the next task.
        let next = queue.execute(|| Ok(()));
        next.wait().unwrap();
    }

    #[test]
    fn two_mutex_backed_queues_never_interleave_critical_sections() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::resolve(temp_dir.path());
        ctx.ensure_layout().unwrap();
        let config = Config {
            lock_retry_interval_ms: 5,
            lock_retry_budget: 500,
            ..Config::default()
        };

        // Two queues over one lock name stand in for two processes.
        let queue_a =
            TaskQueue::with_mutex("shared", FileMutex::new(&ctx, "shared", &config)).unwrap();
        let queue_b =
            TaskQueue::with_mutex("shared", FileMutex::new(&ctx, "shared", &config)).unwrap();

        let inside = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();
        for queue in [&queue_a, &queue_b] {
            for _ in 0..3 {
                let inside = Arc::clone(&inside);
                handles.push(queue.execute(move || {
                    let was_inside = inside.swap(true, Ordering::SeqCst);
                    assert!(!was_inside, "two critical sections overlapped");
                    thread::sleep(Duration::from_millis(10));
                    inside.store(false, Ordering::SeqCst);
                    Ok(())
                }));
            }
        }

        for handle in handles {
            handle.wait().unwrap();
        }
    }

    #[test]
    fn dropped_queue_drains_already_enqueued_work() {
        let queue = TaskQueue::new("inventory").unwrap();
        let slow = queue.execute(|| {
            thread::sleep(Duration::from_millis(20));
            Ok(())
        });
        drop(queue);

        // Already-enqueued work drains before the worker exits.
        slow.wait().unwrap();
    }
}
