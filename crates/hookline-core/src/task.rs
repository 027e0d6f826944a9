//! Result handles for generic deferred tasks.
//!
//! Tasks posted with [`CallbackRegistry::submit_task`](crate::CallbackRegistry::submit_task)
//! run whenever some context drains the task queue with
//! [`run_tasks`](crate::CallbackRegistry::run_tasks). The returned
//! [`TaskHandle`] lets the submitter collect the result.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};

/// Receives the result of a task once it has run.
///
/// If the task is dropped without running (for example because the queue was
/// discarded at shutdown), waiting returns `None`.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<T>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Wrap `task` so that its result is delivered to a new handle.
    pub(crate) fn wrap<F>(task: F) -> (impl FnOnce() + Send + 'static, Self)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver): (Sender<T>, Receiver<T>) = bounded(1);
        let job = move || {
            // The handle may already be gone; the result is simply discarded.
            let _ = sender.send(task());
        };
        (job, Self { receiver })
    }

    /// Block until the task has run and return its result.
    pub fn wait(self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Block for at most `timeout`.
    ///
    /// Returns `Err(self)` if the task has not run yet, so the caller can
    /// keep waiting later.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Option<T>, Self> {
        match self.receiver.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }

    /// Return the result if the task has already run.
    pub fn try_take(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_delivered_after_run() {
        let (job, handle) = TaskHandle::wrap(|| 6 * 7);
        assert!(handle.try_take().is_none());

        job();
        assert_eq!(handle.wait(), Some(42));
    }

    #[test]
    fn test_dropped_task_yields_none() {
        let (job, handle) = TaskHandle::wrap(|| "never");
        drop(job);
        assert_eq!(handle.wait(), None);
    }

    #[test]
    fn test_wait_timeout_returns_handle() {
        let (job, handle) = TaskHandle::wrap(|| 1u8);
        let handle = match handle.wait_timeout(Duration::from_millis(5)) {
            Err(handle) => handle,
            Ok(_) => panic!("task has not run yet"),
        };

        job();
        assert!(matches!(handle.wait_timeout(Duration::from_millis(5)), Ok(Some(1))));
    }
}
