//! Blocking FIFO of deferred jobs.
//!
//! Producers push from any thread without blocking; a single dedicated
//! consumer blocks in [`JobQueue::wait_and_pop`] until work arrives.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

/// A boxed, run-once unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread-safe FIFO of [`Job`]s with a blocking pop.
///
/// Backed by an unbounded channel whose sending half lives as long as the
/// queue, so the receiving half never observes a disconnect.
pub struct JobQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Append a job and wake one waiting consumer.
    pub fn push(&self, job: Job) {
        // The receiver lives in `self`, so the send cannot fail.
        let _ = self.sender.send(job);
    }

    /// Box and append a closure.
    pub fn push_fn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Box::new(job));
    }

    /// Block until a job is available and remove the oldest one.
    ///
    /// Returns `None` only if the channel disconnected.
    pub fn wait_and_pop(&self) -> Option<Job> {
        self.receiver.recv().ok()
    }

    /// Like [`wait_and_pop`](Self::wait_and_pop), but gives up after `timeout`.
    pub fn wait_and_pop_timeout(&self, timeout: Duration) -> Option<Job> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Remove the oldest job without blocking.
    pub fn try_pop(&self) -> Option<Job> {
        self.receiver.try_recv().ok()
    }

    /// Whether the queue is empty. May be stale under concurrent pushes.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            queue.push_fn(move || order.lock().push(i));
        }
        assert_eq!(queue.len(), 5);

        while let Some(job) = queue.try_pop() {
            job();
        }

        assert!(queue.is_empty());
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_wait_and_pop_blocks_until_push() {
        let queue = Arc::new(JobQueue::new());
        let consumer_queue = queue.clone();

        let consumer = thread::spawn(move || {
            let job = consumer_queue.wait_and_pop().unwrap();
            job();
        });

        thread::sleep(Duration::from_millis(20));
        let ran = Arc::new(Mutex::new(false));
        let ran_clone = ran.clone();
        queue.push_fn(move || *ran_clone.lock() = true);

        consumer.join().unwrap();
        assert!(*ran.lock());
    }

    #[test]
    fn test_wait_and_pop_timeout_on_empty_queue() {
        let queue = JobQueue::new();
        assert!(queue.wait_and_pop_timeout(Duration::from_millis(10)).is_none());

        queue.push_fn(|| {});
        assert!(queue.wait_and_pop_timeout(Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_many_producers_single_consumer() {
        let queue = Arc::new(JobQueue::new());
        let counter = Arc::new(Mutex::new(0usize));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        let counter = counter.clone();
                        queue.push_fn(move || *counter.lock() += 1);
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            let job = queue.wait_and_pop().unwrap();
            job();
        }
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(*counter.lock(), 100);
        assert!(queue.is_empty());
    }
}
