//! The callback execution loop.
//!
//! One dedicated context drains the registry's call queue and runs each job
//! while holding the execution token. The token is given up while the loop
//! waits for work, so producers that also need it are never starved by an
//! idle loop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hookline_core::testing::{MockHost, RecordingToken};
//! use hookline_core::CallbackRegistry;
//!
//! let host = MockHost::new();
//! let registry = Arc::new(CallbackRegistry::new(host.clone(), RecordingToken::new()));
//! let handle = registry.spawn_execution_loop()?;
//!
//! let handler = host.handler(1);
//! registry.dispatch(Some(&handler), 7u64, None, None)?;
//!
//! handle.stop_and_join();
//! # Ok::<(), hookline_core::CallbackError>(())
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::{CallbackError, Result};
use crate::host::Host;
use crate::logging::{span_names, targets};
use crate::registry::CallbackRegistry;
use crate::token::TokenGuard;

impl<H: Host> CallbackRegistry<H> {
    /// Run the execution loop on the calling thread until a stop is requested.
    ///
    /// Jobs run in submission order. Each completed job decrements the
    /// pending-call counter, including jobs that panic.
    pub fn run_callbacks(&self) {
        let _span =
            tracing::debug_span!(target: targets::EXECUTION_LOOP, span_names::EXECUTION_LOOP)
                .entered();
        self.running.store(true, Ordering::Release);
        tracing::info!(target: targets::EXECUTION_LOOP, "callback execution loop started");

        let mut token = TokenGuard::acquire(self.token().as_ref());
        while self.running.load(Ordering::Acquire) {
            let Some(job) = token.unlocked(|| self.calls.wait_and_pop()) else {
                break;
            };
            {
                let _span =
                    tracing::trace_span!(target: targets::EXECUTION_LOOP, span_names::CALLBACK_JOB)
                        .entered();
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    tracing::error!(
                        target: targets::EXECUTION_LOOP,
                        panic = panic_message(payload.as_ref()),
                        "callback job panicked"
                    );
                }
            }
            self.call_count.fetch_sub(1, Ordering::AcqRel);
        }
        drop(token);

        tracing::info!(target: targets::EXECUTION_LOOP, "callback execution loop stopped");
    }

    /// Whether the execution loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the execution loop to stop.
    ///
    /// The stop travels through the call queue: jobs queued before the
    /// request still run, and the loop exits right after the stop job, even
    /// if it is blocked waiting when the request arrives.
    pub fn request_stop(&self) {
        tracing::debug!(target: targets::EXECUTION_LOOP, "stop requested");
        let running = Arc::clone(&self.running);
        self.submit_callback(move || running.store(false, Ordering::Release));
    }

    /// Run every generic task queued so far on the calling thread.
    ///
    /// Does not touch the execution token or the pending-call counter.
    /// Returns the number of tasks run.
    pub fn run_tasks(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.tasks.try_pop() {
            task();
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(target: targets::EXECUTION_LOOP, ran, "ran deferred tasks");
        }
        ran
    }

    /// Start the execution loop on a dedicated thread named after the
    /// configuration.
    pub fn spawn_execution_loop(self: &Arc<Self>) -> Result<LoopHandle<H>> {
        let mut builder = thread::Builder::new().name(self.config().thread_name.clone());
        if let Some(stack_size) = self.config().stack_size {
            builder = builder.stack_size(stack_size);
        }

        let registry = Arc::clone(self);
        let handle = builder
            .spawn(move || registry.run_callbacks())
            .map_err(|err| CallbackError::LoopSpawn(err.to_string()))?;

        Ok(LoopHandle {
            registry: Arc::clone(self),
            handle: Mutex::new(Some(handle)),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Controls an execution loop started with
/// [`CallbackRegistry::spawn_execution_loop`].
///
/// Dropping the handle requests a stop without waiting for the thread.
pub struct LoopHandle<H: Host> {
    registry: Arc<CallbackRegistry<H>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<H: Host> LoopHandle<H> {
    /// The registry the loop drains.
    pub fn registry(&self) -> &Arc<CallbackRegistry<H>> {
        &self.registry
    }

    /// Request a stop. Non-blocking.
    pub fn stop(&self) {
        self.registry.request_stop();
    }

    /// Wait for the loop thread to exit.
    ///
    /// Returns `false` if it was already joined or panicked.
    pub fn join(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => handle.join().is_ok(),
            None => false,
        }
    }

    /// Equivalent to [`stop`](Self::stop) followed by [`join`](Self::join).
    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }

    /// Whether the loop thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }
}

impl<H: Host> Drop for LoopHandle<H> {
    fn drop(&mut self) {
        if self.handle.lock().is_some() {
            self.stop();
        }
    }
}
