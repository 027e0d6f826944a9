//! The callback registry: dispatch, manual mode, and frame callbacks.
//!
//! A [`CallbackRegistry`] is the one explicitly owned context that replaces
//! process-wide callback state. Event sources call [`CallbackRegistry::dispatch`]
//! to fire a handler; the registry then either queues the call for the
//! execution loop or, in manual callback mode, records a [`CallbackJob`] for
//! an external pump to drain.
//!
//! # Shared state
//!
//! | field | access |
//! |---|---|
//! | pending-call counter | atomic; incremented on enqueue, decremented by the loop |
//! | pending-call ceiling | atomic |
//! | running flag | atomic, shared with stop jobs |
//! | manual mode flag | atomic |
//! | manual job list | mutex |
//! | frame table | mutex |
//!
//! # Example
//!
//! ```
//! use hookline_core::testing::{MockHost, MockValue, RecordingToken};
//! use hookline_core::CallbackRegistry;
//!
//! let host = MockHost::new();
//! let registry = CallbackRegistry::new(host.clone(), RecordingToken::new());
//! registry.set_manual_callbacks(true);
//!
//! let handler = host.handler(2);
//! let app_data = host.owned(MockValue::Int(5));
//! registry.dispatch(Some(&handler), "ok_button", Some(app_data), None)?;
//!
//! for job in registry.drain_manual_jobs() {
//!     job.invoke(registry.invoker());
//! }
//! assert_eq!(host.calls().len(), 1);
//! # Ok::<(), hookline_core::CallbackError>(())
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::{CallbackConfig, CallbackConfigBuilder};
use crate::error::{CallbackError, Result};
use crate::frame::{FrameCallbacks, FrameEntry};
use crate::host::{Host, HostRef, SenderId};
use crate::invoker::CallbackInvoker;
use crate::logging::targets;
use crate::queue::JobQueue;
use crate::task::TaskHandle;
use crate::token::{ExecutionToken, TokenGuard};

/// A callback recorded in manual callback mode.
///
/// Each job holds its own strong references; dropping or invoking the job
/// releases them.
pub struct CallbackJob<H: Host> {
    /// Who fired the callback.
    pub sender: SenderId,
    /// The handler to call.
    pub handler: Option<HostRef<H>>,
    /// Event-supplied payload.
    pub app_data: Option<HostRef<H>>,
    /// Registration-supplied payload.
    pub user_data: Option<HostRef<H>>,
}

impl<H: Host> CallbackJob<H> {
    /// Run the job through `invoker` on the calling context.
    ///
    /// The caller is responsible for holding the execution token if the host
    /// requires it.
    pub fn invoke(self, invoker: &CallbackInvoker<H>) {
        let Self {
            sender,
            handler,
            app_data,
            user_data,
        } = self;
        invoker.invoke(handler.as_ref(), &sender, app_data, user_data);
    }
}

impl<H: Host> fmt::Debug for CallbackJob<H>
where
    H::Object: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackJob")
            .field("sender", &self.sender)
            .field("handler", &self.handler)
            .field("app_data", &self.app_data)
            .field("user_data", &self.user_data)
            .finish()
    }
}

/// Owns every piece of callback dispatch state for one embedded runtime.
pub struct CallbackRegistry<H: Host> {
    invoker: CallbackInvoker<H>,
    token: Arc<dyn ExecutionToken>,
    config: CallbackConfig,
    /// Callback jobs drained by the execution loop.
    pub(crate) calls: JobQueue,
    /// Generic deferred work drained by `run_tasks`.
    pub(crate) tasks: JobQueue,
    /// Calls queued or in flight on the execution loop.
    pub(crate) call_count: AtomicUsize,
    max_pending_calls: AtomicUsize,
    pub(crate) running: Arc<AtomicBool>,
    manual_callbacks: AtomicBool,
    manual_jobs: Mutex<Vec<CallbackJob<H>>>,
    frames: FrameCallbacks<H>,
}

impl<H: Host> CallbackRegistry<H> {
    /// Create a registry with the default configuration.
    pub fn new(host: Arc<H>, token: Arc<dyn ExecutionToken>) -> Self {
        Self::with_config(host, token, CallbackConfig::default())
    }

    /// Create a registry with a custom configuration.
    pub fn with_config(
        host: Arc<H>,
        token: Arc<dyn ExecutionToken>,
        config: CallbackConfig,
    ) -> Self {
        Self {
            invoker: CallbackInvoker::new(host),
            token,
            calls: JobQueue::new(),
            tasks: JobQueue::new(),
            call_count: AtomicUsize::new(0),
            max_pending_calls: AtomicUsize::new(config.max_pending_calls),
            running: Arc::new(AtomicBool::new(false)),
            manual_callbacks: AtomicBool::new(config.manual_callbacks),
            manual_jobs: Mutex::new(Vec::new()),
            frames: FrameCallbacks::new(),
            config,
        }
    }

    /// Start building a registry with custom configuration.
    pub fn builder() -> CallbackConfigBuilder {
        CallbackConfigBuilder::new()
    }

    /// The host handlers are called through.
    pub fn host(&self) -> &Arc<H> {
        self.invoker.host()
    }

    /// The invoker used for every callback.
    pub fn invoker(&self) -> &CallbackInvoker<H> {
        &self.invoker
    }

    /// The execution token handler code runs under.
    pub fn token(&self) -> &Arc<dyn ExecutionToken> {
        &self.token
    }

    /// The configuration the registry was created with.
    pub fn config(&self) -> &CallbackConfig {
        &self.config
    }

    /// Calls queued or in flight on the execution loop.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Acquire)
    }

    /// The current pending-call ceiling.
    pub fn max_pending_calls(&self) -> usize {
        self.max_pending_calls.load(Ordering::Acquire)
    }

    /// Change the pending-call ceiling.
    pub fn set_max_pending_calls(&self, limit: usize) {
        self.max_pending_calls.store(limit, Ordering::Release);
    }

    /// Whether dispatched callbacks are recorded for an external pump.
    pub fn manual_callbacks(&self) -> bool {
        self.manual_callbacks.load(Ordering::Acquire)
    }

    /// Switch manual callback mode on or off.
    pub fn set_manual_callbacks(&self, enabled: bool) {
        self.manual_callbacks.store(enabled, Ordering::Release);
    }

    /// Fire `handler` on behalf of `sender`.
    ///
    /// The payloads are owned references; they move into the queued job or
    /// are released here. The call never waits for the handler.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError::CallLimitReached`] when the pending-call
    /// ceiling has been reached. The payloads are released and the handler is
    /// not called.
    pub fn dispatch(
        &self,
        handler: Option<&HostRef<H>>,
        sender: impl Into<SenderId>,
        app_data: Option<HostRef<H>>,
        user_data: Option<HostRef<H>>,
    ) -> Result<()> {
        let sender = sender.into();
        let limit = self.max_pending_calls();
        let pending = self.call_count();
        if pending >= limit {
            return Err(self.refuse(&sender, pending, limit));
        }

        if self.manual_callbacks() {
            tracing::trace!(target: targets::DISPATCH, %sender, "recording manual callback job");
            self.manual_jobs.lock().push(CallbackJob {
                sender,
                handler: handler.cloned(),
                app_data,
                user_data,
            });
            return Ok(());
        }

        // Reserve a slot so concurrent producers cannot overshoot the ceiling.
        let reserved = self
            .call_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < limit).then_some(count + 1)
            });
        if let Err(pending) = reserved {
            return Err(self.refuse(&sender, pending, limit));
        }

        tracing::trace!(target: targets::DISPATCH, %sender, "queueing callback");
        let handler = handler.cloned();
        let invoker = self.invoker.clone();
        self.calls.push_fn(move || {
            invoker.invoke(handler.as_ref(), &sender, app_data, user_data);
        });
        Ok(())
    }

    fn refuse(&self, sender: &SenderId, pending: usize, limit: usize) -> CallbackError {
        tracing::error!(
            target: targets::DISPATCH,
            %sender,
            pending,
            limit,
            "pending callback ceiling reached, dropping callback"
        );
        CallbackError::CallLimitReached { pending, limit }
    }

    /// Call `handler` synchronously on the current context.
    ///
    /// Acquires the execution token for the duration of the call, so it must
    /// not be used from inside a running callback.
    pub fn dispatch_now(
        &self,
        handler: Option<&HostRef<H>>,
        sender: impl Into<SenderId>,
        app_data: Option<HostRef<H>>,
        user_data: Option<HostRef<H>>,
    ) {
        let sender = sender.into();
        let _token = TokenGuard::acquire(self.token.as_ref());
        self.invoker.invoke(handler, &sender, app_data, user_data);
    }

    /// Ask `handler` whether a close should proceed, synchronously.
    ///
    /// Acquires the execution token for the duration of the call. See
    /// [`CallbackInvoker::should_close`] for how the answer is derived.
    pub fn should_close(
        &self,
        handler: Option<&HostRef<H>>,
        user_data: Option<HostRef<H>>,
    ) -> bool {
        if handler.is_none() {
            return true;
        }
        let _token = TokenGuard::acquire(self.token.as_ref());
        self.invoker.should_close(handler, user_data)
    }

    /// Queue an arbitrary job on the execution loop.
    ///
    /// The job counts towards the pending-call total but bypasses the ceiling.
    pub fn submit_callback<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.call_count.fetch_add(1, Ordering::AcqRel);
        self.calls.push_fn(job);
    }

    /// Queue generic work for the next [`run_tasks`](Self::run_tasks) drain.
    pub fn submit_task<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (job, handle) = TaskHandle::wrap(task);
        self.tasks.push_fn(job);
        handle
    }

    /// Take every job recorded in manual callback mode, oldest first.
    pub fn drain_manual_jobs(&self) -> Vec<CallbackJob<H>> {
        std::mem::take(&mut *self.manual_jobs.lock())
    }

    /// Number of jobs waiting to be drained.
    pub fn pending_manual_jobs(&self) -> usize {
        self.manual_jobs.lock().len()
    }

    /// Register `handler` to be dispatched when frame `frame` is reached.
    ///
    /// Replaces any handler already registered for that frame.
    pub fn register_frame_callback(
        &self,
        frame: u64,
        handler: HostRef<H>,
        user_data: Option<HostRef<H>>,
    ) {
        let replaced = self.frames.register(frame, FrameEntry { handler, user_data });
        if replaced.is_some() {
            tracing::debug!(target: targets::FRAME, frame, "replaced frame callback");
        }
    }

    /// Remove the handler for `frame`. Returns `true` if one was registered.
    pub fn remove_frame_callback(&self, frame: u64) -> bool {
        self.frames.remove(frame).is_some()
    }

    /// Remove every frame callback.
    pub fn clear_frame_callbacks(&self) {
        let removed = self.frames.clear();
        tracing::debug!(target: targets::FRAME, count = removed.len(), "cleared frame callbacks");
    }

    /// The highest frame any callback has been registered for.
    pub fn highest_frame(&self) -> u64 {
        self.frames.highest_frame()
    }

    /// Number of registered frame callbacks.
    pub fn frame_callback_count(&self) -> usize {
        self.frames.len()
    }

    /// Forward the frame callback registered for `frame`, if any.
    ///
    /// Called by the render loop once per frame. The handler is dispatched
    /// with the null sender and its registration payload as `user_data`.
    pub fn on_frame(&self, frame: u64) -> Result<()> {
        let Some(entry) = self.frames.lookup(frame) else {
            return Ok(());
        };
        tracing::trace!(target: targets::FRAME, frame, "frame callback due");
        let FrameEntry { handler, user_data } = entry;
        self.dispatch(Some(&handler), SenderId::NULL, None, user_data)
    }
}
