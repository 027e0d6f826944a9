//! Logging facilities for Hookline.
//!
//! Hookline uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. To see logs, install one in the embedding application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("hookline_core::dispatch=debug,hookline_core=warn")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Dispatcher: delivery mode selection and backpressure.
    pub const DISPATCH: &str = "hookline_core::dispatch";
    /// Invoker: argument shaping and handler failures.
    pub const INVOKE: &str = "hookline_core::invoke";
    /// Callback execution loop and generic task draining.
    pub const EXECUTION_LOOP: &str = "hookline_core::execution_loop";
    /// Frame callback scheduler.
    pub const FRAME: &str = "hookline_core::frame";
    /// Close-confirmation queries.
    pub const CLOSE: &str = "hookline_core::close";
}

/// Span names used throughout Hookline for tracing.
pub mod span_names {
    /// The execution loop, for as long as it runs.
    pub const EXECUTION_LOOP: &str = "hookline::execution_loop";
    /// One iteration of the execution loop running a callback job.
    pub const CALLBACK_JOB: &str = "hookline::callback_job";
    /// A synchronous close-confirmation query.
    pub const SHOULD_CLOSE: &str = "hookline::should_close";
}
