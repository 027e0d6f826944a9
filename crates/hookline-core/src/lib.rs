//! Core systems for Hookline.
//!
//! Hookline decouples a real-time render/event loop from user-supplied
//! handlers living in an embedded, reference-counted scripting runtime:
//!
//! - **Host**: the capability surface of the embedded object model and the
//!   RAII [`HostRef`] that owns one strong reference
//! - **Execution Token**: the single lock handler code runs under
//! - **Job Queue**: blocking FIFO between producers and the execution loop
//! - **Invoker**: shapes call arguments by each handler's declared arity
//! - **Registry**: dispatch, manual callback mode, frame callbacks, and
//!   close confirmation
//! - **Execution Loop**: the dedicated context that runs queued callbacks
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hookline_core::testing::{MockHost, MockValue, RecordingToken};
//! use hookline_core::CallbackRegistry;
//!
//! let host = MockHost::new();
//! let registry = Arc::new(CallbackRegistry::new(host.clone(), RecordingToken::new()));
//! let handle = registry.spawn_execution_loop()?;
//!
//! // A handler declaring (sender, app_data)
//! let handler = host.handler(2);
//! let app_data = host.owned(MockValue::Int(42));
//! registry.dispatch(Some(&handler), "apply_button", Some(app_data), None)?;
//!
//! handle.stop_and_join();
//! assert_eq!(
//!     host.calls()[0].args,
//!     vec![MockValue::Str("apply_button".into()), MockValue::Int(42)]
//! );
//! # Ok::<(), hookline_core::CallbackError>(())
//! ```

mod config;
mod error;
mod execution;
mod frame;
pub mod host;
pub mod invoker;
pub mod logging;
pub mod queue;
mod registry;
mod task;
pub mod testing;
pub mod token;

pub use config::{CallbackConfig, CallbackConfigBuilder, DEFAULT_MAX_PENDING_CALLS};
pub use error::{CallbackError, Result};
pub use execution::LoopHandle;
pub use frame::FrameEntry;
pub use host::{Host, HostRef, ReturnValue, SenderId};
pub use invoker::{CallbackInvoker, build_arguments};
pub use queue::{Job, JobQueue};
pub use registry::{CallbackJob, CallbackRegistry};
pub use task::TaskHandle;
pub use token::{ExclusiveToken, ExecutionToken, TokenGuard};

static_assertions::assert_impl_all!(CallbackRegistry<testing::MockHost>: Send, Sync);
static_assertions::assert_impl_all!(CallbackJob<testing::MockHost>: Send);
static_assertions::assert_impl_all!(JobQueue: Send, Sync);
static_assertions::assert_impl_all!(ExclusiveToken: Send, Sync);
