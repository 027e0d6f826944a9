//! Configuration for the callback registry.

use std::sync::Arc;

use crate::host::Host;
use crate::registry::CallbackRegistry;
use crate::token::ExecutionToken;

/// Default ceiling on queued plus in-flight callback calls.
pub const DEFAULT_MAX_PENDING_CALLS: usize = 50;

/// Configuration for creating a [`CallbackRegistry`].
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Ceiling on queued plus in-flight calls. Dispatches beyond it are dropped.
    pub max_pending_calls: usize,
    /// Queue dispatched callbacks for an external pump instead of the
    /// execution loop.
    pub manual_callbacks: bool,
    /// Name for the execution loop thread.
    pub thread_name: String,
    /// Stack size for the execution loop thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            max_pending_calls: DEFAULT_MAX_PENDING_CALLS,
            manual_callbacks: false,
            thread_name: "hookline-callbacks".to_string(),
            stack_size: None,
        }
    }
}

impl CallbackConfig {
    /// Create a configuration with manual callback mode enabled.
    pub fn manual() -> Self {
        Self {
            manual_callbacks: true,
            ..Default::default()
        }
    }
}

/// Builder for creating a [`CallbackRegistry`] with custom configuration.
#[derive(Debug, Default)]
pub struct CallbackConfigBuilder {
    config: CallbackConfig,
}

impl CallbackConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pending-call ceiling.
    pub fn max_pending_calls(mut self, limit: usize) -> Self {
        self.config.max_pending_calls = limit;
        self
    }

    /// Enable or disable manual callback mode.
    pub fn manual_callbacks(mut self, enabled: bool) -> Self {
        self.config.manual_callbacks = enabled;
        self
    }

    /// Set the execution loop thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Set the execution loop thread stack size.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Finish and return the configuration.
    pub fn config(self) -> CallbackConfig {
        self.config
    }

    /// Build a registry for `host` guarded by `token`.
    pub fn build<H: Host>(
        self,
        host: Arc<H>,
        token: Arc<dyn ExecutionToken>,
    ) -> CallbackRegistry<H> {
        CallbackRegistry::with_config(host, token, self.config)
    }
}
