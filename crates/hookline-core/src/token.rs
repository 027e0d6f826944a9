//! The execution token: one context runs handler code at a time.
//!
//! Embedded runtimes with a global interpreter lock allow handler code to run
//! on only one native thread at a time. The [`ExecutionToken`] trait models
//! that lock. Hookline only takes it through scoped wrappers:
//!
//! - [`TokenGuard`] holds the token for its lifetime.
//! - [`TokenGuard::unlocked`] gives the token up for the duration of a closure
//!   and takes it back afterwards, even if the closure panics. The execution
//!   loop blocks on its job queue inside this region so that idle waiting never
//!   starves producer threads that also need the token.
//!
//! # Example
//!
//! ```
//! use hookline_core::token::{ExclusiveToken, TokenGuard};
//!
//! let token = ExclusiveToken::new();
//! let mut guard = TokenGuard::acquire(&token);
//! assert!(token.is_held());
//!
//! guard.unlocked(|| assert!(!token.is_held()));
//! assert!(token.is_held());
//!
//! drop(guard);
//! assert!(!token.is_held());
//! ```

use std::time::Duration;

use parking_lot::lock_api::{RawMutex as _, RawMutexTimed as _};

/// A process-wide mutual-exclusion capability for running handler code.
///
/// Callers take the token through [`TokenGuard`], which pairs every release
/// with a prior acquire.
pub trait ExecutionToken: Send + Sync {
    /// Block until the token is held by the calling context.
    fn acquire(&self);

    /// Give the token up.
    ///
    /// # Safety
    ///
    /// The calling context must currently hold the token, acquired through
    /// [`acquire`](Self::acquire) or an implementation's own try-acquire.
    unsafe fn release(&self);
}

/// Holds an [`ExecutionToken`] until dropped.
#[must_use = "the token is released as soon as the guard is dropped"]
pub struct TokenGuard<'a> {
    token: &'a dyn ExecutionToken,
}

impl<'a> TokenGuard<'a> {
    /// Acquire `token`, blocking until it is available.
    pub fn acquire(token: &'a dyn ExecutionToken) -> Self {
        token.acquire();
        Self { token }
    }

    /// Wrap a token the calling context already holds.
    ///
    /// # Safety
    ///
    /// `token` must be held by the calling context and not owned by another
    /// guard.
    pub(crate) unsafe fn adopt(token: &'a dyn ExecutionToken) -> Self {
        Self { token }
    }

    /// Run `f` with the token released, then re-acquire it.
    pub fn unlocked<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let _released = TokenRelease::new(self.token);
        f()
    }
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: a guard exists only while its token is held.
        unsafe { self.token.release() }
    }
}

/// The inverse of [`TokenGuard`]: released on creation, re-acquired on drop.
struct TokenRelease<'a> {
    token: &'a dyn ExecutionToken,
}

impl<'a> TokenRelease<'a> {
    fn new(token: &'a dyn ExecutionToken) -> Self {
        // SAFETY: only built from `TokenGuard::unlocked`, whose guard holds
        // the token and cannot be used until this value is dropped.
        unsafe { token.release() };
        Self { token }
    }
}

impl Drop for TokenRelease<'_> {
    fn drop(&mut self) {
        self.token.acquire();
    }
}

/// An [`ExecutionToken`] backed by a raw `parking_lot` mutex.
///
/// Unlike a `Mutex<()>` guard, the raw mutex can be released and re-acquired
/// around a blocking wait without threading a guard value through the loop.
pub struct ExclusiveToken {
    raw: parking_lot::RawMutex,
}

impl ExclusiveToken {
    /// Create an unheld token.
    pub const fn new() -> Self {
        Self {
            raw: parking_lot::RawMutex::INIT,
        }
    }

    /// Try to acquire the token, giving up after `timeout`.
    ///
    /// The token is held until the returned guard is dropped.
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<TokenGuard<'_>> {
        if self.try_lock_for(timeout) {
            // SAFETY: the lock was just taken by this context.
            Some(unsafe { TokenGuard::adopt(self) })
        } else {
            None
        }
    }

    pub(crate) fn try_lock_for(&self, timeout: Duration) -> bool {
        self.raw.try_lock_for(timeout)
    }

    /// Whether any context currently holds the token.
    pub fn is_held(&self) -> bool {
        self.raw.is_locked()
    }
}

impl Default for ExclusiveToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionToken for ExclusiveToken {
    fn acquire(&self) {
        self.raw.lock();
    }

    unsafe fn release(&self) {
        // SAFETY: the caller holds the lock.
        unsafe { self.raw.unlock() }
    }
}
