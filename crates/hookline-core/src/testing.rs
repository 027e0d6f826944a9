//! Test doubles for hosts and execution tokens.
//!
//! [`MockHost`] is an in-memory object model with explicit reference counts.
//! It records every call and every reported error, and counts releases of
//! objects that hold no references, so tests can assert that each acquired
//! reference is released exactly once. [`RecordingToken`] wraps an
//! [`ExclusiveToken`] and records who holds it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::host::{Host, HostRef, ReturnValue};
use crate::token::{ExclusiveToken, ExecutionToken, TokenGuard};

/// Handle to an object owned by a [`MockHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockObject(u64);

/// The value stored behind a [`MockObject`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    /// The "no value" sentinel.
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    /// A rendered integer sender identity.
    Uuid(u64),
    /// A callable object.
    Callable(MockObject),
}

/// One recorded handler call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The handler that was called.
    pub callable: MockObject,
    /// The arguments it received.
    pub args: Vec<MockValue>,
}

type CallBody = Arc<dyn Fn(&[MockValue]) -> Result<MockValue, String> + Send + Sync>;

struct CallableShape {
    arity: Option<i64>,
    bound: bool,
    body: CallBody,
}

struct Slot {
    value: MockValue,
    refs: i64,
    /// Created by the host itself (rendered senders, call results); these
    /// must all be released by the time a test checks balance.
    transient: bool,
    callable: Option<CallableShape>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    objects: HashMap<MockObject, Slot>,
    calls: Vec<RecordedCall>,
    errors: Vec<String>,
    underflows: usize,
}

const NONE: MockObject = MockObject(0);

/// A reference-counting [`Host`] double.
pub struct MockHost {
    state: Mutex<MockState>,
}

impl MockHost {
    /// Create a host holding only the "no value" sentinel.
    pub fn new() -> Arc<Self> {
        let mut state = MockState {
            next_id: 1,
            ..Default::default()
        };
        state.objects.insert(
            NONE,
            Slot {
                value: MockValue::None,
                refs: 1,
                transient: false,
                callable: None,
            },
        );
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    fn insert(
        &self,
        value: MockValue,
        transient: bool,
        callable: Option<CallableShape>,
    ) -> MockObject {
        let mut state = self.state.lock();
        let object = MockObject(state.next_id);
        state.next_id += 1;
        let value = match value {
            MockValue::Callable(_) => MockValue::Callable(object),
            value => value,
        };
        state.objects.insert(
            object,
            Slot {
                value,
                refs: 1,
                transient,
                callable,
            },
        );
        object
    }

    /// Create a plain object with one reference owned by the caller.
    pub fn value(&self, value: MockValue) -> MockObject {
        self.insert(value, false, None)
    }

    /// Create a plain object and adopt its reference.
    pub fn owned(self: &Arc<Self>, value: MockValue) -> HostRef<Self> {
        HostRef::from_owned(self, self.value(value))
    }

    /// Create a callable declaring `arity` parameters that runs `body`.
    pub fn callable<F>(self: &Arc<Self>, arity: i64, body: F) -> HostRef<Self>
    where
        F: Fn(&[MockValue]) -> Result<MockValue, String> + Send + Sync + 'static,
    {
        self.register_callable(Some(arity), false, Arc::new(body))
    }

    /// Create a callable that returns "no value".
    pub fn handler(self: &Arc<Self>, arity: i64) -> HostRef<Self> {
        self.callable(arity, |_| Ok(MockValue::None))
    }

    /// Create a bound method whose reported arity includes its receiver.
    pub fn bound_method(self: &Arc<Self>, arity: i64) -> HostRef<Self> {
        self.register_callable(Some(arity), true, Arc::new(|_| Ok(MockValue::None)))
    }

    /// Create a callable without introspectable code.
    pub fn opaque_callable(self: &Arc<Self>) -> HostRef<Self> {
        self.register_callable(None, false, Arc::new(|_| Ok(MockValue::None)))
    }

    fn register_callable(
        self: &Arc<Self>,
        arity: Option<i64>,
        bound: bool,
        body: CallBody,
    ) -> HostRef<Self> {
        let shape = CallableShape { arity, bound, body };
        let object = self.insert(MockValue::Callable(NONE), false, Some(shape));
        HostRef::from_owned(self, object)
    }

    /// Current reference count of `object`, or 0 if it was never created.
    pub fn refcount(&self, object: MockObject) -> i64 {
        self.state.lock().objects.get(&object).map_or(0, |slot| slot.refs)
    }

    /// The value stored behind `object`.
    pub fn value_of(&self, object: MockObject) -> MockValue {
        self.state
            .lock()
            .objects
            .get(&object)
            .map_or(MockValue::None, |slot| slot.value.clone())
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Calls made to `callable`, in order.
    pub fn calls_to(&self, callable: MockObject) -> Vec<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.callable == callable)
            .cloned()
            .collect()
    }

    /// Diagnostics passed to [`Host::report_error`].
    pub fn reported_errors(&self) -> Vec<String> {
        self.state.lock().errors.clone()
    }

    /// Releases of objects that held no references (or never existed).
    pub fn underflows(&self) -> usize {
        self.state.lock().underflows
    }

    /// Whether every host-created object has been released, the sentinel is
    /// back to its baseline, and nothing was released twice.
    pub fn is_balanced(&self) -> bool {
        let state = self.state.lock();
        state.underflows == 0
            && state.objects.get(&NONE).map(|slot| slot.refs) == Some(1)
            && state
                .objects
                .values()
                .filter(|slot| slot.transient)
                .all(|slot| slot.refs == 0)
    }
}

impl Host for MockHost {
    type Object = MockObject;
    type Error = String;

    fn incref(&self, object: &MockObject) {
        let mut state = self.state.lock();
        match state.objects.get_mut(object) {
            Some(slot) => slot.refs += 1,
            None => state.underflows += 1,
        }
    }

    fn decref(&self, object: &MockObject) {
        let mut state = self.state.lock();
        match state.objects.get_mut(object) {
            Some(slot) if slot.refs > 0 => slot.refs -= 1,
            _ => state.underflows += 1,
        }
    }

    fn none(&self) -> MockObject {
        NONE
    }

    fn is_callable(&self, object: &MockObject) -> bool {
        self.state
            .lock()
            .objects
            .get(object)
            .is_some_and(|slot| slot.callable.is_some())
    }

    fn arity(&self, callable: &MockObject) -> Option<i64> {
        self.state
            .lock()
            .objects
            .get(callable)
            .and_then(|slot| slot.callable.as_ref())
            .and_then(|shape| shape.arity)
    }

    fn is_bound_method(&self, callable: &MockObject) -> bool {
        self.state
            .lock()
            .objects
            .get(callable)
            .and_then(|slot| slot.callable.as_ref())
            .is_some_and(|shape| shape.bound)
    }

    fn uuid_object(&self, id: u64) -> MockObject {
        self.insert(MockValue::Uuid(id), true, None)
    }

    fn str_object(&self, value: &str) -> MockObject {
        self.insert(MockValue::Str(value.to_owned()), true, None)
    }

    fn call(&self, callable: &MockObject, args: Vec<HostRef<Self>>) -> Result<MockObject, String> {
        let body = self
            .state
            .lock()
            .objects
            .get(callable)
            .and_then(|slot| slot.callable.as_ref())
            .map(|shape| Arc::clone(&shape.body))
            .ok_or_else(|| "object is not callable".to_string())?;

        let values: Vec<MockValue> = args.iter().map(|arg| self.value_of(*arg.get())).collect();
        self.state.lock().calls.push(RecordedCall {
            callable: *callable,
            args: values.clone(),
        });
        // The call owns its arguments; they go away with it.
        drop(args);

        let returned = body(&values)?;
        Ok(self.insert(returned, true, None))
    }

    fn classify(&self, object: &MockObject) -> ReturnValue {
        match self.value_of(*object) {
            MockValue::None => ReturnValue::None,
            MockValue::Bool(value) => ReturnValue::Bool(value),
            MockValue::Int(value) => ReturnValue::Int(value),
            _ => ReturnValue::Other,
        }
    }

    fn report_error(&self, message: &str) {
        self.state.lock().errors.push(message.to_owned());
    }
}

/// An [`ExecutionToken`] that records its state for assertions.
#[derive(Default)]
pub struct RecordingToken {
    inner: ExclusiveToken,
    held: AtomicBool,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
}

impl RecordingToken {
    /// Create an unheld token.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether some context holds the token right now.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Total successful acquisitions.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::Acquire)
    }

    /// Total releases.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Acquire)
    }

    /// Try to take the token from another context, giving up after `timeout`.
    ///
    /// The token is held until the returned guard is dropped.
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<TokenGuard<'_>> {
        if !self.inner.try_lock_for(timeout) {
            return None;
        }
        self.held.store(true, Ordering::Release);
        self.acquisitions.fetch_add(1, Ordering::AcqRel);
        // SAFETY: the inner lock was just taken by this context.
        Some(unsafe { TokenGuard::adopt(self) })
    }
}

impl ExecutionToken for RecordingToken {
    fn acquire(&self) {
        self.inner.acquire();
        self.held.store(true, Ordering::Release);
        self.acquisitions.fetch_add(1, Ordering::AcqRel);
    }

    unsafe fn release(&self) {
        self.held.store(false, Ordering::Release);
        self.releases.fetch_add(1, Ordering::AcqRel);
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.inner.release() }
    }
}
