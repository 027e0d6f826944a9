//! The embedded object model, seen from the dispatch core.
//!
//! Handlers and their payloads live in a foreign, reference-counted object
//! model (a scripting runtime embedded in the application). Hookline never
//! looks inside those objects; everything it needs is expressed by the
//! [`Host`] trait, and every strong reference it holds is a [`HostRef`].
//!
//! # Reference ownership
//!
//! A [`HostRef`] owns exactly one strong reference:
//!
//! - [`HostRef::new`] acquires a reference on a borrowed object.
//! - [`HostRef::from_owned`] adopts a reference the caller already owns.
//! - `Clone` acquires another reference.
//! - `Drop` releases it.
//! - [`HostRef::into_raw`] hands the reference to the host without releasing
//!   it, for APIs that steal references.
//!
//! Because release happens in `Drop`, every early return and error path in
//! the dispatcher and invoker releases what it holds.

use std::fmt;
use std::sync::Arc;

/// The capability surface of an embedded object model.
///
/// Implementations wrap a concrete runtime (and its handle type) so that the
/// dispatch logic stays independent of it. All methods may be called from the
/// producer contexts as well as from the callback execution loop; methods that
/// touch handler code ([`Host::call`], [`Host::classify`]) are only called
/// while the execution token is held.
pub trait Host: Sized + Send + Sync + 'static {
    /// A borrowed handle to a foreign object.
    type Object: Clone + Send + 'static;

    /// The error produced when a handler call raises.
    type Error: fmt::Display;

    /// Acquire one strong reference to `object`.
    fn incref(&self, object: &Self::Object);

    /// Release one strong reference to `object`.
    fn decref(&self, object: &Self::Object);

    /// The canonical "no value" sentinel, borrowed.
    fn none(&self) -> Self::Object;

    /// Whether `object` can be called.
    fn is_callable(&self, object: &Self::Object) -> bool;

    /// Number of positional parameters `callable` declares.
    ///
    /// Returns `None` when the callable exposes no introspectable code.
    fn arity(&self, callable: &Self::Object) -> Option<i64>;

    /// Whether `callable` is a method bound to a receiver. The receiver is
    /// counted by [`Host::arity`] but never passed explicitly.
    fn is_bound_method(&self, callable: &Self::Object) -> bool;

    /// Render an integer sender identity. Returns a new reference.
    fn uuid_object(&self, id: u64) -> Self::Object;

    /// Render a string sender identity. Returns a new reference.
    fn str_object(&self, value: &str) -> Self::Object;

    /// Call `callable` with positional `args`.
    ///
    /// The argument references are stolen by the call. On success the result
    /// is a new reference owned by the caller.
    fn call(
        &self,
        callable: &Self::Object,
        args: Vec<HostRef<Self>>,
    ) -> Result<Self::Object, Self::Error>;

    /// Classify a value returned from a handler.
    fn classify(&self, object: &Self::Object) -> ReturnValue;

    /// Surface a non-fatal diagnostic to the embedded runtime's user.
    fn report_error(&self, message: &str);
}

/// The shape of a handler's return value, as far as Hookline cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    /// The "no value" sentinel.
    None,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// Anything else.
    Other,
}

impl ReturnValue {
    /// Interpret the value as a close-confirmation answer.
    ///
    /// Booleans are taken as-is, integers are `true` when nonzero, and
    /// everything else allows the close.
    pub fn allows_close(self) -> bool {
        match self {
            Self::Bool(value) => value,
            Self::Int(value) => value != 0,
            Self::None | Self::Other => true,
        }
    }
}

/// A strong reference to a foreign object.
pub struct HostRef<H: Host> {
    host: Arc<H>,
    /// `None` only after the reference has been handed off by `into_raw`.
    object: Option<H::Object>,
}

impl<H: Host> HostRef<H> {
    /// Acquire a new strong reference to a borrowed object.
    pub fn new(host: &Arc<H>, object: &H::Object) -> Self {
        host.incref(object);
        Self {
            host: Arc::clone(host),
            object: Some(object.clone()),
        }
    }

    /// Adopt a reference the caller already owns.
    pub fn from_owned(host: &Arc<H>, object: H::Object) -> Self {
        Self {
            host: Arc::clone(host),
            object: Some(object),
        }
    }

    /// A new reference to the host's "no value" sentinel.
    pub fn none(host: &Arc<H>) -> Self {
        let none = host.none();
        Self::new(host, &none)
    }

    /// The referenced object.
    pub fn get(&self) -> &H::Object {
        match &self.object {
            Some(object) => object,
            None => unreachable!("HostRef accessed after its reference was transferred"),
        }
    }

    /// The host this reference belongs to.
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Transfer the reference out without releasing it.
    pub fn into_raw(mut self) -> H::Object {
        match self.object.take() {
            Some(object) => object,
            None => unreachable!("HostRef transferred twice"),
        }
    }
}

impl<H: Host> Clone for HostRef<H> {
    fn clone(&self) -> Self {
        Self::new(&self.host, self.get())
    }
}

impl<H: Host> Drop for HostRef<H> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.host.decref(&object);
        }
    }
}

impl<H: Host> fmt::Debug for HostRef<H>
where
    H::Object: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostRef").field(&self.object).finish()
    }
}

/// Identity of the entity that fired a callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SenderId {
    /// An integer item identity.
    Uuid(u64),
    /// A string alias.
    Alias(String),
}

impl SenderId {
    /// The absent sender.
    pub const NULL: SenderId = SenderId::Uuid(0);

    /// Render the sender as a new host reference.
    pub fn to_host_ref<H: Host>(&self, host: &Arc<H>) -> HostRef<H> {
        let object = match self {
            Self::Uuid(id) => host.uuid_object(*id),
            Self::Alias(alias) => host.str_object(alias),
        };
        HostRef::from_owned(host, object)
    }
}

impl Default for SenderId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(id) => write!(f, "{id}"),
            Self::Alias(alias) => write!(f, "{alias:?}"),
        }
    }
}

impl From<u64> for SenderId {
    fn from(id: u64) -> Self {
        Self::Uuid(id)
    }
}

impl From<&str> for SenderId {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_owned())
    }
}

impl From<String> for SenderId {
    fn from(alias: String) -> Self {
        Self::Alias(alias)
    }
}
