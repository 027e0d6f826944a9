//! Arity-shaped handler invocation.
//!
//! Handlers are free to declare fewer parameters than Hookline could pass.
//! The invoker asks the host how many positional parameters a handler takes
//! and builds exactly that many arguments:
//!
//! | arity | arguments |
//! |---|---|
//! | 0 | none |
//! | 1 | `sender` |
//! | 2 | `sender, app_data` |
//! | 3+ | `sender, app_data, user_data`, then "no value" padding |
//!
//! A bound method's receiver is counted by the host but never passed, so it
//! is subtracted first. Handler failures of any kind are reported through
//! [`Host::report_error`], logged, and swallowed.

use std::sync::Arc;

use crate::error::{CallbackError, Result};
use crate::host::{Host, HostRef, SenderId};
use crate::logging::{span_names, targets};

/// Build the positional argument list for a handler of the given arity.
///
/// `sender` is only rendered when at least one slot needs it. Payloads that do
/// not fit are dropped here, which releases them.
pub fn build_arguments<T>(
    arity: usize,
    sender: impl FnOnce() -> T,
    app_data: T,
    user_data: T,
    mut padding: impl FnMut() -> T,
) -> Vec<T> {
    let mut args = Vec::with_capacity(arity);
    if arity == 0 {
        return args;
    }

    args.push(sender());
    if arity >= 2 {
        args.push(app_data);
    }
    if arity >= 3 {
        args.push(user_data);
    }
    while args.len() < arity {
        args.push(padding());
    }
    args
}

/// Calls handlers on the current execution context.
///
/// The caller is responsible for holding the execution token.
pub struct CallbackInvoker<H: Host> {
    host: Arc<H>,
}

impl<H: Host> Clone for CallbackInvoker<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
        }
    }
}

impl<H: Host> CallbackInvoker<H> {
    /// Create an invoker for `host`.
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    /// The host handlers are called through.
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Call `handler` once with arguments shaped by its arity.
    ///
    /// An absent handler is a no-op. Absent payloads are passed as the host's
    /// "no value" sentinel.
    pub fn invoke(
        &self,
        handler: Option<&HostRef<H>>,
        sender: &SenderId,
        app_data: Option<HostRef<H>>,
        user_data: Option<HostRef<H>>,
    ) {
        let Some(handler) = handler else {
            return;
        };

        if let Err(err) = self.try_invoke(handler, sender, app_data, user_data) {
            tracing::warn!(target: targets::INVOKE, %sender, error = %err, "callback failed");
            self.report(&err);
        }
    }

    fn try_invoke(
        &self,
        handler: &HostRef<H>,
        sender: &SenderId,
        app_data: Option<HostRef<H>>,
        user_data: Option<HostRef<H>>,
    ) -> Result<()> {
        if !self.host.is_callable(handler.get()) {
            return Err(CallbackError::NotCallable("callback"));
        }

        let app_data = app_data.unwrap_or_else(|| HostRef::none(&self.host));
        let user_data = user_data.unwrap_or_else(|| HostRef::none(&self.host));
        let arity = self.effective_arity(handler)?;

        let args = build_arguments(
            arity,
            || sender.to_host_ref(&self.host),
            app_data,
            user_data,
            || HostRef::none(&self.host),
        );

        tracing::trace!(target: targets::INVOKE, %sender, arity, "invoking callback");
        let result = self
            .host
            .call(handler.get(), args)
            .map_err(|err| CallbackError::CallFailed(err.to_string()))?;
        drop(HostRef::from_owned(&self.host, result));
        Ok(())
    }

    /// Ask `handler` whether a close should proceed.
    ///
    /// Fails open: an absent, uncallable, or raising handler allows the close.
    /// A handler declaring at least one parameter receives `user_data`.
    pub fn should_close(
        &self,
        handler: Option<&HostRef<H>>,
        user_data: Option<HostRef<H>>,
    ) -> bool {
        let Some(handler) = handler else {
            return true;
        };

        let _span =
            tracing::debug_span!(target: targets::CLOSE, span_names::SHOULD_CLOSE).entered();
        match self.try_should_close(handler, user_data) {
            Ok(should_close) => {
                tracing::debug!(target: targets::CLOSE, should_close, "close callback answered");
                should_close
            }
            Err(err) => {
                tracing::warn!(
                    target: targets::CLOSE,
                    error = %err,
                    "close callback failed, allowing close"
                );
                self.report(&err);
                true
            }
        }
    }

    fn try_should_close(
        &self,
        handler: &HostRef<H>,
        user_data: Option<HostRef<H>>,
    ) -> Result<bool> {
        if !self.host.is_callable(handler.get()) {
            return Err(CallbackError::NotCallable("close callback"));
        }

        let user_data = user_data.unwrap_or_else(|| HostRef::none(&self.host));
        let args = if self.effective_arity(handler)? >= 1 {
            vec![user_data]
        } else {
            Vec::new()
        };

        let result = self
            .host
            .call(handler.get(), args)
            .map_err(|err| CallbackError::CallFailed(err.to_string()))?;
        let result = HostRef::from_owned(&self.host, result);
        Ok(self.host.classify(result.get()).allows_close())
    }

    fn effective_arity(&self, handler: &HostRef<H>) -> Result<usize> {
        let declared = self
            .host
            .arity(handler.get())
            .ok_or(CallbackError::ArityUnavailable)?;
        let declared = if self.host.is_bound_method(handler.get()) {
            declared.saturating_sub(1)
        } else {
            declared
        };
        Ok(usize::try_from(declared).unwrap_or(0))
    }

    /// Forward a failure to the host's error channel. Handlers without
    /// introspectable code are only logged.
    fn report(&self, err: &CallbackError) {
        if !matches!(err, CallbackError::ArityUnavailable) {
            self.host.report_error(&err.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockHost, MockValue};
    use parking_lot::Mutex;
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Collects the target of every event it sees.
    #[derive(Clone, Default)]
    struct TargetRecorder(Arc<Mutex<Vec<String>>>);

    impl<S: Subscriber> Layer<S> for TargetRecorder {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().push(event.metadata().target().to_owned());
        }
    }

    fn recorded_targets(f: impl FnOnce()) -> Vec<String> {
        let recorder = TargetRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        tracing::subscriber::with_default(subscriber, f);
        let targets = recorder.0.lock().clone();
        targets
    }

    fn sentinel_args(arity: usize) -> Vec<&'static str> {
        build_arguments(arity, || "sender", "app", "user", || "none")
    }

    #[test]
    fn test_argument_table() {
        assert!(sentinel_args(0).is_empty());
        assert_eq!(sentinel_args(1), vec!["sender"]);
        assert_eq!(sentinel_args(2), vec!["sender", "app"]);
        assert_eq!(sentinel_args(3), vec!["sender", "app", "user"]);
        assert_eq!(sentinel_args(5), vec!["sender", "app", "user", "none", "none"]);
    }

    #[test]
    fn test_argument_length_matches_arity() {
        for arity in 0..10 {
            let args = sentinel_args(arity);
            assert_eq!(args.len(), arity);
            let prefix = ["sender", "app", "user"];
            let shared = arity.min(3);
            assert_eq!(&args[..shared], &prefix[..shared]);
            assert!(args[shared..].iter().all(|slot| *slot == "none"));
        }
    }

    #[test]
    fn test_sender_not_rendered_for_zero_arity() {
        let mut rendered = false;
        let args = build_arguments(0, || rendered = true, (), (), || ());
        assert!(args.is_empty());
        assert!(!rendered);
    }

    #[test]
    fn test_invoke_passes_arguments_by_arity() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());

        for arity in 0..6usize {
            let handler = host.handler(arity as i64);
            let app = host.owned(MockValue::Int(1));
            let user = host.owned(MockValue::Str("user".into()));

            invoker.invoke(Some(&handler), &SenderId::Uuid(9), Some(app), Some(user));

            let calls = host.calls_to(*handler.get());
            assert_eq!(calls.len(), 1);
            let expected: Vec<MockValue> = [
                MockValue::Uuid(9),
                MockValue::Int(1),
                MockValue::Str("user".into()),
            ]
            .into_iter()
            .chain(std::iter::repeat(MockValue::None))
            .take(arity)
            .collect();
            assert_eq!(calls[0].args, expected);
        }
        assert_eq!(host.underflows(), 0);
    }

    #[test]
    fn test_alias_sender_rendered_as_string() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let handler = host.handler(1);

        invoker.invoke(Some(&handler), &SenderId::from("save_button"), None, None);

        let calls = host.calls_to(*handler.get());
        assert_eq!(calls[0].args, vec![MockValue::Str("save_button".into())]);
    }

    #[test]
    fn test_bound_method_drops_receiver_slot() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let method = host.bound_method(3);

        invoker.invoke(Some(&method), &SenderId::Uuid(4), None, None);

        let calls = host.calls_to(*method.get());
        assert_eq!(calls[0].args, vec![MockValue::Uuid(4), MockValue::None]);
    }

    #[test]
    fn test_absent_payloads_become_none() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let handler = host.handler(3);

        invoker.invoke(Some(&handler), &SenderId::NULL, None, None);

        let calls = host.calls_to(*handler.get());
        assert_eq!(
            calls[0].args,
            vec![MockValue::Uuid(0), MockValue::None, MockValue::None]
        );
        assert!(host.is_balanced());
    }

    #[test]
    fn test_absent_handler_is_noop() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let app = host.owned(MockValue::Int(5));
        let raw = *app.get();

        invoker.invoke(None, &SenderId::NULL, Some(app), None);

        assert!(host.calls().is_empty());
        assert!(host.reported_errors().is_empty());
        assert_eq!(host.refcount(raw), 0);
    }

    #[test]
    fn test_uncallable_handler_reports_and_releases() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let handler = host.owned(MockValue::Int(12));
        let app = host.owned(MockValue::Int(1));
        let user = host.owned(MockValue::Int(2));
        let (app_raw, user_raw) = (*app.get(), *user.get());

        invoker.invoke(Some(&handler), &SenderId::Uuid(1), Some(app), Some(user));

        assert_eq!(host.reported_errors(), vec!["callback not callable".to_string()]);
        assert_eq!(host.refcount(app_raw), 0);
        assert_eq!(host.refcount(user_raw), 0);
    }

    #[test]
    fn test_raising_handler_is_swallowed() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let handler = host.callable(3, |_| Err("ValueError: bad input".into()));
        let app = host.owned(MockValue::Int(1));
        let app_raw = *app.get();

        invoker.invoke(Some(&handler), &SenderId::Uuid(2), Some(app), None);

        assert_eq!(
            host.reported_errors(),
            vec!["handler call failed: ValueError: bad input".to_string()]
        );
        assert_eq!(host.refcount(app_raw), 0);
        assert!(host.is_balanced());
    }

    #[test]
    fn test_handler_without_code_is_skipped() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let handler = host.opaque_callable();
        let user = host.owned(MockValue::Int(2));
        let user_raw = *user.get();

        invoker.invoke(Some(&handler), &SenderId::Uuid(2), None, Some(user));

        assert!(host.calls().is_empty());
        assert!(host.reported_errors().is_empty());
        assert_eq!(host.refcount(user_raw), 0);
    }

    #[test]
    fn test_bound_method_with_extreme_arity() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let handler = host.bound_method(i64::MIN);

        invoker.invoke(Some(&handler), &SenderId::Uuid(1), None, None);
        assert!(invoker.should_close(Some(&handler), None));

        let calls = host.calls_to(*handler.get());
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|call| call.args.is_empty()));
        assert!(host.is_balanced());
    }

    #[test]
    fn test_failures_log_under_their_own_target() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let raising = host.callable(1, |_| Err("RuntimeError".into()));

        let invoke_targets = recorded_targets(|| {
            invoker.invoke(Some(&raising), &SenderId::Uuid(1), None, None);
        });
        let close_targets = recorded_targets(|| {
            assert!(invoker.should_close(Some(&raising), None));
        });

        assert!(invoke_targets.iter().any(|target| target == targets::INVOKE));
        assert!(!invoke_targets.iter().any(|target| target == targets::CLOSE));
        assert!(close_targets.iter().any(|target| target == targets::CLOSE));
        assert!(!close_targets.iter().any(|target| target == targets::INVOKE));
    }

    #[test]
    fn test_should_close_without_handler() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let user = host.owned(MockValue::Int(2));
        let user_raw = *user.get();

        assert!(invoker.should_close(None, Some(user)));
        assert!(host.calls().is_empty());
        assert_eq!(host.refcount(user_raw), 0);
    }

    #[test]
    fn test_should_close_interprets_return_values() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());

        let cases = [
            (MockValue::Int(0), false),
            (MockValue::Int(7), true),
            (MockValue::Bool(false), false),
            (MockValue::Bool(true), true),
            (MockValue::None, true),
            (MockValue::Str("no".into()), true),
        ];
        for (returned, expected) in cases {
            let handler = host.callable(1, move |_| Ok(returned.clone()));
            assert_eq!(invoker.should_close(Some(&handler), None), expected);
        }
        assert!(host.is_balanced());
    }

    #[test]
    fn test_should_close_passes_user_data_by_arity() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let with_arg = host.callable(2, |_| Ok(MockValue::Bool(true)));
        let without_arg = host.callable(0, |_| Ok(MockValue::Bool(true)));
        let user = host.owned(MockValue::Str("doc".into()));
        let user_raw = *user.get();

        invoker.should_close(Some(&with_arg), Some(user.clone()));
        invoker.should_close(Some(&without_arg), Some(user.clone()));

        assert_eq!(host.calls_to(*with_arg.get())[0].args, vec![MockValue::Str("doc".into())]);
        assert!(host.calls_to(*without_arg.get())[0].args.is_empty());
        assert_eq!(host.refcount(user_raw), 1);
    }

    #[test]
    fn test_should_close_fails_open() {
        let host = MockHost::new();
        let invoker = CallbackInvoker::new(host.clone());
        let raising = host.callable(1, |_| Err("RuntimeError".into()));
        let uncallable = host.owned(MockValue::Int(3));

        assert!(invoker.should_close(Some(&raising), None));
        assert!(invoker.should_close(Some(&uncallable), None));
        assert_eq!(
            host.reported_errors(),
            vec![
                "handler call failed: RuntimeError".to_string(),
                "close callback not callable".to_string(),
            ]
        );
        assert!(host.is_balanced());
    }
}
