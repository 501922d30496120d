//! Logger listeners
//!
//! Listeners that turn intercepted calls into entries and hand them to an
//! [`EntryDispatcher`].

use std::sync::Arc;

use crate::dispatcher::{CorrelationId, EntryDispatcher};
use crate::entry::{MessageEntry, MethodCallEntry, ObjectEntry, StackTraceElementEntry, ThrowableEntry};
use crate::error::Result;
use crate::preference::{GeneralPreference, GeneralPreferenceEvaluator, PreferenceKey};
use crate::proxy::{InterceptorEvent, MethodListener, MethodPattern, ProxyFactory};

/// Last path segment of a Rust type name, `io::Error` style paths included.
pub(crate) fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// Build a method call entry from a completed call.
pub(crate) fn method_call_entry(event: &InterceptorEvent<'_>, stack_trace: bool) -> MethodCallEntry {
    let mut entry = MethodCallEntry::new(event.method().signature())
        .with_arguments(event.arguments())
        .with_elapse_time(event.elapse_time().clone());

    if let Some(value) = event.returned() {
        entry = entry.with_returned_value(ObjectEntry::from_captured(value));
    }
    if let Some(error) = event.error() {
        let mut throwable = ThrowableEntry::capture(error);
        throwable.type_name = event.error_type_name().map(str::to_string);
        entry = entry.with_exception(throwable);
    }
    if stack_trace {
        entry = entry.with_caller_stack_trace(StackTraceElementEntry::capture_current());
    }
    entry
}

/// Logs each call as a message named after the method, with elapsed time.
///
/// A failed call is logged as `method:ErrorType`.
pub struct SimpleMethodLoggerListener {
    dispatcher: Arc<dyn EntryDispatcher>,
    correlation: CorrelationId,
    preference_key: &'static str,
}

impl SimpleMethodLoggerListener {
    pub fn new(
        dispatcher: Arc<dyn EntryDispatcher>,
        correlation: CorrelationId,
        preference_key: impl PreferenceKey,
    ) -> Self {
        Self {
            dispatcher,
            correlation,
            preference_key: preference_key.property_name(),
        }
    }
}

impl MethodListener for SimpleMethodLoggerListener {
    fn after_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
        let entry = MessageEntry::with_elapse_time(event.method().name(), event.elapse_time().clone());
        self.dispatcher
            .forward(self.preference_key, &self.correlation, entry.into());
        Ok(())
    }

    fn exception_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
        let error_type = event.error_type_name().map(short_type_name).unwrap_or("Error");
        let entry = MessageEntry::with_elapse_time(
            format!("{}:{}", event.method().name(), error_type),
            event.elapse_time().clone(),
        );
        self.dispatcher
            .forward(self.preference_key, &self.correlation, entry.into());
        Ok(())
    }
}

/// Logs each call as a full [`MethodCallEntry`].
pub struct MethodCallLoggerListener {
    dispatcher: Arc<dyn EntryDispatcher>,
    correlation: CorrelationId,
    preference_key: &'static str,
    stack_trace: bool,
}

impl MethodCallLoggerListener {
    pub fn new(
        dispatcher: Arc<dyn EntryDispatcher>,
        correlation: CorrelationId,
        preference_key: impl PreferenceKey,
    ) -> Self {
        Self {
            dispatcher,
            correlation,
            preference_key: preference_key.property_name(),
            stack_trace: false,
        }
    }

    /// Also record the caller's stack on every entry.
    pub fn with_stack_trace(mut self, enabled: bool) -> Self {
        self.stack_trace = enabled;
        self
    }

    fn forward(&self, event: &InterceptorEvent<'_>) {
        let entry = method_call_entry(event, self.stack_trace);
        self.dispatcher
            .forward(self.preference_key, &self.correlation, entry.into());
    }
}

impl MethodListener for MethodCallLoggerListener {
    fn after_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
        self.forward(event);
        Ok(())
    }

    fn exception_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
        self.forward(event);
        Ok(())
    }
}

/// Builds proxy factories whose listeners follow the caller's preferences.
///
/// Gating happens once, when the factory is built: a disabled preference
/// means no listener is attached and intercepted calls pay only the pattern
/// check.
#[derive(Clone)]
pub struct LoggerProxyFactory {
    dispatcher: Arc<dyn EntryDispatcher>,
    correlation: CorrelationId,
    evaluator: GeneralPreferenceEvaluator,
}

impl LoggerProxyFactory {
    pub fn new(
        dispatcher: Arc<dyn EntryDispatcher>,
        correlation: CorrelationId,
        evaluator: GeneralPreferenceEvaluator,
    ) -> Self {
        Self {
            dispatcher,
            correlation,
            evaluator,
        }
    }

    pub fn dispatcher(&self) -> &Arc<dyn EntryDispatcher> {
        &self.dispatcher
    }

    pub fn correlation(&self) -> &CorrelationId {
        &self.correlation
    }

    pub fn evaluator(&self) -> &GeneralPreferenceEvaluator {
        &self.evaluator
    }

    /// Factory that logs calls matching `pattern` as method call entries when
    /// general method call logging is enabled.
    pub fn method_call_factory(&self, pattern: MethodPattern) -> ProxyFactory {
        let mut factory = ProxyFactory::new();
        if self.evaluator.is_method_call_enabled() {
            let listener = MethodCallLoggerListener::new(
                Arc::clone(&self.dispatcher),
                self.correlation.clone(),
                GeneralPreference::MethodCallEnabled,
            )
            .with_stack_trace(self.evaluator.is_stack_trace_enabled());
            factory.add_method_listener(pattern, Arc::new(listener));
        }
        factory
    }

    /// Factory that logs calls matching `pattern` as simple messages when
    /// `key` is enabled.
    pub fn simple_factory(&self, pattern: MethodPattern, key: impl PreferenceKey) -> ProxyFactory {
        let mut factory = ProxyFactory::new();
        if self.evaluator.is_enabled(key.property_name()) {
            let listener =
                SimpleMethodLoggerListener::new(Arc::clone(&self.dispatcher), self.correlation.clone(), key);
            factory.add_method_listener(pattern, Arc::new(listener));
        }
        factory
    }
}

impl std::fmt::Debug for LoggerProxyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerProxyFactory")
            .field("correlation", &self.correlation)
            .field("evaluator", &self.evaluator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::InMemoryEntryDispatcher;
    use crate::entry::Entry;
    use crate::preference::Preferences;
    use crate::proxy::{Method, Proxy};

    #[derive(Debug, thiserror::Error)]
    enum StoreError {
        #[error("disk full")]
        Full(#[source] std::io::Error),
    }

    trait Store {
        fn put(&self, key: &str, value: i64) -> std::result::Result<bool, StoreError>;
    }

    #[derive(Debug)]
    struct FullStore;

    impl Store for FullStore {
        fn put(&self, key: &str, _value: i64) -> std::result::Result<bool, StoreError> {
            if key == "full" {
                return Err(StoreError::Full(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "no space left",
                )));
            }
            Ok(true)
        }
    }

    const PUT: Method = Method::new("Store", "put", &["&str", "i64"]);

    impl<S: Store> Store for Proxy<S> {
        fn put(&self, key: &str, value: i64) -> std::result::Result<bool, StoreError> {
            self.invoke(
                &PUT,
                || vec![ObjectEntry::of(&key.to_string()).into(), ObjectEntry::of(&value).into()],
                |s| s.put(key, value),
            )
        }
    }

    fn factory(prefs: Preferences) -> (LoggerProxyFactory, Arc<InMemoryEntryDispatcher>) {
        let dispatcher = Arc::new(InMemoryEntryDispatcher::new());
        let factory = LoggerProxyFactory::new(
            dispatcher.clone(),
            "10.0.0.1".into(),
            GeneralPreferenceEvaluator::new(Arc::new(prefs)),
        );
        (factory, dispatcher)
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("ctxlog::logger::tests::StoreError"), "StoreError");
        assert_eq!(short_type_name("std::io::Error"), "Error");
        assert_eq!(short_type_name("Box<dyn std::error::Error>"), "Box");
    }

    #[test]
    fn test_simple_listener_messages() {
        let (factory, dispatcher) = factory(Preferences::new().with_enabled("store.enabled", true));
        let store = factory
            .simple_factory(MethodPattern::exact("put"), "store.enabled")
            .proxy(FullStore);

        store.put("a", 1).unwrap();
        assert!(store.put("full", 2).is_err());

        let messages: Vec<_> = dispatcher
            .entries_for_key("store.enabled")
            .iter()
            .map(|e| e.message().unwrap_or_default().to_string())
            .collect();
        assert_eq!(messages, vec!["put", "put:StoreError"]);
        assert!(dispatcher.entries()[0].elapse_time().unwrap().elapsed().is_some());
    }

    #[test]
    fn test_method_call_listener_captures_failure() {
        let (factory, dispatcher) = factory(
            Preferences::new().with_enabled(GeneralPreference::MethodCallEnabled, true),
        );
        let store = factory.method_call_factory(MethodPattern::exact("put")).proxy(FullStore);

        let err = store.put("full", 9).unwrap_err();
        assert_eq!(err.to_string(), "disk full");

        let entries = dispatcher.entries_for_key("general.method.call.enabled");
        assert_eq!(entries.len(), 1);
        let call = match &entries[0] {
            Entry::MethodCall(call) => call,
            other => panic!("unexpected entry {:?}", other),
        };
        assert_eq!(call.method_name(), "put");
        assert_eq!(call.object_argument(1).unwrap().to_value::<i64>().unwrap(), 9);
        assert!(call.returned_value.is_none());

        let exception = call.exception.as_ref().unwrap();
        assert_eq!(exception.message.as_deref(), Some("disk full"));
        assert!(exception.type_name.as_deref().unwrap().ends_with("StoreError"));
        assert_eq!(exception.cause_depth(), 1);
        assert_eq!(exception.root_cause().message.as_deref(), Some("no space left"));
        assert!(call.caller_stack_trace.is_empty());
    }

    #[test]
    fn test_disabled_preference_attaches_nothing() {
        let (factory, dispatcher) = factory(Preferences::new());
        let proxies = factory.method_call_factory(MethodPattern::exact("put"));
        assert_eq!(proxies.listener_count(), 0);

        proxies.proxy(FullStore).put("a", 1).unwrap();
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_stack_trace_preference() {
        let (factory, dispatcher) = factory(
            Preferences::new()
                .with_enabled(GeneralPreference::MethodCallEnabled, true)
                .with_enabled(GeneralPreference::StackTraceEnabled, true),
        );
        let store = factory.method_call_factory(MethodPattern::regex("p.*").unwrap()).proxy(FullStore);
        store.put("a", 1).unwrap();

        let entries = dispatcher.entries();
        let call = entries[0].method_call().unwrap();
        assert_eq!(
            call.returned_value.as_deref().and_then(|e| e.message()),
            Some("true")
        );
        assert!(!call.caller_stack_trace.is_empty());
    }
}
