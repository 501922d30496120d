//! Listener table and call forwarding

use std::any::{type_name, Any};
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use super::listener::{CallOutcome, InterceptorEvent, Method, MethodListener};
use super::pattern::MethodPattern;
use crate::entry::{ElapseTimeEntry, Entry};

/// A listener bound to the pattern that selects it.
#[derive(Clone)]
pub struct Registration {
    pattern: MethodPattern,
    listener: Arc<dyn MethodListener>,
}

impl Registration {
    pub fn new(pattern: MethodPattern, listener: Arc<dyn MethodListener>) -> Self {
        Self { pattern, listener }
    }

    pub fn pattern(&self) -> &MethodPattern {
        &self.pattern
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("pattern", &self.pattern)
            .field("listener", &self.listener.name())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Before,
    After,
    Exception,
}

impl Hook {
    fn as_str(&self) -> &'static str {
        match self {
            Hook::Before => "before_call",
            Hook::After => "after_call",
            Hook::Exception => "exception_call",
        }
    }
}

/// Copy-on-write table of listener registrations.
///
/// Each intercepted call works on one snapshot of the table, so registering
/// a listener concurrently never affects a call already in flight.
#[derive(Default)]
pub struct Interceptor {
    registrations: RwLock<Arc<Vec<Registration>>>,
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_registrations(registrations: Vec<Registration>) -> Self {
        Self {
            registrations: RwLock::new(Arc::new(registrations)),
        }
    }

    pub fn add_method_listener(&self, pattern: MethodPattern, listener: Arc<dyn MethodListener>) {
        let mut table = self.registrations.write();
        let mut next = Vec::with_capacity(table.len() + 1);
        next.extend(table.iter().cloned());
        next.push(Registration::new(pattern, listener));
        *table = Arc::new(next);
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.read().len()
    }

    fn snapshot(&self) -> Arc<Vec<Registration>> {
        Arc::clone(&self.registrations.read())
    }

    /// Listeners whose pattern matches, each listener at most once.
    fn matching(&self, method_name: &str) -> Vec<Arc<dyn MethodListener>> {
        let table = self.snapshot();
        let mut listeners: Vec<Arc<dyn MethodListener>> = Vec::new();
        for registration in table.iter() {
            if !registration.pattern.matches(method_name) {
                continue;
            }
            if listeners.iter().any(|l| Arc::ptr_eq(l, &registration.listener)) {
                continue;
            }
            listeners.push(Arc::clone(&registration.listener));
        }
        listeners
    }

    /// Forward `call` to `target`, notifying every matching listener.
    ///
    /// The result of `call` is returned unchanged whatever the listeners do.
    pub fn intercept<T, R, E, A, F>(
        &self,
        target: &T,
        method: &Method,
        arguments: A,
        call: F,
    ) -> std::result::Result<R, E>
    where
        T: ?Sized,
        R: Any + fmt::Debug,
        E: StdError + 'static,
        A: Fn() -> Vec<Entry>,
        F: FnOnce(&T) -> std::result::Result<R, E>,
    {
        let listeners = self.matching(method.name());
        if listeners.is_empty() {
            return call(target);
        }

        let target_type = type_name::<T>();
        let arguments: &dyn Fn() -> Vec<Entry> = &arguments;

        let pending = ElapseTimeEntry::new();
        let event = InterceptorEvent::new(target_type, method, arguments, &pending, CallOutcome::Pending);
        for listener in &listeners {
            notify(listener.as_ref(), Hook::Before, &event);
        }

        let mut elapse = ElapseTimeEntry::started();
        let result = call(target);
        if let Err(e) = elapse.stop() {
            debug!(method = method.name(), error = %e, "Elapse time not recorded");
        }

        match &result {
            Ok(value) => {
                let event = InterceptorEvent::new(
                    target_type,
                    method,
                    arguments,
                    &elapse,
                    CallOutcome::Returned(value),
                );
                for listener in &listeners {
                    notify(listener.as_ref(), Hook::After, &event);
                }
            }
            Err(failure) => {
                let event = InterceptorEvent::new(
                    target_type,
                    method,
                    arguments,
                    &elapse,
                    CallOutcome::Failed {
                        error: failure,
                        type_name: type_name::<E>(),
                    },
                );
                for listener in &listeners {
                    notify(listener.as_ref(), Hook::Exception, &event);
                }
            }
        }

        result
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("registrations", &self.snapshot())
            .finish()
    }
}

fn notify(listener: &dyn MethodListener, hook: Hook, event: &InterceptorEvent<'_>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match hook {
        Hook::Before => listener.before_call(event),
        Hook::After => listener.after_call(event),
        Hook::Exception => listener.exception_call(event),
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            listener = listener.name(),
            method = event.method().name(),
            hook = hook.as_str(),
            error = %e,
            "Listener hook failed"
        ),
        Err(payload) => error!(
            listener = listener.name(),
            method = event.method().name(),
            hook = hook.as_str(),
            panic = panic_message(payload.as_ref()),
            "Listener hook panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// =============================================================================
// Proxy
// =============================================================================

/// Forwarding wrapper around a target.
///
/// Decorators implement the target's capability trait for `Proxy<T>` and
/// route every method through [`Proxy::invoke`].
pub struct Proxy<T> {
    target: T,
    interceptor: Interceptor,
}

impl<T> Proxy<T> {
    /// Wrap a target with no listeners.
    pub fn new(target: T) -> Self {
        Self::with_interceptor(target, Interceptor::new())
    }

    pub fn with_interceptor(target: T, interceptor: Interceptor) -> Self {
        Self {
            target,
            interceptor,
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn into_inner(self) -> T {
        self.target
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn add_method_listener(&self, pattern: MethodPattern, listener: Arc<dyn MethodListener>) {
        self.interceptor.add_method_listener(pattern, listener);
    }

    /// Run `call` against the wrapped target through the listener table.
    pub fn invoke<R, E, A, F>(&self, method: &Method, arguments: A, call: F) -> std::result::Result<R, E>
    where
        R: Any + fmt::Debug,
        E: StdError + 'static,
        A: Fn() -> Vec<Entry>,
        F: FnOnce(&T) -> std::result::Result<R, E>,
    {
        self.interceptor.intercept(&self.target, method, arguments, call)
    }
}

impl<T: fmt::Debug> fmt::Debug for Proxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("target", &self.target)
            .field("interceptor", &self.interceptor)
            .finish()
    }
}

/// Builds proxies that share a set of listener registrations.
///
/// Each proxy gets its own copy of the table; listeners added to one proxy
/// later do not leak into the others.
#[derive(Debug, Clone, Default)]
pub struct ProxyFactory {
    registrations: Vec<Registration>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_method_listener(&mut self, pattern: MethodPattern, listener: Arc<dyn MethodListener>) -> &mut Self {
        self.registrations.push(Registration::new(pattern, listener));
        self
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn proxy<T>(&self, target: T) -> Proxy<T> {
        Proxy::with_interceptor(target, Interceptor::from_registrations(self.registrations.clone()))
    }
}
