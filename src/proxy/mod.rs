//! Interception Layer
//!
//! Wraps a target in a [`Proxy`] that forwards every call and notifies the
//! [`MethodListener`]s whose [`MethodPattern`] matches the method name.
//!
//! A decorator implements the wrapped capability trait for `Proxy<T>`:
//!
//! ```ignore
//! const FIND: Method = Method::new("Repository", "find", &["u32"]);
//!
//! impl<R: Repository> Repository for Proxy<R> {
//!     fn find(&self, id: u32) -> Result<String, RepoError> {
//!         self.invoke(&FIND, || vec![ObjectEntry::of(&id).into()], |r| r.find(id))
//!     }
//! }
//! ```

mod interceptor;
mod listener;
mod pattern;

pub use interceptor::{Interceptor, Proxy, ProxyFactory, Registration};
pub use listener::{CallOutcome, InterceptorEvent, Method, MethodListener};
pub use pattern::MethodPattern;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, ObjectEntry};
    use crate::error::{Error, Result};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("row {0} not found")]
    struct NotFound(u32);

    trait Repository {
        fn find(&self, id: u32) -> std::result::Result<String, NotFound>;
        fn count(&self) -> std::result::Result<usize, NotFound>;
    }

    #[derive(Debug)]
    struct Rows(Vec<String>);

    impl Repository for Rows {
        fn find(&self, id: u32) -> std::result::Result<String, NotFound> {
            self.0.get(id as usize).cloned().ok_or(NotFound(id))
        }

        fn count(&self) -> std::result::Result<usize, NotFound> {
            Ok(self.0.len())
        }
    }

    const FIND: Method = Method::new("Repository", "find", &["u32"]);
    const COUNT: Method = Method::new("Repository", "count", &[]);

    impl<R: Repository> Repository for Proxy<R> {
        fn find(&self, id: u32) -> std::result::Result<String, NotFound> {
            self.invoke(&FIND, || vec![ObjectEntry::of(&id).into()], |r| r.find(id))
        }

        fn count(&self) -> std::result::Result<usize, NotFound> {
            self.invoke(&COUNT, Vec::new, |r| r.count())
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl MethodListener for Recorder {
        fn before_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
            self.calls.lock().push(format!("before:{}", event.method().name()));
            Ok(())
        }

        fn after_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
            let value = event.returned().map(ObjectEntry::from_captured);
            self.calls.lock().push(format!(
                "after:{}:{}",
                event.method().name(),
                value.map(|v| v.to_string()).unwrap_or_default()
            ));
            Ok(())
        }

        fn exception_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
            let message = event.error().map(|e| e.to_string()).unwrap_or_default();
            self.calls.lock().push(format!("exception:{}:{}", event.method().name(), message));
            Ok(())
        }
    }

    struct Faulty;

    impl MethodListener for Faulty {
        fn before_call(&self, _event: &InterceptorEvent<'_>) -> Result<()> {
            Err(Error::listener("faulty", "refused"))
        }

        fn after_call(&self, _event: &InterceptorEvent<'_>) -> Result<()> {
            panic!("listener blew up");
        }
    }

    struct ArgumentCounter(AtomicUsize);

    impl MethodListener for ArgumentCounter {
        fn before_call(&self, event: &InterceptorEvent<'_>) -> Result<()> {
            self.0.fetch_add(event.arguments().len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn rows() -> Rows {
        Rows(vec!["a".to_string(), "b".to_string()])
    }

    #[test]
    fn test_hooks_run_around_matching_call() {
        let recorder = Arc::new(Recorder::default());
        let proxy = Proxy::new(rows());
        proxy.add_method_listener(MethodPattern::exact("find"), recorder.clone());

        assert_eq!(proxy.find(1).unwrap(), "b");
        assert_eq!(proxy.count().unwrap(), 2);

        let calls = recorder.calls.lock().clone();
        assert_eq!(calls, vec!["before:find".to_string(), "after:find:b".to_string()]);
    }

    #[test]
    fn test_failure_is_reported_and_returned_unchanged() {
        let recorder = Arc::new(Recorder::default());
        let proxy = Proxy::new(rows());
        proxy.add_method_listener(MethodPattern::regex("find|count").unwrap(), recorder.clone());

        let err = proxy.find(9).unwrap_err();
        assert_eq!(err.0, 9);

        let calls = recorder.calls.lock().clone();
        assert_eq!(
            calls,
            vec!["before:find".to_string(), "exception:find:row 9 not found".to_string()]
        );
    }

    #[test]
    fn test_listener_failures_do_not_affect_call() {
        let recorder = Arc::new(Recorder::default());
        let mut factory = ProxyFactory::new();
        factory
            .add_method_listener(MethodPattern::exact("find"), Arc::new(Faulty))
            .add_method_listener(MethodPattern::exact("find"), recorder.clone());
        let proxy = factory.proxy(rows());

        assert_eq!(proxy.find(0).unwrap(), "a");
        // the listener after the faulty one still ran
        assert_eq!(recorder.calls.lock().len(), 2);
    }

    #[test]
    fn test_arguments_built_only_when_requested() {
        let built = Arc::new(AtomicUsize::new(0));
        let proxy = Proxy::new(rows());
        let counter = built.clone();
        let result = proxy.invoke(
            &FIND,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Vec::<Entry>::new()
            },
            |r| r.find(0),
        );
        assert!(result.is_ok());
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let args = Arc::new(ArgumentCounter(AtomicUsize::new(0)));
        proxy.add_method_listener(MethodPattern::exact("find"), args.clone());
        proxy.find(1).unwrap();
        assert_eq!(args.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_registered_twice_fires_once() {
        let recorder = Arc::new(Recorder::default());
        let proxy = Proxy::new(rows());
        proxy.add_method_listener(MethodPattern::exact("count"), recorder.clone());
        proxy.add_method_listener(MethodPattern::regex("c.*").unwrap(), recorder.clone());

        proxy.count().unwrap();
        assert_eq!(recorder.calls.lock().len(), 2);
        assert_eq!(proxy.interceptor().listener_count(), 2);
    }

    #[test]
    fn test_factory_tables_are_independent() {
        let mut factory = ProxyFactory::new();
        factory.add_method_listener(MethodPattern::exact("find"), Arc::new(Recorder::default()));
        let first = factory.proxy(rows());
        let second = factory.proxy(rows());

        first.add_method_listener(MethodPattern::exact("count"), Arc::new(Recorder::default()));
        assert_eq!(first.interceptor().listener_count(), 2);
        assert_eq!(second.interceptor().listener_count(), 1);
    }
}
