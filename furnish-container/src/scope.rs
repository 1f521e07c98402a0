//! Named, nested lifetime scopes.
//!
//! A scope caches at most one value per type. Scopes form a chain through
//! the [`Context`]: [`enter`] pushes a new innermost scope, [`retrieve`]
//! finds the nearest scope with a given name. Names need not be unique;
//! the innermost match shadows outer ones.
//!
//! ```text
//! ""  (application)
//!  └── "request"
//!       └── "request"   <- retrieve(ctx, "request") finds this one
//! ```
//!
//! Values are created lazily (usually by a service factory through
//! [`Scope::ensure`]) and torn down explicitly with [`Scope::close`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::{BoxError, CloseError, CloseFailure, Error, Result};
use crate::key::TypeKey;

/// Name of the scope services bind to unless they declare another.
pub const DEFAULT_SCOPE: &str = "";

/// Release hook for values cached in a scope.
pub trait Close: Send + Sync {
    fn close(&self) -> Result<(), BoxError>;
}

/// A value cached in a scope, with its optional closer.
#[derive(Clone)]
pub struct ScopedValue {
    value: Arc<dyn Any + Send + Sync>,
    closer: Option<Arc<dyn Close>>,
    seq: u64,
}

impl ScopedValue {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            closer: None,
            seq: 0,
        }
    }

    /// Attaches the hook [`Scope::close`] calls for this value.
    pub fn closable(mut self, closer: Arc<dyn Close>) -> Self {
        self.closer = Some(closer);
        self
    }

    /// Returns the value if it is a `T`.
    pub fn downcast<T: Clone + 'static>(&self) -> Option<T> {
        self.value.downcast_ref::<T>().cloned()
    }

    pub fn is_closable(&self) -> bool {
        self.closer.is_some()
    }
}

impl fmt::Debug for ScopedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedValue")
            .field("closable", &self.closer.is_some())
            .field("seq", &self.seq)
            .finish()
    }
}

type Slot = Arc<OnceCell<ScopedValue>>;

/// One node of the scope chain.
pub struct Scope {
    name: String,
    parent: Option<Arc<Scope>>,
    values: RwLock<HashMap<TypeKey, Slot>>,
    seq: AtomicU64,
}

impl Scope {
    fn new(name: String, parent: Option<Arc<Scope>>) -> Self {
        Self {
            name,
            parent,
            values: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// Returns the cached value for `key`.
    ///
    /// A value still being built by [`ensure`](Scope::ensure) is not
    /// visible yet.
    pub fn get(&self, key: &TypeKey) -> Option<ScopedValue> {
        let values = self.values.read();
        values.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Caches `value` under `key`, replacing any existing value.
    pub fn insert(&self, key: TypeKey, value: ScopedValue) {
        let value = self.stamp(value);
        trace!(scope = %self.name, ty = %key, "Inserting scoped value");
        self.values.write().insert(key, Arc::new(OnceCell::with_value(value)));
    }

    /// Returns the cached value for `key`, creating it with `supplier` first
    /// if absent.
    ///
    /// Concurrent callers for one key wait for a single supplier run. A
    /// failed supplier caches nothing, so the next call tries again.
    pub fn ensure<F>(&self, key: TypeKey, supplier: F) -> Result<ScopedValue>
    where
        F: FnOnce() -> Result<ScopedValue>,
    {
        let slot = self.slot(key);

        let mut created = false;
        let value = slot.get_or_try_init(|| {
            created = true;
            debug!(scope = %self.name, ty = %key, "Creating scoped value");
            supplier().map(|value| self.stamp(value))
        })?;

        if !created {
            trace!(scope = %self.name, ty = %key, "Scoped value cache hit");
        }
        Ok(value.clone())
    }

    /// Typed [`get`](Scope::get) keyed by `T`.
    pub fn get_as<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.get(&TypeKey::of::<T>())?.downcast::<T>()
    }

    /// Typed [`insert`](Scope::insert) keyed by `T`.
    pub fn insert_value<T: Send + Sync + 'static>(&self, value: T) {
        self.insert(TypeKey::of::<T>(), ScopedValue::new(value));
    }

    /// Number of values cached in this scope.
    pub fn len(&self) -> usize {
        self.values
            .read()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every closable value, newest first.
    ///
    /// Keeps going after a failure; all failures are reported together.
    /// Values stay cached, so closing twice closes them twice.
    ///
    /// # Errors
    /// [`Error::Close`] listing every value whose closer failed.
    pub fn close(&self) -> Result<()> {
        let mut closable: Vec<(TypeKey, ScopedValue)> = {
            let values = self.values.read();
            values
                .iter()
                .filter_map(|(key, slot)| slot.get().map(|value| (*key, value.clone())))
                .filter(|(_, value)| value.closer.is_some())
                .collect()
        };
        closable.sort_by(|a, b| b.1.seq.cmp(&a.1.seq));

        debug!(scope = %self.name, closable = closable.len(), "Closing scope");

        let failures: Vec<CloseFailure> = closable
            .into_iter()
            .filter_map(|(ty, value)| {
                let closer = value.closer?;
                closer.close().err().map(|source| {
                    warn!(scope = %self.name, ty = %ty, error = %source, "Failed to close scoped value");
                    CloseFailure { ty, source }
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close(CloseError {
                scope: self.name.clone(),
                failures,
            }))
        }
    }

    fn slot(&self, key: TypeKey) -> Slot {
        if let Some(slot) = self.values.read().get(&key) {
            return slot.clone();
        }
        self.values.write().entry(key).or_default().clone()
    }

    fn stamp(&self, mut value: ScopedValue) -> ScopedValue {
        value.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        value
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("values", &self.len())
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .finish()
    }
}

/// Derives a context whose innermost scope is a new, empty scope `name`.
pub fn enter(ctx: &Context, name: impl Into<String>) -> Context {
    let name = name.into();
    debug!(scope = %name, "Entering scope");
    ctx.with_scope(Arc::new(Scope::new(name, ctx.scope().cloned())))
}

/// The innermost scope named `name`, if any.
pub fn retrieve(ctx: &Context, name: &str) -> Option<Arc<Scope>> {
    std::iter::successors(ctx.scope(), |scope| scope.parent.as_ref())
        .find(|scope| scope.name == name)
        .cloned()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex};
    use std::thread;

    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug)]
    struct Conn {
        id: usize,
        log: Arc<Mutex<Vec<usize>>>,
        fail: bool,
    }

    impl Close for Conn {
        fn close(&self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(self.id);
            if self.fail {
                Err(format!("conn {} refused to close", self.id).into())
            } else {
                Ok(())
            }
        }
    }

    fn conn(id: usize, log: &Arc<Mutex<Vec<usize>>>, fail: bool) -> ScopedValue {
        let conn = Arc::new(Conn {
            id,
            log: log.clone(),
            fail,
        });
        ScopedValue::new(conn.clone()).closable(conn)
    }

    struct K1;
    struct K2;
    struct K3;

    fn scope(name: &str) -> Arc<Scope> {
        let ctx = enter(&Context::new(), name);
        ctx.scope().cloned().unwrap()
    }

    #[test]
    fn get_after_insert() {
        let scope = scope("test");
        assert!(scope.get(&TypeKey::of::<u32>()).is_none());

        scope.insert_value(7u32);
        assert_eq!(scope.get_as::<u32>(), Some(7));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn insert_replaces() {
        let scope = scope("test");
        scope.insert_value(1u32);
        scope.insert_value(2u32);
        assert_eq!(scope.get_as::<u32>(), Some(2));
    }

    #[test]
    fn ensure_runs_supplier_once() {
        let scope = scope("test");
        let calls = AtomicUsize::new(0);
        let key = TypeKey::of::<u32>();

        for _ in 0..3 {
            let value = scope
                .ensure(key, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(ScopedValue::new(5u32))
                })
                .unwrap();
            assert_eq!(value.downcast::<u32>(), Some(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ensure_returns_inserted_value() {
        let scope = scope("test");
        scope.insert_value(9u32);

        let value = scope
            .ensure(TypeKey::of::<u32>(), || panic!("supplier must not run"))
            .unwrap();
        assert_eq!(value.downcast::<u32>(), Some(9));
    }

    #[test]
    fn ensure_failure_caches_nothing() {
        let scope = scope("test");
        let key = TypeKey::of::<u32>();

        let err = scope
            .ensure(key, || Err(Error::failed("not yet")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failed);
        assert!(scope.get(&key).is_none());

        let value = scope.ensure(key, || Ok(ScopedValue::new(1u32))).unwrap();
        assert_eq!(value.downcast::<u32>(), Some(1));
    }

    #[test]
    fn concurrent_ensure_runs_supplier_once() {
        const THREADS: usize = 8;

        let scope = scope("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let scope = scope.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    scope
                        .ensure(TypeKey::of::<u64>(), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(10));
                            Ok(ScopedValue::new(42u64))
                        })
                        .unwrap()
                        .downcast::<u64>()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_aggregates_failures_newest_first() {
        let scope = scope("request");
        let log = Arc::new(Mutex::new(Vec::new()));

        scope.insert(TypeKey::of::<K1>(), conn(1, &log, true));
        scope.insert(TypeKey::of::<K2>(), conn(2, &log, false));
        scope.insert(TypeKey::of::<K3>(), conn(3, &log, true));
        scope.insert_value(String::from("not closable"));

        let err = scope.close().unwrap_err();
        assert_eq!(*log.lock().unwrap(), vec![3, 2, 1]);

        match err {
            Error::Close(e) => {
                assert_eq!(e.scope, "request");
                let failed: Vec<TypeKey> = e.failures.iter().map(|f| f.ty).collect();
                assert_eq!(failed, vec![TypeKey::of::<K3>(), TypeKey::of::<K1>()]);
            }
            other => panic!("Expected Close, got: {other:?}"),
        }

        // Values stay cached after close.
        assert_eq!(scope.len(), 4);
    }

    #[test]
    fn close_without_failures() {
        let scope = scope("request");
        let log = Arc::new(Mutex::new(Vec::new()));
        scope.insert(TypeKey::of::<K1>(), conn(1, &log, false));

        assert!(scope.close().is_ok());
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn retrieve_finds_innermost_match() {
        let outer = enter(&Context::new(), "A");
        let middle = enter(&outer, "B");
        let inner = enter(&middle, "A");

        let found = retrieve(&inner, "A").unwrap();
        assert!(Arc::ptr_eq(&found, inner.scope().unwrap()));

        let b = retrieve(&inner, "B").unwrap();
        assert!(Arc::ptr_eq(&b, middle.scope().unwrap()));

        assert!(retrieve(&inner, "C").is_none());
        assert!(retrieve(&Context::new(), DEFAULT_SCOPE).is_none());
    }

    #[test]
    fn enter_does_not_change_parent_context() {
        let root = enter(&Context::new(), DEFAULT_SCOPE);
        let child = enter(&root, "request");

        assert_eq!(root.scope().unwrap().name(), "");
        assert_eq!(child.scope().unwrap().name(), "request");
        assert!(Arc::ptr_eq(
            child.scope().unwrap().parent().unwrap(),
            root.scope().unwrap()
        ));
    }
}
