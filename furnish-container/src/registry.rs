//! Factory registry: the configuration builder and its installed snapshot.
//!
//! [`Configuration`] collects `(produced type, factory)` pairs in
//! registration order. [`Configuration::install`] copies them into an
//! immutable [`Registry`] bound into a derived [`Context`]; mutating the
//! builder afterwards never affects contexts that were already derived.
//!
//! # Examples
//! ```
//! use furnish_container::prelude::*;
//!
//! let mut config = Configuration::new();
//! config.value(12i32);
//! config.factory(|ctx| {
//!     let port: i32 = ctx.resolve()?;
//!     Ok(format!("localhost:{port}"))
//! });
//!
//! let ctx = config.install(&Context::new());
//! let addr: String = ctx.resolve().unwrap();
//! assert_eq!(addr, "localhost:12");
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use furnish_support::rendering::suggest_similar;

use crate::context::Context;
use crate::error::{AmbiguousFactoryError, Error, Result, UnsupportedTypeError};
use crate::key::{AnyValue, TypeDescriptor, TypeKey};

/// Type alias for factory functions.
///
/// A factory receives the [`Context`] it is invoked in (to furnish its own
/// dependencies or reach a scope) and returns a boxed value of its
/// declared produced type.
///
/// # Why `Arc` and not `Box`?
/// Installed snapshots are shared between threads and between every
/// context derived from them. `Arc` allows cloning without copying the
/// closure.
pub type FactoryFn = Arc<dyn Fn(&Context) -> Result<AnyValue> + Send + Sync>;

/// A registered factory and the type it declares to produce.
#[derive(Clone)]
pub struct FactoryEntry {
    produced: TypeDescriptor,
    factory: FactoryFn,
    origin: Option<String>,
}

impl FactoryEntry {
    pub fn new(produced: TypeDescriptor, factory: FactoryFn) -> Self {
        Self {
            produced,
            factory,
            origin: None,
        }
    }

    /// Labels the entry for diagnostics ("service", "provider member `x`").
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn produced(&self) -> &TypeDescriptor {
        &self.produced
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Invokes the factory and binds its value to `T`.
    ///
    /// The produced type stays on the resolution path while the factory
    /// runs, so a factory that ends up requesting its own type fails with
    /// a circular dependency instead of recursing.
    pub(crate) fn produce<T: 'static>(&self, ctx: &Context) -> Result<T> {
        let target = TypeKey::of::<T>();
        let (inner, _frame) = ctx.with_frame(self.produced.key())?;
        let raw = (self.factory)(&inner)?;
        let coerced = self.produced.coerce(raw, &target)?;

        coerced.downcast::<T>().map(|b| *b).map_err(|_| Error::TypeMismatch {
            expected: target,
            declared: self.produced.key(),
        })
    }
}

impl fmt::Debug for FactoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryEntry")
            .field("produced", &self.produced)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Order in which record fields are furnished.
///
/// Furnishing a field may run a factory with side effects, so the order
/// is observable. Fields are furnished last-to-first unless configured
/// otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrder {
    /// Last declared field first.
    #[default]
    Reverse,
    /// First declared field first.
    Declaration,
}

impl FieldOrder {
    /// Field indices `0..len` in this order.
    pub fn sequence(self, len: usize) -> Vec<usize> {
        match self {
            FieldOrder::Reverse => (0..len).rev().collect(),
            FieldOrder::Declaration => (0..len).collect(),
        }
    }
}

/// Resolver settings captured into every installed snapshot.
///
/// Deserializable so applications can keep it next to the rest of their
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub field_order: FieldOrder,
}

/// Builds the factory registry and installs it into contexts.
///
/// Registration performs no validation: overlapping produced types are
/// allowed and only surface as [`Error::AmbiguousFactory`] when the
/// overlapping type is requested.
#[derive(Clone, Default)]
pub struct Configuration {
    factories: Vec<FactoryEntry>,
    settings: Settings,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a factory producing values described by `produced`.
    pub fn add_factory(&mut self, produced: TypeDescriptor, factory: FactoryFn) -> &mut Self {
        self.add_entry(FactoryEntry::new(produced, factory))
    }

    /// Appends a prepared entry.
    pub fn add_entry(&mut self, entry: FactoryEntry) -> &mut Self {
        debug!(
            produced = %entry.produced.key(),
            origin = entry.origin.as_deref().unwrap_or("factory"),
            position = self.factories.len(),
            "Registered factory"
        );
        self.factories.push(entry);
        self
    }

    /// Registers a typed factory.
    ///
    /// The returned builder can declare further types the value is
    /// assignable to.
    pub fn factory<T, F>(&mut self, factory: F) -> FactoryBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&Context) -> Result<T> + Send + Sync + 'static,
    {
        let factory: FactoryFn =
            Arc::new(move |ctx: &Context| Ok(Box::new(factory(ctx)?) as AnyValue));
        self.add_factory(TypeDescriptor::of::<T>(), factory);
        self.last_builder()
    }

    /// Registers a pre-built value, cloned on every resolve.
    ///
    /// Use `Arc<T>` for cheap sharing.
    pub fn value<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> FactoryBuilder<'_, T> {
        let factory: FactoryFn =
            Arc::new(move |_: &Context| Ok(Box::new(value.clone()) as AnyValue));
        self.add_entry(FactoryEntry::new(TypeDescriptor::of::<T>(), factory).with_origin("value"));
        self.last_builder()
    }

    /// Sets the order record fields are furnished in.
    pub fn field_order(&mut self, order: FieldOrder) -> &mut Self {
        self.settings.field_order = order;
        self
    }

    /// Replaces all resolver settings.
    pub fn settings(&mut self, settings: Settings) -> &mut Self {
        self.settings = settings;
        self
    }

    pub fn entries(&self) -> &[FactoryEntry] {
        &self.factories
    }

    /// Returns the number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no factories are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Installs a snapshot of the current registrations into a context
    /// derived from `ctx`.
    #[instrument(skip_all, name = "configuration_install")]
    pub fn install(&self, ctx: &Context) -> Context {
        info!(factories = self.factories.len(), "Installing configuration");

        ctx.with_registry(Arc::new(Registry {
            factories: self.factories.clone(),
            settings: self.settings.clone(),
        }))
    }

    fn last_builder<T>(&mut self) -> FactoryBuilder<'_, T> {
        let last = self.factories.len() - 1;
        FactoryBuilder {
            entry: &mut self.factories[last],
            _produces: PhantomData,
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("registered", &self.factories.len())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Refines the entry just registered by [`Configuration::factory`] or
/// [`Configuration::value`].
pub struct FactoryBuilder<'a, T> {
    entry: &'a mut FactoryEntry,
    _produces: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> FactoryBuilder<'_, T> {
    /// Declares that the produced value may also furnish `U`.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use furnish_container::prelude::*;
    ///
    /// trait Clock: Send + Sync { fn now(&self) -> u64; }
    /// struct Fixed;
    /// impl Clock for Fixed { fn now(&self) -> u64 { 7 } }
    ///
    /// let mut config = Configuration::new();
    /// config
    ///     .factory(|_| Ok(Arc::new(Fixed)))
    ///     .assignable_to(|c: Arc<Fixed>| c as Arc<dyn Clock>);
    ///
    /// let ctx = config.install(&Context::new());
    /// let clock: Arc<dyn Clock> = ctx.resolve().unwrap();
    /// assert_eq!(clock.now(), 7);
    /// ```
    pub fn assignable_to<U: Send + Sync + 'static>(
        self,
        convert: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> Self {
        let produced = std::mem::replace(&mut self.entry.produced, TypeDescriptor::of::<T>());
        self.entry.produced = produced.assignable_to(convert);
        self
    }

    /// Labels the entry for diagnostics.
    pub fn origin(self, origin: impl Into<String>) -> Self {
        self.entry.origin = Some(origin.into());
        self
    }
}

/// Immutable snapshot of a [`Configuration`], shared by every context
/// derived from one installation.
pub(crate) struct Registry {
    factories: Vec<FactoryEntry>,
    settings: Settings,
}

impl Registry {
    /// Every entry assignable to `key`, in registration order.
    pub fn find(&self, key: &TypeKey) -> Vec<&FactoryEntry> {
        self.factories
            .iter()
            .filter(|entry| entry.produced.is_assignable_to(key))
            .collect()
    }

    /// The single entry assignable to `key`, if any.
    ///
    /// # Errors
    /// [`Error::AmbiguousFactory`] if more than one entry matches.
    pub fn select(&self, key: &TypeKey) -> Result<Option<&FactoryEntry>> {
        let found = self.find(key);
        match found.len() {
            0 => Ok(None),
            1 => {
                trace!(ty = %key, "Factory located");
                Ok(Some(found[0]))
            }
            n => {
                warn!(ty = %key, candidates = n, "Multiple factories located");
                Err(Error::AmbiguousFactory(AmbiguousFactoryError {
                    requested: *key,
                    candidates: found
                        .iter()
                        .map(|entry| (entry.produced.key(), entry.origin.clone()))
                        .collect(),
                }))
            }
        }
    }

    /// Fills in "did you mean?" suggestions for an unsupported `key`.
    pub fn explain_unsupported(&self, error: Error, key: &TypeKey) -> Error {
        match error {
            Error::UnsupportedType(err) if err.requested == *key && err.suggestions.is_empty() => {
                let available: Vec<&str> = self
                    .factories
                    .iter()
                    .flat_map(|entry| entry.produced.targets())
                    .map(|k| k.type_name())
                    .collect();

                Error::UnsupportedType(UnsupportedTypeError {
                    requested: *key,
                    suggestions: suggest_similar(key.type_name(), &available, 3),
                })
            }
            other => other,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registered", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_factory(value: i32) -> FactoryFn {
        Arc::new(move |_| Ok(Box::new(value)))
    }

    #[test]
    fn find_preserves_registration_order() {
        let mut config = Configuration::new();
        config.add_factory(TypeDescriptor::of::<i32>(), dummy_factory(1));
        config.add_factory(TypeDescriptor::of::<String>(), Arc::new(|_| Ok(Box::new(String::new()))));
        config.add_factory(TypeDescriptor::of::<i32>(), dummy_factory(2));

        let ctx = config.install(&Context::new());
        let registry = ctx.registry().unwrap();
        let found = registry.find(&TypeKey::of::<i32>());
        assert_eq!(found.len(), 2);

        let values: Vec<i32> = found.iter().map(|e| e.produce::<i32>(&ctx).unwrap()).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn select_rejects_ambiguity() {
        let mut config = Configuration::new();
        config.value(1i32);
        config.value(2i32);

        let ctx = config.install(&Context::new());
        let err = ctx.registry().unwrap().select(&TypeKey::of::<i32>()).unwrap_err();
        match err {
            Error::AmbiguousFactory(e) => assert_eq!(e.candidates.len(), 2),
            other => panic!("Expected AmbiguousFactory, got: {other:?}"),
        }
    }

    #[test]
    fn installed_snapshot_ignores_later_registrations() {
        let mut config = Configuration::new();
        config.value(1i32);
        let before = config.install(&Context::new());

        config.value(String::from("late"));
        let after = config.install(&Context::new());

        let key = TypeKey::of::<String>();
        assert!(before.registry().unwrap().find(&key).is_empty());
        assert_eq!(after.registry().unwrap().find(&key).len(), 1);
        assert_eq!(before.registry().unwrap().find(&TypeKey::of::<i32>()).len(), 1);
    }

    #[test]
    fn builder_cast_makes_entry_assignable() {
        let mut config = Configuration::new();
        config.value(7u8).assignable_to(u32::from).origin("widened");

        let entry = &config.entries()[0];
        assert!(entry.produced().is_assignable_to(&TypeKey::of::<u32>()));
        assert_eq!(entry.origin(), Some("widened"));
    }

    #[test]
    fn field_order_sequences() {
        assert_eq!(FieldOrder::Reverse.sequence(3), vec![2, 1, 0]);
        assert_eq!(FieldOrder::Declaration.sequence(3), vec![0, 1, 2]);
        assert!(FieldOrder::default().sequence(0).is_empty());
    }

    #[test]
    fn settings_flow_into_snapshot() {
        let mut config = Configuration::new();
        config.field_order(FieldOrder::Declaration);

        let ctx = config.install(&Context::new());
        assert_eq!(ctx.field_order(), FieldOrder::Declaration);
        assert_eq!(Context::new().field_order(), FieldOrder::Reverse);
    }

    #[test]
    fn settings_deserialize_from_configuration_files() {
        let settings: Settings = serde_json::from_str(r#"{ "field_order": "declaration" }"#).unwrap();
        assert_eq!(settings.field_order, FieldOrder::Declaration);

        let defaults: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, Settings::default());

        assert!(serde_json::from_str::<Settings>(r#"{ "field_order": "random" }"#).is_err());

        let mut config = Configuration::new();
        config.settings(settings);
        assert_eq!(config.install(&Context::new()).field_order(), FieldOrder::Declaration);
    }

    #[test]
    fn debug_display() {
        let mut config = Configuration::new();
        config.value(1i32);
        config.value(String::from("x"));

        let debug = format!("{config:?}");
        assert!(debug.contains("Configuration"));
        assert!(debug.contains("2"));
    }
}
