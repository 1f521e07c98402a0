//! Type catalog: the types an application makes available for loading.
//!
//! A [`TypeCatalog`] is an ordered list of [`TypeEntry`] records queried
//! with composable [`Filter`]s. Entries carry everything the loader needs
//! to register a service or provider: the scope it is cached in, the types
//! its handle may stand in for, and the binders that build its factories.
//!
//! Besides explicit catalogs there is one process-wide catalog,
//! [`global()`], seeded at first access from every [`submit_type!`]
//! registration linked into the binary.
//!
//! [`submit_type!`]: crate::submit_type

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::key::{TypeDescriptor, TypeKey};
use crate::marker::{Marker, ProviderRole, ServiceRole};
use crate::provider::{self, Member, Provider, Service};
use crate::registry::FactoryFn;
use crate::scope::DEFAULT_SCOPE;

type ServiceBinder = fn(&TypeEntry) -> FactoryFn;
type ProviderBinder = fn() -> Vec<Member>;

/// A catalogued type and its loading metadata.
#[derive(Clone)]
pub struct TypeEntry {
    key: TypeKey,
    package: String,
    markers: Vec<TypeKey>,
    scope: String,
    produced: TypeDescriptor,
    service: Option<ServiceBinder>,
    provider: Option<ProviderBinder>,
}

impl TypeEntry {
    /// A plain entry for `T`, with no service capability.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        let key = TypeKey::of::<T>();
        Self {
            key,
            package: key.package().to_string(),
            markers: Vec::new(),
            scope: DEFAULT_SCOPE.to_string(),
            produced: TypeDescriptor::of::<T>(),
            service: None,
            provider: None,
        }
    }

    /// An entry for service `S`; loading it registers a factory for `Arc<S>`.
    pub fn service<S: Service>() -> Self {
        let key = TypeKey::of::<S>();
        Self {
            key,
            package: key.package().to_string(),
            markers: vec![TypeKey::of::<ServiceRole>()],
            scope: DEFAULT_SCOPE.to_string(),
            produced: TypeDescriptor::of::<Arc<S>>(),
            service: Some(provider::service_factory::<S>),
            provider: None,
        }
    }

    /// An entry for provider `P`: a service whose members are factories too.
    ///
    /// Provider entries carry [`ProviderRole`] instead of [`ServiceRole`]:
    /// the loader registers them in its provider pass only.
    pub fn provider<P: Provider>() -> Self {
        Self {
            markers: vec![TypeKey::of::<ProviderRole>()],
            provider: Some(provider::provider_members::<P>),
            ..Self::service::<P>()
        }
    }

    /// Overrides the package derived from the type's module path.
    pub fn in_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Names the scope the service is cached in.
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Declares role `M`.
    pub fn with_marker<M: Marker>(mut self) -> Self {
        let marker = TypeKey::of::<M>();
        if !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
        self
    }

    /// Declares that the produced handle may stand in for `U`.
    ///
    /// For services the produced handle is `Arc<S>`:
    ///
    /// ```
    /// use std::sync::Arc;
    /// use furnish_container::prelude::*;
    ///
    /// trait Greeter: Send + Sync {}
    /// struct English;
    /// impl Greeter for English {}
    /// impl Furnish for English {}
    /// impl Service for English {}
    ///
    /// let entry = TypeEntry::service::<English>()
    ///     .assignable_to(|s: Arc<English>| s as Arc<dyn Greeter>);
    /// assert!(entry.produced().is_assignable_to(&TypeKey::of::<Arc<dyn Greeter>>()));
    /// ```
    pub fn assignable_to<T, U>(mut self, convert: impl Fn(T) -> U + Send + Sync + 'static) -> Self
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
    {
        self.produced = self.produced.assignable_to(convert);
        self
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Name of the scope the service is cached in.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn markers(&self) -> &[TypeKey] {
        &self.markers
    }

    /// The handle loading this entry produces.
    pub fn produced(&self) -> &TypeDescriptor {
        &self.produced
    }

    pub fn is_service(&self) -> bool {
        self.service.is_some()
    }

    pub fn is_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Returns `true` if the entry declares marker `key` or its handle is
    /// assignable to `key`.
    pub fn is_assignable_to(&self, key: &TypeKey) -> bool {
        self.key == *key || self.markers.contains(key) || self.produced.is_assignable_to(key)
    }

    pub(crate) fn service_binder(&self) -> Option<ServiceBinder> {
        self.service
    }

    pub(crate) fn provider_binder(&self) -> Option<ProviderBinder> {
        self.provider
    }
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEntry")
            .field("key", &self.key)
            .field("package", &self.package)
            .field("scope", &self.scope)
            .field("markers", &self.markers)
            .field("service", &self.is_service())
            .field("provider", &self.is_provider())
            .finish()
    }
}

// ============================================================
// Filters
// ============================================================

/// A predicate over catalog entries.
pub type Filter = Arc<dyn Fn(&TypeEntry) -> bool + Send + Sync>;

/// Keeps entries whose package matches `pattern`.
///
/// - `"..."` matches every package;
/// - a trailing `/...` or `::...` matches the prefix and everything below
///   it (`app/...` matches `app` and `app/sub`, not `application`);
/// - anything else is an exact match.
pub fn in_package(pattern: impl Into<String>) -> Filter {
    let pattern = pattern.into();
    Arc::new(move |entry: &TypeEntry| package_matches(&pattern, entry.package()))
}

/// Keeps entries that declare marker `T` or produce a handle assignable to `T`.
pub fn assignable_to<T: ?Sized + 'static>() -> Filter {
    assignable_to_key(TypeKey::of::<T>())
}

/// [`assignable_to`] with a runtime key.
pub fn assignable_to_key(key: TypeKey) -> Filter {
    Arc::new(move |entry: &TypeEntry| entry.is_assignable_to(&key))
}

/// Package pattern matching used by [`in_package`].
pub fn package_matches(pattern: &str, package: &str) -> bool {
    if pattern == "..." {
        return true;
    }

    for separator in ["/", "::"] {
        let wildcard = format!("{separator}...");
        if let Some(prefix) = pattern.strip_suffix(wildcard.as_str()) {
            return package == prefix
                || package
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with(separator));
        }
    }

    pattern == package
}

// ============================================================
// TypeCatalog
// ============================================================

/// Ordered, thread-safe collection of catalogued types.
#[derive(Default)]
pub struct TypeCatalog {
    entries: RwLock<Vec<TypeEntry>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry`.
    pub fn register_type(&self, entry: TypeEntry) {
        debug!(
            ty = %entry.key,
            package = %entry.package,
            service = entry.is_service(),
            provider = entry.is_provider(),
            "Catalogued type"
        );
        self.entries.write().push(entry);
    }

    /// Entries matching every filter, in registration order.
    ///
    /// The result is a copy; later registrations do not affect it.
    pub fn list_types(&self, filters: &[Filter]) -> Vec<TypeEntry> {
        let matching: Vec<TypeEntry> = self
            .entries
            .read()
            .iter()
            .filter(|entry| filters.iter().all(|filter| filter(entry)))
            .cloned()
            .collect();
        trace!(filters = filters.len(), matching = matching.len(), "Listed catalog types");
        matching
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCatalog")
            .field("entries", &self.len())
            .finish()
    }
}

// ============================================================
// Global catalog
// ============================================================

/// A link-time registration collected into [`global()`].
///
/// Created by [`submit_type!`](crate::submit_type).
pub struct Submission {
    build: fn() -> TypeEntry,
}

impl Submission {
    pub const fn new(build: fn() -> TypeEntry) -> Self {
        Self { build }
    }
}

inventory::collect!(Submission);

static GLOBAL: Lazy<TypeCatalog> = Lazy::new(|| {
    let catalog = TypeCatalog::new();
    for submission in inventory::iter::<Submission> {
        catalog.register_type((submission.build)());
    }
    debug!(entries = catalog.len(), "Seeded global catalog");
    catalog
});

/// The process-wide catalog.
pub fn global() -> &'static TypeCatalog {
    &GLOBAL
}

/// Appends `entry` to the [`global()`] catalog.
pub fn register_type(entry: TypeEntry) {
    global().register_type(entry);
}

/// Lists the [`global()`] catalog.
pub fn list_types(filters: &[Filter]) -> Vec<TypeEntry> {
    global().list_types(filters)
}
