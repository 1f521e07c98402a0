//! The ambient context every resolution runs in.
//!
//! A [`Context`] carries at most one installed registry snapshot, the
//! innermost [`Scope`] of the scope chain, the types currently under
//! construction and arbitrary typed values. Deriving a new context never
//! changes the one it was derived from, so contexts are passed by
//! reference and cloned freely.

use std::fmt;
use std::sync::Arc;

use anymap2::Map;
use anymap2::any::CloneAnySendSync;

use crate::error::Result;
use crate::furnisher::{self, Furnish};
use crate::key::TypeKey;
use crate::path::{FrameGuard, ResolutionPath};
use crate::registry::{FieldOrder, Registry};
use crate::scope::{self, Scope};

type Values = Map<dyn CloneAnySendSync + Send + Sync>;

/// Immutable, cheap-to-clone resolution context.
///
/// # Examples
/// ```
/// use furnish_container::prelude::*;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct RequestId(u64);
///
/// let root = Context::new();
/// let ctx = root.with_value(RequestId(42));
///
/// assert_eq!(ctx.value::<RequestId>(), Some(&RequestId(42)));
/// assert_eq!(root.value::<RequestId>(), None);
/// ```
#[derive(Clone, Default)]
pub struct Context {
    registry: Option<Arc<Registry>>,
    scope: Option<Arc<Scope>>,
    path: ResolutionPath,
    values: Arc<Values>,
}

impl Context {
    /// An empty context: no configuration, no scopes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a context carrying `value`, replacing any value of the same type.
    pub fn with_value<T: Clone + Send + Sync + 'static>(&self, value: T) -> Context {
        let mut values = Values::clone(&self.values);
        values.insert(value);
        Context {
            values: Arc::new(values),
            ..self.clone()
        }
    }

    /// Returns the ambient value of type `T`, if one was attached.
    pub fn value<T: Clone + Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    /// Furnishes a fresh `T`.
    ///
    /// Shorthand for [`furnisher::resolve`].
    pub fn resolve<T: Furnish>(&self) -> Result<T> {
        furnisher::resolve(self)
    }

    /// Furnishes the value behind `target` in place.
    pub fn resolve_into<T: Furnish>(&self, target: &mut T) -> Result<()> {
        furnisher::resolve_into(self, target)
    }

    /// Derives a context with a new innermost scope named `name`.
    pub fn enter_scope(&self, name: impl Into<String>) -> Context {
        scope::enter(self, name)
    }

    /// The innermost scope, if any was entered.
    pub fn scope(&self) -> Option<&Arc<Scope>> {
        self.scope.as_ref()
    }

    /// Returns `true` if a configuration has been installed.
    pub fn is_installed(&self) -> bool {
        self.registry.is_some()
    }

    /// Order in which record fields are furnished.
    pub fn field_order(&self) -> FieldOrder {
        self.registry
            .as_ref()
            .map(|registry| registry.settings().field_order)
            .unwrap_or_default()
    }

    pub(crate) fn registry(&self) -> Option<&Registry> {
        self.registry.as_deref()
    }

    pub(crate) fn with_registry(&self, registry: Arc<Registry>) -> Context {
        Context {
            registry: Some(registry),
            ..self.clone()
        }
    }

    pub(crate) fn with_scope(&self, scope: Arc<Scope>) -> Context {
        Context {
            scope: Some(scope),
            ..self.clone()
        }
    }

    /// Derives a context marking `key` as under construction until the
    /// returned guard is dropped.
    ///
    /// # Errors
    /// [`Error::CircularDependency`](crate::error::Error::CircularDependency)
    /// if `key` is already under construction.
    pub(crate) fn with_frame(&self, key: TypeKey) -> Result<(Context, FrameGuard)> {
        let (path, guard) = self.path.push(key)?;
        Ok((Context { path, ..self.clone() }, guard))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("scope", &self.scope.as_ref().map(|s| s.name().to_string()))
            .field("constructing", &self.path.keys())
            .field("values", &self.values.len())
            .finish()
    }
}
