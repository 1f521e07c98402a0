//! Type identities and produced-type descriptors.
//!
//! [`TypeKey`] identifies a type inside the container. [`TypeDescriptor`]
//! describes what a factory produces: a key plus the explicit set of other
//! types the produced value may be converted into. Rust has no runtime
//! assignability check, so every "this `Arc<English>` may stand in for an
//! `Arc<dyn Greeter>`" relation is declared up front as a cast.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::warn;

use furnish_support::rendering::shorten_type_name;

use crate::error::{Error, Result};

/// A type-erased value moving between factories and the resolver.
pub type AnyValue = Box<dyn Any + Send + Sync>;

/// Uniquely identifies a type in the container.
///
/// # Examples
/// ```
/// use furnish_container::key::TypeKey;
///
/// let key = TypeKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(key.short_name(), "String");
/// assert_eq!(key.package(), "alloc::string");
/// ```
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeKey {
    /// Creates a key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] of this type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name with module paths stripped.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }

    /// Returns the module path the type was declared in.
    ///
    /// Generic arguments are ignored: `alloc::sync::Arc<app::Db>` lives in
    /// `alloc::sync`. Types without a path (primitives) return `""`.
    pub fn package(&self) -> &'static str {
        let name = self.type_name;
        let head = match name.find('<') {
            Some(pos) => &name[..pos],
            None => name,
        };
        match head.rfind("::") {
            Some(pos) => &name[..pos],
            None => "",
        }
    }

    /// Returns `true` if this key identifies `T`.
    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.type_name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

type Convert = dyn Fn(AnyValue) -> std::result::Result<AnyValue, AnyValue> + Send + Sync;

#[derive(Clone)]
struct Cast {
    target: TypeKey,
    convert: Arc<Convert>,
}

/// Describes the value a factory produces and what it is assignable to.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use furnish_container::key::{TypeDescriptor, TypeKey};
///
/// trait Greeter: Send + Sync {}
/// struct English;
/// impl Greeter for English {}
///
/// let produced = TypeDescriptor::of::<Arc<English>>()
///     .assignable_to(|g: Arc<English>| g as Arc<dyn Greeter>);
///
/// assert!(produced.is_assignable_to(&TypeKey::of::<Arc<English>>()));
/// assert!(produced.is_assignable_to(&TypeKey::of::<Arc<dyn Greeter>>()));
/// assert!(!produced.is_assignable_to(&TypeKey::of::<English>()));
/// ```
#[derive(Clone)]
pub struct TypeDescriptor {
    key: TypeKey,
    casts: Vec<Cast>,
}

impl TypeDescriptor {
    /// Describes values of exactly type `T`.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            casts: Vec::new(),
        }
    }

    /// Returns the produced type.
    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Declares that produced values may stand in for `U`.
    ///
    /// `T` must be the produced type; a cast from any other source type
    /// could never apply and is dropped with a warning.
    pub fn assignable_to<T, U>(mut self, convert: impl Fn(T) -> U + Send + Sync + 'static) -> Self
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
    {
        let target = TypeKey::of::<U>();
        if !self.key.is::<T>() {
            warn!(
                produced = %self.key,
                source = type_name::<T>(),
                target = %target,
                "Ignoring cast whose source is not the produced type"
            );
            return self;
        }
        if target == self.key || self.casts.iter().any(|c| c.target == target) {
            return self;
        }

        let convert: Arc<Convert> = Arc::new(move |value: AnyValue| {
            value
                .downcast::<T>()
                .map(|v| Box::new(convert(*v)) as AnyValue)
        });
        self.casts.push(Cast { target, convert });
        self
    }

    /// Returns `true` if produced values can be bound to `target`.
    pub fn is_assignable_to(&self, target: &TypeKey) -> bool {
        self.key == *target || self.casts.iter().any(|c| c.target == *target)
    }

    /// Every type produced values can be bound to, the produced type first.
    pub fn targets(&self) -> Vec<TypeKey> {
        std::iter::once(self.key)
            .chain(self.casts.iter().map(|c| c.target))
            .collect()
    }

    /// Converts a produced value into a value of `target`.
    ///
    /// # Errors
    /// [`Error::TypeMismatch`] if `target` is not assignable or the value
    /// is not actually of the produced type.
    pub fn coerce(&self, value: AnyValue, target: &TypeKey) -> Result<AnyValue> {
        if self.key == *target {
            return Ok(value);
        }

        let mismatch = || Error::TypeMismatch {
            expected: *target,
            declared: self.key,
        };
        let cast = self
            .casts
            .iter()
            .find(|c| c.target == *target)
            .ok_or_else(mismatch)?;
        (cast.convert)(value).map_err(|_| mismatch())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("key", &self.key)
            .field("casts", &self.casts.iter().map(|c| c.target).collect::<Vec<_>>())
            .finish()
    }
}
