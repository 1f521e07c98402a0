//! The value resolver.
//!
//! Furnishing a `T` tries, in order:
//!
//! 1. the [`Context`] itself, when `T` is `Context`;
//! 2. the single installed factory assignable to `T` (two or more is an
//!    [`Error::AmbiguousFactory`]);
//! 3. the structural rule `T` declares through [`Furnish`]: allocate and
//!    fill a pointer, populate a record's fields, collect a sequence, call
//!    a function pointer with furnished arguments.
//!
//! Whatever path bound the value, its post-construct hook runs last.
//! Every failure is wrapped as `furnishing <T>: <cause>`.
//!
//! # Examples
//! ```
//! use furnish_container::prelude::*;
//!
//! let mut config = Configuration::new();
//! config.value(12i32);
//! let ctx = config.install(&Context::new());
//!
//! let mut slot: Option<Box<i32>> = None;
//! resolve_into(&ctx, &mut slot).unwrap();
//! assert_eq!(slot.as_deref(), Some(&12));
//! ```

use std::any::{Any, TypeId};

use tracing::trace;

use crate::call::FurnishArgs;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::key::TypeKey;
use crate::registry::Registry;

/// A type the resolver can furnish.
///
/// Every method has a default, so opting a type in is one line:
/// `impl Furnish for MyType {}` makes it furnishable from factories only.
/// `#[derive(Furnish)]` adds the record rule: public fields are furnished
/// one by one.
///
/// # Examples
/// ```
/// use furnish_container::prelude::*;
///
/// struct Port(u16);
///
/// impl Furnish for Port {
///     fn furnish_new(_: &Context) -> Result<Self> {
///         Ok(Port(8080))
///     }
/// }
///
/// let ctx = Configuration::new().install(&Context::new());
/// let port: Port = resolve(&ctx).unwrap();
/// assert_eq!(port.0, 8080);
/// ```
pub trait Furnish: Sized + Send + Sync + 'static {
    /// Name of the post-construct method, if the type declares one.
    const POST_CONSTRUCT: Option<&'static str> = None;

    /// Builds a value when no factory produces `Self`.
    ///
    /// Types without a structural rule fail with
    /// [`Error::UnsupportedType`].
    fn furnish_new(ctx: &Context) -> Result<Self> {
        let _ = ctx;
        Err(Error::unsupported::<Self>())
    }

    /// Populates an existing value when no factory produces `Self`.
    fn furnish_in_place(&mut self, ctx: &Context) -> Result<()> {
        *self = Self::furnish_new(ctx)?;
        Ok(())
    }

    /// Runs after the value is bound.
    fn post_construct(&mut self, ctx: &Context) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}

/// Furnishes a fresh `T`.
///
/// # Errors
/// [`Error::NoResolver`] without an installed configuration, otherwise
/// whatever the factory, structural rule or post-construct hook reported,
/// wrapped with `T`.
pub fn resolve<T: Furnish>(ctx: &Context) -> Result<T> {
    if let Some(this) = self_reference::<T>(ctx) {
        return Ok(this);
    }

    let key = TypeKey::of::<T>();
    furnish_new::<T>(ctx, &key).map_err(|e| Error::furnishing(key, e))
}

/// Furnishes the value behind `target`.
///
/// A factory result replaces `*target`; otherwise the structural rule fills
/// it in place, leaving parts it does not furnish untouched.
pub fn resolve_into<T: Furnish>(ctx: &Context, target: &mut T) -> Result<()> {
    if let Some(this) = self_reference::<T>(ctx) {
        *target = this;
        return Ok(());
    }

    let key = TypeKey::of::<T>();
    furnish_in_place(ctx, &key, target).map_err(|e| Error::furnishing(key, e))
}

/// Furnishes one value per element of the tuple `A`, in order.
///
/// ```
/// use furnish_container::prelude::*;
///
/// let mut config = Configuration::new();
/// config.value(3u8);
/// config.value(String::from("three"));
/// let ctx = config.install(&Context::new());
///
/// let (n, s): (u8, String) = resolve_args(&ctx).unwrap();
/// assert_eq!((n, s.as_str()), (3, "three"));
/// ```
pub fn resolve_args<A: FurnishArgs>(ctx: &Context) -> Result<A> {
    A::furnish_args(ctx)
}

fn furnish_new<T: Furnish>(ctx: &Context, key: &TypeKey) -> Result<T> {
    let registry = ctx.registry().ok_or(Error::NoResolver)?;

    let mut value = match registry.select(key)? {
        Some(entry) => {
            trace!(ty = %key, origin = entry.origin().unwrap_or("factory"), "Furnishing from factory");
            entry.produce::<T>(ctx)?
        }
        None => {
            trace!(ty = %key, "Furnishing structurally");
            let (inner, _frame) = ctx.with_frame(*key)?;
            T::furnish_new(&inner).map_err(|e| registry.explain_unsupported(e, key))?
        }
    };

    post_construct(ctx, key, &mut value)?;
    Ok(value)
}

fn furnish_in_place<T: Furnish>(ctx: &Context, key: &TypeKey, target: &mut T) -> Result<()> {
    let registry = ctx.registry().ok_or(Error::NoResolver)?;

    match registry.select(key)? {
        Some(entry) => {
            trace!(ty = %key, origin = entry.origin().unwrap_or("factory"), "Furnishing from factory");
            *target = entry.produce::<T>(ctx)?;
        }
        None => {
            trace!(ty = %key, "Furnishing structurally in place");
            let (inner, _frame) = ctx.with_frame(*key)?;
            target
                .furnish_in_place(&inner)
                .map_err(|e| registry.explain_unsupported(e, key))?;
        }
    }

    post_construct(ctx, key, target)
}

fn post_construct<T: Furnish>(ctx: &Context, key: &TypeKey, value: &mut T) -> Result<()> {
    if let Some(method) = T::POST_CONSTRUCT {
        trace!(ty = %key, method, "Running post-construct hook");
    }
    value.post_construct(ctx)
}

/// The current context, when `T` is [`Context`].
fn self_reference<T: 'static>(ctx: &Context) -> Option<T> {
    if TypeId::of::<T>() != TypeId::of::<Context>() {
        return None;
    }

    let boxed: Box<dyn Any> = Box::new(ctx.clone());
    boxed.downcast::<T>().ok().map(|this| *this)
}

/// All values the installed factories assignable to `T` produce, in
/// registration order.
pub(crate) fn collect<T: 'static>(ctx: &Context, registry: &Registry) -> Result<Vec<T>> {
    let key = TypeKey::of::<T>();
    let entries = registry.find(&key);
    trace!(ty = %key, count = entries.len(), "Furnishing sequence");

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.produce::<T>(ctx).map_err(|e| Error::element(index, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::Configuration;

    #[derive(Debug, PartialEq)]
    struct Port(u16);

    impl Furnish for Port {}

    #[derive(Debug, Default)]
    struct Counted {
        hooks: usize,
    }

    impl Furnish for Counted {
        const POST_CONSTRUCT: Option<&'static str> = Some("count");

        fn furnish_new(_: &Context) -> Result<Self> {
            Ok(Counted::default())
        }

        fn post_construct(&mut self, _: &Context) -> Result<()> {
            self.hooks += 1;
            Ok(())
        }
    }

    #[test]
    fn resolve_without_configuration() {
        let err = resolve::<Port>(&Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResolver);
        assert!(err.to_string().starts_with("furnishing"));
    }

    #[test]
    fn resolve_single_factory() {
        let mut config = Configuration::new();
        config.factory(|_| Ok(Port(8080)));
        let ctx = config.install(&Context::new());

        assert_eq!(resolve::<Port>(&ctx).unwrap(), Port(8080));
    }

    #[test]
    fn factory_runs_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut config = Configuration::new();
        config.factory(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Port(1))
        });
        let ctx = config.install(&Context::new());

        resolve::<Port>(&ctx).unwrap();
        resolve::<Port>(&ctx).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ambiguous_factories_are_rejected() {
        let mut config = Configuration::new();
        config.factory(|_| Ok(Port(1)));
        config.factory(|_| Ok(Port(2)));
        let ctx = config.install(&Context::new());

        let err = resolve::<Port>(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousFactory);
        assert!(err.to_string().contains("2 candidates"));
    }

    #[test]
    fn factory_error_propagates() {
        #[derive(Debug, thiserror::Error)]
        #[error("port exhausted")]
        struct Exhausted;

        let mut config = Configuration::new();
        config.factory::<Port, _>(|_| Err(Error::failed(Exhausted)));
        let ctx = config.install(&Context::new());

        let err = resolve::<Port>(&ctx).unwrap_err();
        assert!(err.downcast_ref::<Exhausted>().is_some());
        assert!(err.to_string().contains("port exhausted"));
    }

    #[test]
    fn unsupported_type_suggests_registered_types() {
        struct PortNumber;
        impl Furnish for PortNumber {}

        let mut config = Configuration::new();
        config.factory(|_| Ok(Port(1)));
        let ctx = config.install(&Context::new());

        let err = resolve::<PortNumber>(&ctx).err().unwrap();
        match err.root() {
            Error::UnsupportedType(e) => {
                assert!(e.suggestions.iter().any(|s| s.ends_with("Port")));
            }
            other => panic!("Expected UnsupportedType, got: {other:?}"),
        }
    }

    #[test]
    fn circular_factories_are_reported() {
        let mut config = Configuration::new();
        config.factory(|ctx| Ok(Port(resolve::<u32>(ctx)? as u16)));
        config.factory(|ctx| Ok(resolve::<Port>(ctx)?.0 as u32));
        let ctx = config.install(&Context::new());

        let err = resolve::<Port>(&ctx).unwrap_err();
        match err.root() {
            Error::CircularDependency(e) => {
                assert_eq!(
                    e.chain,
                    vec![TypeKey::of::<Port>(), TypeKey::of::<u32>(), TypeKey::of::<Port>()]
                );
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn recursive_structure_is_reported() {
        struct Chain(Option<Box<Chain>>);

        impl Furnish for Chain {
            fn furnish_new(ctx: &Context) -> Result<Self> {
                Ok(Chain(resolve(ctx)?))
            }
        }

        let ctx = Configuration::new().install(&Context::new());
        let err = resolve::<Chain>(&ctx).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CircularDependency);
    }

    #[test]
    fn context_resolves_to_itself() {
        #[derive(Clone, Debug, PartialEq)]
        struct Marker(u8);

        let ctx = Configuration::new()
            .install(&Context::new())
            .with_value(Marker(9));
        let this: Context = resolve(&ctx).unwrap();
        assert_eq!(this.value::<Marker>(), Some(&Marker(9)));

        // No configuration needed for the self reference.
        assert!(resolve::<Context>(&Context::new()).is_ok());
    }

    #[test]
    fn post_construct_runs_on_every_path() {
        let ctx = Configuration::new().install(&Context::new());
        let structural: Counted = resolve(&ctx).unwrap();
        assert_eq!(structural.hooks, 1);

        let mut config = Configuration::new();
        config.factory(|_| Ok(Counted { hooks: 10 }));
        let ctx = config.install(&Context::new());
        let produced: Counted = resolve(&ctx).unwrap();
        assert_eq!(produced.hooks, 11);

        let mut existing = Counted { hooks: 100 };
        resolve_into(&Configuration::new().install(&Context::new()), &mut existing).unwrap();
        assert_eq!(existing.hooks, 1);
    }

    #[test]
    fn resolve_into_replaces_with_factory_value() {
        let mut config = Configuration::new();
        config.factory(|_| Ok(Port(443)));
        let ctx = config.install(&Context::new());

        let mut port = Port(0);
        resolve_into(&ctx, &mut port).unwrap();
        assert_eq!(port, Port(443));
    }

    #[test]
    fn resolve_args_in_declaration_order() {
        let mut config = Configuration::new();
        config.value(7u32);
        config.factory(|_| Ok(Port(80)));
        let ctx = config.install(&Context::new());

        let (port, n, this): (Port, u32, Context) = resolve_args(&ctx).unwrap();
        assert_eq!(port, Port(80));
        assert_eq!(n, 7);
        assert!(this.is_installed());
    }

    #[test]
    fn resolve_args_reports_failing_position() {
        let mut config = Configuration::new();
        config.value(7u32);
        let ctx = config.install(&Context::new());

        let err = resolve_args::<(u32, Port)>(&ctx).unwrap_err();
        match err {
            Error::Argument { index, ty, .. } => {
                assert_eq!(index, 1);
                assert_eq!(ty, TypeKey::of::<Port>());
            }
            other => panic!("Expected Argument, got: {other:?}"),
        }
    }
}
