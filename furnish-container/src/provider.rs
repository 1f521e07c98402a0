//! Service and provider roles.
//!
//! A **service** is a type the loader turns into a scope-cached factory:
//! requesting `Arc<S>` builds one `S` per scope, furnishes it and caches
//! it. A **provider** is a service whose members are factories too, the
//! way a module groups related registrations.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use furnish_container::prelude::*;
//!
//! struct Settings;
//! impl Furnish for Settings {
//!     fn furnish_new(_: &Context) -> Result<Self> { Ok(Settings) }
//! }
//! impl Service for Settings {}
//!
//! impl Provider for Settings {
//!     fn members(members: &mut Members<Self>) {
//!         members.add("port", |_: &Settings| Arc::new(8080u16));
//!     }
//! }
//!
//! let catalog = TypeCatalog::new();
//! catalog.register_type(TypeEntry::provider::<Settings>());
//!
//! let mut config = Configuration::new();
//! Loader::new(&catalog).load(&mut config).unwrap();
//!
//! let ctx = scope::enter(&config.install(&Context::new()), scope::DEFAULT_SCOPE);
//! let port: Arc<u16> = ctx.resolve().unwrap();
//! assert_eq!(*port, 8080);
//! ```

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::call::FurnishArgs;
use crate::catalog::TypeEntry;
use crate::context::Context;
use crate::error::{BoxError, Error, Result};
use crate::furnisher::{Furnish, resolve};
use crate::key::{AnyValue, TypeDescriptor, TypeKey};
use crate::registry::FactoryFn;
use crate::scope::{self, Close, ScopedValue};

/// A type cached per scope and shared as `Arc<Self>`.
///
/// # Closing
///
/// Implementing [`Close`] alone does not register the service for
/// [`Scope::close`](crate::scope::Scope::close): the scope only sees what
/// [`as_closable`](Service::as_closable) returns, and the default returns
/// `None`. Closable services override it:
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use furnish_container::loader::add_service_factory;
/// use furnish_container::prelude::*;
///
/// static CLOSED: AtomicBool = AtomicBool::new(false);
///
/// struct Pool;
/// impl Furnish for Pool {
///     fn furnish_new(_: &Context) -> Result<Self> { Ok(Pool) }
/// }
///
/// impl Close for Pool {
///     fn close(&self) -> std::result::Result<(), BoxError> {
///         CLOSED.store(true, Ordering::SeqCst);
///         Ok(())
///     }
/// }
///
/// impl Service for Pool {
///     fn as_closable(self: Arc<Self>) -> Option<Arc<dyn Close>> {
///         Some(self)
///     }
/// }
///
/// let mut config = Configuration::new();
/// add_service_factory(&mut config, &TypeEntry::service::<Pool>()).unwrap();
/// let ctx = scope::enter(&config.install(&Context::new()), scope::DEFAULT_SCOPE);
///
/// let _pool: Arc<Pool> = ctx.resolve().unwrap();
/// ctx.scope().unwrap().close().unwrap();
/// assert!(CLOSED.load(Ordering::SeqCst));
/// ```
pub trait Service: Furnish {
    /// The release hook run when the owning scope closes.
    ///
    /// Must return `Some(self)` for services implementing [`Close`];
    /// `None` means the scope never closes this service.
    fn as_closable(self: Arc<Self>) -> Option<Arc<dyn Close>> {
        None
    }
}

/// A service whose members are factories.
pub trait Provider: Service {
    /// Declares the members the loader registers.
    fn members(members: &mut Members<Self>);
}

// ============================================================
// Output shapes
// ============================================================

/// One value in a member's return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub key: TypeKey,
    /// The value is error-shaped and cannot be produced as a dependency.
    pub error: bool,
}

impl Output {
    pub fn of<T: ?Sized + 'static>() -> Self {
        let key = TypeKey::of::<T>();
        Self {
            key,
            error: is_error_shaped(&key),
        }
    }
}

/// What a provider member returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Returns nothing.
    Empty,
    /// Returns one value.
    Single(Output),
    /// Returns a value or fails.
    Fallible { value: Output, error: Output },
    /// Returns several values at once.
    Many(Vec<Output>),
}

impl Shape {
    /// Checks the shape can act as a factory, explaining why not otherwise.
    pub fn check(&self) -> std::result::Result<(), String> {
        match self {
            Shape::Single(value) if !value.error => Ok(()),
            Shape::Fallible { value, .. } if value.key.is::<()>() => {
                Err("member returns only an error".to_string())
            }
            Shape::Fallible { value, .. } if !value.error => Ok(()),
            Shape::Fallible { value, .. } => Err(format!(
                "member returns {} where a value is expected",
                value.key
            )),
            Shape::Single(_) => Err("member returns only an error".to_string()),
            Shape::Empty => Err("member returns nothing".to_string()),
            Shape::Many(outputs) => Err(format!("member returns {} values", outputs.len())),
        }
    }
}

/// Types recognised as errors in member return positions.
fn is_error_shaped(key: &TypeKey) -> bool {
    key.is::<Error>()
        || key.is::<BoxError>()
        || key.is::<std::io::Error>()
        || key.is::<std::fmt::Error>()
        || key.is::<Box<dyn std::error::Error>>()
        || key.is::<Box<dyn std::error::Error + Send>>()
}

/// A provider member's return type.
pub trait MemberReturn: 'static {
    type Value: Send + Sync + 'static;

    fn shape() -> Shape;

    fn into_value(self) -> Result<AnyValue>;
}

impl MemberReturn for () {
    type Value = ();

    fn shape() -> Shape {
        Shape::Empty
    }

    fn into_value(self) -> Result<AnyValue> {
        Ok(Box::new(()))
    }
}

impl<T, E> MemberReturn for std::result::Result<T, E>
where
    T: Send + Sync + 'static,
    E: Into<BoxError> + 'static,
{
    type Value = T;

    fn shape() -> Shape {
        Shape::Fallible {
            value: Output::of::<T>(),
            error: Output::of::<E>(),
        }
    }

    fn into_value(self) -> Result<AnyValue> {
        self.map(|value| Box::new(value) as AnyValue)
            .map_err(Error::failed)
    }
}

macro_rules! single_output {
    ($([$($gen:tt)*] $ty:ty),* $(,)?) => {
        $(
            impl<$($gen)*> MemberReturn for $ty {
                type Value = $ty;

                fn shape() -> Shape {
                    Shape::Single(Output::of::<$ty>())
                }

                fn into_value(self) -> Result<AnyValue> {
                    Ok(Box::new(self))
                }
            }
        )*
    };
}

single_output!(
    [] bool, [] char, [] u8, [] u16, [] u32, [] u64, [] u128, [] usize,
    [] i8, [] i16, [] i32, [] i64, [] i128, [] isize, [] f32, [] f64,
    [] String, [] &'static str, [] std::time::Duration, [] std::path::PathBuf,
    [] Error, [] BoxError, [] std::io::Error,
    [T: ?Sized + Send + Sync + 'static] Arc<T>,
    [T: Send + Sync + 'static] Vec<T>,
    [T: Send + Sync + 'static] Option<T>,
);

macro_rules! many_outputs {
    ($($arg:ident),+) => {
        impl<$($arg: Send + Sync + 'static),+> MemberReturn for ($($arg,)+) {
            type Value = ($($arg,)+);

            fn shape() -> Shape {
                Shape::Many(vec![$(Output::of::<$arg>()),+])
            }

            fn into_value(self) -> Result<AnyValue> {
                Ok(Box::new(self))
            }
        }
    };
}

many_outputs!(A1, A2);
many_outputs!(A1, A2, A3);
many_outputs!(A1, A2, A3, A4);

// ============================================================
// Members
// ============================================================

/// A provider member: a function of the provider and furnished parameters.
pub trait MemberFn<P, Args>: Send + Sync + 'static {
    type Output;

    fn call_member(&self, provider: &P, args: Args) -> Self::Output;
}

macro_rules! member_arity {
    ($($arg:ident),*) => {
        impl<F, P, R, $($arg),*> MemberFn<P, ($($arg,)*)> for F
        where
            F: Fn(&P, $($arg),*) -> R + Send + Sync + 'static,
        {
            type Output = R;

            #[allow(non_snake_case)]
            fn call_member(&self, provider: &P, ($($arg,)*): ($($arg,)*)) -> R {
                self(provider, $($arg),*)
            }
        }
    };
}

member_arity!();
member_arity!(A1);
member_arity!(A1, A2);
member_arity!(A1, A2, A3);
member_arity!(A1, A2, A3, A4);
member_arity!(A1, A2, A3, A4, A5);

/// A declared member, ready to be checked and registered.
pub(crate) struct Member {
    pub name: &'static str,
    pub shape: Shape,
    pub produced: TypeDescriptor,
    pub factory: FactoryFn,
}

/// Collects a provider's members.
pub struct Members<P> {
    declared: Vec<Member>,
    _provider: PhantomData<fn() -> P>,
}

impl<P: Provider> Members<P> {
    fn new() -> Self {
        Self {
            declared: Vec::new(),
            _provider: PhantomData,
        }
    }

    /// Declares member `name`.
    ///
    /// The member factory furnishes the provider (as `Arc<P>`) and the
    /// member's parameters, then returns the member's value or its error.
    /// A member named like the provider's post-construct hook is ignored.
    pub fn add<Args, F>(&mut self, name: &'static str, member: F) -> &mut Self
    where
        Args: FurnishArgs + 'static,
        F: MemberFn<P, Args>,
        F::Output: MemberReturn,
    {
        if P::POST_CONSTRUCT == Some(name) {
            debug!(provider = type_name::<P>(), member = name, "Skipping post-construct member");
            return self;
        }

        let factory: FactoryFn = Arc::new(move |ctx: &Context| {
            let provider: Arc<P> = resolve(ctx)?;
            let args = Args::furnish_args(ctx)?;
            trace!(provider = type_name::<P>(), member = name, "Invoking provider member");
            member.call_member(&provider, args).into_value()
        });

        self.declared.push(Member {
            name,
            shape: <F::Output as MemberReturn>::shape(),
            produced: TypeDescriptor::of::<<F::Output as MemberReturn>::Value>(),
            factory,
        });
        self
    }

    /// Declared member names, in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.declared.iter().map(|m| m.name).collect()
    }

    pub(crate) fn collect() -> Vec<Member> {
        let mut members = Members::<P>::new();
        P::members(&mut members);
        members.declared
    }
}

impl<P> fmt::Debug for Members<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.declared.iter().map(|m| (m.name, &m.shape)))
            .finish()
    }
}

// ============================================================
// Service factories
// ============================================================

/// Builds the scope-cached factory for service `S` described by `entry`.
pub(crate) fn service_factory<S: Service>(entry: &TypeEntry) -> FactoryFn {
    let scope_name = entry.scope().to_string();
    Arc::new(move |ctx: &Context| Ok(Box::new(furnish_service::<S>(ctx, &scope_name)?) as AnyValue))
}

fn furnish_service<S: Service>(ctx: &Context, scope_name: &str) -> Result<Arc<S>> {
    let key = TypeKey::of::<Arc<S>>();
    let scope = scope::retrieve(ctx, scope_name).ok_or_else(|| Error::MissingScope {
        scope: scope_name.to_string(),
        service: key,
    })?;

    if let Some(cached) = scope.get(&key).and_then(|value| value.downcast::<Arc<S>>()) {
        trace!(service = %key, scope = scope.name(), "Service cache hit");
        return Ok(cached);
    }

    // The factory invocation already put `Arc<S>` on the resolution path,
    // so a cycle fails there instead of re-entering this slot's `ensure`.
    let cached = scope.ensure(key, || {
        let instance = Arc::new(resolve::<S>(ctx)?);
        let value = ScopedValue::new(instance.clone());
        Ok(match instance.as_closable() {
            Some(closer) => value.closable(closer),
            None => value,
        })
    })?;

    cached.downcast::<Arc<S>>().ok_or(Error::TypeMismatch {
        expected: key,
        declared: key,
    })
}

/// Members of provider `P`, for the loader.
pub(crate) fn provider_members<P: Provider>() -> Vec<Member> {
    Members::<P>::collect()
}
