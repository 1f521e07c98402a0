//! Invoking functions with furnished arguments.
//!
//! [`call`] is the one primitive behind every "resolve the parameters, then
//! invoke" operation: provider members, post-construct hooks and the
//! function-pointer structural rule all go through it (or through
//! [`invoke_method`], its receiver-taking form).

use tracing::trace;

use crate::context::Context;
use crate::error::{BoxError, Error, Result};
use crate::furnisher::{Furnish, resolve};
use crate::key::TypeKey;

/// A tuple of parameter types that can be furnished together.
///
/// Implemented for tuples of up to six [`Furnish`] types. Elements are
/// furnished in declaration order and stop at the first failure.
pub trait FurnishArgs: Sized {
    /// Parameter types, in declaration order.
    fn signature() -> Vec<TypeKey>;

    fn furnish_args(ctx: &Context) -> Result<Self>;
}

/// How a callable's return value maps onto success or failure.
///
/// `()` always succeeds. `Result<T, E>` surfaces `E` as the failure.
pub trait Outcome {
    type Value;

    fn into_result(self) -> Result<Self::Value>;
}

impl Outcome for () {
    type Value = ();

    fn into_result(self) -> Result<()> {
        Ok(())
    }
}

impl<T, E: Into<BoxError>> Outcome for Result<T, E> {
    type Value = T;

    fn into_result(self) -> Result<T> {
        self.map_err(Error::failed)
    }
}

/// A function taking the parameter tuple `Args`.
pub trait Callable<Args> {
    type Output;

    fn call_with(&self, args: Args) -> Self::Output;
}

/// A function taking `&mut S` followed by the parameter tuple `Args`.
pub trait MethodCallable<S, Args> {
    type Output;

    fn call_with(&self, receiver: &mut S, args: Args) -> Self::Output;
}

/// Furnishes the parameters of `f`, invokes it and interprets its result.
///
/// # Examples
/// ```
/// use furnish_container::prelude::*;
///
/// let mut config = Configuration::new();
/// config.value(2u32);
/// config.value(20u32 as u64);
/// let ctx = config.install(&Context::new());
///
/// let total = call(&ctx, &|a: u32, b: u64| -> Result<u64> { Ok(a as u64 + b) }).unwrap();
/// assert_eq!(total, 22);
/// ```
pub fn call<Args, F>(ctx: &Context, f: &F) -> Result<<F::Output as Outcome>::Value>
where
    Args: FurnishArgs,
    F: Callable<Args>,
    F::Output: Outcome,
{
    trace!(params = Args::signature().len(), "Calling with furnished arguments");
    let args = Args::furnish_args(ctx)?;
    f.call_with(args).into_result()
}

/// Like [`call`], with `target` passed as the receiver.
pub fn invoke_method<S, Args, M>(
    ctx: &Context,
    target: &mut S,
    method: &M,
) -> Result<<M::Output as Outcome>::Value>
where
    Args: FurnishArgs,
    M: MethodCallable<S, Args>,
    M::Output: Outcome,
{
    trace!(
        receiver = std::any::type_name::<S>(),
        params = Args::signature().len(),
        "Invoking method with furnished arguments"
    );
    let args = Args::furnish_args(ctx)?;
    method.call_with(target, args).into_result()
}

macro_rules! impl_arity {
    ($($arg:ident $idx:tt),*) => {
        impl<$($arg: Furnish),*> FurnishArgs for ($($arg,)*) {
            fn signature() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$arg>()),*]
            }

            #[allow(unused_variables)]
            fn furnish_args(ctx: &Context) -> Result<Self> {
                Ok(($(
                    resolve::<$arg>(ctx)
                        .map_err(|e| Error::argument($idx, TypeKey::of::<$arg>(), e))?,
                )*))
            }
        }

        impl<F, R, $($arg),*> Callable<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R,
        {
            type Output = R;

            #[allow(non_snake_case)]
            fn call_with(&self, ($($arg,)*): ($($arg,)*)) -> R {
                self($($arg),*)
            }
        }

        impl<F, S, R, $($arg),*> MethodCallable<S, ($($arg,)*)> for F
        where
            F: Fn(&mut S, $($arg),*) -> R,
        {
            type Output = R;

            #[allow(non_snake_case)]
            fn call_with(&self, receiver: &mut S, ($($arg,)*): ($($arg,)*)) -> R {
                self(receiver, $($arg),*)
            }
        }

        // Function pointers are the callable structural rule: furnishing
        // one calls it.
        impl<R, $($arg),*> Furnish for fn($($arg),*) -> R
        where
            R: Outcome + 'static,
            $($arg: Furnish,)*
        {
            fn furnish_in_place(&mut self, ctx: &Context) -> Result<()> {
                let f = *self;
                call(ctx, &f).map(drop)
            }
        }
    };
}

impl_arity!();
impl_arity!(A1 0);
impl_arity!(A1 0, A2 1);
impl_arity!(A1 0, A2 1, A3 2);
impl_arity!(A1 0, A2 1, A3 2, A4 3);
impl_arity!(A1 0, A2 1, A3 2, A4 3, A5 4);
impl_arity!(A1 0, A2 1, A3 2, A4 3, A5 4, A6 5);

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::Configuration;

    #[derive(Debug, thiserror::Error)]
    #[error("refused")]
    struct Refused;

    fn installed() -> Context {
        let mut config = Configuration::new();
        config.value(5u8);
        config.value(String::from("five"));
        config.install(&Context::new())
    }

    #[test]
    fn signature_lists_parameters() {
        assert_eq!(
            <(u8, String)>::signature(),
            vec![TypeKey::of::<u8>(), TypeKey::of::<String>()]
        );
        assert!(<()>::signature().is_empty());
    }

    #[test]
    fn call_unit_returning_closure() {
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();
        let ctx = installed();

        call(&ctx, &move |n: u8| {
            sink.store(n as usize, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn call_surfaces_callable_error() {
        let ctx = installed();
        let err = call(&ctx, &|_: String| -> std::result::Result<(), Refused> { Err(Refused) })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Failed);
        assert!(err.downcast_ref::<Refused>().is_some());
    }

    #[test]
    fn call_fails_before_invoking_on_missing_argument() {
        let ctx = installed();
        let invoked = AtomicUsize::new(0);

        let err = call(&ctx, &|_: u8, _: u16| {
            invoked.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap_err();

        assert!(matches!(err, Error::Argument { index: 1, .. }));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invoke_method_passes_receiver() {
        #[derive(Default)]
        struct Greeting {
            text: String,
        }

        impl Greeting {
            fn inject(&mut self, name: String, times: u8) {
                self.text = name.repeat(times as usize);
            }
        }

        let ctx = installed();
        let mut greeting = Greeting::default();
        invoke_method(&ctx, &mut greeting, &Greeting::inject).unwrap();
        assert_eq!(greeting.text, "five".repeat(5));
    }

    #[test]
    fn function_pointer_is_called_when_furnished() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        fn record(n: u8) -> std::result::Result<(), Refused> {
            CALLS.fetch_add(n as usize, Ordering::SeqCst);
            Ok(())
        }

        fn refuse(_: String) -> std::result::Result<(), Refused> {
            Err(Refused)
        }

        let ctx = installed();

        let mut f: fn(u8) -> std::result::Result<(), Refused> = record;
        crate::furnisher::resolve_into(&ctx, &mut f).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 5);

        let mut g: fn(String) -> std::result::Result<(), Refused> = refuse;
        let err = crate::furnisher::resolve_into(&ctx, &mut g).unwrap_err();
        assert!(err.downcast_ref::<Refused>().is_some());
    }
}
