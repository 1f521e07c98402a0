//! [`Furnish`] for standard library types.
//!
//! - `Option<T>` and `Box<T>` are pointer-like: the referent is allocated
//!   when absent, then furnished.
//! - `Vec<T>` collects one element per factory assignable to `T`.
//! - Primitives, strings, `Arc<T>` and [`Context`] have no structural rule
//!   and come from factories only.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::furnisher::{self, Furnish, resolve, resolve_into};

impl<T: Furnish> Furnish for Option<T> {
    fn furnish_new(ctx: &Context) -> Result<Self> {
        resolve::<T>(ctx).map(Some)
    }

    fn furnish_in_place(&mut self, ctx: &Context) -> Result<()> {
        match self {
            Some(value) => resolve_into(ctx, value),
            None => {
                *self = Some(resolve::<T>(ctx)?);
                Ok(())
            }
        }
    }
}

impl<T: Furnish> Furnish for Box<T> {
    fn furnish_new(ctx: &Context) -> Result<Self> {
        resolve::<T>(ctx).map(Box::new)
    }

    fn furnish_in_place(&mut self, ctx: &Context) -> Result<()> {
        resolve_into(ctx, self.as_mut())
    }
}

impl<T: Send + Sync + 'static> Furnish for Vec<T> {
    fn furnish_new(ctx: &Context) -> Result<Self> {
        let registry = ctx.registry().ok_or(Error::NoResolver)?;
        furnisher::collect(ctx, registry)
    }
}

impl<T: ?Sized + Send + Sync + 'static> Furnish for Arc<T> {}

impl Furnish for Context {}

macro_rules! opaque {
    ($($ty:ty),* $(,)?) => {
        $(impl Furnish for $ty {})*
    };
}

opaque!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, &'static str, std::time::Duration, std::path::PathBuf,
);
