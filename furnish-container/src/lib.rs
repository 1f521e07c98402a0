//! Core container implementation for furnish.
//!
//! ```text
//! TypeCatalog ──Loader──> Configuration ──install()──> Context ──resolve::<T>()──> T
//!                                                        │
//!                                                  scope::enter()
//! ```

pub mod call;
pub mod catalog;
pub mod context;
pub mod error;
pub mod furnisher;
pub mod key;
pub mod loader;
pub mod marker;
mod path;
pub mod provider;
pub mod registry;
pub mod scope;
mod shapes;

pub use context::Context;
pub use error::{BoxError, Error, ErrorKind, Result};
pub use furnisher::{Furnish, resolve, resolve_args, resolve_into};
pub use key::{TypeDescriptor, TypeKey};
pub use registry::Configuration;
pub use scope::Scope;

/// Everything needed to configure, load and resolve.
pub mod prelude {
    pub use crate::call::{FurnishArgs, Outcome, call, invoke_method};
    pub use crate::catalog::{
        Filter, TypeCatalog, TypeEntry, assignable_to, assignable_to_key, in_package,
    };
    pub use crate::context::Context;
    pub use crate::error::{BoxError, Error, ErrorKind, Result};
    pub use crate::furnisher::{Furnish, resolve, resolve_args, resolve_into};
    pub use crate::key::{TypeDescriptor, TypeKey};
    pub use crate::loader::{Loader, load_services};
    pub use crate::marker::{Marker, ProviderRole, ServiceRole};
    pub use crate::provider::{Members, Provider, Service};
    pub use crate::registry::{Configuration, FieldOrder, Settings};
    pub use crate::scope::{self, Close, Scope, ScopedValue};
}

/// Support for `#[derive(Furnish)]` and [`submit_type!`]. Not public API.
#[doc(hidden)]
pub mod __private {
    pub use inventory;

    use crate::error::{Error, Result};

    /// Unwraps a field slot the derived `furnish_new` filled.
    pub fn filled<T: 'static>(slot: Option<T>, field: &'static str) -> Result<T> {
        slot.ok_or_else(|| Error::field(field, Error::unsupported::<T>()))
    }
}

/// Adds a [`TypeEntry`](catalog::TypeEntry) to the
/// [`global`](catalog::global) catalog at link time.
///
/// ```
/// use furnish_container::prelude::*;
/// use furnish_container::submit_type;
///
/// struct Audit;
/// impl Furnish for Audit {}
/// impl Service for Audit {}
///
/// submit_type!(TypeEntry::service::<Audit>().in_scope("request"));
///
/// let found = furnish_container::catalog::list_types(&[assignable_to::<ServiceRole>()]);
/// assert!(found.iter().any(|e| e.key() == TypeKey::of::<Audit>()));
/// ```
#[macro_export]
macro_rules! submit_type {
    ($entry:expr) => {
        $crate::__private::inventory::submit! {
            $crate::catalog::Submission::new(|| $entry)
        }
    };
}
