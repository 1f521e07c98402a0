//! Capability markers attached to catalog entries.
//!
//! A marker is a zero-sized type naming a role. Catalog filters select
//! entries by the markers they carry, so "every type playing role X" is a
//! query instead of a hand-maintained list.

/// A role a catalog entry can declare.
///
/// # Examples
/// ```
/// use furnish_container::prelude::*;
///
/// struct Plugin;
/// impl Marker for Plugin {}
///
/// struct Audit;
/// impl Furnish for Audit {}
/// impl Service for Audit {}
///
/// let catalog = TypeCatalog::new();
/// catalog.register_type(TypeEntry::service::<Audit>().with_marker::<Plugin>());
/// assert_eq!(catalog.list_types(&[assignable_to::<Plugin>()]).len(), 1);
/// ```
pub trait Marker: Send + Sync + 'static {}

/// Carried by every entry built with `TypeEntry::service`.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRole;

impl Marker for ServiceRole {}

/// Carried by every entry built with `TypeEntry::provider`.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRole;

impl Marker for ProviderRole {}
