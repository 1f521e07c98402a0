//! Loading catalogued services and providers into a [`Configuration`].
//!
//! The loader runs two passes over a [`TypeCatalog`]: every entry with
//! [`ServiceRole`] gets a scope-cached service factory, then every entry
//! with [`ProviderRole`] gets its service factory plus one factory per
//! member. The first failure stops loading.

use tracing::{debug, info, instrument};

use crate::catalog::{self, TypeCatalog, TypeEntry, assignable_to};
use crate::error::{BadProviderError, Error, Result};
use crate::marker::{ProviderRole, ServiceRole};
use crate::registry::{Configuration, FactoryEntry};

/// Registers a catalog's services and providers.
#[derive(Debug, Clone, Copy)]
pub struct Loader<'a> {
    catalog: &'a TypeCatalog,
}

impl<'a> Loader<'a> {
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self { catalog }
    }

    /// Loads services first, then providers.
    ///
    /// # Errors
    /// The first [`Error::NotAService`] or [`Error::BadProvider`]
    /// encountered; entries before it stay registered.
    #[instrument(skip_all, name = "loader_load")]
    pub fn load(&self, config: &mut Configuration) -> Result<()> {
        let services = self.catalog.list_types(&[assignable_to::<ServiceRole>()]);
        for entry in &services {
            add_service_factory(config, entry)?;
        }

        let providers = self.catalog.list_types(&[assignable_to::<ProviderRole>()]);
        for entry in &providers {
            add_provider_factories(config, entry)?;
        }

        info!(
            services = services.len(),
            providers = providers.len(),
            factories = config.len(),
            "Loaded catalog"
        );
        Ok(())
    }
}

/// Loads the [`global`](catalog::global) catalog.
pub fn load_services(config: &mut Configuration) -> Result<()> {
    Loader::new(catalog::global()).load(config)
}

/// Registers the scope-cached factory for the service `entry` describes.
///
/// Requesting the produced handle (or a type it is assignable to) then
/// retrieves the entry's scope, fails with [`Error::MissingScope`] if it
/// is not entered, and otherwise returns the instance cached there,
/// building and furnishing it on first use.
///
/// # Errors
/// [`Error::NotAService`] if the entry has no service capability.
pub fn add_service_factory(config: &mut Configuration, entry: &TypeEntry) -> Result<()> {
    let bind = entry
        .service_binder()
        .ok_or(Error::NotAService { ty: entry.key() })?;

    debug!(service = %entry.key(), scope = entry.scope(), "Adding service factory");
    config.add_entry(
        FactoryEntry::new(entry.produced().clone(), bind(entry))
            .with_origin(format!("service {}", entry.key().short_name())),
    );
    Ok(())
}

/// Registers provider `entry` as a service and each member as a factory.
///
/// Every member is checked before anything is registered.
///
/// # Errors
/// [`Error::NotAService`] if the entry is not a provider,
/// [`Error::BadProvider`] if a member cannot act as a factory.
pub fn add_provider_factories(config: &mut Configuration, entry: &TypeEntry) -> Result<()> {
    let collect = entry
        .provider_binder()
        .ok_or(Error::NotAService { ty: entry.key() })?;
    let members = collect();

    for member in &members {
        member.shape.check().map_err(|reason| {
            Error::BadProvider(BadProviderError {
                provider: entry.key(),
                member: member.name,
                reason,
            })
        })?;
    }

    add_service_factory(config, entry)?;

    let provider = entry.key().short_name();
    for member in members {
        debug!(provider = %entry.key(), member = member.name, produces = %member.produced.key(), "Adding provider member factory");
        config.add_entry(
            FactoryEntry::new(member.produced, member.factory)
                .with_origin(format!("{provider}::{}", member.name)),
        );
    }
    Ok(())
}
