//! Request-scoped services on top of an application scope.
//!
//! Run with `RUST_LOG=furnish_container=debug cargo run --example request_scope`
//! to watch scopes being entered, services created and closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use furnish::Furnish;
use furnish::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub trait Repository: Send + Sync {
    fn find(&self, id: u32) -> Option<String>;
}

/// Application-wide: one per process.
#[derive(Furnish)]
pub struct Database {
    pub url: Arc<str>,
}

impl Service for Database {}

impl Database {
    fn users(&self) -> Vec<String> {
        vec!["ada".into(), "grace".into()]
    }
}

/// Per request: borrows the database, closed when the request ends.
#[derive(Furnish)]
#[furnish(post_construct = "inject")]
pub struct Transaction {
    pub db: Arc<Database>,
    number: usize,
}

static TRANSACTIONS: AtomicUsize = AtomicUsize::new(0);

impl Transaction {
    fn inject(&mut self) {
        self.number = TRANSACTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    }
}

impl Repository for Transaction {
    fn find(&self, id: u32) -> Option<String> {
        self.db.users().get(id as usize).cloned()
    }
}

impl Close for Transaction {
    fn close(&self) -> Result<(), BoxError> {
        info!(number = self.number, url = %self.db.url, "Committing transaction");
        Ok(())
    }
}

impl Service for Transaction {
    fn as_closable(self: Arc<Self>) -> Option<Arc<dyn Close>> {
        Some(self)
    }
}

#[derive(Furnish)]
pub struct Handler {
    pub repo: Arc<dyn Repository>,
    pub db: Arc<Database>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("furnish_container=info".parse()?),
        )
        .init();

    let catalog = TypeCatalog::new();
    catalog.register_type(TypeEntry::service::<Database>());
    catalog.register_type(
        TypeEntry::service::<Transaction>()
            .in_scope("request")
            .assignable_to(|t: Arc<Transaction>| t as Arc<dyn Repository>),
    );

    let mut config = Configuration::new();
    config.value(Arc::<str>::from("postgres://localhost/app"));
    Loader::new(&catalog).load(&mut config)?;

    let app = scope::enter(&config.install(&Context::new()), scope::DEFAULT_SCOPE);

    for id in 0..3 {
        let request = scope::enter(&app, "request");
        let handler: Handler = request.resolve()?;

        match handler.repo.find(id) {
            Some(user) => info!(id, %user, "Found user"),
            None => info!(id, "No such user"),
        }

        if let Some(scope) = scope::retrieve(&request, "request") {
            scope.close()?;
        }
    }

    let db: Arc<Database> = app.resolve()?;
    info!(
        strong = Arc::strong_count(&db),
        transactions = TRANSACTIONS.load(Ordering::SeqCst),
        "Done"
    );
    Ok(())
}
