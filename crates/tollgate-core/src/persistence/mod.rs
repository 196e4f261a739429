//! Persistence
//!
//! Batch writers for usage reports. A [`PersistenceProvider`] is one backend
//! strategy; [`PersistenceService`] wraps a provider and absorbs its failures;
//! [`LazyPersistence`] defers building the service until the first flush and
//! guarantees it is built at most once.

mod bigquery;
mod factory;
mod provider;
mod service;
mod sqlite;

#[cfg(test)]
mod tests;

pub use bigquery::BigQueryProvider;
pub use factory::{PersistenceFactory, ProviderKind};
#[cfg(test)]
pub use provider::MockPersistenceProvider;
pub use provider::{BatchOutcome, PersistenceProvider, RowError};
pub use service::{LazyPersistence, PersistenceService};
pub use sqlite::SqliteProvider;
