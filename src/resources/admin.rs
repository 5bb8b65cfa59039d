//! Administrative query interface seams
//!
//! `AdminConnector` opens sessions; `AdminSession` runs statements and catalog
//! lookups on one database. The production implementation lives in
//! `postgres_client`; tests substitute recording fakes.

use std::time::Duration;

use async_trait::async_trait;

use crate::resources::postgres_client::{PostgresClientError, PostgresClientResult};

/// Opens a new administrative session scoped to one database
#[async_trait]
pub trait AdminConnector: Send + Sync {
    async fn connect(&self, database: &str) -> PostgresClientResult<Box<dyn AdminSession>>;
}

/// One open administrative session
///
/// A session is owned by a single caller and is consumed by `close`.
#[async_trait]
pub trait AdminSession: Send + Sync {
    /// Run a statement that returns no rows
    async fn execute(&self, statement: &str) -> PostgresClientResult<()>;

    /// Look up a database by name in `pg_database`
    async fn database_exists(&self, name: &str) -> PostgresClientResult<bool>;

    /// Return which of `names` are present in `pg_extension`, sorted
    async fn installed_extensions(&self, names: &[String]) -> PostgresClientResult<Vec<String>>;

    async fn close(self: Box<Self>) -> PostgresClientResult<()>;
}

/// Open a session, failing with `Timeout` if the connector does not answer within `timeout`
pub async fn connect_with_timeout(
    connector: &dyn AdminConnector,
    database: &str,
    timeout: Duration,
) -> PostgresClientResult<Box<dyn AdminSession>> {
    match tokio::time::timeout(timeout, connector.connect(database)).await {
        Ok(result) => result,
        Err(_) => Err(PostgresClientError::Timeout(timeout)),
    }
}
