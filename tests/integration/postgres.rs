//! Live PostgreSQL helpers for integration tests

use std::sync::Arc;
use std::time::Duration;

use pg_bootstrap::controller::{Initializer, InitializerConfig};
use pg_bootstrap::model::{ClusterEndpoint, CredentialRef};
use pg_bootstrap::resources::admin::AdminConnector;
use pg_bootstrap::resources::postgres_client::PostgresConnector;
use pg_bootstrap::resources::sql::quote_identifier;

/// Connection timeout used by every integration test
pub const TEST_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Initialize test logging once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,pg_bootstrap=debug,tokio_postgres=warn")
        .with_test_writer()
        .try_init();
}

/// Endpoint from DB_HOST/DB_PORT with credentials from DB_USER/DB_PASSWORD
pub fn test_endpoint() -> ClusterEndpoint {
    let host = std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("DB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5432);
    ClusterEndpoint::new(host, port, CredentialRef::default())
}

pub fn test_connector() -> Arc<dyn AdminConnector> {
    Arc::new(PostgresConnector::new(test_endpoint(), TEST_CONNECT_TIMEOUT))
}

/// Unique secondary database name for one test
pub fn unique_database(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    format!("{}_{}", prefix, nanos)
}

pub fn initializer_for_database(database: &str) -> Initializer {
    Initializer::new(
        test_connector(),
        InitializerConfig {
            secondary_database: database.to_string(),
            ..Default::default()
        },
    )
}

/// Drop a database created by a test
pub async fn drop_database(database: &str) {
    let session = test_connector()
        .connect("postgres")
        .await
        .expect("Failed to connect for cleanup");
    session
        .execute(&format!(
            "DROP DATABASE IF EXISTS {} WITH (FORCE)",
            quote_identifier(database)
        ))
        .await
        .expect("Failed to drop test database");
    session.close().await.expect("Failed to close session");
}

/// Installed extensions in `database` out of `names`
pub async fn extensions_in(database: &str, names: &[&str]) -> Vec<String> {
    let session = test_connector()
        .connect(database)
        .await
        .expect("Failed to connect to test database");
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let installed = session
        .installed_extensions(&names)
        .await
        .expect("Failed to query extension catalog");
    session.close().await.expect("Failed to close session");
    installed
}
