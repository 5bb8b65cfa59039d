//! SQL used by the initializer
//!
//! Statement builders plus the idempotent "ensure" helpers that run them over an
//! `AdminSession`. Identifiers are validated before use and always quoted.

use tracing::debug;

use crate::resources::admin::AdminSession;
use crate::resources::postgres_client::PostgresClientResult;

/// Parameterized existence check against the database catalog
pub const DATABASE_EXISTS_QUERY: &str = "SELECT 1 FROM pg_database WHERE datname = $1";

/// Parameterized lookup of installed extensions, restricted to the names in `$1`
pub const EXTENSION_CATALOG_QUERY: &str =
    "SELECT extname FROM pg_extension WHERE extname = ANY($1) ORDER BY extname";

/// `CREATE DATABASE` for a single database (not idempotent on its own)
pub fn create_database_statement(database_name: &str) -> String {
    format!("CREATE DATABASE {}", quote_identifier(database_name))
}

/// `CREATE EXTENSION IF NOT EXISTS` for a single extension
pub fn create_extension_statement(extension_name: &str) -> String {
    format!(
        "CREATE EXTENSION IF NOT EXISTS {}",
        quote_identifier(extension_name)
    )
}

/// Ensure a database exists (idempotent - creates if not exists)
///
/// Returns true if the database was created, false if it already existed.
pub async fn ensure_database(
    session: &dyn AdminSession,
    database_name: &str,
) -> PostgresClientResult<bool> {
    if session.database_exists(database_name).await? {
        debug!(database = %database_name, "Database already exists");
        return Ok(false);
    }

    debug!(database = %database_name, "Creating database");
    session
        .execute(&create_database_statement(database_name))
        .await?;
    Ok(true)
}

/// Ensure an extension is installed in the session's database
pub async fn ensure_extension(
    session: &dyn AdminSession,
    extension_name: &str,
) -> PostgresClientResult<()> {
    debug!(extension = %extension_name, "Installing extension");
    session
        .execute(&create_extension_statement(extension_name))
        .await
}

/// Quote a SQL identifier using PostgreSQL's double-quote escaping
///
/// - `my_table` -> `"my_table"`
/// - `table"name` -> `"table""name"`
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Maximum identifier length PostgreSQL keeps without truncation
const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate that a name is safe for use as a database name
///
/// Starts with a lowercase letter or underscore, followed by lowercase letters,
/// digits, or underscores. Max length 63 characters.
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN {
        return false;
    }

    let mut chars = name.chars();

    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Validate an extension name
///
/// Same rules as `is_valid_identifier`, except hyphens are allowed after the
/// first character (`uuid-ossp`).
pub fn is_valid_extension_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN {
        return false;
    }

    let mut chars = name.chars();

    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
