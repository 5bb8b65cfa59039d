//! Idempotent initializer for the secondary database and its extensions
//!
//! Create and Update run the same "ensure" path:
//!
//! 1. open a session on the admin database (bounded by the connect timeout)
//! 2. create the secondary database only if `pg_database` does not list it
//! 3. close, then open a fresh session on the secondary database
//! 4. `CREATE EXTENSION IF NOT EXISTS` for every required extension
//! 5. confirm the extensions in `pg_extension`
//! 6. close and report success with the confirmed extension list
//!
//! Delete never touches the cluster: database objects outlive the
//! initialization resource so that tearing it down cannot destroy user data.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::controller::error::{Error, InitPhase, Result};
use crate::health::HealthState;
use crate::model::{InitializationOutcome, LifecycleEvent, ResourceProperties};
use crate::resources::admin::{AdminConnector, AdminSession, connect_with_timeout};
use crate::resources::postgres_client::PostgresClientError;
use crate::resources::sql::{self, is_valid_extension_name, is_valid_identifier};

/// Database the admin session connects to before the secondary database exists
pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";
/// Secondary database created for extension-dependent data
pub const DEFAULT_SECONDARY_DATABASE: &str = "pgvector";
/// Extensions required in the secondary database
pub const DEFAULT_EXTENSIONS: &[&str] = &["vector", "uuid-ossp"];
/// Connect timeout for every administrative session
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Initializer settings; lifecycle events may override the database and extensions
#[derive(Debug, Clone)]
pub struct InitializerConfig {
    pub admin_database: String,
    pub secondary_database: String,
    pub extensions: Vec<String>,
    pub connect_timeout: Duration,
}

impl Default for InitializerConfig {
    fn default() -> Self {
        Self {
            admin_database: DEFAULT_ADMIN_DATABASE.to_string(),
            secondary_database: DEFAULT_SECONDARY_DATABASE.to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl InitializerConfig {
    /// Validate the configured names
    pub fn validate(&self) -> Result<()> {
        if self.admin_database.is_empty() {
            return Err(Error::InvalidConfig(
                "admin database name must not be empty".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        Target::resolve(self, &ResourceProperties::default()).map(|_| ())
    }
}

/// Effective secondary database and extension set for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    database: String,
    extensions: Vec<String>,
}

impl Target {
    fn resolve(config: &InitializerConfig, properties: &ResourceProperties) -> Result<Self> {
        let database = properties
            .secondary_database
            .clone()
            .unwrap_or_else(|| config.secondary_database.clone());

        if !is_valid_identifier(&database) {
            return Err(Error::InvalidConfig(format!(
                "invalid secondary database name: {:?}",
                database
            )));
        }
        if database == config.admin_database {
            return Err(Error::InvalidConfig(format!(
                "secondary database must differ from the admin database ({})",
                database
            )));
        }

        let mut extensions = properties
            .extensions
            .clone()
            .unwrap_or_else(|| config.extensions.clone());
        extensions.sort();
        extensions.dedup();

        if extensions.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one required extension must be named".to_string(),
            ));
        }

        if let Some(bad) = extensions.iter().find(|e| !is_valid_extension_name(e)) {
            return Err(Error::InvalidConfig(format!(
                "invalid extension name: {:?}",
                bad
            )));
        }

        Ok(Self {
            database,
            extensions,
        })
    }
}

fn failed_at(phase: InitPhase) -> impl FnOnce(PostgresClientError) -> Error {
    move |source| Error::Initialization { phase, source }
}

async fn close_session(session: Box<dyn AdminSession>, database: &str) {
    if let Err(e) = session.close().await {
        warn!(database, error = %e, "Failed to close administrative session");
    }
}

/// Lifecycle-aware unit that ensures the secondary database and its extensions
pub struct Initializer {
    connector: Arc<dyn AdminConnector>,
    config: InitializerConfig,
    health_state: Option<Arc<HealthState>>,
}

impl Initializer {
    pub fn new(connector: Arc<dyn AdminConnector>, config: InitializerConfig) -> Self {
        Self {
            connector,
            config,
            health_state: None,
        }
    }

    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    pub fn config(&self) -> &InitializerConfig {
        &self.config
    }

    /// Secondary database name in effect for `properties`
    pub fn secondary_database_for(&self, properties: &ResourceProperties) -> String {
        properties
            .secondary_database
            .clone()
            .unwrap_or_else(|| self.config.secondary_database.clone())
    }

    /// Handle a lifecycle event, reporting failures as `Failed` outcomes
    pub async fn invoke(&self, event: &LifecycleEvent) -> InitializationOutcome {
        let outcome = match self.handle(event).await {
            Ok(outcome) => outcome,
            Err(e) => InitializationOutcome::failed(e),
        };

        if let Some(state) = &self.health_state {
            state
                .metrics
                .record_lifecycle(event.request_type().as_str(), outcome.status);
        }
        outcome
    }

    /// Handle a lifecycle event
    ///
    /// Errors are logged with the phase they occurred in and returned; the
    /// caller must report the event as failed.
    #[instrument(skip_all, fields(request_type = %event.request_type()))]
    pub async fn handle(&self, event: &LifecycleEvent) -> Result<InitializationOutcome> {
        match event {
            LifecycleEvent::Delete { .. } => {
                info!("Delete requested, leaving databases and extensions in place");
                Ok(InitializationOutcome::skipped())
            }
            LifecycleEvent::Create { properties } | LifecycleEvent::Update { properties, .. } => {
                match self.ensure(properties).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => {
                        match &e {
                            Error::Initialization { phase, source } => error!(
                                phase = %phase,
                                error = %source,
                                retryable = e.is_retryable(),
                                "Database initialization failed"
                            ),
                            other => error!(error = %other, "Database initialization failed"),
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    async fn connect(&self, database: &str, phase: InitPhase) -> Result<Box<dyn AdminSession>> {
        connect_with_timeout(
            self.connector.as_ref(),
            database,
            self.config.connect_timeout,
        )
        .await
        .map_err(failed_at(phase))
    }

    async fn ensure(&self, properties: &ResourceProperties) -> Result<InitializationOutcome> {
        let target = Target::resolve(&self.config, properties)?;

        let admin = self
            .connect(&self.config.admin_database, InitPhase::ConnectingAdmin)
            .await?;
        let created = sql::ensure_database(admin.as_ref(), &target.database).await;
        close_session(admin, &self.config.admin_database).await;
        let created = created.map_err(failed_at(InitPhase::EnsuringDatabase))?;

        if created {
            info!(database = %target.database, "Created secondary database");
        } else {
            info!(database = %target.database, "Secondary database already exists");
        }

        let session = self
            .connect(&target.database, InitPhase::ConnectingSecondary)
            .await?;
        let confirmed = Self::install_extensions(session.as_ref(), &target.extensions).await;
        close_session(session, &target.database).await;
        let confirmed = confirmed?;

        info!(
            database = %target.database,
            extensions = ?confirmed,
            "Database initialization complete"
        );
        Ok(InitializationOutcome::success(created, confirmed))
    }

    async fn install_extensions(
        session: &dyn AdminSession,
        extensions: &[String],
    ) -> Result<Vec<String>> {
        for extension in extensions {
            info!(extension = %extension, "Installing extension");
            sql::ensure_extension(session, extension)
                .await
                .map_err(failed_at(InitPhase::InstallingExtensions))?;
        }

        let installed = session
            .installed_extensions(extensions)
            .await
            .map_err(failed_at(InitPhase::VerifyingExtensions))?;

        let missing: Vec<String> = extensions
            .iter()
            .filter(|e| !installed.contains(e))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingExtensions(missing));
        }

        Ok(installed)
    }
}
