//! Command-line and environment configuration
//!
//! Every policy constant can be overridden by a flag or its environment
//! variable. The defaults match a cluster with a `main` primary database and a
//! `pgvector` secondary database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::controller::{
    BackoffConfig, DEFAULT_ADMIN_DATABASE, DEFAULT_SECONDARY_DATABASE, Error, InitializerConfig,
    ReadinessGate, ReadinessProbe, Result,
};
use crate::health::HEALTH_PORT;
use crate::model::{
    ClusterEndpoint, CredentialRef, DEFAULT_PASSWORD_VAR, DEFAULT_USERNAME_VAR, StepPlan,
    WriterActiveMarker,
};
use crate::resources::admin::AdminConnector;
use crate::resources::postgres_client::{PostgresConnector, TlsMode};
use crate::trigger::TRIGGER_PORT;

/// Default primary database created with the cluster
pub const DEFAULT_PRIMARY_DATABASE: &str = "main";
/// Default path to the trigger server TLS certificate
pub const TRIGGER_CERT_PATH: &str = "/etc/pg-bootstrap/certs/tls.crt";
/// Default path to the trigger server TLS private key
pub const TRIGGER_KEY_PATH: &str = "/etc/pg-bootstrap/certs/tls.key";

#[derive(Parser, Debug)]
#[command(name = "pg-bootstrap")]
#[command(about = "Bootstrap a managed PostgreSQL cluster to an application-ready state")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the lifecycle trigger endpoint
    Serve(ServeArgs),
    /// Run readiness gate, step plan, and initializer once, then print connection info
    Provision(ProvisionArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsArg {
    #[default]
    Disabled,
    /// Encrypt without verifying the server certificate
    Require,
    /// Encrypt and verify against `--ca-cert`
    Verify,
}

/// Connection settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Cluster endpoint hostname
    #[arg(long, env = "DB_HOST")]
    pub host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Kubernetes Secret holding `username` and `password`, as NAMESPACE/NAME
    #[arg(long, env = "DB_CREDENTIALS_SECRET", value_parser = parse_secret_ref)]
    pub credentials_secret: Option<(String, String)>,

    /// Environment variable holding the admin username
    #[arg(long, default_value = DEFAULT_USERNAME_VAR)]
    pub username_env: String,

    /// Environment variable holding the admin password
    #[arg(long, default_value = DEFAULT_PASSWORD_VAR)]
    pub password_env: String,

    #[arg(long, env = "DB_TLS", value_enum, default_value_t = TlsArg::Disabled)]
    pub tls: TlsArg,

    /// PEM CA certificate used with `--tls verify`
    #[arg(long, env = "DB_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Primary database reported to the application tier
    #[arg(long, env = "DB_NAME", default_value = DEFAULT_PRIMARY_DATABASE)]
    pub primary_database: String,

    /// Database used for the existence check and CREATE DATABASE
    #[arg(long, env = "DB_ADMIN_DATABASE", default_value = DEFAULT_ADMIN_DATABASE)]
    pub admin_database: String,

    #[arg(long, env = "DB_SECONDARY_DATABASE", default_value = DEFAULT_SECONDARY_DATABASE)]
    pub secondary_database: String,

    /// Extensions required in the secondary database
    #[arg(
        long,
        env = "DB_EXTENSIONS",
        value_delimiter = ',',
        default_value = "vector,uuid-ossp"
    )]
    pub extensions: Vec<String>,

    #[arg(long, env = "DB_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,
}

fn parse_secret_ref(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace.to_string(), name.to_string()))
        }
        _ => Err(format!("expected NAMESPACE/NAME, got {:?}", value)),
    }
}

impl ClusterArgs {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn credential_ref(&self) -> CredentialRef {
        match &self.credentials_secret {
            Some((namespace, name)) => CredentialRef::KubernetesSecret {
                namespace: namespace.clone(),
                name: name.clone(),
            },
            None => CredentialRef::Environment {
                username_var: self.username_env.clone(),
                password_var: self.password_env.clone(),
            },
        }
    }

    pub fn endpoint(&self) -> ClusterEndpoint {
        ClusterEndpoint::new(self.host.clone(), self.port, self.credential_ref())
    }

    pub fn tls_mode(&self) -> Result<TlsMode> {
        match self.tls {
            TlsArg::Disabled => Ok(TlsMode::Disabled),
            TlsArg::Require => Ok(TlsMode::RequireUnverified),
            TlsArg::Verify => {
                let path = self.ca_cert.as_ref().ok_or_else(|| {
                    Error::InvalidConfig("--tls verify requires --ca-cert".to_string())
                })?;
                let ca_cert_pem = std::fs::read_to_string(path).map_err(|e| {
                    Error::InvalidConfig(format!(
                        "failed to read CA certificate {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(TlsMode::RequireVerified { ca_cert_pem })
            }
        }
    }

    pub fn initializer_config(&self) -> Result<InitializerConfig> {
        let config = InitializerConfig {
            admin_database: self.admin_database.clone(),
            secondary_database: self.secondary_database.clone(),
            extensions: self
                .extensions
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            connect_timeout: self.connect_timeout(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn connector(&self) -> Result<Arc<dyn AdminConnector>> {
        let connector =
            PostgresConnector::new(self.endpoint(), self.connect_timeout()).with_tls(self.tls_mode()?);
        Ok(Arc::new(connector))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Port of the lifecycle trigger endpoint; `--port` is the database port
    #[arg(long = "trigger-port", env = "TRIGGER_PORT", default_value_t = TRIGGER_PORT)]
    pub trigger_port: u16,

    #[arg(long, env = "HEALTH_PORT", default_value_t = HEALTH_PORT)]
    pub health_port: u16,

    #[arg(long, env = "TRIGGER_CERT_PATH", default_value = TRIGGER_CERT_PATH)]
    pub cert_path: PathBuf,

    #[arg(long, env = "TRIGGER_KEY_PATH", default_value = TRIGGER_KEY_PATH)]
    pub key_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// When the writer instance became active (RFC 3339); defaults to now
    #[arg(long, env = "WRITER_ACTIVE_AT")]
    pub writer_active_at: Option<DateTime<Utc>>,

    /// Minimum delay after the writer became active before the first query
    #[arg(long, env = "SETTLE_DELAY_SECS", default_value_t = 60)]
    pub settle_delay_secs: u64,

    /// Skip polling the administrative interface after the settle delay
    #[arg(long)]
    pub no_probe: bool,

    /// Upper bound on the readiness probe
    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value_t = 300)]
    pub probe_timeout_secs: u64,

    /// JSON step plan run before the initializer
    #[arg(long, env = "STEP_PLAN")]
    pub plan: Option<PathBuf>,
}

impl ProvisionArgs {
    pub fn marker(&self) -> WriterActiveMarker {
        self.writer_active_at
            .map(WriterActiveMarker::at)
            .unwrap_or_else(WriterActiveMarker::now)
    }

    pub fn plan(&self) -> Result<StepPlan> {
        match &self.plan {
            Some(path) => Ok(StepPlan::load(path)?),
            None => Ok(StepPlan::new()),
        }
    }

    pub fn readiness_gate(&self, connector: Arc<dyn AdminConnector>) -> ReadinessGate {
        let gate = ReadinessGate::new(self.marker(), Duration::from_secs(self.settle_delay_secs));
        if self.no_probe {
            return gate;
        }
        gate.with_probe(
            ReadinessProbe::new(
                connector,
                self.cluster.admin_database.clone(),
                self.cluster.connect_timeout(),
            )
            .with_backoff(BackoffConfig::default())
            .with_timeout(Duration::from_secs(self.probe_timeout_secs)),
        )
    }
}
