//! PostgreSQL client for administrative sessions
//!
//! Provides `PostgresConnector`, which resolves credentials from a
//! `CredentialRef` and opens a fresh `tokio-postgres` connection per session.
//! Every session is owned by exactly one caller and is consumed by `close`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use rustls::pki_types::{CertificateDer, ServerName};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::model::{ClusterEndpoint, CredentialRef};
use crate::resources::admin::{AdminConnector, AdminSession};
use crate::resources::sql;

/// Application name reported to the server for every session
const APPLICATION_NAME: &str = "pg-bootstrap";

/// Upper bound on waiting for the connection task after the client is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during PostgreSQL operations
#[derive(Error, Debug)]
pub enum PostgresClientError {
    #[error("Connection failed: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Credentials secret not found: {0}")]
    SecretNotFound(String),

    #[error("Secret missing required key: {0}")]
    SecretMissingKey(String),

    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Invalid UTF-8 in secret data")]
    InvalidUtf8,

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),
}

impl PostgresClientError {
    /// Whether the error means the endpoint could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            PostgresClientError::Connection(_) | PostgresClientError::Timeout(_)
        )
    }
}

/// Result type for PostgreSQL client operations
pub type PostgresClientResult<T> = Result<T, PostgresClientError>;

/// TLS mode for PostgreSQL connections
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// No TLS
    #[default]
    Disabled,
    /// Require TLS but skip certificate verification
    RequireUnverified,
    /// Require TLS with CA certificate verification
    RequireVerified {
        /// PEM-encoded CA certificate
        ca_cert_pem: String,
    },
}

/// PostgreSQL connection credentials
#[derive(Clone)]
pub struct PostgresCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for PostgresCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl PostgresCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Extract credentials from a Kubernetes Secret with `username` and `password` keys
    pub fn from_secret(secret: &Secret) -> PostgresClientResult<Self> {
        let data = secret
            .data
            .as_ref()
            .ok_or_else(|| PostgresClientError::SecretMissingKey("no data in secret".into()))?;

        let username = data
            .get("username")
            .ok_or_else(|| PostgresClientError::SecretMissingKey("username".into()))?;
        let password = data
            .get("password")
            .ok_or_else(|| PostgresClientError::SecretMissingKey("password".into()))?;

        Ok(Self {
            username: String::from_utf8(username.0.clone())
                .map_err(|_| PostgresClientError::InvalidUtf8)?,
            password: String::from_utf8(password.0.clone())
                .map_err(|_| PostgresClientError::InvalidUtf8)?,
        })
    }

    /// Read credentials from environment variables
    pub fn from_env(username_var: &str, password_var: &str) -> PostgresClientResult<Self> {
        let username = std::env::var(username_var)
            .map_err(|_| PostgresClientError::MissingEnvVar(username_var.to_string()))?;
        let password = std::env::var(password_var)
            .map_err(|_| PostgresClientError::MissingEnvVar(password_var.to_string()))?;
        Ok(Self { username, password })
    }
}

/// Fetch credentials from a Kubernetes secret
pub async fn fetch_credentials(
    client: &Client,
    namespace: &str,
    secret_name: &str,
) -> PostgresClientResult<PostgresCredentials> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    let secret = secrets.get(secret_name).await.map_err(|e| match &e {
        kube::Error::Api(api_err) if api_err.code == 404 => {
            PostgresClientError::SecretNotFound(secret_name.to_string())
        }
        _ => PostgresClientError::Kube(e),
    })?;

    PostgresCredentials::from_secret(&secret)
}

/// Resolve a credential reference into concrete credentials
///
/// A Kubernetes client is created on demand when the reference points at a
/// Secret and none was supplied.
pub async fn resolve_credentials(
    credential_ref: &CredentialRef,
    kube_client: Option<&Client>,
) -> PostgresClientResult<PostgresCredentials> {
    match credential_ref {
        CredentialRef::Environment {
            username_var,
            password_var,
        } => PostgresCredentials::from_env(username_var, password_var),
        CredentialRef::KubernetesSecret { namespace, name } => match kube_client {
            Some(client) => fetch_credentials(client, namespace, name).await,
            None => {
                let client = Client::try_default().await?;
                fetch_credentials(&client, namespace, name).await
            }
        },
        CredentialRef::Inline { username, password } => {
            Ok(PostgresCredentials::new(username.clone(), password.clone()))
        }
    }
}

/// A single PostgreSQL connection
///
/// The background connection task is joined on `close`; dropping the
/// connection without closing also terminates it.
pub struct PostgresConnection {
    client: tokio_postgres::Client,
    connection_task: JoinHandle<()>,
}

impl PostgresConnection {
    /// Open a connection to `database` on `host:port`
    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        credentials: &PostgresCredentials,
        tls_mode: &TlsMode,
        connect_timeout: Duration,
    ) -> PostgresClientResult<Self> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(host)
            .port(port)
            .user(&credentials.username)
            .password(&credentials.password)
            .dbname(database)
            .application_name(APPLICATION_NAME)
            .connect_timeout(connect_timeout);

        let (client, connection_task) = match tls_mode {
            TlsMode::Disabled => {
                let (client, connection) = config.connect(NoTls).await.map_err(connect_error)?;
                let task = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::trace!(error = %e, "PostgreSQL connection closed");
                    }
                });
                (client, task)
            }
            _ => {
                let tls = build_tls_connector(tls_mode)?;
                let (client, connection) = config.connect(tls).await.map_err(connect_error)?;
                let task = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::trace!(error = %e, "PostgreSQL TLS connection closed");
                    }
                });
                (client, task)
            }
        };

        tracing::debug!(
            host = host,
            port = port,
            database = database,
            "PostgreSQL connection established"
        );

        Ok(Self {
            client,
            connection_task,
        })
    }
}

/// Server-reported startup errors (bad password, missing database) are permanent,
/// except "the database system is starting up"
fn connect_error(e: tokio_postgres::Error) -> PostgresClientError {
    match e.code() {
        Some(code) if *code != tokio_postgres::error::SqlState::CANNOT_CONNECT_NOW => query_error(e),
        _ => PostgresClientError::Connection(e),
    }
}

/// Map a server error to a query error carrying the server's diagnostic
fn query_error(e: tokio_postgres::Error) -> PostgresClientError {
    match e.as_db_error() {
        Some(db) => PostgresClientError::Query(format!(
            "{} (SQLSTATE {})",
            db.message(),
            db.code().code()
        )),
        None => PostgresClientError::Query(e.to_string()),
    }
}

#[async_trait]
impl AdminSession for PostgresConnection {
    async fn execute(&self, statement: &str) -> PostgresClientResult<()> {
        // Simple query protocol: CREATE DATABASE cannot run inside the
        // implicit transaction of an extended-protocol statement.
        self.client.batch_execute(statement).await.map_err(query_error)
    }

    async fn database_exists(&self, name: &str) -> PostgresClientResult<bool> {
        let row = self
            .client
            .query_opt(sql::DATABASE_EXISTS_QUERY, &[&name])
            .await
            .map_err(query_error)?;
        Ok(row.is_some())
    }

    async fn installed_extensions(&self, names: &[String]) -> PostgresClientResult<Vec<String>> {
        let rows = self
            .client
            .query(sql::EXTENSION_CATALOG_QUERY, &[&names])
            .await
            .map_err(query_error)?;
        rows.iter()
            .map(|row| row.try_get::<_, String>("extname").map_err(query_error))
            .collect()
    }

    async fn close(self: Box<Self>) -> PostgresClientResult<()> {
        let PostgresConnection {
            client,
            connection_task,
        } = *self;
        drop(client);
        join_connection_task(connection_task, CLOSE_TIMEOUT).await;
        Ok(())
    }
}

/// Wait for a connection task to finish, aborting it after `limit`
///
/// Returns whether the task finished on its own.
async fn join_connection_task(mut task: JoinHandle<()>, limit: Duration) -> bool {
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "PostgreSQL connection task did not shut down cleanly");
            true
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = limit.as_secs(),
                "PostgreSQL connection task still running after close, aborting"
            );
            task.abort();
            false
        }
    }
}

/// Opens administrative sessions against a cluster endpoint
pub struct PostgresConnector {
    endpoint: ClusterEndpoint,
    tls_mode: TlsMode,
    connect_timeout: Duration,
    kube_client: Option<Client>,
}

impl PostgresConnector {
    pub fn new(endpoint: ClusterEndpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            tls_mode: TlsMode::Disabled,
            connect_timeout,
            kube_client: None,
        }
    }

    pub fn with_tls(mut self, tls_mode: TlsMode) -> Self {
        self.tls_mode = tls_mode;
        self
    }

    /// Use an existing Kubernetes client for Secret-backed credentials
    pub fn with_kube_client(mut self, client: Client) -> Self {
        self.kube_client = Some(client);
        self
    }

    pub fn endpoint(&self) -> &ClusterEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl AdminConnector for PostgresConnector {
    async fn connect(&self, database: &str) -> PostgresClientResult<Box<dyn AdminSession>> {
        let credentials =
            resolve_credentials(&self.endpoint.credential_ref, self.kube_client.as_ref()).await?;

        let connection = PostgresConnection::connect(
            &self.endpoint.host,
            self.endpoint.port,
            database,
            &credentials,
            &self.tls_mode,
            self.connect_timeout,
        )
        .await?;

        Ok(Box::new(connection))
    }
}

// =============================================================================
// TLS Configuration
// =============================================================================

/// Parse PEM-encoded certificates into DER format
fn parse_pem_certificates(pem_data: &str) -> PostgresClientResult<Vec<CertificateDer<'static>>> {
    let mut certs = Vec::new();
    let mut reader = std::io::BufReader::new(pem_data.as_bytes());

    for cert in rustls_pemfile::certs(&mut reader) {
        match cert {
            Ok(cert) => certs.push(cert),
            Err(e) => {
                return Err(PostgresClientError::InvalidCertificate(format!(
                    "Failed to parse certificate: {}",
                    e
                )));
            }
        }
    }

    if certs.is_empty() {
        return Err(PostgresClientError::InvalidCertificate(
            "No certificates found in PEM data".to_string(),
        ));
    }

    Ok(certs)
}

/// Build a rustls TLS connector for PostgreSQL
fn build_tls_connector(tls_mode: &TlsMode) -> PostgresClientResult<MakeRustlsConnect> {
    match tls_mode {
        TlsMode::Disabled => Err(PostgresClientError::TlsConfig(
            "Cannot build TLS connector for disabled TLS mode".to_string(),
        )),
        TlsMode::RequireUnverified => {
            let config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();

            Ok(MakeRustlsConnect::new(config))
        }
        TlsMode::RequireVerified { ca_cert_pem } => {
            let certs = parse_pem_certificates(ca_cert_pem)?;

            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs {
                root_store.add(cert).map_err(|e| {
                    PostgresClientError::InvalidCertificate(format!("Failed to add CA cert: {}", e))
                })?;
            }

            let config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            Ok(MakeRustlsConnect::new(config))
        }
    }
}

/// Certificate verifier that accepts any server certificate
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
