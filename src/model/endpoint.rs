//! Cluster endpoint, credential references, and application-facing connection info

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default environment variable holding the administrative username
pub const DEFAULT_USERNAME_VAR: &str = "DB_USER";
/// Default environment variable holding the administrative password
pub const DEFAULT_PASSWORD_VAR: &str = "DB_PASSWORD";

/// Opaque reference to where the administrative credentials live
///
/// Steps and lifecycle events never carry credential values; they are resolved
/// from this reference each time a session is opened.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CredentialRef {
    /// Username and password read from environment variables
    #[serde(rename_all = "camelCase")]
    Environment {
        username_var: String,
        password_var: String,
    },
    /// Kubernetes Secret with `username` and `password` keys
    KubernetesSecret { namespace: String, name: String },
    /// Literal credentials, for local runs and tests
    Inline { username: String, password: String },
}

impl Default for CredentialRef {
    fn default() -> Self {
        CredentialRef::Environment {
            username_var: DEFAULT_USERNAME_VAR.to_string(),
            password_var: DEFAULT_PASSWORD_VAR.to_string(),
        }
    }
}

impl fmt::Debug for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialRef::Environment {
                username_var,
                password_var,
            } => f
                .debug_struct("Environment")
                .field("username_var", username_var)
                .field("password_var", password_var)
                .finish(),
            CredentialRef::KubernetesSecret { namespace, name } => f
                .debug_struct("KubernetesSecret")
                .field("namespace", namespace)
                .field("name", name)
                .finish(),
            CredentialRef::Inline { username, .. } => f
                .debug_struct("Inline")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Network address of the cluster's administrative interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEndpoint {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub credential_ref: CredentialRef,
}

impl ClusterEndpoint {
    pub fn new(host: impl Into<String>, port: u16, credential_ref: CredentialRef) -> Self {
        Self {
            host: host.into(),
            port,
            credential_ref,
        }
    }
}

/// Marker that the cluster's writer instance finished creating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterActiveMarker {
    pub activated_at: DateTime<Utc>,
}

impl WriterActiveMarker {
    pub fn at(activated_at: DateTime<Utc>) -> Self {
        Self { activated_at }
    }

    /// Marker for a writer that became active just now
    pub fn now() -> Self {
        Self::at(Utc::now())
    }
}

/// Connection details exposed to the application tier once initialization succeeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConnectionInfo {
    pub host: String,
    pub port: u16,
    pub primary_database_name: String,
    pub secondary_database_name: String,
}
