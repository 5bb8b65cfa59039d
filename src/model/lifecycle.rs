//! Lifecycle trigger wire types and initialization outcomes
//!
//! The trigger payload follows the custom-resource convention:
//!
//! ```json
//! {"RequestType": "Create", "ResourceProperties": {"SecondaryDatabase": "pgvector"}}
//! ```
//!
//! and a successful reply is `{"PhysicalResourceId": "db-init", "Data": {...}}`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::endpoint::ApplicationConnectionInfo;

/// Physical id reported for the initialization resource on every event
pub const PHYSICAL_RESOURCE_ID: &str = "db-init";

/// Optional per-resource overrides carried by a lifecycle event
///
/// Unset fields fall back to the initializer's configuration. Unknown keys
/// (such as `ServiceToken`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

/// Why the initializer is being invoked
///
/// An event without `RequestType` is treated as `Create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "RequestType", from = "RawLifecycleEvent")]
pub enum LifecycleEvent {
    Create {
        #[serde(rename = "ResourceProperties", default)]
        properties: ResourceProperties,
    },
    Update {
        #[serde(rename = "ResourceProperties", default)]
        properties: ResourceProperties,
        #[serde(rename = "OldResourceProperties", default)]
        old_properties: ResourceProperties,
    },
    Delete {
        #[serde(rename = "ResourceProperties", default)]
        properties: ResourceProperties,
    },
}

/// Event as received, before the request type selects a variant
#[derive(Deserialize)]
struct RawLifecycleEvent {
    #[serde(rename = "RequestType", default)]
    request_type: RequestType,
    #[serde(rename = "ResourceProperties", default)]
    properties: ResourceProperties,
    #[serde(rename = "OldResourceProperties", default)]
    old_properties: ResourceProperties,
}

impl From<RawLifecycleEvent> for LifecycleEvent {
    fn from(raw: RawLifecycleEvent) -> Self {
        let RawLifecycleEvent {
            request_type,
            properties,
            old_properties,
        } = raw;
        match request_type {
            RequestType::Create => LifecycleEvent::Create { properties },
            RequestType::Update => LifecycleEvent::Update {
                properties,
                old_properties,
            },
            RequestType::Delete => LifecycleEvent::Delete { properties },
        }
    }
}

impl LifecycleEvent {
    pub fn create() -> Self {
        LifecycleEvent::Create {
            properties: ResourceProperties::default(),
        }
    }

    pub fn update() -> Self {
        LifecycleEvent::Update {
            properties: ResourceProperties::default(),
            old_properties: ResourceProperties::default(),
        }
    }

    pub fn delete() -> Self {
        LifecycleEvent::Delete {
            properties: ResourceProperties::default(),
        }
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            LifecycleEvent::Create { .. } => RequestType::Create,
            LifecycleEvent::Update { .. } => RequestType::Update,
            LifecycleEvent::Delete { .. } => RequestType::Delete,
        }
    }

    pub fn properties(&self) -> &ResourceProperties {
        match self {
            LifecycleEvent::Create { properties }
            | LifecycleEvent::Update { properties, .. }
            | LifecycleEvent::Delete { properties } => properties,
        }
    }
}

/// Discriminant of a lifecycle event, used for logging and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum RequestType {
    #[default]
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Create => "Create",
            RequestType::Update => "Update",
            RequestType::Delete => "Delete",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result category of one initializer invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Failed,
    /// Delete-triggered invocations
    Skipped,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "Success"),
            OutcomeStatus::Failed => write!(f, "Failed"),
            OutcomeStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Diagnostic payload of an outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeDetail {
    /// Whether this invocation created the secondary database (None when not reached)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_created: Option<bool>,

    /// Required extensions confirmed present in the extension catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one invocation of the initializer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationOutcome {
    pub status: OutcomeStatus,
    pub detail: OutcomeDetail,
}

impl InitializationOutcome {
    pub fn success(database_created: bool, extensions: Vec<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            detail: OutcomeDetail {
                database_created: Some(database_created),
                extensions,
                error: None,
            },
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            detail: OutcomeDetail::default(),
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            detail: OutcomeDetail {
                error: Some(error.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// `Data` section of a lifecycle reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseData {
    /// `Success` for create/update, `Deleted` for delete
    pub status: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_created: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ApplicationConnectionInfo>,
}

/// Successful reply to the lifecycle trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleResponse {
    pub physical_resource_id: String,
    pub data: ResponseData,
}

impl LifecycleResponse {
    /// Build the reply for a non-failed outcome
    ///
    /// Returns `None` for failed outcomes; those are reported as failures, never as data.
    pub fn from_outcome(
        outcome: &InitializationOutcome,
        connection: Option<ApplicationConnectionInfo>,
    ) -> Option<Self> {
        let data = match outcome.status {
            OutcomeStatus::Failed => return None,
            OutcomeStatus::Skipped => ResponseData {
                status: "Deleted".to_string(),
                extensions: Vec::new(),
                database_created: None,
                connection: None,
            },
            OutcomeStatus::Success => ResponseData {
                status: "Success".to_string(),
                extensions: outcome.detail.extensions.clone(),
                database_created: outcome.detail.database_created,
                connection,
            },
        };

        Some(Self {
            physical_resource_id: PHYSICAL_RESOURCE_ID.to_string(),
            data,
        })
    }
}

/// Failure reply to the lifecycle trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleFailure {
    pub status: String,
    pub reason: String,
}

impl LifecycleFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            status: "FAILED".to_string(),
            reason: reason.into(),
        }
    }
}
