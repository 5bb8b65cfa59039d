use std::sync::Arc;

use tokio::sync::Mutex;

use crate::controller::initializer::Initializer;
use crate::health::HealthState;
use crate::model::{ApplicationConnectionInfo, ResourceProperties};

/// Shared context for the lifecycle trigger handlers
pub struct Context {
    pub initializer: Arc<Initializer>,
    /// Cluster host, port, and primary database exposed to the application tier
    pub host: String,
    pub port: u16,
    pub primary_database: String,
    pub health_state: Option<Arc<HealthState>>,
    /// Held for the duration of each lifecycle event
    pub in_flight: Mutex<()>,
}

impl Context {
    pub fn new(
        initializer: Arc<Initializer>,
        host: impl Into<String>,
        port: u16,
        primary_database: impl Into<String>,
    ) -> Self {
        Self {
            initializer,
            host: host.into(),
            port,
            primary_database: primary_database.into(),
            health_state: None,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    /// Connection details for a successful event with these properties
    pub fn connection_info(&self, properties: &ResourceProperties) -> ApplicationConnectionInfo {
        ApplicationConnectionInfo {
            host: self.host.clone(),
            port: self.port,
            primary_database_name: self.primary_database.clone(),
            secondary_database_name: self.initializer.secondary_database_for(properties),
        }
    }
}
