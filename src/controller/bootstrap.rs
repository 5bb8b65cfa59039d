//! Bootstrap-to-ready orchestration for one cluster
//!
//! Runs the readiness gate, the step plan, and the initializer's create path in
//! that order, then hands back the connection details for the application tier.

use serde::Serialize;
use tracing::{info, instrument};

use crate::controller::error::Result;
use crate::controller::initializer::Initializer;
use crate::controller::readiness::ReadinessGate;
use crate::controller::sequencer::{SequenceReport, StepSequencer};
use crate::model::{
    ApplicationConnectionInfo, InitializationOutcome, LifecycleEvent, ResourceProperties, StepPlan,
};

/// Everything a successful bootstrap produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    pub steps: SequenceReport,
    pub outcome: InitializationOutcome,
    pub connection: ApplicationConnectionInfo,
}

/// Components for one bootstrap run
pub struct Bootstrap {
    gate: ReadinessGate,
    sequencer: StepSequencer,
    initializer: Initializer,
    plan: StepPlan,
    host: String,
    port: u16,
    primary_database: String,
}

impl Bootstrap {
    pub fn new(
        gate: ReadinessGate,
        sequencer: StepSequencer,
        initializer: Initializer,
        plan: StepPlan,
    ) -> Self {
        Self {
            gate,
            sequencer,
            initializer,
            plan,
            host: String::new(),
            port: 5432,
            primary_database: String::new(),
        }
    }

    /// Endpoint and primary database reported to the application tier
    pub fn with_connection(
        mut self,
        host: impl Into<String>,
        port: u16,
        primary_database: impl Into<String>,
    ) -> Self {
        self.host = host.into();
        self.port = port;
        self.primary_database = primary_database.into();
        self
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Run gate, steps, and initializer; any failure fails the whole bootstrap
    #[instrument(skip_all, fields(host = %self.host, steps = self.plan.len()))]
    pub async fn run(&self) -> Result<BootstrapReport> {
        let steps = self.sequencer.execute(&self.plan, &self.gate).await?;

        // An empty plan never opens the gate; the initializer still needs it.
        self.gate.await_ready().await?;

        let event = LifecycleEvent::create();
        let outcome = self.initializer.handle(&event).await?;

        let connection = ApplicationConnectionInfo {
            host: self.host.clone(),
            port: self.port,
            primary_database_name: self.primary_database.clone(),
            secondary_database_name: self
                .initializer
                .secondary_database_for(&ResourceProperties::default()),
        };

        info!(
            secondary_database = %connection.secondary_database_name,
            "Cluster ready for application use"
        );

        Ok(BootstrapReport {
            steps,
            outcome,
            connection,
        })
    }
}
