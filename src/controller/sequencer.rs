//! Strictly ordered, fail-fast execution of a step plan
//!
//! Step k is started only after step k-1 has returned success from the
//! executor and its record has been appended to the execution log. The first
//! step additionally waits for the readiness gate. Steps are awaited one at a
//! time inside a single task, so two steps can never overlap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::controller::error::Error;
use crate::controller::readiness::{ProceedSignal, ReadinessGate};
use crate::health::HealthState;
use crate::model::{InitializationStep, StepPlan, StepRecord, StepStatus};
use crate::resources::admin::{AdminConnector, connect_with_timeout};
use crate::resources::postgres_client::PostgresClientResult;

/// Substrate that runs a single step to completion
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Returns only once the step's effect is complete
    async fn execute(&self, step: &InitializationStep) -> PostgresClientResult<()>;
}

/// Runs each step's statement on a fresh session against its target database
pub struct StatementExecutor {
    connector: Arc<dyn AdminConnector>,
    connect_timeout: Duration,
}

impl StatementExecutor {
    pub fn new(connector: Arc<dyn AdminConnector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
        }
    }
}

#[async_trait]
impl StepExecutor for StatementExecutor {
    async fn execute(&self, step: &InitializationStep) -> PostgresClientResult<()> {
        let session = connect_with_timeout(
            self.connector.as_ref(),
            step.target_database(),
            self.connect_timeout,
        )
        .await?;

        let result = session.execute(step.statement()).await;
        let closed = session.close().await;
        result?;
        closed
    }
}

/// Records of the steps that ran, in execution order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceReport {
    records: Vec<StepRecord>,
    #[serde(skip)]
    proceed: Option<ProceedSignal>,
}

impl SequenceReport {
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Number of steps that completed successfully
    pub fn completed(&self) -> usize {
        self.records.iter().filter(|r| r.succeeded()).count()
    }

    /// The gate's signal, if the run had to wait on it
    pub fn proceed_signal(&self) -> Option<ProceedSignal> {
        self.proceed
    }

    fn append(&mut self, record: StepRecord) {
        self.records.push(record);
    }
}

/// A failed run together with everything recorded before the failure
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct SequenceFailure {
    #[source]
    pub error: Error,
    pub report: SequenceReport,
}

impl From<SequenceFailure> for Error {
    fn from(failure: SequenceFailure) -> Self {
        failure.error
    }
}

/// Executes step plans one step at a time
pub struct StepSequencer {
    executor: Arc<dyn StepExecutor>,
    health_state: Option<Arc<HealthState>>,
}

impl StepSequencer {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            executor,
            health_state: None,
        }
    }

    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    /// Run every step in order, stopping at the first failure
    ///
    /// An empty plan succeeds immediately without waiting on the gate.
    #[instrument(skip_all, fields(steps = plan.len()))]
    pub async fn execute(
        &self,
        plan: &StepPlan,
        gate: &ReadinessGate,
    ) -> Result<SequenceReport, SequenceFailure> {
        let mut report = SequenceReport::default();

        if plan.is_empty() {
            info!("No initialization steps to run");
            return Ok(report);
        }

        match gate.await_ready().await {
            Ok(signal) => report.proceed = Some(signal),
            Err(error) => return Err(SequenceFailure { error, report }),
        }

        for step in plan {
            let index = step.sequence_index();
            info!(
                index,
                database = step.target_database(),
                "Starting initialization step"
            );

            let started_at = Utc::now();
            let timer = std::time::Instant::now();
            let result = self.executor.execute(step).await;
            let finished_at = Utc::now();

            if let Some(state) = &self.health_state {
                state.metrics.record_step(result.is_ok(), timer.elapsed().as_secs_f64());
            }

            match result {
                Ok(()) => {
                    report.append(StepRecord {
                        sequence_index: index,
                        started_at,
                        finished_at,
                        status: StepStatus::Succeeded,
                    });
                    info!(index, "Initialization step succeeded");
                }
                Err(source) => {
                    error!(index, error = %source, "Initialization step failed, halting sequence");
                    report.append(StepRecord {
                        sequence_index: index,
                        started_at,
                        finished_at,
                        status: StepStatus::Failed(source.to_string()),
                    });
                    return Err(SequenceFailure {
                        error: Error::StepFailed { index, source },
                        report,
                    });
                }
            }
        }

        info!(completed = report.completed(), "All initialization steps succeeded");
        Ok(report)
    }
}
