pub mod config;
pub mod controller;
pub mod health;
pub mod model;
pub mod resources;
pub mod trigger;

pub use config::{Cli, ClusterArgs, Command, ProvisionArgs, ServeArgs};
pub use controller::{
    BackoffConfig, Bootstrap, BootstrapReport, Context, Error, Initializer, InitializerConfig,
    ReadinessGate, Result, StepSequencer,
};
pub use health::{HealthState, Metrics};
pub use trigger::{TRIGGER_PORT, TriggerError, run_trigger_server};

use std::sync::Arc;

use controller::StatementExecutor;

/// Assemble the one-shot bootstrap from provision arguments
///
/// Nothing touches the cluster until [`Bootstrap::run`] is awaited.
pub fn build_bootstrap(
    args: &ProvisionArgs,
    health_state: Option<Arc<HealthState>>,
) -> Result<Bootstrap> {
    let cluster = &args.cluster;
    let connector = cluster.connector()?;
    let plan = args.plan()?;

    let mut sequencer = StepSequencer::new(Arc::new(StatementExecutor::new(
        connector.clone(),
        cluster.connect_timeout(),
    )));
    let mut initializer = Initializer::new(connector.clone(), cluster.initializer_config()?);
    if let Some(state) = health_state {
        sequencer = sequencer.with_health_state(state.clone());
        initializer = initializer.with_health_state(state);
    }

    let gate = args.readiness_gate(connector);

    Ok(
        Bootstrap::new(gate, sequencer, initializer, plan).with_connection(
            cluster.host.clone(),
            cluster.port,
            cluster.primary_database.clone(),
        ),
    )
}

/// Assemble the lifecycle trigger context from serve arguments
pub fn build_context(args: &ServeArgs, health_state: Arc<HealthState>) -> Result<Context> {
    let cluster = &args.cluster;
    let initializer = Initializer::new(cluster.connector()?, cluster.initializer_config()?)
        .with_health_state(health_state.clone());

    Ok(Context::new(
        Arc::new(initializer),
        cluster.host.clone(),
        cluster.port,
        cluster.primary_database.clone(),
    )
    .with_health_state(health_state))
}
