//! In-memory administrative interface and instrumented step executor
//!
//! `MockCluster` implements `AdminConnector` over a shared catalog of databases
//! and per-database extensions, and records every connect, statement, and
//! catalog lookup so tests can assert on exactly what was issued.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let cluster = MockCluster::new().with_database("pgvector");
//! let initializer = initializer_for(&cluster);
//! let outcome = initializer.handle(&LifecycleEvent::create()).await?;
//! assert!(cluster.has_extension("pgvector", "vector"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use pg_bootstrap::controller::{Initializer, InitializerConfig, ReadinessGate, StepExecutor};
use pg_bootstrap::model::{InitializationStep, StepPlan, WriterActiveMarker};
use pg_bootstrap::resources::admin::{AdminConnector, AdminSession};
use pg_bootstrap::resources::postgres_client::{PostgresClientError, PostgresClientResult};

/// Database that always exists on a fresh cluster
pub const ADMIN_DATABASE: &str = "postgres";

// =============================================================================
// Recording administrative interface
// =============================================================================

#[derive(Debug, Default)]
struct ClusterState {
    databases: BTreeSet<String>,
    extensions: BTreeMap<String, BTreeSet<String>>,
    connects: Vec<String>,
    statements: Vec<(String, String)>,
    catalog_queries: usize,
    mutations: usize,
    closed_sessions: usize,
    failing_connects: u32,
    hang_connects: bool,
    rejected_extensions: BTreeSet<String>,
    ignored_extensions: BTreeSet<String>,
}

/// Shared in-memory cluster; clones observe the same state
#[derive(Clone, Debug)]
pub struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    /// A fresh cluster containing only the admin database
    pub fn new() -> Self {
        let mut state = ClusterState::default();
        state.databases.insert(ADMIN_DATABASE.to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_database(self, name: &str) -> Self {
        self.state.lock().unwrap().databases.insert(name.to_string());
        self
    }

    pub fn with_extension(self, database: &str, extension: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .extensions
            .entry(database.to_string())
            .or_default()
            .insert(extension.to_string());
        self
    }

    /// The next `attempts` connects fail with a connectivity error
    pub fn failing_connects(self, attempts: u32) -> Self {
        self.state.lock().unwrap().failing_connects = attempts;
        self
    }

    /// Every connect hangs forever
    pub fn hanging(self) -> Self {
        self.state.lock().unwrap().hang_connects = true;
        self
    }

    /// `CREATE EXTENSION` for `extension` fails with a server error
    pub fn rejecting_extension(self, extension: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected_extensions
            .insert(extension.to_string());
        self
    }

    /// `CREATE EXTENSION` for `extension` reports success but installs nothing
    pub fn ignoring_extension(self, extension: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .ignored_extensions
            .insert(extension.to_string());
        self
    }

    /// Lift every `rejecting_extension` setting
    pub fn allow_all_extensions(&self) {
        self.state.lock().unwrap().rejected_extensions.clear();
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.state.lock().unwrap().databases.contains(name)
    }

    pub fn has_extension(&self, database: &str, extension: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .extensions
            .get(database)
            .is_some_and(|e| e.contains(extension))
    }

    /// Databases connected to, in order
    pub fn connects(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }

    /// `(database, statement)` pairs passed to `execute`, in order
    pub fn statements(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Statements that actually changed the catalog
    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    pub fn catalog_queries(&self) -> usize {
        self.state.lock().unwrap().catalog_queries
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.lock().unwrap().closed_sessions
    }

    /// Every call of any kind made against the cluster
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.connects.len() + state.statements.len() + state.catalog_queries
    }
}

fn unquote(identifier: &str) -> String {
    identifier
        .trim()
        .trim_matches('"')
        .replace("\"\"", "\"")
}

#[async_trait]
impl AdminConnector for MockCluster {
    async fn connect(&self, database: &str) -> PostgresClientResult<Box<dyn AdminSession>> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.connects.push(database.to_string());

            if state.hang_connects {
                true
            } else if state.failing_connects > 0 {
                state.failing_connects -= 1;
                return Err(PostgresClientError::Timeout(Duration::from_secs(1)));
            } else if !state.databases.contains(database) {
                return Err(PostgresClientError::Query(format!(
                    "database \"{}\" does not exist (SQLSTATE 3D000)",
                    database
                )));
            } else {
                false
            }
        };

        if hang {
            std::future::pending::<()>().await;
        }

        Ok(Box::new(MockSession {
            database: database.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct MockSession {
    database: String,
    state: Arc<Mutex<ClusterState>>,
}

#[async_trait]
impl AdminSession for MockSession {
    async fn execute(&self, statement: &str) -> PostgresClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .statements
            .push((self.database.clone(), statement.to_string()));

        if let Some(name) = statement.strip_prefix("CREATE DATABASE ") {
            let name = unquote(name);
            if !state.databases.insert(name.clone()) {
                return Err(PostgresClientError::Query(format!(
                    "database \"{}\" already exists (SQLSTATE 42P04)",
                    name
                )));
            }
            state.mutations += 1;
        } else if let Some(name) = statement.strip_prefix("CREATE EXTENSION IF NOT EXISTS ") {
            let name = unquote(name);
            if state.rejected_extensions.contains(&name) {
                return Err(PostgresClientError::Query(format!(
                    "extension \"{}\" is not available (SQLSTATE 0A000)",
                    name
                )));
            }
            if !state.ignored_extensions.contains(&name) {
                let database = self.database.clone();
                if state.extensions.entry(database).or_default().insert(name) {
                    state.mutations += 1;
                }
            }
        }
        Ok(())
    }

    async fn database_exists(&self, name: &str) -> PostgresClientResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.catalog_queries += 1;
        Ok(state.databases.contains(name))
    }

    async fn installed_extensions(&self, names: &[String]) -> PostgresClientResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.catalog_queries += 1;
        let installed = state.extensions.get(&self.database);
        let mut found: Vec<String> = names
            .iter()
            .filter(|n| installed.is_some_and(|e| e.contains(*n)))
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }

    async fn close(self: Box<Self>) -> PostgresClientResult<()> {
        self.state.lock().unwrap().closed_sessions += 1;
        Ok(())
    }
}

/// Initializer with default configuration over `cluster`
pub fn initializer_for(cluster: &MockCluster) -> Initializer {
    Initializer::new(Arc::new(cluster.clone()), InitializerConfig::default())
}

// =============================================================================
// Instrumented step executor
// =============================================================================

/// Start and finish instants of one executed step
#[derive(Debug, Clone, Copy)]
pub struct StepTiming {
    pub index: usize,
    pub started: Instant,
    pub finished: Instant,
}

/// Executor that records when each step ran and can fail at a chosen index
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    timings: Mutex<Vec<StepTiming>>,
    fail_at: Option<usize>,
    step_duration: Duration,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Each step takes `duration` to complete
    pub fn with_step_duration(mut self, duration: Duration) -> Self {
        self.step_duration = duration;
        self
    }

    pub fn timings(&self) -> Vec<StepTiming> {
        self.timings.lock().unwrap().clone()
    }

    pub fn started_indices(&self) -> Vec<usize> {
        self.timings().iter().map(|t| t.index).collect()
    }
}

#[async_trait]
impl StepExecutor for RecordingExecutor {
    async fn execute(&self, step: &InitializationStep) -> PostgresClientResult<()> {
        let started = Instant::now();
        if !self.step_duration.is_zero() {
            tokio::time::sleep(self.step_duration).await;
        }
        let finished = Instant::now();

        self.timings.lock().unwrap().push(StepTiming {
            index: step.sequence_index(),
            started,
            finished,
        });

        if self.fail_at == Some(step.sequence_index()) {
            return Err(PostgresClientError::Query(format!(
                "step {} rejected (SQLSTATE 42601)",
                step.sequence_index()
            )));
        }
        Ok(())
    }
}

/// Plan of `count` trivial steps against the admin database
pub fn plan_of(count: usize) -> StepPlan {
    (0..count).fold(StepPlan::new(), |plan, i| {
        plan.then(format!("SELECT {}", i), ADMIN_DATABASE)
    })
}

/// Gate whose settle delay has already elapsed
pub fn settled_gate() -> ReadinessGate {
    ReadinessGate::new(
        WriterActiveMarker::at(Utc::now() - chrono::Duration::hours(1)),
        Duration::from_secs(60),
    )
}

/// Gate for a writer that just became active
pub fn fresh_gate(settle_delay: Duration) -> ReadinessGate {
    ReadinessGate::new(WriterActiveMarker::now(), settle_delay)
}
