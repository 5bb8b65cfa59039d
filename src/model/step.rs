//! Initialization steps and the ordered plan that holds them
//!
//! A `StepPlan` assigns each step its `sequence_index` as the step is appended,
//! so a plan always holds indices `0..len` in order. There is no constructor that
//! accepts caller-supplied indices.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single administrative statement run against a specific database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationStep {
    sequence_index: usize,
    statement: String,
    target_database: String,
}

impl InitializationStep {
    /// Position of this step in its plan (zero-based)
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// The administrative statement to execute
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Database the statement runs against
    pub fn target_database(&self) -> &str {
        &self.target_database
    }

    /// What must have completed before this step may start
    pub fn depends_on(&self) -> StepDependency {
        match self.sequence_index {
            0 => StepDependency::ReadinessGate,
            n => StepDependency::Step(n - 1),
        }
    }
}

/// Implicit predecessor of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDependency {
    /// The first step waits for the readiness gate to fire
    ReadinessGate,
    /// Every later step waits for the step with this index
    Step(usize),
}

/// Serialized form of a step inside a plan file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDefinition {
    statement: String,
    target_database: String,
}

/// Errors loading a step plan from disk
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Failed to read plan file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid plan file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Step {index} has an empty {field}")]
    EmptyField { index: usize, field: &'static str },
}

/// Ordered, immutable list of initialization steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepPlan {
    steps: Vec<InitializationStep>,
}

impl StepPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; it runs after every step already in the plan
    pub fn then(mut self, statement: impl Into<String>, target_database: impl Into<String>) -> Self {
        let sequence_index = self.steps.len();
        self.steps.push(InitializationStep {
            sequence_index,
            statement: statement.into(),
            target_database: target_database.into(),
        });
        self
    }

    /// Parse a plan from JSON: `[{"statement": "...", "targetDatabase": "..."}]`
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let definitions: Vec<StepDefinition> = serde_json::from_str(json)?;

        let mut plan = Self::new();
        for (index, def) in definitions.into_iter().enumerate() {
            if def.statement.trim().is_empty() {
                return Err(PlanError::EmptyField {
                    index,
                    field: "statement",
                });
            }
            if def.target_database.trim().is_empty() {
                return Err(PlanError::EmptyField {
                    index,
                    field: "targetDatabase",
                });
            }
            plan = plan.then(def.statement, def.target_database);
        }
        Ok(plan)
    }

    /// Load a plan file from disk
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[InitializationStep] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InitializationStep> {
        self.steps.iter()
    }
}

impl<'a> IntoIterator for &'a StepPlan {
    type Item = &'a InitializationStep;
    type IntoIter = std::slice::Iter<'a, InitializationStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Terminal status of an executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Succeeded,
    Failed(String),
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Succeeded => write!(f, "Succeeded"),
            StepStatus::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Execution record of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub sequence_index: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: StepStatus,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}
