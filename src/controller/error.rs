//! Error types for the bootstrap controller

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::model::PlanError;
use crate::resources::postgres_client::PostgresClientError;

/// Phase of the initializer's create/update path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// Opening the session on the primary/admin database
    ConnectingAdmin,
    /// Checking for and creating the secondary database
    EnsuringDatabase,
    /// Opening the session on the secondary database
    ConnectingSecondary,
    InstallingExtensions,
    VerifyingExtensions,
}

impl fmt::Display for InitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitPhase::ConnectingAdmin => write!(f, "ConnectingAdmin"),
            InitPhase::EnsuringDatabase => write!(f, "EnsuringDatabase"),
            InitPhase::ConnectingSecondary => write!(f, "ConnectingSecondary"),
            InitPhase::InstallingExtensions => write!(f, "InstallingExtensions"),
            InitPhase::VerifyingExtensions => write!(f, "VerifyingExtensions"),
        }
    }
}

/// Error variants are named with the `Error` suffix where they wrap another layer's error.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] PostgresClientError),

    #[error("Step plan error: {0}")]
    PlanError(#[from] PlanError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cluster not ready after {0:?}")]
    ReadinessTimeout(Duration),

    #[error("Step {index} failed: {source}")]
    StepFailed {
        index: usize,
        #[source]
        source: PostgresClientError,
    },

    #[error("Database initialization failed during {phase}: {source}")]
    Initialization {
        phase: InitPhase,
        #[source]
        source: PostgresClientError,
    },

    #[error("Extensions missing after installation: {0:?}")]
    MissingExtensions(Vec<String>),
}

impl Error {
    /// Check if this error is retryable by the layer that triggered the work
    ///
    /// The initializer and sequencer never retry internally.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::PostgresError(e) => e.is_connectivity(),
            Error::StepFailed { source, .. } => source.is_connectivity(),
            Error::Initialization { source, .. } => source.is_connectivity(),
            Error::ReadinessTimeout(_) => true,
            // Statement, configuration, and catalog errors are permanent
            Error::PlanError(_) => false,
            Error::SerializationError(_) => false,
            Error::InvalidConfig(_) => false,
            Error::MissingExtensions(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }
}
