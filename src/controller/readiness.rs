//! One-shot readiness gate in front of the first initialization step
//!
//! A freshly created cluster can reject administrative connections for a while
//! after its writer reports active. The gate waits out a settling delay
//! measured from the writer-active marker and, when a probe is configured,
//! then polls the administrative interface with exponential backoff until a
//! session opens.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::controller::error::{BackoffConfig, Error, Result};
use crate::model::WriterActiveMarker;
use crate::resources::admin::{AdminConnector, connect_with_timeout};

/// Default settling delay after the writer becomes active
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(60);

/// Default upper bound on the probe phase
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(300);

/// Token proving the gate has opened
///
/// Only the gate can construct one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProceedSignal {
    opened_at: DateTime<Utc>,
    probe_attempts: u32,
}

impl ProceedSignal {
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Number of connection attempts the probe made (0 without a probe)
    pub fn probe_attempts(&self) -> u32 {
        self.probe_attempts
    }
}

/// Polls the administrative interface until it accepts a session
pub struct ReadinessProbe {
    connector: Arc<dyn AdminConnector>,
    database: String,
    connect_timeout: Duration,
    backoff: BackoffConfig,
    timeout: Duration,
}

impl ReadinessProbe {
    pub fn new(
        connector: Arc<dyn AdminConnector>,
        database: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            database: database.into(),
            connect_timeout,
            backoff: BackoffConfig::default(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the number of attempts it took to open a session
    async fn wait_until_reachable(&self) -> Result<u32> {
        let deadline = Instant::now() + self.timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match connect_with_timeout(
                self.connector.as_ref(),
                &self.database,
                self.connect_timeout,
            )
            .await
            {
                Ok(session) => {
                    if let Err(e) = session.close().await {
                        warn!(error = %e, "Failed to close readiness probe session");
                    }
                    debug!(attempt, "Administrative interface reachable");
                    return Ok(attempt);
                }
                Err(e) if e.is_connectivity() => {
                    let delay = self.backoff.delay_for_attempt(attempt - 1);
                    if Instant::now() + delay > deadline {
                        warn!(attempt, error = %e, "Readiness probe gave up");
                        return Err(Error::ReadinessTimeout(self.timeout));
                    }
                    debug!(
                        attempt,
                        error = %e,
                        retry_in = ?delay,
                        "Administrative interface not ready yet"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(Error::PostgresError(e)),
            }
        }
    }
}

/// Gate that opens once per cluster lifetime
///
/// The first `await_ready` call performs the wait; every later call returns the
/// same signal without waiting again.
pub struct ReadinessGate {
    marker: WriterActiveMarker,
    settle_delay: Duration,
    probe: Option<ReadinessProbe>,
    signal: OnceCell<ProceedSignal>,
}

impl ReadinessGate {
    pub fn new(marker: WriterActiveMarker, settle_delay: Duration) -> Self {
        Self {
            marker,
            settle_delay,
            probe: None,
            signal: OnceCell::new(),
        }
    }

    pub fn with_probe(mut self, probe: ReadinessProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn marker(&self) -> &WriterActiveMarker {
        &self.marker
    }

    /// Whether the gate has already opened
    pub fn is_open(&self) -> bool {
        self.signal.initialized()
    }

    /// Portion of the settling delay still outstanding at `now`
    ///
    /// A marker in the future counts as zero elapsed time.
    pub fn remaining_settle_delay(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - self.marker.activated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.settle_delay.saturating_sub(elapsed)
    }

    /// Wait until the cluster is safe to query
    pub async fn await_ready(&self) -> Result<ProceedSignal> {
        self.signal.get_or_try_init(|| self.open()).await.copied()
    }

    async fn open(&self) -> Result<ProceedSignal> {
        let wait = self.remaining_settle_delay(Utc::now());
        if !wait.is_zero() {
            info!(
                activated_at = %self.marker.activated_at,
                wait = ?wait,
                "Waiting for cluster to settle before first administrative query"
            );
            tokio::time::sleep(wait).await;
        }

        let probe_attempts = match &self.probe {
            Some(probe) => probe.wait_until_reachable().await?,
            None => 0,
        };

        info!(probe_attempts, "Readiness gate open");
        Ok(ProceedSignal {
            opened_at: Utc::now(),
            probe_attempts,
        })
    }
}
