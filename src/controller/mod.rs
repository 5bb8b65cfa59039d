pub mod bootstrap;
pub mod context;
pub mod error;
pub mod initializer;
pub mod readiness;
pub mod sequencer;

pub use bootstrap::{Bootstrap, BootstrapReport};
pub use context::Context;
pub use error::{BackoffConfig, Error, InitPhase, Result};
pub use initializer::{
    DEFAULT_ADMIN_DATABASE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EXTENSIONS,
    DEFAULT_SECONDARY_DATABASE, Initializer, InitializerConfig,
};
pub use readiness::{
    DEFAULT_PROBE_TIMEOUT, DEFAULT_SETTLE_DELAY, ProceedSignal, ReadinessGate, ReadinessProbe,
};
pub use sequencer::{
    SequenceFailure, SequenceReport, StatementExecutor, StepExecutor, StepSequencer,
};
