//! Data model shared by the gate, the sequencer, and the initializer

pub mod endpoint;
pub mod lifecycle;
pub mod step;

pub use endpoint::{
    ApplicationConnectionInfo, ClusterEndpoint, CredentialRef, DEFAULT_PASSWORD_VAR,
    DEFAULT_USERNAME_VAR, WriterActiveMarker,
};
pub use lifecycle::{
    InitializationOutcome, LifecycleEvent, LifecycleFailure, LifecycleResponse, OutcomeDetail,
    OutcomeStatus, PHYSICAL_RESOURCE_ID, RequestType, ResourceProperties, ResponseData,
};
pub use step::{
    InitializationStep, PlanError, StepDependency, StepPlan, StepRecord, StepStatus,
};
