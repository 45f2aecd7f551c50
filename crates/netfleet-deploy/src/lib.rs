//! Netfleet deployment pipeline.
//!
//! Staged, failure-contained rollout of rendered configs: dependency
//! planning, per-device execution with backup-before-apply, read-only
//! validation and report aggregation.

pub mod executor;
pub mod gate;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod validator;

pub use executor::{DeployStatus, DeploymentExecutor, DeploymentResult};
pub use gate::{AutoGate, ConfirmationGate, StdinGate};
pub use pipeline::{DeployPipeline, PipelineOptions};
pub use planner::{DeploymentPlan, DeploymentPlanner};
pub use report::{GenerationRecord, PipelineReport, PreviewRecord};
pub use validator::{CheckStatus, ValidationPhase, ValidationResult, ValidationRunner};
