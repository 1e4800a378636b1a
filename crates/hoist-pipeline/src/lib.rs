pub mod error;
pub mod orchestrator;
pub mod tracker;

pub use error::PipelineError;
pub use orchestrator::{DeploymentPipeline, PipelineConfig};
pub use tracker::{ApprovalDecision, DeploymentTracker};
