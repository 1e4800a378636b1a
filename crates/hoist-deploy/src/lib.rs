pub mod bluegreen;
pub mod canary;
pub mod cluster;
pub mod direct;
pub mod error;
pub mod metrics;
pub mod node;
pub mod rolling;
pub mod stabilize;
pub mod strategy;

pub use bluegreen::BlueGreenStrategy;
pub use canary::{CanaryConfig, CanaryStrategy};
pub use cluster::{ClusterHealth, ClusterSet, EnvironmentCluster};
pub use direct::DirectStrategy;
pub use error::DeployError;
pub use metrics::{ClusterMetrics, MetricsProvider, NodeMetrics, StaticMetricsProvider};
pub use node::{DeploymentRecord, FailureMode, KernelNode, NodeDeployResult};
pub use rolling::{RollingConfig, RollingStrategy};
pub use stabilize::{ResourceStabilizationService, StabilizationConfig, StabilizationResult};
pub use strategy::{DeploymentResult, DeploymentStrategy, StrategyContext, StrategyRegistry};
