use std::sync::Arc;
use std::time::{Duration, Instant};

use hoist_domain::NodeId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DeployError;
use crate::metrics::{ClusterMetrics, MetricsProvider};

/// Thresholds and timing for the post-deploy quiescence window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizationConfig {
    /// Allowed CPU drift from baseline, in percent.
    pub cpu_delta_percent: f64,
    /// Allowed memory drift from baseline, in percent.
    pub memory_delta_percent: f64,
    /// Allowed latency drift from baseline, in percent.
    pub latency_delta_percent: f64,
    pub polling_interval: Duration,
    pub consecutive_stable_checks: u32,
    pub minimum_wait: Duration,
    pub maximum_wait: Duration,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            cpu_delta_percent: 10.0,
            memory_delta_percent: 10.0,
            latency_delta_percent: 20.0,
            polling_interval: Duration::from_secs(5),
            consecutive_stable_checks: 3,
            minimum_wait: Duration::from_secs(10),
            maximum_wait: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilizationResult {
    pub is_stable: bool,
    pub elapsed: Duration,
    /// The stable streak at exit.
    pub consecutive_stable_checks: u32,
    pub total_checks: u32,
    pub timeout_reached: bool,
}

/// Polls node metrics after a deploy and decides when the fleet has settled
/// back to within configured deltas of the pre-deploy baseline.
#[derive(Clone)]
pub struct ResourceStabilizationService {
    metrics: Arc<dyn MetricsProvider>,
}

impl ResourceStabilizationService {
    pub fn new(metrics: Arc<dyn MetricsProvider>) -> Self {
        Self { metrics }
    }

    /// Snapshot aggregate metrics for `node_ids`, used as the pre-deploy
    /// baseline.
    pub async fn baseline(&self, node_ids: &[NodeId]) -> Result<ClusterMetrics, DeployError> {
        let nodes = self.metrics.nodes_metrics(node_ids).await?;
        Ok(ClusterMetrics::aggregate(&nodes))
    }

    /// Poll until `consecutive_stable_checks` consecutive samples sit within
    /// the configured deltas of `baseline` and at least `minimum_wait` has
    /// elapsed, or until `maximum_wait` runs out.
    ///
    /// A failed metrics fetch counts as an unstable check (streak resets);
    /// transient monitoring gaps must not green-light a traffic switch.
    pub async fn wait_for_stabilization(
        &self,
        node_ids: &[NodeId],
        baseline: &ClusterMetrics,
        config: &StabilizationConfig,
        cancel: &CancellationToken,
    ) -> Result<StabilizationResult, DeployError> {
        let started = Instant::now();
        let mut consecutive = 0u32;
        let mut total = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(DeployError::Cancelled);
            }

            let stable = match self.metrics.nodes_metrics(node_ids).await {
                Ok(nodes) => {
                    let current = ClusterMetrics::aggregate(&nodes);
                    self.is_within_deltas(baseline, &current, config)
                }
                Err(e) => {
                    warn!(error = %e, "metrics fetch failed during stabilization; counting as unstable");
                    false
                }
            };
            total += 1;
            if stable {
                consecutive += 1;
            } else {
                consecutive = 0;
            }
            debug!(total, consecutive, stable, "stabilization check");

            let elapsed = started.elapsed();
            if consecutive >= config.consecutive_stable_checks && elapsed >= config.minimum_wait
            {
                return Ok(StabilizationResult {
                    is_stable: true,
                    elapsed,
                    consecutive_stable_checks: consecutive,
                    total_checks: total,
                    timeout_reached: false,
                });
            }
            if elapsed >= config.maximum_wait {
                return Ok(StabilizationResult {
                    is_stable: false,
                    elapsed,
                    consecutive_stable_checks: consecutive,
                    total_checks: total,
                    timeout_reached: true,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(DeployError::Cancelled),
                _ = tokio::time::sleep(config.polling_interval) => {}
            }
        }
    }

    fn is_within_deltas(
        &self,
        baseline: &ClusterMetrics,
        current: &ClusterMetrics,
        config: &StabilizationConfig,
    ) -> bool {
        within_delta(baseline.avg_cpu_percent, current.avg_cpu_percent, config.cpu_delta_percent)
            && within_delta(
                baseline.avg_memory_percent,
                current.avg_memory_percent,
                config.memory_delta_percent,
            )
            && within_delta(
                baseline.avg_latency_ms,
                current.avg_latency_ms,
                config.latency_delta_percent,
            )
    }
}

/// Relative drift check. A zero baseline has no relative scale, so the
/// current value is compared absolutely against the delta.
fn within_delta(baseline: f64, current: f64, delta_percent: f64) -> bool {
    if baseline.abs() < f64::EPSILON {
        return current.abs() <= delta_percent;
    }
    ((current - baseline).abs() / baseline.abs()) * 100.0 <= delta_percent
}
