use std::sync::Arc;
use std::time::Duration;

use hoist_store::MessageQueue;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrokerHealth {
    /// No successful sample yet.
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for BrokerHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BrokerHealth::Unknown => "unknown",
            BrokerHealth::Healthy => "healthy",
            BrokerHealth::Degraded => "degraded",
            BrokerHealth::Unhealthy => "unhealthy",
        };
        write!(f, "{}", s)
    }
}

/// Queue-depth classification bounds: `< degraded_depth` is healthy,
/// `[degraded_depth, unhealthy_depth]` degraded, above that unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub degraded_depth: u64,
    pub unhealthy_depth: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self { degraded_depth: 500, unhealthy_depth: 1000 }
    }
}

impl HealthThresholds {
    pub fn classify(&self, depth: u64) -> BrokerHealth {
        if depth < self.degraded_depth {
            BrokerHealth::Healthy
        } else if depth <= self.unhealthy_depth {
            BrokerHealth::Degraded
        } else {
            BrokerHealth::Unhealthy
        }
    }
}

/// Periodic queue-depth sampler. Sampling errors are logged and leave the
/// previous status in place; the loop never stops on them.
pub struct BrokerHealthMonitor {
    queue: Arc<dyn MessageQueue>,
    thresholds: HealthThresholds,
    interval: Duration,
    status: RwLock<BrokerHealth>,
}

impl BrokerHealthMonitor {
    pub fn new(queue: Arc<dyn MessageQueue>, thresholds: HealthThresholds) -> Self {
        Self {
            queue,
            thresholds,
            interval: Duration::from_secs(5),
            status: RwLock::new(BrokerHealth::Unknown),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn current_status(&self) -> BrokerHealth {
        *self.status.read().await
    }

    /// One sample. Returns the (possibly unchanged) status.
    pub async fn check_once(&self) -> BrokerHealth {
        match self.queue.count().await {
            Ok(depth) => {
                let next = self.thresholds.classify(depth);
                let mut status = self.status.write().await;
                if *status != next {
                    info!(depth, from = %*status, to = %next, "broker health changed");
                }
                *status = next;
                next
            }
            Err(e) => {
                error!(error = %e, "broker health sample failed");
                *self.status.read().await
            }
        }
    }

    /// Run until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
            let status = self.check_once().await;
            debug!(status = %status, "broker health sampled");
        }
    }
}
