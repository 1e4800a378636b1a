mod error;
mod loader;
mod raw;

pub use error::ConfigError;
pub use loader::{
    load_config, BrokerSettings, ClusterTopology, DeliverySettings, NodeSpec, PipelineSettings,
    ServerConfig, StabilizationSettings, StoreBackend,
};
