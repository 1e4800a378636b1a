pub mod ack;
pub mod broker;
pub mod delivery;
pub mod dispatch;
pub mod dlq;
pub mod error;
pub mod exactly_once;
pub mod health;
pub mod router;
pub mod topics;
pub mod transport;

pub use ack::AckTimeoutMonitor;
pub use broker::{MessageBroker, MAX_TOPIC_FETCH};
pub use delivery::{DeliverFn, DeliveryOptions, DeliveryOutcome, DeliveryService};
pub use dispatch::Dispatcher;
pub use dlq::{
    DeadLetterService, DLQ_DELIVERY_ATTEMPTS_HEADER, DLQ_ORIGINAL_TOPIC_HEADER,
    DLQ_REASON_HEADER, DLQ_TIMESTAMP_HEADER,
};
pub use error::BrokerError;
pub use exactly_once::{ExactlyOnceDelivery, ExactlyOnceOutcome};
pub use health::{BrokerHealth, BrokerHealthMonitor, HealthThresholds};
pub use router::{Router, RouteResult, RoutingStrategyKind, ROUTING_STRATEGY_CONFIG_KEY};
pub use topics::{SubscriptionRegistry, TopicRegistry, TopicUpdate};
pub use transport::{ConsumerTransport, HttpPushTransport};
