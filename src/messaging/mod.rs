mod broker;
mod publisher;
mod rabbit;
mod reply;

#[cfg(test)]
pub mod fake;

pub use broker::{Broker, BrokerChannel, BrokerError, Deliveries};
pub use publisher::PublishError;
pub use rabbit::{build_pool, RabbitBroker, RabbitError};
pub use reply::ReplyChannel;

#[cfg(test)]
pub use rabbit::{BATCH_QUEUE, MESSAGE_TTL, REALTIME_QUEUE};
