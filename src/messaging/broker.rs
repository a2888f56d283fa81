use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

// ── Error ──────────────────────────────────────────────────────────────────────

/// Failure of a single broker operation. The message is the transport's own
/// description; nothing here is meant for HTTP callers.
#[derive(Debug, Clone)]
pub enum BrokerError {
    Connection(String),
    Channel(String),
    Declare(String),
    Publish(String),
    Consume(String),
    Delivery(String),
    Cancel(String),
    Delete(String),
    Close(String),
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(m) => write!(f, "broker connection error: {m}"),
            Self::Channel(m) => write!(f, "channel open failed: {m}"),
            Self::Declare(m) => write!(f, "reply queue declaration failed: {m}"),
            Self::Publish(m) => write!(f, "publish failed: {m}"),
            Self::Consume(m) => write!(f, "failed to start consuming: {m}"),
            Self::Delivery(m) => write!(f, "delivery stream error: {m}"),
            Self::Cancel(m) => write!(f, "consumer cancel failed: {m}"),
            Self::Delete(m) => write!(f, "reply queue delete failed: {m}"),
            Self::Close(m) => write!(f, "channel close failed: {m}"),
        }
    }
}

impl std::error::Error for BrokerError {}

// ── Wire types ─────────────────────────────────────────────────────────────────

/// AMQP properties attached to every published job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishProperties {
    pub correlation_id: String,
    pub reply_to: String,
    /// Broker drops the message if nobody consumed it within this window.
    pub expiration: Duration,
}

/// Payloads delivered to a reply queue, in broker order.
pub type Deliveries = BoxStream<'static, Result<Vec<u8>, BrokerError>>;

// ── Seams ──────────────────────────────────────────────────────────────────────

/// Process-wide broker handle. Cheap to clone, safe to share across requests.
///
/// The production implementation is [`super::RabbitBroker`]; tests use an
/// in-process fake so the request path can run without RabbitMQ.
#[async_trait]
pub trait Broker: Clone + Send + Sync + 'static {
    type Channel: BrokerChannel;

    /// Open a fresh channel owned by the calling request.
    async fn open_channel(&self) -> Result<Self::Channel, BrokerError>;
}

/// One request's AMQP channel. Clones refer to the same channel.
#[async_trait]
pub trait BrokerChannel: Clone + Send + Sync + 'static {
    /// Declare an exclusive, server-named queue and return its name.
    async fn declare_reply_queue(&self) -> Result<String, BrokerError>;

    /// Publish on the default exchange, i.e. straight to queue `routing_key`.
    async fn publish(
        &self,
        routing_key: &str,
        body: &[u8],
        properties: PublishProperties,
    ) -> Result<(), BrokerError>;

    /// Register consumer `consumer_tag` on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Deliveries, BrokerError>;

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError>;

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}
