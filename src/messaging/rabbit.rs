use std::time::Duration;

use async_trait::async_trait;
use deadpool_lapin::Manager;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions,
        QueueDeleteOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, ConnectionProperties,
};

use super::broker::{Broker, BrokerChannel, BrokerError, Deliveries, PublishProperties};

/// Re-exported so other modules inside `messaging/` can import Pool from here.
pub type Pool = deadpool_lapin::Pool;

// ── Topology ───────────────────────────────────────────────────────────────────
// Both queues are owned and declared by the worker side; the bridge publishes
// to them through the default exchange.

/// Queue for batch jobs (one reply with the whole payload).
pub const BATCH_QUEUE: &str = "tts_queue";
/// Queue for realtime jobs (chunked replies, empty message terminates).
pub const REALTIME_QUEUE: &str = "tts_realtime";
/// The nameless default exchange routes by queue name.
pub const DEFAULT_EXCHANGE: &str = "";

/// Per-message expiration on published jobs.
pub const MESSAGE_TTL: Duration = Duration::from_secs(600);

// ── Connection retry ───────────────────────────────────────────────────────────

const MAX_CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum RabbitError {
    /// Could not establish a connection after all retry attempts.
    Connection(String),
    /// Failed to build the connection pool itself.
    Pool(String),
}

impl std::fmt::Display for RabbitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "RabbitMQ connection failed: {msg}"),
            Self::Pool(msg) => write!(f, "connection pool build failed: {msg}"),
        }
    }
}

impl std::error::Error for RabbitError {}

// ── Pool constructor ───────────────────────────────────────────────────────────

/// Build a [`deadpool_lapin`] connection pool and verify connectivity.
///
/// Attempts up to [`MAX_CONNECT_ATTEMPTS`] (10) times with a
/// [`CONNECT_RETRY_INTERVAL`] (5 s) delay between attempts. After startup the
/// pool recycles broken connections on its own, so a broker restart costs
/// the in-flight requests but not the process.
pub async fn build_pool(url: &str, max_connections: usize) -> Result<Pool, RabbitError> {
    let manager = Manager::new(url, ConnectionProperties::default());

    let pool = Pool::builder(manager)
        .max_size(max_connections)
        .build()
        .map_err(|e| RabbitError::Pool(e.to_string()))?;

    let mut attempt = 1;
    loop {
        match pool.get().await {
            Ok(_) => {
                tracing::info!("📡 RabbitMQ connected");
                return Ok(pool);
            }
            Err(e) if attempt < MAX_CONNECT_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    max = MAX_CONNECT_ATTEMPTS,
                    error = %e,
                    "⚠️  RabbitMQ not ready, retrying in {}s...",
                    CONNECT_RETRY_INTERVAL.as_secs()
                );
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(RabbitError::Connection(format!(
                    "failed after {MAX_CONNECT_ATTEMPTS} attempts: {e}"
                )));
            }
        }
    }
}

// ── RabbitBroker ───────────────────────────────────────────────────────────────

/// [`Broker`] backed by the shared connection pool.
///
/// Cloning is cheap (the pool is `Arc`-backed). Each request borrows a pooled
/// connection only long enough to open its own channel; the channel keeps the
/// underlying connection alive after the pool object is returned.
#[derive(Clone)]
pub struct RabbitBroker {
    pool: Pool,
}

impl RabbitBroker {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Broker for RabbitBroker {
    type Channel = RabbitChannel;

    async fn open_channel(&self) -> Result<RabbitChannel, BrokerError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;

        // conn (pool Object) drops here; the channel's Arc<Connection> keeps
        // the TCP connection alive.
        Ok(RabbitChannel { channel })
    }
}

/// lapin channel owned by one request.
#[derive(Clone)]
pub struct RabbitChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for RabbitChannel {
    async fn declare_reply_queue(&self) -> Result<String, BrokerError> {
        // Empty name: the broker picks one (`amq.gen-…`).
        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(e.to_string()))?;

        Ok(queue.name().as_str().to_string())
    }

    async fn publish(
        &self,
        routing_key: &str,
        body: &[u8],
        properties: PublishProperties,
    ) -> Result<(), BrokerError> {
        // AMQP expiration is a string of milliseconds.
        let expiration = properties.expiration.as_millis().to_string();

        let props = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_correlation_id(properties.correlation_id.into())
            .with_reply_to(properties.reply_to.into())
            .with_expiration(expiration.into());

        // Fire-and-forget: the confirm is not awaited, the reply is the ack.
        self.channel
            .basic_publish(
                DEFAULT_EXCHANGE,
                routing_key,
                BasicPublishOptions::default(),
                body,
                props,
            )
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Deliveries, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    // The queue is private and deleted after use; nothing to redeliver.
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(e.to_string()))?;

        Ok(consumer
            .map(|delivery| {
                delivery
                    .map(|d| d.data)
                    .map_err(|e| BrokerError::Delivery(e.to_string()))
            })
            .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|e| BrokerError::Cancel(e.to_string()))
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await
            .map(|_purged| ())
            .map_err(|e| BrokerError::Delete(e.to_string()))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.channel
            .close(200, "OK")
            .await
            .map_err(|e| BrokerError::Close(e.to_string()))
    }
}
