use std::sync::Arc;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::model::{CorrelationToken, JobMode};

use super::broker::{Broker, BrokerChannel, BrokerError, Deliveries};
use super::publisher::{self, PublishError};

/// A request's private reply queue and the channel it lives on.
///
/// # Lifecycle
///
/// ```text
/// open ──► publish ──► consume ──► close
///   │                                ▲
///   └──── any failure / drop ────────┘
/// ```
///
/// Teardown cancels the consumer (if one was registered), deletes the queue
/// and closes the channel, in that order, exactly once. Setup and teardown
/// both run on detached tasks that the caller awaits, so a request cancelled
/// mid-setup or mid-teardown still releases everything. If the guard is
/// dropped without [`close`](Self::close) (the request future was cancelled,
/// the client went away mid-stream, an early `?` return) `Drop` spawns the
/// same teardown on the current runtime.
///
/// Teardown failures are logged and swallowed: whatever error ended the
/// request is the one the caller sees.
pub struct ReplyChannel<C: BrokerChannel> {
    channel: C,
    queue: String,
    consumer_tag: Option<String>,
    metrics: Arc<Metrics>,
    released: bool,
}

impl<C: BrokerChannel> ReplyChannel<C> {
    /// Open a channel on `broker` and declare an exclusive reply queue on it.
    ///
    /// If the channel opens but the declaration fails, the channel is closed
    /// before the error is returned; on `Err` nothing is left allocated. If
    /// the caller stops waiting, the setup task releases what it opened.
    pub async fn open<B>(broker: &B, metrics: Arc<Metrics>) -> Result<Self, BrokerError>
    where
        B: Broker<Channel = C>,
    {
        let broker = broker.clone();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let opened = Self::establish(&broker, metrics).await;
            if let Err(Ok(orphan)) = tx.send(opened) {
                tracing::debug!(queue = %orphan.queue, "reply queue outlived its request");
                orphan.close().await;
            }
        });

        rx.await
            .map_err(|_| BrokerError::Channel("reply channel setup task died".into()))?
    }

    async fn establish<B>(broker: &B, metrics: Arc<Metrics>) -> Result<Self, BrokerError>
    where
        B: Broker<Channel = C>,
    {
        let channel = broker.open_channel().await?;

        let queue = match channel.declare_reply_queue().await {
            Ok(queue) => queue,
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    tracing::warn!(error = %close_err, "channel close after failed declare");
                }
                return Err(e);
            }
        };

        metrics.inc_reply_open();
        tracing::debug!(queue = %queue, "📬 reply queue declared");

        Ok(Self {
            channel,
            queue,
            consumer_tag: None,
            metrics,
            released: false,
        })
    }

    /// Broker-assigned queue name, used as the job's `reply_to`.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Publish the job JSON in `body` with this queue as its reply destination.
    pub async fn publish(
        &self,
        body: &[u8],
        mode: JobMode,
    ) -> Result<CorrelationToken, PublishError> {
        publisher::publish(&self.channel, &self.queue, body, mode).await
    }

    /// Register the queue's single consumer and return its delivery stream.
    pub async fn consume(&mut self) -> Result<Deliveries, BrokerError> {
        if self.consumer_tag.is_some() {
            return Err(BrokerError::Consume(format!(
                "queue {} already has a consumer",
                self.queue
            )));
        }

        let tag = format!("synth-{}", Uuid::new_v4().simple());
        let deliveries = self.channel.consume(&self.queue, &tag).await?;
        self.consumer_tag = Some(tag);

        Ok(deliveries)
    }

    /// Tear everything down and wait for it. The teardown finishes even if
    /// this future is dropped.
    pub async fn close(mut self) {
        self.released = true;
        let task = tokio::spawn(teardown(
            self.channel.clone(),
            std::mem::take(&mut self.queue),
            self.consumer_tag.take(),
            Arc::clone(&self.metrics),
        ));

        if let Err(e) = task.await {
            tracing::warn!(error = %e, "⚠️  reply teardown task failed");
        }
    }
}

impl<C: BrokerChannel> Drop for ReplyChannel<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let channel = self.channel.clone();
        let queue = std::mem::take(&mut self.queue);
        let consumer_tag = self.consumer_tag.take();
        let metrics = Arc::clone(&self.metrics);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(queue = %queue, "reply queue abandoned, releasing in background");
                handle.spawn(teardown(channel, queue, consumer_tag, metrics));
            }
            Err(_) => {
                // Exclusive queues still vanish with their connection.
                tracing::warn!(queue = %queue, "no runtime to release reply queue");
            }
        }
    }
}

async fn teardown<C: BrokerChannel>(
    channel: C,
    queue: String,
    consumer_tag: Option<String>,
    metrics: Arc<Metrics>,
) {
    if let Some(tag) = consumer_tag.as_deref() {
        if let Err(e) = channel.cancel(tag).await {
            tracing::warn!(queue = %queue, consumer_tag = tag, error = %e, "⚠️  consumer cancel failed");
        }
    }

    if let Err(e) = channel.delete_queue(&queue).await {
        tracing::warn!(queue = %queue, error = %e, "⚠️  reply queue delete failed");
    }

    if let Err(e) = channel.close().await {
        tracing::warn!(queue = %queue, error = %e, "⚠️  channel close failed");
    }

    metrics.dec_reply_open();
    tracing::debug!(queue = %queue, "reply queue released");
}
