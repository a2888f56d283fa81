use std::sync::Arc;
use std::time::Duration;

use crate::messaging::{Broker, ReplyChannel};
use crate::metrics::Metrics;
use crate::model::SynthesisJob;

use super::assembler::{ResponseAssembler, SynthBody};
use super::error::BridgeError;

/// Per-deployment limits applied to every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Maximum total characters across the job's `text` segments.
    pub max_chars: usize,
    /// Bound on each wait for a reply message. `None` waits until the client
    /// gives up.
    pub reply_timeout: Option<Duration>,
}

/// Successful outcome of [`Bridge::submit`].
pub struct SynthReply {
    pub content_type: &'static str,
    pub body: SynthBody,
}

/// Runs one HTTP synthesis call as an RPC over the broker.
///
/// # Request flow
///
/// ```text
/// Validating ──► ChannelOpen ──► Published ──► AwaitingReply ──► Completed
///     │               │              │               │
///     └──► 400/413    └──► 500       └──► 500        └──► 5xx / 504
///       (nothing       (nothing       (reply queue released on every
///        opened)        allocated)     path from here on)
/// ```
///
/// The reply queue is held by a [`ReplyChannel`] guard from `ChannelOpen`
/// onwards. Its setup and teardown run detached, so cancelling the request
/// future at any await point still releases it.
pub struct Bridge<B: Broker> {
    broker: B,
    settings: BridgeSettings,
    metrics: Arc<Metrics>,
}

impl<B: Broker> Bridge<B> {
    pub fn new(broker: B, settings: BridgeSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            broker,
            settings,
            metrics,
        }
    }

    /// Parse `body` as a job, publish it and assemble the worker's reply.
    pub async fn submit(&self, body: &[u8]) -> Result<SynthReply, BridgeError> {
        self.metrics.inc_received();

        let result = self.run(body).await;

        if let Err(e) = &result {
            if e.is_rejection() {
                self.metrics.inc_rejected();
                tracing::info!(error = %e, "🚫 job rejected");
            } else {
                self.metrics.inc_failed();
                tracing::warn!(error = %e, "❌ job failed");
            }
        }

        result
    }

    async fn run(&self, body: &[u8]) -> Result<SynthReply, BridgeError> {
        // ── Validating ────────────────────────────────────────────────────────
        let job: SynthesisJob =
            serde_json::from_slice(body).map_err(|e| BridgeError::MalformedJob(e.to_string()))?;

        let chars = job.text_chars()?;
        if chars > self.settings.max_chars {
            return Err(BridgeError::QuotaExceeded {
                chars,
                max: self.settings.max_chars,
            });
        }

        let mode = job.mode();
        let content_type = job.audio_format().content_type();

        // ── ChannelOpen ───────────────────────────────────────────────────────
        let reply = ReplyChannel::open(&self.broker, Arc::clone(&self.metrics))
            .await
            .map_err(BridgeError::BrokerUnavailable)?;

        // ── Published ─────────────────────────────────────────────────────────
        let token = match reply.publish(body, mode).await {
            Ok(token) => token,
            Err(e) => {
                reply.close().await;
                return Err(BridgeError::PublishFailed(e));
            }
        };

        tracing::info!(
            correlation_id = %token,
            mode = %mode,
            format = %job.format,
            chars,
            reply_to = reply.queue(),
            "▶️  job submitted"
        );

        // ── AwaitingReply → Completed ─────────────────────────────────────────
        let body = ResponseAssembler::for_mode(mode)
            .assemble(reply, self.settings.reply_timeout, Arc::clone(&self.metrics))
            .await?;

        Ok(SynthReply { content_type, body })
    }
}
