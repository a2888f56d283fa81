use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::messaging::{BrokerChannel, Deliveries, ReplyChannel};
use crate::metrics::Metrics;
use crate::model::JobMode;

use super::error::BridgeError;

/// Audio chunks in worker order. Ends after the empty terminator or with one
/// `Err` item.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, BridgeError>>;

/// What the caller gets back for a job.
pub enum SynthBody {
    /// The worker's single reply, already complete.
    Buffered(Vec<u8>),
    /// Chunks forwarded as they arrive. The stream owns the reply queue and
    /// releases it when it ends or is dropped.
    Streaming(ChunkStream),
}

/// Turns reply messages into a [`SynthBody`], one variant per [`JobMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAssembler {
    Batch,
    Streaming,
}

impl ResponseAssembler {
    pub fn for_mode(mode: JobMode) -> Self {
        match mode {
            JobMode::Batch => Self::Batch,
            JobMode::Realtime => Self::Streaming,
        }
    }

    /// Attach the consumer and collect (batch) or hand over (streaming) the reply.
    ///
    /// Takes ownership of `reply`. Batch releases it before returning;
    /// streaming moves it into the returned stream.
    pub async fn assemble<C: BrokerChannel>(
        self,
        mut reply: ReplyChannel<C>,
        deadline: Option<Duration>,
        metrics: Arc<Metrics>,
    ) -> Result<SynthBody, BridgeError> {
        let deliveries = match reply.consume().await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                reply.close().await;
                return Err(BridgeError::ReplyStream(e));
            }
        };

        match self {
            Self::Batch => {
                let mut deliveries = deliveries;
                let first = next_message(&mut deliveries, deadline).await;
                drop(deliveries);
                reply.close().await;

                let payload = first?;
                metrics.inc_batch_replies();
                tracing::info!(bytes = payload.len(), "✅ batch reply received");
                Ok(SynthBody::Buffered(payload))
            }
            Self::Streaming => Ok(SynthBody::Streaming(chunk_stream(
                reply, deliveries, deadline, metrics,
            ))),
        }
    }
}

// ── Streaming ──────────────────────────────────────────────────────────────────

struct StreamState<C: BrokerChannel> {
    reply: ReplyChannel<C>,
    deliveries: Deliveries,
    deadline: Option<Duration>,
    metrics: Arc<Metrics>,
    chunks: usize,
}

/// Forward non-empty payloads in order; the first empty payload ends the
/// stream and is not forwarded.
fn chunk_stream<C: BrokerChannel>(
    reply: ReplyChannel<C>,
    deliveries: Deliveries,
    deadline: Option<Duration>,
    metrics: Arc<Metrics>,
) -> ChunkStream {
    let state = StreamState {
        reply,
        deliveries,
        deadline,
        metrics,
        chunks: 0,
    };

    futures_util::stream::unfold(Some(state), |state| async move {
        let Some(mut state) = state else {
            return None;
        };

        match next_message(&mut state.deliveries, state.deadline).await {
            Ok(payload) if !payload.is_empty() => {
                state.chunks += 1;
                Some((Ok(payload), Some(state)))
            }
            Ok(_) => {
                let StreamState { reply, deliveries, metrics, chunks, .. } = state;
                drop(deliveries);
                reply.close().await;
                metrics.inc_streams_completed();
                tracing::info!(chunks, "✅ stream complete");
                None
            }
            Err(e) => {
                let StreamState { reply, deliveries, metrics, chunks, .. } = state;
                drop(deliveries);
                reply.close().await;
                metrics.inc_failed();
                tracing::warn!(chunks, error = %e, "❌ stream aborted");
                Some((Err(e), None))
            }
        }
    })
    .boxed()
}

/// Wait for the next reply payload, bounded by `deadline` when set.
async fn next_message(
    deliveries: &mut Deliveries,
    deadline: Option<Duration>,
) -> Result<Vec<u8>, BridgeError> {
    let next = match deadline {
        Some(limit) => tokio::time::timeout(limit, deliveries.next())
            .await
            .map_err(|_| BridgeError::ReplyTimeout(limit))?,
        None => deliveries.next().await,
    };

    match next {
        Some(Ok(payload)) => Ok(payload),
        Some(Err(e)) => Err(BridgeError::ReplyStream(e)),
        None => Err(BridgeError::ReplyStreamClosed),
    }
}
