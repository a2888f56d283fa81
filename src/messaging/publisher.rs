use crate::model::{CorrelationToken, JobMode};

use super::broker::{BrokerChannel, PublishProperties};
use super::rabbit::{BATCH_QUEUE, MESSAGE_TTL, REALTIME_QUEUE};

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum PublishError {
    Publish(String),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish(m) => write!(f, "publish failed: {m}"),
        }
    }
}

impl std::error::Error for PublishError {}

// ── Publishing ─────────────────────────────────────────────────────────────────

/// Queue a job of the given mode is routed to.
fn routing_key(mode: JobMode) -> &'static str {
    match mode {
        JobMode::Realtime => REALTIME_QUEUE,
        JobMode::Batch => BATCH_QUEUE,
    }
}

/// Publish the job JSON in `body` for the workers and return the correlation
/// token it carries.
///
/// The body goes out byte for byte as the caller sent it. The message names
/// `reply_to` as its reply queue and expires after [`MESSAGE_TTL`]. No
/// validation happens here; the caller has already checked the job.
pub async fn publish<C: BrokerChannel>(
    channel: &C,
    reply_to: &str,
    body: &[u8],
    mode: JobMode,
) -> Result<CorrelationToken, PublishError> {
    let token = CorrelationToken::mint();
    let routing_key = routing_key(mode);

    let properties = PublishProperties {
        correlation_id: token.as_str().to_string(),
        reply_to: reply_to.to_string(),
        expiration: MESSAGE_TTL,
    };

    channel
        .publish(routing_key, body, properties)
        .await
        .map_err(|e| PublishError::Publish(e.to_string()))?;

    tracing::debug!(
        correlation_id = %token,
        routing_key,
        reply_to,
        bytes = body.len(),
        "📨 job published"
    );

    Ok(token)
}
