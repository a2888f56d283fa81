use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::bridge::{BridgeError, SynthBody, SynthReply};
use crate::messaging::Broker;

use super::AppState;

/// `POST /synth`
///
/// The body is read as raw bytes and parsed by the bridge, so callers do not
/// need to send a JSON content type.
pub async fn synthesize<B: Broker>(State(state): State<AppState<B>>, body: Bytes) -> Response {
    match state.bridge.submit(&body).await {
        Ok(reply) => audio_response(reply),
        Err(e) => e.into_response(),
    }
}

/// Buffered replies go out with a `Content-Length`; streams go out chunked,
/// one chunk per reply message.
fn audio_response(reply: SynthReply) -> Response {
    let body = match reply.body {
        SynthBody::Buffered(payload) => Body::from(payload),
        SynthBody::Streaming(chunks) => Body::from_stream(chunks),
    };

    ([(header::CONTENT_TYPE, reply.content_type)], body).into_response()
}

impl IntoResponse for BridgeError {
    /// Status code only; the body stays empty so nothing internal leaks.
    fn into_response(self) -> Response {
        let status = match self {
            Self::MalformedJob(_) => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ReplyTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::BrokerUnavailable(_)
            | Self::PublishFailed(_)
            | Self::ReplyStream(_)
            | Self::ReplyStreamClosed => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, [(header::CONTENT_TYPE, "text/plain")]).into_response()
    }
}
