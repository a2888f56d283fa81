mod info;
mod synth;
mod voices;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bridge::Bridge;
use crate::messaging::Broker;

pub use voices::{CatalogError, VoiceCatalog};

/// Limits advertised on `/getvars`, under the names of their env variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientLimits {
    #[serde(rename = "CLIENT_MAX_SIZE_BYTES")]
    pub max_size_bytes: usize,
    #[serde(rename = "CLIENT_MAX_CHARS")]
    pub max_chars: usize,
}

/// Shared handler state. Cloned per request; everything inside is `Arc`ed.
pub struct AppState<B: Broker> {
    pub bridge: Arc<Bridge<B>>,
    pub catalog: Arc<VoiceCatalog>,
    pub limits: ClientLimits,
}

impl<B: Broker> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            bridge: Arc::clone(&self.bridge),
            catalog: Arc::clone(&self.catalog),
            limits: self.limits,
        }
    }
}

/// All routes, with the body-size limit, request tracing and (optionally) a
/// permissive CORS policy.
pub fn router<B: Broker>(state: AppState<B>, cors_enabled: bool) -> Router {
    let max_body = state.limits.max_size_bytes;

    let app = Router::new()
        .route("/", get(info::root))
        .route("/synth", post(synth::synthesize::<B>))
        .route("/whoami", get(info::whoami))
        .route("/getvars", get(info::getvars::<B>))
        .route("/voices", get(voices::list_voices::<B>))
        .route("/all-voices", get(voices::list_voices::<B>))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}
