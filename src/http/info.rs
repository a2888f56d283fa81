use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::messaging::Broker;

use super::{AppState, ClientLimits};

/// `GET /`
pub async fn root() -> impl IntoResponse {
    [(header::CONTENT_TYPE, "application/json")]
}

/// `GET /whoami`
pub async fn whoami() -> impl IntoResponse {
    let text = format!(
        "{} ver. {}\n{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_DESCRIPTION"),
    );

    ([(header::CONTENT_TYPE, "text/plain")], text)
}

/// `GET /getvars`: the limits clients must respect.
pub async fn getvars<B: Broker>(State(state): State<AppState<B>>) -> Json<ClientLimits> {
    Json(state.limits)
}
