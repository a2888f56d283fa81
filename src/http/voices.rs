use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::messaging::Broker;

use super::AppState;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum CatalogError {
    Client(String),
    Request(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(m) => write!(f, "catalog client build failed: {m}"),
            Self::Request(m) => write!(f, "catalog request failed: {m}"),
        }
    }
}

impl std::error::Error for CatalogError {}

// ── Catalog ────────────────────────────────────────────────────────────────────

/// Pass-through to the external voice catalog.
///
/// The catalog answers with one voice per line; the list is relayed as a JSON
/// array of strings.
#[derive(Clone)]
pub struct VoiceCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl VoiceCatalog {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(CATALOG_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetch `base_url + path` and split it into voice names.
    pub async fn list(&self, path: &str) -> Result<Vec<String>, CatalogError> {
        let url = format!("{}{}", self.base_url, path);

        let text = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?
            .text()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        Ok(split_lines(&text))
    }
}

/// One entry per `\n`-terminated line. Whatever follows the last newline is
/// dropped, as the catalog always ends its listing with one.
fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    lines.pop();
    lines
}

/// `GET /voices` and `GET /all-voices`
pub async fn list_voices<B: Broker>(State(state): State<AppState<B>>, uri: Uri) -> Response {
    match state.catalog.list(uri.path()).await {
        Ok(voices) => Json(voices).into_response(),
        Err(e) => {
            tracing::warn!(path = uri.path(), error = %e, "⚠️  voice catalog unavailable");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
