use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;

use crate::bridge::{Bridge, BridgeSettings};
use crate::config::Config;
use crate::http::{self, AppState, ClientLimits, VoiceCatalog};
use crate::messaging::{build_pool, RabbitBroker};
use crate::metrics::Metrics;
use crate::shutdown::{self, ShutdownSignal};

/// How long open connections (mostly realtime streams) get to finish after
/// shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

// ── Error type ─────────────────────────────────────────────────────────────────

/// Top-level application error, surfaced only at startup and shutdown.
#[derive(Debug)]
pub enum AppError {
    Config(crate::config::ConfigError),
    RabbitMQ(crate::messaging::RabbitError),
    Catalog(crate::http::CatalogError),
    Tls(std::io::Error),
    Server(std::io::Error),
    Task(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e)   => write!(f, "config error: {e}"),
            Self::RabbitMQ(e) => write!(f, "rabbitmq pool error: {e}"),
            Self::Catalog(e)  => write!(f, "voice catalog error: {e}"),
            Self::Tls(e)      => write!(f, "tls material error: {e}"),
            Self::Server(e)   => write!(f, "http server error: {e}"),
            Self::Task(e)     => write!(f, "server task error: {e}"),
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────────────────

/// Full application lifecycle.
///
/// # Startup sequence
/// 1. Load and validate configuration from environment variables.
/// 2. Build the RabbitMQ connection pool (retries until the broker answers).
/// 3. Wire broker → bridge → HTTP router.
/// 4. Load TLS material when HTTPS is enabled.
/// 5. Serve until SIGINT / SIGTERM, then drain open connections and exit.
pub async fn run() -> Result<(), AppError> {
    // ── 1. Configuration ──────────────────────────────────────────────────────
    let cfg = Config::load().map_err(AppError::Config)?;
    cfg.log_summary();
    let addr = cfg.api_addr().map_err(AppError::Config)?;

    // ── 2. RabbitMQ pool ──────────────────────────────────────────────────────
    tracing::info!("🔌 connecting to RabbitMQ (pool_size={})...", cfg.rabbit_pool_size);
    let rabbit_pool = build_pool(&cfg.rabbitmq_url, cfg.rabbit_pool_size)
        .await
        .map_err(AppError::RabbitMQ)?;
    let broker = RabbitBroker::new(rabbit_pool);

    // ── 3. Bridge + router ────────────────────────────────────────────────────
    let metrics = Arc::new(Metrics::new());

    let bridge = Bridge::new(
        broker,
        BridgeSettings {
            max_chars: cfg.client_max_chars,
            reply_timeout: cfg.reply_timeout(),
        },
        Arc::clone(&metrics),
    );
    let catalog = VoiceCatalog::new(cfg.tts_url.clone()).map_err(AppError::Catalog)?;

    let state = AppState {
        bridge: Arc::new(bridge),
        catalog: Arc::new(catalog),
        limits: ClientLimits {
            max_size_bytes: cfg.client_max_size_bytes,
            max_chars: cfg.client_max_chars,
        },
    };
    let app = http::router(state, cfg.cors_enabled);

    // ── 4. TLS ────────────────────────────────────────────────────────────────
    let tls = if cfg.https_enabled {
        let config = RustlsConfig::from_pem_file(&cfg.tls_cert_path, &cfg.tls_key_path)
            .await
            .map_err(AppError::Tls)?;
        Some(config)
    } else {
        None
    };

    // ── 5. Serve + OS-signal wait ─────────────────────────────────────────────
    let (shutdown_handle, shutdown_signal) = shutdown::new_pair();
    let mut server = tokio::spawn(serve(app, addr, tls, shutdown_signal));

    tracing::info!("✅ synth-producer ready on {addr}");

    tokio::select! {
        () = shutdown::wait_for_os_signal() => {
            tracing::info!("🛑 signal received — draining open connections...");
            shutdown_handle.trigger();
        }
        joined = &mut server => {
            // The server only stops on its own when it failed.
            joined.map_err(|e| AppError::Task(e.to_string()))??;
            return Err(AppError::Task("server stopped unexpectedly".into()));
        }
    }

    server
        .await
        .map_err(|e| AppError::Task(e.to_string()))??;

    metrics.log_summary();
    tracing::info!("✅ shutdown complete — goodbye");
    Ok(())
}

/// Serve `app` on `addr`, over TLS when `tls` is set, until `signal` fires.
async fn serve(
    app: Router,
    addr: SocketAddr,
    tls: Option<RustlsConfig>,
    mut signal: ShutdownSignal,
) -> Result<(), AppError> {
    let handle = axum_server::Handle::new();

    let watcher = handle.clone();
    tokio::spawn(async move {
        signal.wait().await;
        watcher.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    tracing::info!(%addr, https = tls.is_some(), "🌐 listening");

    let service = app.into_make_service();
    let served = match tls {
        Some(config) => {
            axum_server::bind_rustls(addr, config)
                .handle(handle)
                .serve(service)
                .await
        }
        None => axum_server::bind(addr).handle(handle).serve(service).await,
    };

    served.map_err(AppError::Server)
}
