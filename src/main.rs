mod app;
mod bridge;
mod config;
mod http;
mod messaging;
mod metrics;
mod model;
mod shutdown;

#[tokio::main]
async fn main() {
    // ── Tracing / structured logging ──────────────────────────────────────────
    // Default level = INFO for this crate, WARN for everything else.
    // Override at runtime via the RUST_LOG environment variable:
    //   RUST_LOG=synth_producer=debug,tower_http=debug,lapin=warn
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("synth_producer=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    // ── Run ───────────────────────────────────────────────────────────────────
    if let Err(e) = app::run().await {
        tracing::error!("❌ fatal: {e}");
        std::process::exit(1);
    }
}
