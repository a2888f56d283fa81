use tokio::sync::watch;

/// Sender side, held by `app::run`.
/// Call `trigger()` to tell the HTTP server to stop accepting and drain.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Receiver side handed to the server task. Clone freely; each clone
/// observes the signal independently.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Construct a linked handle/signal pair.
pub fn new_pair() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

impl ShutdownHandle {
    /// Broadcast the shutdown signal to all outstanding [`ShutdownSignal`] receivers.
    pub fn trigger(self) {
        // Errors only if every receiver is gone.
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered, immediately if it already was.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|&v| v).await;
    }
}

/// Wait for `SIGINT` (Ctrl-C) or `SIGTERM` (container stop / kill).
pub async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

    tokio::select! {
        _ = sigint.recv()  => tracing::info!("🔔 SIGINT received"),
        _ = sigterm.recv() => tracing::info!("🔔 SIGTERM received"),
    }
}
