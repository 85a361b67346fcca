use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;
#[cfg(not(unix))]
use tracing::warn;

/// Graceful shutdown coordinator.
///
/// Shutdown uses a defer-and-drain policy: a request only records intent and
/// wakes the accept loop. The server checks [`ShutdownCoordinator::is_requested`]
/// and waits on [`ShutdownCoordinator::requested`] solely while it is idle
/// between exchanges, so an exchange in progress always runs to its own
/// conclusion before the request is honoured.
pub struct ShutdownCoordinator {
    tx: broadcast::Sender<()>,
    requested: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            requested: AtomicBool::new(false),
        }
    }

    /// Subscribe to shutdown signal
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    /// Whether shutdown has been requested at any point
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Completes once shutdown has been requested, including requests made
    /// before this call.
    pub async fn requested(&self) {
        let mut rx = self.subscribe();
        if self.is_requested() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Registers SIGINT/SIGTERM (CTRL+C elsewhere) handlers and spawns a
    /// task that triggers shutdown when one arrives.
    ///
    /// Registration happens before this returns so a failure is reported to
    /// the caller as a setup error.
    pub fn listen_for_signals(self: &Arc<Self>) -> io::Result<()> {
        let coordinator = self.clone();

        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};

            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM");
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT (CTRL+C)");
                    }
                }
                info!("Shutdown requested, finishing current exchange first");
                coordinator.shutdown();
            });
        }

        #[cfg(not(unix))]
        {
            tokio::spawn(async move {
                match signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Received CTRL+C");
                        info!("Shutdown requested, finishing current exchange first");
                        coordinator.shutdown();
                    }
                    Err(e) => warn!("Failed to listen for CTRL+C: {}", e),
                }
            });
        }

        Ok(())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
