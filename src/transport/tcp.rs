use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{Instrument, error, info, warn};

use crate::counter::DEFAULT_CHUNK_SIZE;
use crate::server::connection::handle_connection;
use crate::server::metrics::{Metrics, MetricsSnapshot};
use crate::state::{StatsSnapshot, StatsStore};
use crate::transport::shutdown::ShutdownCoordinator;

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 10;

pub struct TcpServerConfig {
    pub addr: String,
    pub chunk_size: usize,
    pub backlog: u32,
    pub metrics: Arc<Metrics>,
    pub shutdown: Arc<ShutdownCoordinator>,
}

impl TcpServerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            backlog: DEFAULT_BACKLOG,
            metrics: Arc::new(Metrics::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Size of the working buffer payloads are streamed through (at least 1)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// What the server had accumulated when it stopped
#[derive(Debug)]
pub struct ServerReport {
    pub stats: StatsSnapshot,
    pub metrics: MetricsSnapshot,
    /// Set when the server stopped because of a fatal I/O error
    pub fatal: Option<io::Error>,
}

/// Single-connection-at-a-time pcc server
pub struct TcpServer {
    listener: TcpListener,
    chunk_size: usize,
    metrics: Arc<Metrics>,
    shutdown: Arc<ShutdownCoordinator>,
    stats: StatsStore,
}

impl TcpServer {
    /// Binds the listening socket with `SO_REUSEADDR` and the configured backlog
    pub async fn bind(config: TcpServerConfig) -> Result<Self> {
        let addr: SocketAddr = tokio::net::lookup_host(config.addr.as_str())
            .await
            .with_context(|| format!("resolving {}", config.addr))?
            .next()
            .with_context(|| format!("no address found for {}", config.addr))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .context("socket")?;
        socket.set_reuseaddr(true).context("setsockopt")?;
        socket.bind(addr).with_context(|| format!("bind {addr}"))?;
        let listener = socket.listen(config.backlog).context("listen")?;

        info!("pcc server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            chunk_size: config.chunk_size.max(1),
            metrics: config.metrics,
            shutdown: config.shutdown,
            stats: StatsStore::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    /// Serves connections one at a time until shutdown or a fatal error.
    ///
    /// Shutdown is only observed while idle in front of `accept`; once a
    /// connection is accepted its exchange runs to completion (or its own
    /// abort/fatal end) and its statistics are folded before the loop looks
    /// at the shutdown flag again. The listener is closed when this returns.
    pub async fn run(self) -> ServerReport {
        let TcpServer {
            listener,
            chunk_size,
            metrics,
            shutdown,
            mut stats,
        } = self;
        let mut buffer = vec![0u8; chunk_size];
        let mut fatal = None;

        loop {
            if shutdown.is_requested() {
                info!("Shutting down pcc server");
                break;
            }

            let accepted = tokio::select! {
                biased;
                _ = shutdown.requested() => continue,
                accepted = listener.accept() => accepted,
            };

            let (socket, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let span = tracing::info_span!("connection", %peer);
            let result = handle_connection(socket, &mut buffer, &mut stats, metrics.clone())
                .instrument(span)
                .await;
            if let Err(e) = result {
                error!(%peer, "Fatal error, stopping server: {}", e);
                fatal = Some(e);
                break;
            }
        }

        drop(listener);
        ServerReport {
            stats: stats.snapshot(),
            metrics: metrics.snapshot(),
            fatal,
        }
    }
}

/// Bind, install signal handling and serve until SIGINT/SIGTERM
pub async fn run_with_shutdown(config: TcpServerConfig) -> Result<ServerReport> {
    let server = TcpServer::bind(config).await?;

    server
        .shutdown_handle()
        .listen_for_signals()
        .context("installing signal handlers")?;

    Ok(server.run().await)
}
