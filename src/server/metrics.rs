use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Exchange counters for the pcc server
#[derive(Debug, Default)]
pub struct Metrics {
    /// Connections accepted and handed to the handler
    exchanges_started: AtomicU64,
    /// Exchanges that reached `Done`
    exchanges_completed: AtomicU64,
    /// Exchanges dropped because the peer went away
    exchanges_aborted: AtomicU64,
    /// Exchanges that ended in an unrecoverable I/O error
    exchanges_failed: AtomicU64,
    /// Payload bytes received by completed exchanges
    bytes_received: AtomicU64,
    /// Printable characters counted by completed exchanges
    printable_counted: AtomicU64,
    /// Duration of the last completed exchange in microseconds
    last_duration_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&self) {
        self.exchanges_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, bytes: u32, printable: u32, duration: Duration) {
        self.exchanges_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(u64::from(bytes), Ordering::Relaxed);
        self.printable_counted
            .fetch_add(u64::from(printable), Ordering::Relaxed);
        self.last_duration_us
            .store(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_aborted(&self) {
        self.exchanges_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.exchanges_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            exchanges_started: self.exchanges_started.load(Ordering::Relaxed),
            exchanges_completed: self.exchanges_completed.load(Ordering::Relaxed),
            exchanges_aborted: self.exchanges_aborted.load(Ordering::Relaxed),
            exchanges_failed: self.exchanges_failed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            printable_counted: self.printable_counted.load(Ordering::Relaxed),
            last_duration_us: self.last_duration_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub exchanges_started: u64,
    pub exchanges_completed: u64,
    pub exchanges_aborted: u64,
    pub exchanges_failed: u64,
    pub bytes_received: u64,
    pub printable_counted: u64,
    pub last_duration_us: u64,
}

/// Times a single exchange and records how it ended
pub struct ExchangeTracer {
    id: Uuid,
    start: Instant,
    metrics: Arc<Metrics>,
}

impl ExchangeTracer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let id = Uuid::new_v4();
        debug!(exchange = %id, "Starting exchange");
        metrics.record_start();

        Self {
            id,
            start: Instant::now(),
            metrics,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn completed(self, bytes: u32, printable: u32) {
        let duration = self.start.elapsed();
        info!(
            exchange = %self.id,
            bytes,
            printable,
            "Exchange completed ({}ms)",
            duration.as_millis()
        );
        self.metrics.record_completed(bytes, printable, duration);
    }

    pub fn aborted(self, reason: &str) {
        warn!(
            exchange = %self.id,
            "Exchange aborted by client: {} ({}ms)",
            reason,
            self.start.elapsed().as_millis()
        );
        self.metrics.record_aborted();
    }

    pub fn failed(self, error: &std::io::Error) {
        tracing::error!(
            exchange = %self.id,
            "Exchange failed: {} ({}ms)",
            error,
            self.start.elapsed().as_millis()
        );
        self.metrics.record_failed();
    }
}

/// Initialize logging with tracing.
///
/// Logs go to stderr; stdout carries the statistics and client results.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pcc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Log server startup
pub fn log_startup(addr: &str) {
    info!("╔══════════════════════════════════════╗");
    info!("║          pcc Server Started          ║");
    info!("╚══════════════════════════════════════╝");
    info!("Address: {}", addr);
    info!("Ready to accept connections");
}

/// Log server shutdown
pub fn log_shutdown(snapshot: &MetricsSnapshot) {
    info!("╔══════════════════════════════════════╗");
    info!("║        pcc Server Shutting Down      ║");
    info!("╚══════════════════════════════════════╝");
    info!(
        "Exchanges: {} started, {} completed, {} aborted, {} failed",
        snapshot.exchanges_started,
        snapshot.exchanges_completed,
        snapshot.exchanges_aborted,
        snapshot.exchanges_failed
    );
    info!(
        "Payload bytes: {}, printable characters: {}",
        snapshot.bytes_received, snapshot.printable_counted
    );
}
