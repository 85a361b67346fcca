pub mod connection;
pub mod metrics;

pub use connection::{ConnectionOutcome, ExchangeState, handle_connection, run_exchange};
pub use metrics::{ExchangeTracer, Metrics, MetricsSnapshot};
