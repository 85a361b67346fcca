// Counting engine
pub mod counter;

// Process-wide statistics
pub mod state;

// Transport layer
pub mod transport;

// Connection handling
pub mod server;

// Client
pub mod client;

pub use counter::{Histogram, PrintableCounter, is_printable, printable_count};
pub use server::metrics::Metrics;
pub use state::{StatsSnapshot, StatsStore};
