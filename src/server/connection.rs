use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{Instrument, debug, info_span};

use crate::counter::{Histogram, PrintableCounter};
use crate::server::metrics::{ExchangeTracer, Metrics};
use crate::state::StatsStore;
use crate::transport::framing::FrameCodec;

/// Where an exchange is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Reading the 4-byte length prefix
    AwaitLength,
    /// Reading and counting payload bytes
    Streaming,
    /// Writing the 4-byte count back
    AwaitFlush,
    /// Response delivered, statistics folded
    Done,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::AwaitLength => "awaiting length",
            ExchangeState::Streaming => "streaming payload",
            ExchangeState::AwaitFlush => "writing response",
            ExchangeState::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a single exchange ended
#[derive(Debug)]
pub enum ConnectionOutcome {
    /// Response fully written; the histogram is ready to be folded
    Completed {
        declared: u32,
        count: u32,
        histogram: Histogram,
    },
    /// Peer closed or a transient network error occurred. Not a server error.
    ClientAborted {
        state: ExchangeState,
        reason: String,
    },
    /// Unexpected I/O failure; the server must stop
    Fatal {
        state: ExchangeState,
        error: io::Error,
    },
}

impl ConnectionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ConnectionOutcome::Completed { .. })
    }

    fn from_error(state: ExchangeState, error: io::Error) -> Self {
        if is_transient(error.kind()) {
            ConnectionOutcome::ClientAborted {
                state,
                reason: error.to_string(),
            }
        } else {
            ConnectionOutcome::Fatal { state, error }
        }
    }

    fn peer_closed(state: ExchangeState, detail: impl Into<String>) -> Self {
        ConnectionOutcome::ClientAborted {
            state,
            reason: detail.into(),
        }
    }
}

/// Error kinds that mean the peer went away rather than the server failing
pub fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}

/// Runs one request/response exchange on `stream`.
///
/// `buffer` is the working buffer payload bytes are streamed through; its
/// length bounds how much of the payload is held in memory at once. It must
/// not be empty. Global state is never touched here, the caller folds the
/// histogram of a `Completed` outcome.
pub async fn run_exchange<S>(stream: &mut S, buffer: &mut [u8]) -> ConnectionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug_assert!(!buffer.is_empty());

    let declared = match FrameCodec::read_length(stream).await {
        Ok(Some(n)) => n,
        Ok(None) => {
            return ConnectionOutcome::peer_closed(
                ExchangeState::AwaitLength,
                "connection closed before length prefix",
            );
        }
        Err(e) => return ConnectionOutcome::from_error(ExchangeState::AwaitLength, e),
    };
    debug!(declared, "Length prefix received");

    let mut counter = PrintableCounter::new();
    let mut remaining = u64::from(declared);
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let got = match FrameCodec::read_all(stream, &mut buffer[..want]).await {
            Ok(n) => n,
            Err(e) => return ConnectionOutcome::from_error(ExchangeState::Streaming, e),
        };
        counter.feed(&buffer[..got]);
        remaining -= got as u64;

        if got < want {
            return ConnectionOutcome::peer_closed(
                ExchangeState::Streaming,
                format!(
                    "connection closed after {} of {} payload bytes",
                    u64::from(declared) - remaining,
                    declared
                ),
            );
        }
    }

    let count = counter.count();
    match FrameCodec::write_u32(stream, count).await {
        Ok(true) => {}
        Ok(false) => {
            return ConnectionOutcome::peer_closed(
                ExchangeState::AwaitFlush,
                "connection closed while writing count",
            );
        }
        Err(e) => return ConnectionOutcome::from_error(ExchangeState::AwaitFlush, e),
    }
    if let Err(e) = stream.flush().await {
        return ConnectionOutcome::from_error(ExchangeState::AwaitFlush, e);
    }

    let (count, histogram) = counter.into_parts();
    ConnectionOutcome::Completed {
        declared,
        count,
        histogram,
    }
}

/// Handles one accepted connection end to end.
///
/// On a completed exchange the per-connection histogram is folded into
/// `stats` exactly once, then the connection is closed. Aborted exchanges
/// leave `stats` untouched and return `Ok`. Only a fatal I/O error is
/// returned to the caller.
pub async fn handle_connection<S>(
    mut stream: S,
    buffer: &mut [u8],
    stats: &mut StatsStore,
    metrics: Arc<Metrics>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let tracer = ExchangeTracer::new(metrics);
    let span = info_span!("exchange", id = %tracer.id());

    let outcome = run_exchange(&mut stream, buffer).instrument(span).await;
    match outcome {
        ConnectionOutcome::Completed {
            declared,
            count,
            histogram,
        } => {
            stats.fold(&histogram);
            tracer.completed(declared, count);
            if let Err(e) = stream.shutdown().await {
                debug!("Error closing connection after response: {}", e);
            }
            Ok(())
        }
        ConnectionOutcome::ClientAborted { state, reason } => {
            tracer.aborted(&format!("{reason} ({state})"));
            Ok(())
        }
        ConnectionOutcome::Fatal { state, error } => {
            tracer.failed(&error);
            Err(io::Error::new(
                error.kind(),
                format!("fatal I/O error while {state}: {error}"),
            ))
        }
    }
}
