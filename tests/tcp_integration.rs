//! Integration tests for the TCP server loop and shutdown handling

use pcc::Metrics;
use pcc::printable_count;
use pcc::transport::{ServerReport, ShutdownCoordinator, TcpServer, TcpServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep, timeout};

struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Arc<Metrics>,
    handle: JoinHandle<ServerReport>,
}

impl TestServer {
    async fn start(chunk_size: usize) -> Self {
        let metrics = Arc::new(Metrics::new());
        let config = TcpServerConfig::new("127.0.0.1:0")
            .with_chunk_size(chunk_size)
            .with_metrics(metrics.clone());
        let server = TcpServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(server.run());

        Self {
            addr,
            shutdown,
            metrics,
            handle,
        }
    }

    async fn stop(self) -> ServerReport {
        self.shutdown.shutdown();
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
    }

    /// Polls until the server has picked up `n` connections
    async fn wait_for_started(&self, n: u64) {
        for _ in 0..200 {
            if self.metrics.snapshot().exchanges_started >= n {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("server never accepted connection {n}");
    }
}

/// Helper to run one full exchange
async fn exchange(addr: SocketAddr, payload: &[u8]) -> anyhow::Result<u32> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    stream.write_all(payload).await?;

    let mut count = [0u8; 4];
    stream.read_exact(&mut count).await?;
    Ok(u32::from_be_bytes(count))
}

fn count_for(report: &ServerReport, ch: char) -> u32 {
    report
        .stats
        .chars
        .iter()
        .find(|c| c.ch == ch)
        .map(|c| c.count)
        .unwrap()
}

#[tokio::test]
async fn test_hello_world_exchange() {
    let server = TestServer::start(1024).await;

    let count = exchange(server.addr, b"Hello, World!").await.unwrap();
    assert_eq!(count, 13);

    let report = server.stop().await;
    assert!(report.fatal.is_none());
    assert_eq!(report.stats.exchanges, 1);
    assert_eq!(report.stats.total_printable, 13);
    assert_eq!(count_for(&report, 'l'), 3);
    assert_eq!(count_for(&report, 'o'), 2);
    assert_eq!(count_for(&report, 'H'), 1);
    assert_eq!(count_for(&report, ' '), 1);
    assert_eq!(count_for(&report, 'x'), 0);
}

#[tokio::test]
async fn test_control_characters_excluded() {
    let server = TestServer::start(1024).await;

    let count = exchange(server.addr, b"a\tb\nc").await.unwrap();
    assert_eq!(count, 3);

    server.stop().await;
}

#[tokio::test]
async fn test_statistics_sum_across_exchanges() {
    let server = TestServer::start(1024).await;

    assert_eq!(exchange(server.addr, b"aaa").await.unwrap(), 3);
    assert_eq!(exchange(server.addr, b"ab\x01").await.unwrap(), 2);
    assert_eq!(exchange(server.addr, b"~").await.unwrap(), 1);

    let report = server.stop().await;
    assert_eq!(report.stats.exchanges, 3);
    assert_eq!(count_for(&report, 'a'), 4);
    assert_eq!(count_for(&report, 'b'), 1);
    assert_eq!(count_for(&report, '~'), 1);
    assert_eq!(report.metrics.exchanges_completed, 3);
    assert_eq!(report.metrics.bytes_received, 7);
}

#[tokio::test]
async fn test_zero_length_payload() {
    let server = TestServer::start(1024).await;

    assert_eq!(exchange(server.addr, b"").await.unwrap(), 0);

    let report = server.stop().await;
    assert_eq!(report.stats.exchanges, 1);
    assert_eq!(report.stats.total_printable, 0);
}

#[tokio::test]
async fn test_payload_larger_than_chunk() {
    let server = TestServer::start(7).await;
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();

    let count = exchange(server.addr, &payload).await.unwrap();
    assert_eq!(count, printable_count(&payload));

    let report = server.stop().await;
    assert_eq!(report.stats.total_printable, u64::from(count));
}

#[tokio::test]
async fn test_abort_does_not_touch_statistics() {
    let server = TestServer::start(1024).await;

    // length prefix, then gone
    {
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream.write_all(&10u32.to_be_bytes()).await.unwrap();
    }

    // server keeps serving
    assert_eq!(exchange(server.addr, b"zz").await.unwrap(), 2);

    let report = server.stop().await;
    assert!(report.fatal.is_none());
    assert_eq!(report.stats.exchanges, 1);
    assert_eq!(report.stats.total_printable, 2);
    assert_eq!(count_for(&report, 'z'), 2);
    assert_eq!(report.metrics.exchanges_aborted, 1);
    assert_eq!(report.metrics.exchanges_completed, 1);
}

#[tokio::test]
async fn test_truncated_payload_gets_no_response() {
    let server = TestServer::start(1024).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&10u32.to_be_bytes()).await.unwrap();
    stream.write_all(b"abc").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    let n = stream.read_to_end(&mut response).await.unwrap_or(0);
    assert_eq!(n, 0);

    assert_eq!(exchange(server.addr, b"ok").await.unwrap(), 2);

    let report = server.stop().await;
    assert_eq!(report.stats.exchanges, 1);
    assert_eq!(count_for(&report, 'a'), 0);
    assert_eq!(count_for(&report, 'o'), 1);
}

#[tokio::test]
async fn test_shutdown_waits_for_exchange_in_progress() {
    let server = TestServer::start(1024).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&10u32.to_be_bytes()).await.unwrap();
    stream.write_all(b"hello").await.unwrap();
    server.wait_for_started(1).await;

    server.shutdown.shutdown();
    sleep(Duration::from_millis(50)).await;
    assert!(!server.handle.is_finished());

    stream.write_all(b"world").await.unwrap();
    let mut count = [0u8; 4];
    stream.read_exact(&mut count).await.unwrap();
    assert_eq!(u32::from_be_bytes(count), 10);

    let report = timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(report.fatal.is_none());
    assert_eq!(report.stats.exchanges, 1);
    assert_eq!(count_for(&report, 'l'), 3);
    assert_eq!(count_for(&report, 'o'), 2);
}

#[tokio::test]
async fn test_listener_closed_after_shutdown() {
    let server = TestServer::start(1024).await;
    let addr = server.addr;

    let report = server.stop().await;
    assert_eq!(report.stats.exchanges, 0);

    assert!(TcpStream::connect(addr).await.is_err());
}
