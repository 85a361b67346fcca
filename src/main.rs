use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;

use pcc::client::{self, ClientArgs};
use pcc::counter::DEFAULT_CHUNK_SIZE;
use pcc::server::metrics;
use pcc::transport::tcp::{self, DEFAULT_BACKLOG, TcpServerConfig};

#[derive(Parser, Debug)]
#[command(name = "pcc")]
#[command(about = "Printable character counting server and client")]
struct Opts {
    #[command(subcommand)]
    cmd: Mode,
}

/// CLI modes
#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the counting server until SIGINT/SIGTERM
    Server {
        /// Port to listen on
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Listen backlog
        #[arg(long, default_value_t = DEFAULT_BACKLOG)]
        backlog: u32,

        /// Working buffer size in bytes for streaming payloads
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Print the final statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a file and print its printable character count
    Client {
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    metrics::init_logging();

    let opts = Opts::parse();
    match opts.cmd {
        Mode::Server {
            port,
            host,
            backlog,
            chunk_size,
            json,
        } => {
            let addr = format!("{host}:{port}");
            let config = TcpServerConfig::new(addr.clone())
                .with_backlog(backlog)
                .with_chunk_size(chunk_size);

            metrics::log_startup(&addr);
            let report = tcp::run_with_shutdown(config).await?;
            metrics::log_shutdown(&report.metrics);

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if json {
                report.stats.write_json(&mut out)?;
            } else {
                report.stats.write_text(&mut out)?;
            }
            out.flush()?;

            if let Some(fatal) = report.fatal {
                return Err(fatal).context("server stopped");
            }
        }

        Mode::Client { client: args } => {
            let count = client::run_client(args).await?;
            println!("# of printable characters: {}", count);
        }
    }
    Ok(())
}
