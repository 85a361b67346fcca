use clap::Parser;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::counter::DEFAULT_CHUNK_SIZE;
use crate::transport::framing::FrameCodec;

#[derive(Parser, Debug)]
pub struct ClientArgs {
    /// Server IP address, e.g. 127.0.0.1
    pub server_ip: String,

    /// Server port
    pub port: u16,

    /// File whose contents are sent to the server
    pub file_path: PathBuf,
}

/// Rejected before any connection is made
#[derive(Debug, Error)]
pub enum InputError {
    #[error("File is empty")]
    Empty,
    #[error("File size exceeds 32 bits ({0} bytes)")]
    TooLarge(u64),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("Unexpected EOF after {sent} of {expected} bytes")]
    TruncatedInput { sent: u64, expected: u32 },
    #[error("Server closed the connection while {0}")]
    ServerClosed(&'static str),
}

impl ClientError {
    fn io(context: &'static str) -> impl FnOnce(io::Error) -> ClientError {
        move |source| ClientError::Io { context, source }
    }
}

/// Checks that a source of `size` bytes can be described by the length prefix
pub fn validate_len(size: u64) -> Result<u32, InputError> {
    if size == 0 {
        return Err(InputError::Empty);
    }
    u32::try_from(size).map_err(|_| InputError::TooLarge(size))
}

/// Performs one exchange over an established stream.
///
/// Writes the length prefix, streams exactly `len` bytes from `source`
/// through `buffer`, then reads the 4-byte count the server sends back.
pub async fn send_payload<S, R>(
    stream: &mut S,
    source: &mut R,
    len: u32,
    buffer: &mut [u8],
) -> Result<u32, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    if !FrameCodec::write_length(stream, len)
        .await
        .map_err(ClientError::io("Failed to send file size to server"))?
    {
        return Err(ClientError::ServerClosed("sending the file size"));
    }

    let mut sent: u64 = 0;
    while sent < u64::from(len) {
        let want = (u64::from(len) - sent).min(buffer.len() as u64) as usize;
        let n = loop {
            match source.read(&mut buffer[..want]).await {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ClientError::Io { context: "read", source: e }),
            }
        };
        if n == 0 {
            return Err(ClientError::TruncatedInput {
                sent,
                expected: len,
            });
        }

        let written = FrameCodec::write_all(stream, &buffer[..n])
            .await
            .map_err(ClientError::io("write data"))?;
        if written != n {
            return Err(ClientError::ServerClosed("sending the payload"));
        }
        sent += n as u64;
    }
    debug!(sent, "Payload sent");

    FrameCodec::read_u32(stream)
        .await
        .map_err(ClientError::io("read count"))?
        .ok_or(ClientError::ServerClosed("waiting for the count"))
}

/// Sends the file named by `args` and returns the printable character count
pub async fn run_client(args: ClientArgs) -> Result<u32, ClientError> {
    let mut file = File::open(&args.file_path)
        .await
        .map_err(ClientError::io("error opening the file"))?;
    let size = file
        .metadata()
        .await
        .map_err(ClientError::io("fstat error"))?
        .len();
    let len = validate_len(size)?;

    let mut stream = TcpStream::connect((args.server_ip.as_str(), args.port))
        .await
        .map_err(ClientError::io("connect"))?;
    info!(
        "Connected to {}:{}, sending {} bytes",
        args.server_ip, args.port, len
    );

    let mut buffer = vec![0u8; DEFAULT_CHUNK_SIZE];
    send_payload(&mut stream, &mut file, len, &mut buffer).await
}
