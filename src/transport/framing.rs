use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix and of the count response
pub const PREFIX_LEN: usize = 4;

/// Exact-count I/O for the pcc wire format.
///
/// Frame format: [4-byte length (u32, big-endian)][payload]
/// Response: [4-byte count (u32, big-endian)]
///
/// Unlike `read_exact`/`write_all` from tokio, a peer that closes early is not
/// an error here: the primitives report how many bytes actually moved so the
/// caller can decide what a short transfer means.
pub struct FrameCodec;

impl FrameCodec {
    /// Reads until `buf` is full or the peer closes.
    ///
    /// Returns the number of bytes read; less than `buf.len()` only on EOF.
    /// `Interrupted` is retried, any other error is returned.
    pub async fn read_all<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        let mut total = 0;
        while total < buf.len() {
            match reader.read(&mut buf[total..]).await {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Writes every byte of `data` unless the peer closes.
    ///
    /// Returns the number of bytes written; a zero-length write means the
    /// peer is gone and the short count is returned instead of an error.
    pub async fn write_all<W>(writer: &mut W, data: &[u8]) -> io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let mut total = 0;
        while total < data.len() {
            match writer.write(&data[total..]).await {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Reads a 4-byte big-endian value.
    ///
    /// Returns `None` if the peer closed before all four bytes arrived.
    pub async fn read_u32<R>(reader: &mut R) -> io::Result<Option<u32>>
    where
        R: AsyncRead + Unpin,
    {
        let mut bytes = [0u8; PREFIX_LEN];
        let n = Self::read_all(reader, &mut bytes).await?;
        if n < PREFIX_LEN {
            return Ok(None);
        }
        Ok(Some(u32::from_be_bytes(bytes)))
    }

    /// Writes a 4-byte big-endian value.
    ///
    /// Returns false if the peer closed before all four bytes were written.
    pub async fn write_u32<W>(writer: &mut W, value: u32) -> io::Result<bool>
    where
        W: AsyncWrite + Unpin,
    {
        let n = Self::write_all(writer, &value.to_be_bytes()).await?;
        Ok(n == PREFIX_LEN)
    }

    /// Reads the payload length prefix
    pub async fn read_length<R>(reader: &mut R) -> io::Result<Option<u32>>
    where
        R: AsyncRead + Unpin,
    {
        Self::read_u32(reader).await
    }

    /// Writes the payload length prefix
    pub async fn write_length<W>(writer: &mut W, len: u32) -> io::Result<bool>
    where
        W: AsyncWrite + Unpin,
    {
        Self::write_u32(writer, len).await
    }
}
