//! # TCP Connection Abstraction
//!
//! Provides a wrapper around TCP streams with frame-level message framing. It
//! is used for both the signal-server protocol and the direct peer link.
//!
//! ## Wire Protocol
//!
//! Frames are sent with a 4-byte length prefix (big-endian) followed by JSON data:
//! ```text
//! [4 bytes: frame length] [N bytes: JSON payload]
//! ```

use anyhow::Result;
use log::error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Maximum allowed frame size (1MB). Match traffic is a few hundred bytes.
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Read one frame from `reader`.
///
/// # Returns
/// - `Ok(Some(bytes))`: a complete frame
/// - `Ok(None)`: the peer closed the stream, or announced an oversized frame
/// - `Err`: I/O error in the middle of a frame
async fn read_frame_from<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut length_buf = [0u8; 4];

    match reader.read_exact(&mut length_buf).await {
        Ok(_) => {
            let length = u32::from_be_bytes(length_buf) as usize;

            if length > MAX_FRAME_SIZE {
                error!(
                    "❌ Frame too large: {} bytes (max: {} bytes)",
                    length, MAX_FRAME_SIZE
                );
                return Ok(None);
            }

            let mut data = vec![0u8; length];
            reader.read_exact(&mut data).await?;
            Ok(Some(data))
        }
        Err(_) => Ok(None), // Connection closed cleanly
    }
}

/// Write one frame to `writer` and flush it.
async fn write_frame_to<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let length = data.len() as u32;

    writer.write_all(&length.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;

    Ok(())
}

/// TCP connection wrapper with framing support.
pub struct Connection {
    /// Underlying TCP stream
    stream: TcpStream,
}

impl Connection {
    /// Create a new Connection from an existing TCP stream.
    ///
    /// # Example
    /// ```ignore
    /// let stream = TcpStream::connect("127.0.0.1:9470").await?;
    /// let mut conn = Connection::new(stream);
    /// ```
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        read_frame_from(&mut self.stream).await
    }

    pub async fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        write_frame_to(&mut self.stream, data).await
    }

    /// Read a frame and deserialize it.
    ///
    /// Returns `Ok(None)` when the connection closed or the frame did not
    /// deserialize into `T`.
    pub async fn read_json<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.read_frame().await? {
            Some(data) => match serde_json::from_slice(&data) {
                Ok(msg) => Ok(Some(msg)),
                Err(e) => {
                    error!("❌ Failed to deserialize frame: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn write_json<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let data = serde_json::to_vec(message)?;
        self.write_frame(&data).await
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (FrameReader { half: read }, FrameWriter { half: write })
    }
}

/// Read half of a split [`Connection`].
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        read_frame_from(&mut self.half).await
    }
}

/// Write half of a split [`Connection`].
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        write_frame_to(&mut self.half, data).await
    }
}
