//! Framed async transport over any byte stream.
//!
//! The reader half validates each header as soon as it is complete, so a
//! foreign network or an oversized length is rejected before any payload
//! buffer is allocated. Payload buffers then grow with the bytes actually
//! received, never straight to the declared length.

use crate::wire::{self, FrameHeader, Message, WireError, HEADER_SIZE};
use bitcoin::p2p::Magic;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Payload capacity reserved up front. Covers every message the crawler decodes.
const INITIAL_PAYLOAD_CAPACITY: usize = 32 * 1024;

/// Error types specific to the transport layer.
#[derive(Debug)]
pub enum TransportError {
    /// IO error during read/write operations.
    Io(io::Error),
    /// The bytes on the wire did not form a valid message.
    Wire(WireError),
    /// The peer closed the stream between two frames.
    Closed,
}

impl TransportError {
    /// True if the peer closed the stream cleanly.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {e}"),
            TransportError::Wire(e) => write!(f, "Wire error: {e}"),
            TransportError::Closed => write!(f, "Connection closed by peer"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Wire(e) => Some(e),
            TransportError::Closed => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

impl From<WireError> for TransportError {
    fn from(e: WireError) -> Self {
        TransportError::Wire(e)
    }
}

/// Progress of a frame read, kept across cancelled calls.
#[derive(Debug)]
enum ReceiveState {
    ReadingHeader {
        header: [u8; HEADER_SIZE],
        bytes_read: usize,
    },
    ReadingPayload { header: FrameHeader, payload: Vec<u8> },
}

impl ReceiveState {
    fn reading_header() -> Self {
        ReceiveState::ReadingHeader {
            header: [0u8; HEADER_SIZE],
            bytes_read: 0,
        }
    }

    fn reading_payload(header: FrameHeader) -> Self {
        let capacity = (header.payload_len as usize).min(INITIAL_PAYLOAD_CAPACITY);
        ReceiveState::ReadingPayload {
            payload: Vec::with_capacity(capacity),
            header,
        }
    }
}

/// Reading half of a framed transport.
#[derive(Debug)]
pub struct MessageReader<R> {
    magic: Magic,
    state: ReceiveState,
    reader: R,
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create a reader expecting frames for the network identified by `magic`.
    pub fn new(magic: Magic, reader: R) -> Self {
        MessageReader {
            magic,
            state: ReceiveState::reading_header(),
            reader,
        }
    }

    /// Read the next message.
    ///
    /// # Errors
    ///
    /// * [`TransportError::Closed`] if the stream ends between frames.
    /// * [`TransportError::Wire`] if a frame is invalid, or the stream ends inside one.
    /// * [`TransportError::Io`] for failures of the underlying stream.
    ///
    /// # Cancellation Safety
    ///
    /// This method is cancellation safe. Partially read frames are kept and the
    /// next call resumes where the cancelled one stopped.
    pub async fn read(&mut self) -> Result<Message, TransportError> {
        loop {
            match &mut self.state {
                ReceiveState::ReadingHeader { header, bytes_read } => {
                    while *bytes_read < HEADER_SIZE {
                        let n = self.reader.read(&mut header[*bytes_read..]).await?;
                        if n == 0 {
                            let error = if *bytes_read == 0 {
                                TransportError::Closed
                            } else {
                                TransportError::Wire(WireError::Truncated {
                                    needed: HEADER_SIZE,
                                    available: *bytes_read,
                                })
                            };
                            self.state = ReceiveState::reading_header();
                            return Err(error);
                        }
                        *bytes_read += n;
                    }

                    match FrameHeader::decode(header, self.magic) {
                        Ok(parsed) => self.state = ReceiveState::reading_payload(parsed),
                        Err(e) => {
                            self.state = ReceiveState::reading_header();
                            return Err(e.into());
                        }
                    }
                }

                ReceiveState::ReadingPayload { header, payload } => {
                    let len = header.payload_len as usize;
                    while payload.len() < len {
                        let remaining = (len - payload.len()) as u64;
                        // Only appends what was read, so a cancelled call loses nothing.
                        let n = (&mut self.reader).take(remaining).read_buf(payload).await?;
                        if n == 0 {
                            let error = WireError::Truncated {
                                needed: len,
                                available: payload.len(),
                            };
                            self.state = ReceiveState::reading_header();
                            return Err(error.into());
                        }
                    }

                    let message = wire::decode_payload(header, payload);
                    self.state = ReceiveState::reading_header();
                    return message.map_err(TransportError::Wire);
                }
            }
        }
    }
}

/// Writing half of a framed transport.
#[derive(Debug)]
pub struct MessageWriter<W> {
    magic: Magic,
    writer: W,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create a writer framing messages for the network identified by `magic`.
    pub fn new(magic: Magic, writer: W) -> Self {
        MessageWriter { magic, writer }
    }

    /// Frame and write a message, flushing the stream.
    pub async fn write(&mut self, message: &Message) -> Result<(), TransportError> {
        let bytes = wire::encode(self.magic, message)?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// A framed transport made of a reader and a writer half.
///
/// # Example
///
/// ```no_run
/// use bitcoin::p2p::Magic;
/// use peermap_connection::transport::Transport;
/// use peermap_connection::wire::Message;
/// use tokio::net::TcpStream;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = TcpStream::connect("127.0.0.1:8333").await?;
/// let (reader, writer) = stream.into_split();
/// let mut transport = Transport::new(Magic::BITCOIN, reader, writer);
///
/// transport.write(&Message::Ping(42)).await?;
/// let response = transport.read().await?;
/// println!("{response:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Transport<R, W> {
    reader: MessageReader<R>,
    writer: MessageWriter<W>,
}

impl<R, W> Transport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a transport for the network identified by `magic`.
    pub fn new(magic: Magic, reader: R, writer: W) -> Self {
        Transport {
            reader: MessageReader::new(magic, reader),
            writer: MessageWriter::new(magic, writer),
        }
    }

    /// Read the next message. Cancellation safe, see [`MessageReader::read`].
    pub async fn read(&mut self) -> Result<Message, TransportError> {
        self.reader.read().await
    }

    /// Write a message.
    pub async fn write(&mut self, message: &Message) -> Result<(), TransportError> {
        self.writer.write(message).await
    }

    /// Shut down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await
    }

    /// Split into independent reader and writer halves.
    pub fn into_split(self) -> (MessageReader<R>, MessageWriter<W>) {
        (self.reader, self.writer)
    }
}
