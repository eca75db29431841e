//! Plaintext (v1) bitcoin wire codec.
//!
//! Only the handful of messages a crawler needs are modelled. Everything else
//! a peer might send decodes to [`Message::Unknown`] and can be ignored by the
//! caller. Decoding never panics, malformed input always comes back as a
//! [`WireError`].
//!
//! # Example
//!
//! ```
//! use bitcoin::p2p::Magic;
//! use peermap_connection::wire::{self, Message};
//!
//! let bytes = wire::encode(Magic::BITCOIN, &Message::GetAddr).unwrap();
//! let (message, consumed) = wire::decode(Magic::BITCOIN, &bytes).unwrap();
//! assert_eq!(message, Message::GetAddr);
//! assert_eq!(consumed, bytes.len());
//! ```

mod addr;
mod header;

pub use addr::{
    decode_addr_payload, encode_addr_payload, AddrEntry, ADDR_ENTRY_SIZE, MAX_ADDR_ENTRIES,
    MAX_ADDR_PAYLOAD_SIZE,
};
pub use header::{
    checksum, max_payload_len, FrameHeader, COMMAND_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    MAX_VERSION_PAYLOAD_SIZE,
};

use bitcoin::consensus::encode::{self, deserialize_partial};
use bitcoin::p2p::message_network::VersionMessage;
use bitcoin::p2p::Magic;
use std::fmt;

/// Errors produced while framing or parsing wire messages.
#[derive(Debug)]
pub enum WireError {
    /// Frame was sent for a different network.
    MagicMismatch { expected: Magic, found: Magic },
    /// Command field is not NUL padded printable ASCII.
    InvalidCommand,
    /// Declared payload exceeds the limit for its command.
    PayloadTooLarge { len: usize, limit: usize },
    /// Payload does not hash to the declared checksum.
    ChecksumMismatch { expected: [u8; 4], found: [u8; 4] },
    /// Input ended before a complete frame or field.
    Truncated { needed: usize, available: usize },
    /// Payload length does not match what its contents declare.
    LengthMismatch {
        command: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Address list declares more entries than allowed.
    TooManyAddresses(u64),
    /// A field could not be decoded.
    Malformed {
        command: &'static str,
        source: encode::Error,
    },
    /// Address family has no legacy 16 byte representation.
    UnencodableAddress,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::MagicMismatch { expected, found } => {
                write!(f, "network magic mismatch: expected {expected}, found {found}")
            }
            WireError::InvalidCommand => write!(f, "invalid command bytes"),
            WireError::PayloadTooLarge { len, limit } => {
                write!(f, "payload of {len} bytes exceeds {limit}")
            }
            WireError::ChecksumMismatch { expected, found } => write!(
                f,
                "checksum mismatch: expected {expected:02x?}, found {found:02x?}"
            ),
            WireError::Truncated { needed, available } => {
                write!(f, "truncated input: needed {needed} bytes, have {available}")
            }
            WireError::LengthMismatch {
                command,
                expected,
                actual,
            } => write!(
                f,
                "{command} payload length mismatch: expected {expected}, got {actual}"
            ),
            WireError::TooManyAddresses(count) => {
                write!(f, "address list of {count} entries exceeds {MAX_ADDR_ENTRIES}")
            }
            WireError::Malformed { command, source } => write!(f, "malformed {command}: {source}"),
            WireError::UnencodableAddress => {
                write!(f, "address cannot be expressed in the legacy format")
            }
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Malformed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Handshake opener.
    Version(VersionMessage),
    /// Handshake acknowledgement.
    Verack,
    /// Request for known addresses.
    GetAddr,
    /// Address list.
    Addr(Vec<AddrEntry>),
    /// Keepalive request carrying a nonce.
    Ping(u64),
    /// Keepalive response echoing a ping nonce.
    Pong(u64),
    /// Any other command. The payload is checked and dropped.
    Unknown(String),
}

impl Message {
    /// The wire command for this message.
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Unknown(command) => command,
        }
    }

    /// Serialize the message payload, without the frame header.
    pub fn encode_payload(&self) -> Result<Vec<u8>, WireError> {
        match self {
            Message::Version(version) => Ok(encode::serialize(version)),
            Message::Verack | Message::GetAddr | Message::Unknown(_) => Ok(Vec::new()),
            Message::Addr(entries) => encode_addr_payload(entries),
            Message::Ping(nonce) | Message::Pong(nonce) => Ok(nonce.to_le_bytes().to_vec()),
        }
    }
}

/// Frame a message for the network identified by `magic`.
pub fn encode(magic: Magic, message: &Message) -> Result<Vec<u8>, WireError> {
    let payload = message.encode_payload()?;
    let header = FrameHeader::new(magic, message.command(), &payload)?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&header.encode());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode one frame from the front of `bytes`.
///
/// Returns the message and the number of bytes it occupied.
pub fn decode(magic: Magic, bytes: &[u8]) -> Result<(Message, usize), WireError> {
    let Some(raw_header) = bytes.get(..HEADER_SIZE) else {
        return Err(WireError::Truncated {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    };
    let header = FrameHeader::decode(&header::array(raw_header), magic)?;

    let frame_len = HEADER_SIZE + header.payload_len as usize;
    let Some(payload) = bytes.get(HEADER_SIZE..frame_len) else {
        return Err(WireError::Truncated {
            needed: frame_len,
            available: bytes.len(),
        });
    };

    Ok((decode_payload(&header, payload)?, frame_len))
}

/// Decode the payload belonging to an already parsed header.
pub fn decode_payload(header: &FrameHeader, payload: &[u8]) -> Result<Message, WireError> {
    header.verify(payload)?;

    match header.command()? {
        "version" => decode_version(payload).map(Message::Version),
        "verack" => empty_payload("verack", payload).map(|_| Message::Verack),
        "getaddr" => empty_payload("getaddr", payload).map(|_| Message::GetAddr),
        "addr" => decode_addr_payload(payload).map(Message::Addr),
        "ping" => nonce_payload("ping", payload).map(Message::Ping),
        "pong" => nonce_payload("pong", payload).map(Message::Pong),
        other => Ok(Message::Unknown(other.to_string())),
    }
}

fn decode_version(payload: &[u8]) -> Result<VersionMessage, WireError> {
    let malformed = |source| WireError::Malformed {
        command: "version",
        source,
    };

    // Trailing bytes from newer protocol versions are ignored.
    match deserialize_partial::<VersionMessage>(payload) {
        Ok((version, _)) => Ok(version),
        // Very old peers omit the trailing relay byte.
        Err(encode::Error::Io(_)) => {
            let mut padded = payload.to_vec();
            padded.push(0);
            deserialize_partial::<VersionMessage>(&padded)
                .map(|(version, _)| version)
                .map_err(malformed)
        }
        Err(source) => Err(malformed(source)),
    }
}

fn empty_payload(command: &'static str, payload: &[u8]) -> Result<(), WireError> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(WireError::LengthMismatch {
            command,
            expected: 0,
            actual: payload.len(),
        })
    }
}

fn nonce_payload(command: &'static str, payload: &[u8]) -> Result<u64, WireError> {
    let bytes: [u8; 8] = payload
        .try_into()
        .map_err(|_| WireError::LengthMismatch {
            command,
            expected: 8,
            actual: payload.len(),
        })?;
    Ok(u64::from_le_bytes(bytes))
}
