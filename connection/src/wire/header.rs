//! Message frame header.
//!
//! Every message on the plaintext transport starts with a fixed 24 byte header.
//!
//! ```text
//! | magic (4) | command (12, NUL padded) | payload length (4, LE) | checksum (4) |
//! ```

use super::addr::MAX_ADDR_PAYLOAD_SIZE;
use super::WireError;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::p2p::Magic;

/// Size of a message header in bytes.
pub const HEADER_SIZE: usize = 24;
/// Size of the command field in bytes.
pub const COMMAND_SIZE: usize = 12;
/// Largest payload accepted from a peer.
pub const MAX_PAYLOAD_SIZE: usize = 4_000_000;
/// Largest `version` payload accepted. Fits a 256 byte user agent with room to spare.
pub const MAX_VERSION_PAYLOAD_SIZE: usize = 1024;

const COMMAND_OFFSET: usize = 4;
const PAYLOAD_LENGTH_OFFSET: usize = 16;
const CHECKSUM_OFFSET: usize = 20;

/// First four bytes of the double SHA256 of `payload`.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = sha256d::Hash::hash(payload).to_byte_array();
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Largest payload accepted for `command`.
///
/// Commands which are decoded have a known bound. Anything else is only
/// skipped and may be as large as [`MAX_PAYLOAD_SIZE`].
pub fn max_payload_len(command: &str) -> usize {
    match command {
        "version" => MAX_VERSION_PAYLOAD_SIZE,
        "verack" | "getaddr" => 0,
        "ping" | "pong" => 8,
        "addr" => MAX_ADDR_PAYLOAD_SIZE,
        _ => MAX_PAYLOAD_SIZE,
    }
}

/// A decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Network magic the frame was sent with.
    pub magic: Magic,
    /// Raw command bytes, NUL padded.
    pub command: [u8; COMMAND_SIZE],
    /// Declared payload length.
    pub payload_len: u32,
    /// Declared payload checksum.
    pub checksum: [u8; 4],
}

impl FrameHeader {
    /// Build the header for `payload` sent as `command`.
    pub fn new(magic: Magic, command: &str, payload: &[u8]) -> Result<Self, WireError> {
        if command.len() > COMMAND_SIZE || !command.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(WireError::InvalidCommand);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge {
                len: payload.len(),
                limit: MAX_PAYLOAD_SIZE,
            });
        }

        let mut raw = [0u8; COMMAND_SIZE];
        raw[..command.len()].copy_from_slice(command.as_bytes());

        Ok(FrameHeader {
            magic,
            command: raw,
            payload_len: payload.len() as u32,
            checksum: checksum(payload),
        })
    }

    /// Parse a header, rejecting foreign networks and payloads larger than
    /// [`max_payload_len`] allows for the command.
    ///
    /// The checksum can only be verified once the payload has been read, see
    /// [`FrameHeader::verify`].
    pub fn decode(bytes: &[u8; HEADER_SIZE], expected: Magic) -> Result<Self, WireError> {
        let magic = Magic::from_bytes(array(&bytes[..COMMAND_OFFSET]));
        if magic != expected {
            return Err(WireError::MagicMismatch {
                expected,
                found: magic,
            });
        }

        let header = FrameHeader {
            magic,
            command: array(&bytes[COMMAND_OFFSET..]),
            payload_len: u32::from_le_bytes(array(&bytes[PAYLOAD_LENGTH_OFFSET..])),
            checksum: array(&bytes[CHECKSUM_OFFSET..]),
        };
        // Validate the command bytes early, a garbage command means a garbage stream.
        let limit = max_payload_len(header.command()?);
        let len = header.payload_len as usize;
        if len > limit {
            return Err(WireError::PayloadTooLarge { len, limit });
        }
        Ok(header)
    }

    /// Serialize the header.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..COMMAND_OFFSET].copy_from_slice(&self.magic.to_bytes());
        bytes[COMMAND_OFFSET..PAYLOAD_LENGTH_OFFSET].copy_from_slice(&self.command);
        bytes[PAYLOAD_LENGTH_OFFSET..CHECKSUM_OFFSET]
            .copy_from_slice(&self.payload_len.to_le_bytes());
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&self.checksum);
        bytes
    }

    /// The command name without its NUL padding.
    ///
    /// Printable ASCII followed only by NUL bytes, anything else is rejected.
    pub fn command(&self) -> Result<&str, WireError> {
        let end = self
            .command
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMMAND_SIZE);
        let (name, padding) = self.command.split_at(end);

        if name.is_empty()
            || !name.iter().all(|b| b.is_ascii_graphic())
            || padding.iter().any(|&b| b != 0)
        {
            return Err(WireError::InvalidCommand);
        }

        std::str::from_utf8(name).map_err(|_| WireError::InvalidCommand)
    }

    /// Check a fully read payload against the declared length and checksum.
    pub fn verify(&self, payload: &[u8]) -> Result<(), WireError> {
        if payload.len() != self.payload_len as usize {
            return Err(WireError::Truncated {
                needed: self.payload_len as usize,
                available: payload.len(),
            });
        }

        let actual = checksum(payload);
        if actual != self.checksum {
            return Err(WireError::ChecksumMismatch {
                expected: self.checksum,
                found: actual,
            });
        }
        Ok(())
    }
}

/// Copy the first `N` bytes of `bytes` into an array.
///
/// Callers guarantee `bytes.len() >= N`.
pub(crate) fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_checksum() {
        // Well known checksum of the empty payload, carried by verack and getaddr.
        assert_eq!(checksum(&[]), [0x5d, 0xf6, 0xe0, 0xe2]);
    }

    #[test]
    fn test_header_layout() {
        let header = FrameHeader::new(Magic::BITCOIN, "verack", &[]).unwrap();
        let bytes = header.encode();

        assert_eq!(&bytes[..4], &[0xf9, 0xbe, 0xb4, 0xd9]);
        assert_eq!(&bytes[4..16], b"verack\0\0\0\0\0\0");
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0]);
        assert_eq!(&bytes[20..24], &[0x5d, 0xf6, 0xe0, 0xe2]);

        let decoded = FrameHeader::decode(&bytes, Magic::BITCOIN).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.command().unwrap(), "verack");
    }

    #[test]
    fn test_magic_mismatch() {
        let bytes = FrameHeader::new(Magic::REGTEST, "ping", &[0; 8])
            .unwrap()
            .encode();
        let result = FrameHeader::decode(&bytes, Magic::BITCOIN);
        assert!(matches!(result, Err(WireError::MagicMismatch { .. })));
    }

    fn declaring(command: &str, len: usize) -> [u8; HEADER_SIZE] {
        let mut bytes = FrameHeader::new(Magic::BITCOIN, command, &[])
            .unwrap()
            .encode();
        bytes[16..20].copy_from_slice(&(len as u32).to_le_bytes());
        bytes
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = FrameHeader::decode(&declaring("inv", MAX_PAYLOAD_SIZE + 1), Magic::BITCOIN);
        assert!(matches!(result, Err(WireError::PayloadTooLarge { .. })));

        let header = FrameHeader::decode(&declaring("inv", MAX_PAYLOAD_SIZE), Magic::BITCOIN);
        assert_eq!(header.unwrap().payload_len as usize, MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_payload_limit_per_command() {
        // The largest legal addr message is 1000 entries behind a 3 byte count.
        assert_eq!(max_payload_len("addr"), 30_003);
        assert!(FrameHeader::decode(&declaring("addr", 30_003), Magic::BITCOIN).is_ok());
        assert!(matches!(
            FrameHeader::decode(&declaring("addr", MAX_PAYLOAD_SIZE), Magic::BITCOIN),
            Err(WireError::PayloadTooLarge {
                len: MAX_PAYLOAD_SIZE,
                limit: 30_003
            })
        ));

        assert!(FrameHeader::decode(&declaring("version", 1024), Magic::BITCOIN).is_ok());
        assert!(FrameHeader::decode(&declaring("version", 1025), Magic::BITCOIN).is_err());
        assert!(FrameHeader::decode(&declaring("ping", 8), Magic::BITCOIN).is_ok());
        assert!(FrameHeader::decode(&declaring("pong", 9), Magic::BITCOIN).is_err());
        assert!(FrameHeader::decode(&declaring("verack", 1), Magic::BITCOIN).is_err());
        assert!(FrameHeader::decode(&declaring("getaddr", 1), Magic::BITCOIN).is_err());
    }

    #[test]
    fn test_invalid_command_bytes() {
        let mut bytes = FrameHeader::new(Magic::BITCOIN, "ping", &[])
            .unwrap()
            .encode();
        // Non-NUL byte after the padding started.
        bytes[10] = b'x';
        assert!(matches!(
            FrameHeader::decode(&bytes, Magic::BITCOIN),
            Err(WireError::InvalidCommand)
        ));

        assert!(FrameHeader::new(Magic::BITCOIN, "thirteen-char", &[]).is_err());
    }

    #[test]
    fn test_verify_checksum() {
        let header = FrameHeader::new(Magic::BITCOIN, "ping", &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert!(header.verify(&[1, 2, 3, 4, 5, 6, 7, 8]).is_ok());
        assert!(matches!(
            header.verify(&[8, 7, 6, 5, 4, 3, 2, 1]),
            Err(WireError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            header.verify(&[1, 2, 3]),
            Err(WireError::Truncated { .. })
        ));
    }
}
