//! SSH binary packet protocol (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! byte[m]   mac (MAC = Message Authentication Code)
//! ```
//!
//! The MAC is not part of [`Packet`]; the transport appends and strips it.
//!
//! # Constraints
//!
//! - `packet_length`: Does NOT include `mac` or `packet_length` field itself
//! - `padding_length`: Length of padding (minimum 4, maximum 255 bytes)
//! - Total `packet_length` + 4 MUST be a multiple of the block size
//!   (8 before encryption, 16 with AES-CTR)
//! - Maximum packet size: 35000 bytes
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::Packet;
//!
//! let packet = Packet::new(b"SSH-MSG-KEXINIT payload".to_vec(), 8).unwrap();
//! let bytes = packet.to_bytes();
//! assert_eq!(bytes.len() % 8, 0);
//!
//! let parsed = Packet::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.payload(), b"SSH-MSG-KEXINIT payload");
//! ```

use bytes::{Buf, BufMut, BytesMut};
use picoware_platform::{PicoError, PicoResult};
use rand::RngCore;

/// Maximum packet size in bytes (RFC 4253 Section 6.1).
pub const MAX_PACKET_SIZE: usize = 35000;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: u8 = 4;

/// Maximum padding length in bytes (fits in u8).
pub const MAX_PADDING_LEN: u8 = 255;

/// Block size used for alignment before encryption is active.
pub const UNENCRYPTED_BLOCK_SIZE: usize = 8;

/// Returns the padding length for a payload of `payload_len` bytes.
///
/// The result is the smallest value `>= 4` that makes
/// `4 + 1 + payload_len + padding` a multiple of `block_size`.
pub fn padding_length(payload_len: usize, block_size: usize) -> usize {
    let unpadded = 5 + payload_len;
    let mut padding = block_size - unpadded % block_size;
    if padding < MIN_PADDING_LEN as usize {
        padding += block_size;
    }
    padding
}

/// SSH binary packet.
///
/// # Invariants
///
/// - Padding length is between 4 and 255 bytes
/// - Total packet size ≤ 35000 bytes
/// - Packet is aligned to the block size it was built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
    padding: Vec<u8>,
}

impl Packet {
    /// Creates a new SSH packet, padded with random bytes for `block_size`.
    ///
    /// # Errors
    ///
    /// Returns [`PicoError::Protocol`] if the payload does not fit in
    /// [`MAX_PACKET_SIZE`] or `block_size` is not in `8..=255`.
    pub fn new(payload: Vec<u8>, block_size: usize) -> PicoResult<Self> {
        if !(UNENCRYPTED_BLOCK_SIZE..=MAX_PADDING_LEN as usize).contains(&block_size) {
            return Err(PicoError::Protocol(format!(
                "Invalid cipher block size: {}",
                block_size
            )));
        }

        let padding_len = padding_length(payload.len(), block_size);
        let total_size = 1 + payload.len() + padding_len;
        if total_size > MAX_PACKET_SIZE {
            return Err(PicoError::Protocol(format!(
                "Packet size {} exceeds maximum {}",
                total_size, MAX_PACKET_SIZE
            )));
        }

        let mut padding = vec![0u8; padding_len];
        rand::thread_rng().fill_bytes(&mut padding);

        Ok(Self { payload, padding })
    }

    /// Returns the payload of this packet.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet and returns its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns the padding of this packet.
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Serializes this packet to wire format (without MAC).
    pub fn to_bytes(&self) -> Vec<u8> {
        let packet_length = 1 + self.payload.len() + self.padding.len();
        let mut buf = BytesMut::with_capacity(4 + packet_length);

        buf.put_u32(packet_length as u32);
        buf.put_u8(self.padding.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.padding);

        buf.to_vec()
    }

    /// Parses a complete, decrypted packet (length field included, MAC
    /// excluded).
    ///
    /// # Errors
    ///
    /// Returns [`PicoError::Protocol`] if:
    /// - Data is too short (< 5 bytes for header)
    /// - Packet size exceeds maximum (35000 bytes)
    /// - Padding length is below 4 or larger than the packet
    /// - Data length doesn't match declared packet_length
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        if data.len() < 5 {
            return Err(PicoError::Protocol(format!(
                "Packet too short: {} bytes (minimum 5)",
                data.len()
            )));
        }

        let mut buf = data;
        let packet_length = buf.get_u32() as usize;

        if packet_length > MAX_PACKET_SIZE {
            return Err(PicoError::Protocol(format!(
                "Packet too large: {} bytes (maximum {})",
                packet_length, MAX_PACKET_SIZE
            )));
        }

        if buf.len() != packet_length {
            return Err(PicoError::Protocol(format!(
                "Packet length mismatch: declared {} bytes, got {} bytes",
                packet_length,
                buf.len()
            )));
        }

        let padding_length = buf.get_u8() as usize;

        if padding_length < MIN_PADDING_LEN as usize {
            return Err(PicoError::Protocol(format!(
                "Padding too short: {} bytes (minimum {})",
                padding_length, MIN_PADDING_LEN
            )));
        }

        if packet_length < 1 + padding_length {
            return Err(PicoError::Protocol(format!(
                "Invalid packet: packet_length ({}) too small for padding ({})",
                packet_length, padding_length
            )));
        }

        let payload_length = packet_length - 1 - padding_length;
        let payload = buf[..payload_length].to_vec();
        buf.advance(payload_length);
        let padding = buf.to_vec();

        Ok(Self { payload, padding })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_packet_alignment() {
        for block_size in [8, 16] {
            let packet = Packet::new(b"test".to_vec(), block_size).unwrap();
            let total_size = 4 + 1 + packet.payload().len() + packet.padding().len();
            assert_eq!(total_size % block_size, 0);
        }
    }

    #[test]
    fn test_padding_adds_block_when_short() {
        // 5 + 3 = 8: naive padding is 0, so a full block is added.
        assert_eq!(padding_length(3, 8), 8);
        // 5 + 0 = 5: naive padding 3 < 4, so 3 + 8.
        assert_eq!(padding_length(0, 8), 11);
        // 5 + 7 = 12: naive padding is 4.
        assert_eq!(padding_length(7, 16), 4);
    }

    #[test]
    fn test_packet_round_trip() {
        let payload = b"Test SSH packet payload".to_vec();
        let packet = Packet::new(payload.clone(), 16).unwrap();

        let parsed = Packet::from_bytes(&packet.to_bytes()).unwrap();
        assert_eq!(parsed.payload(), &payload[..]);
        assert_eq!(parsed.padding(), packet.padding());
    }

    #[test]
    fn test_packet_invalid_too_short() {
        let result = Packet::from_bytes(&[0, 0, 0, 10]);
        assert!(matches!(result, Err(PicoError::Protocol(_))));
    }

    #[test]
    fn test_packet_invalid_padding_too_short() {
        let data = vec![
            0, 0, 0, 8, // packet_length = 8
            2, // padding_length = 2 (< MIN_PADDING_LEN = 4)
            0x48, 0x65, 0x6c, 0x6c, 0x6f, // payload "Hello"
            0x00, 0x00, // padding
        ];
        match Packet::from_bytes(&data) {
            Err(PicoError::Protocol(msg)) => assert!(msg.contains("Padding too short")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_packet_padding_longer_than_packet() {
        let data = vec![0, 0, 0, 5, 200, 0, 0, 0, 0];
        assert!(matches!(
            Packet::from_bytes(&data),
            Err(PicoError::Protocol(_))
        ));
    }

    #[test]
    fn test_packet_too_large_declared() {
        let mut data = 40000u32.to_be_bytes().to_vec();
        data.push(4);
        match Packet::from_bytes(&data) {
            Err(PicoError::Protocol(msg)) => assert!(msg.contains("too large")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_packet_exceeds_max_size() {
        let result = Packet::new(vec![0u8; MAX_PACKET_SIZE], 8);
        assert!(matches!(result, Err(PicoError::Protocol(_))));
    }

    #[test]
    fn test_packet_rejects_bad_block_size() {
        assert!(Packet::new(b"x".to_vec(), 0).is_err());
        assert!(Packet::new(b"x".to_vec(), 4).is_err());
    }

    proptest! {
        #[test]
        fn prop_padding_rules(len in 0usize..4096, encrypted in any::<bool>()) {
            let block_size = if encrypted { 16 } else { 8 };
            let packet = Packet::new(vec![0xab; len], block_size).unwrap();
            let padding = packet.padding().len();

            prop_assert!(padding >= MIN_PADDING_LEN as usize);
            prop_assert!(padding < MIN_PADDING_LEN as usize + block_size);
            prop_assert_eq!((4 + 1 + len + padding) % block_size, 0);
        }
    }
}
