//! SSH transport layer packet I/O (RFC 4253).
//!
//! [`Transport`] owns the byte stream and everything needed to frame packets
//! on it:
//!
//! - Version line exchange (pre-banner lines are skipped)
//! - Binary packet framing with random padding
//! - AES-CTR encryption and HMAC authentication once keys are installed
//! - Independent send/receive sequence numbers (wrapping at 2^32)
//! - Transport-level message filtering (DISCONNECT, IGNORE, DEBUG,
//!   UNIMPLEMENTED, GLOBAL_REQUEST)
//!
//! The transport is generic over any `AsyncRead + AsyncWrite` stream, so the
//! same code runs over a `TcpStream` or an in-memory duplex pipe.
//!
//! # Receive path when encrypted
//!
//! ```text
//! read 4 bytes, decrypt -> packet_length (must be <= 35000)
//! read packet_length bytes, decrypt
//! read mac_len bytes
//! verify MAC(recv_seq || length || rest) before parsing anything
//! ```
//!
//! The read timeout only covers waiting for the first byte of a packet. Once
//! a frame has started, the keystream and stream position depend on reading
//! it to the end, so a stall, a bad frame or an interrupted read or write
//! leaves the transport out of sync. It then refuses further I/O in that
//! direction and [`Transport::is_desynchronized`] reports true.

use std::io;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use picoware_platform::{PicoError, PicoResult};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream,
};
use tracing::{debug, trace, warn};

use super::crypto::DirectionKeys;
use super::message::MessageType;
use super::packet::{Packet, MAX_PACKET_SIZE, UNENCRYPTED_BLOCK_SIZE};
use super::version::{Version, MAX_PRE_BANNER_LINES};
use super::wire::{parse_bool, parse_uint32, parse_utf8, write_string};

/// Longest line accepted during the version exchange, pre-banner included.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Byte stream the transport can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Disconnect reason codes (RFC 4253 Section 11.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DisconnectReason {
    /// SSH_DISCONNECT_PROTOCOL_ERROR
    ProtocolError = 2,
    /// SSH_DISCONNECT_KEY_EXCHANGE_FAILED
    KeyExchangeFailed = 3,
    /// SSH_DISCONNECT_MAC_ERROR
    MacError = 5,
    /// SSH_DISCONNECT_SERVICE_NOT_AVAILABLE
    ServiceNotAvailable = 7,
    /// SSH_DISCONNECT_BY_APPLICATION
    ByApplication = 11,
    /// SSH_DISCONNECT_NO_MORE_AUTH_METHODS_AVAILABLE
    NoMoreAuthMethodsAvailable = 14,
}

/// SSH_MSG_DISCONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    reason_code: u32,
    description: String,
    language_tag: String,
}

impl Disconnect {
    /// Creates a disconnect message with an empty language tag.
    pub fn new(reason: DisconnectReason, description: &str) -> Self {
        Self {
            reason_code: reason as u32,
            description: description.to_string(),
            language_tag: String::new(),
        }
    }

    /// Returns the reason code.
    pub fn reason_code(&self) -> u32 {
        self.reason_code
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::Disconnect as u8);
        buf.put_u32(self.reason_code);
        write_string(&mut buf, self.description.as_bytes());
        write_string(&mut buf, self.language_tag.as_bytes());
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        if data.first() != Some(&(MessageType::Disconnect as u8)) {
            return Err(PicoError::Protocol(
                "Expected SSH_MSG_DISCONNECT".to_string(),
            ));
        }
        let (reason_code, offset) = parse_uint32(data, 1)?;
        let (description, offset) = parse_utf8(data, offset)?;
        // Some peers omit the language tag.
        let language_tag = parse_utf8(data, offset)
            .map(|(tag, _)| tag)
            .unwrap_or_default();

        Ok(Self {
            reason_code,
            description,
            language_tag,
        })
    }
}

impl From<Disconnect> for PicoError {
    fn from(msg: Disconnect) -> Self {
        PicoError::Disconnected {
            reason_code: msg.reason_code,
            description: msg.description,
        }
    }
}

/// Packet-level connection to the peer.
pub struct Transport {
    stream: BufStream<Box<dyn AsyncStream>>,
    read_timeout: Duration,
    send_seq: u32,
    recv_seq: u32,
    outgoing: Option<DirectionKeys>,
    incoming: Option<DirectionKeys>,
    // Set while a frame is partly read or written; cleared when it completes.
    read_pending: bool,
    write_pending: bool,
}

fn out_of_sync(direction: &str) -> PicoError {
    PicoError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("transport {} side is out of sync after an incomplete packet", direction),
    ))
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("read_timeout", &self.read_timeout)
            .field("send_seq", &self.send_seq)
            .field("recv_seq", &self.recv_seq)
            .field("encrypted", &self.is_encrypted())
            .field("desynchronized", &self.is_desynchronized())
            .finish()
    }
}

impl Transport {
    /// Wraps a connected stream. Every read is bounded by `read_timeout`.
    pub fn new<S: AsyncStream + 'static>(stream: S, read_timeout: Duration) -> Self {
        let boxed: Box<dyn AsyncStream> = Box::new(stream);
        Self {
            stream: BufStream::new(boxed),
            read_timeout,
            send_seq: 0,
            recv_seq: 0,
            outgoing: None,
            incoming: None,
            read_pending: false,
            write_pending: false,
        }
    }

    /// Returns true if a packet was left half read or half written. The
    /// connection cannot be used after that.
    pub fn is_desynchronized(&self) -> bool {
        self.read_pending || self.write_pending
    }

    /// Returns true once keys are installed in both directions.
    pub fn is_encrypted(&self) -> bool {
        self.outgoing.is_some() && self.incoming.is_some()
    }

    /// Sequence number of the next packet we send.
    pub fn send_seq(&self) -> u32 {
        self.send_seq
    }

    /// Sequence number of the next packet we receive.
    pub fn recv_seq(&self) -> u32 {
        self.recv_seq
    }

    /// Returns the per-read timeout.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Installs the keys derived after NEWKEYS. Sequence numbers carry on.
    pub fn enable_encryption(&mut self, outgoing: DirectionKeys, incoming: DirectionKeys) {
        debug!(
            cipher_out = outgoing.cipher.algorithm().name(),
            mac_out = outgoing.mac.algorithm().name(),
            cipher_in = incoming.cipher.algorithm().name(),
            mac_in = incoming.mac.algorithm().name(),
            "Transport keys installed"
        );
        self.outgoing = Some(outgoing);
        self.incoming = Some(incoming);
    }

    fn block_size(&self) -> usize {
        self.outgoing
            .as_ref()
            .map_or(UNENCRYPTED_BLOCK_SIZE, |keys| {
                keys.cipher.algorithm().block_size()
            })
    }

    /// Writes bytes to the stream and flushes.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> PicoResult<()> {
        if self.write_pending {
            return Err(out_of_sync("write"));
        }
        self.write_pending = true;
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.write_pending = false;
        Ok(())
    }

    /// Reads one line, without its trailing CR LF.
    pub async fn read_line(&mut self) -> PicoResult<String> {
        let timeout = self.read_timeout;
        let stream = &mut self.stream;
        let read = async {
            let mut line = Vec::new();
            loop {
                let byte = stream.read_u8().await?;
                if byte == b'\n' {
                    break;
                }
                if line.len() >= MAX_LINE_LENGTH {
                    return Err(PicoError::Protocol(format!(
                        "Version exchange line exceeds {} bytes",
                        MAX_LINE_LENGTH
                    )));
                }
                line.push(byte);
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            Ok(String::from_utf8_lossy(&line).into_owned())
        };

        match tokio::time::timeout(timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(PicoError::Timeout(format!(
                "no version line within {:?}",
                timeout
            ))),
        }
    }

    /// Reads the peer's identification line, skipping pre-banner lines.
    ///
    /// Returns the line exactly as received (minus CR LF), which is what goes
    /// into the exchange hash.
    pub async fn read_identification(&mut self) -> PicoResult<String> {
        for _ in 0..=MAX_PRE_BANNER_LINES {
            let line = self.read_line().await?;
            if Version::is_identification(&line) {
                let version = Version::parse(&line)?;
                debug!(
                    software = version.software(),
                    proto = version.proto_version(),
                    "Peer identification received"
                );
                return Ok(line);
            }
            trace!(line = %line, "Skipping pre-banner line");
        }

        Err(PicoError::Protocol(format!(
            "No SSH identification line within {} lines",
            MAX_PRE_BANNER_LINES + 1
        )))
    }

    /// Sends our identification line.
    pub async fn write_identification(&mut self, version: &Version) -> PicoResult<()> {
        self.write_raw(&version.to_wire_format()).await
    }

    /// Frames, MACs and encrypts `payload`, advancing the send sequence
    /// number. The returned bytes are ready for [`write_raw`](Self::write_raw).
    pub fn encode_packet(&mut self, payload: &[u8]) -> PicoResult<Vec<u8>> {
        let packet = Packet::new(payload.to_vec(), self.block_size())?;
        let mut bytes = packet.to_bytes();

        if let Some(keys) = self.outgoing.as_mut() {
            let mac = keys.mac.compute(self.send_seq, &bytes)?;
            keys.cipher.apply_keystream(&mut bytes);
            bytes.extend_from_slice(&mac);
        }

        self.send_seq = self.send_seq.wrapping_add(1);
        Ok(bytes)
    }

    /// Sends one packet.
    pub async fn send_packet(&mut self, payload: &[u8]) -> PicoResult<()> {
        if let Some(msg) = MessageType::of(payload) {
            trace!(message = %msg, seq = self.send_seq, "Sending packet");
        }
        let bytes = self.encode_packet(payload)?;
        self.write_raw(&bytes).await
    }

    /// Receives one packet and returns its payload, without filtering.
    ///
    /// # Errors
    ///
    /// [`PicoError::Timeout`] if no packet starts within the read timeout.
    /// A packet that starts but does not finish within the timeout is an
    /// [`io::ErrorKind::TimedOut`] I/O error and desynchronizes the
    /// transport.
    pub async fn receive_packet(&mut self) -> PicoResult<Vec<u8>> {
        if self.read_pending {
            return Err(out_of_sync("read"));
        }

        let timeout = self.read_timeout;
        let available = match tokio::time::timeout(timeout, self.stream.fill_buf()).await {
            Ok(Ok(buf)) => buf.len(),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(PicoError::Timeout(format!(
                    "no packet within {:?}",
                    timeout
                )))
            }
        };
        if available == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer").into());
        }

        self.read_pending = true;
        let payload = match tokio::time::timeout(timeout, self.read_packet()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PicoError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("packet not completed within {:?}", timeout),
                )))
            }
        };
        self.read_pending = false;
        Ok(payload)
    }

    async fn read_packet(&mut self) -> PicoResult<Vec<u8>> {
        let mut length_field = [0u8; 4];
        self.stream.read_exact(&mut length_field).await?;
        if let Some(keys) = self.incoming.as_mut() {
            keys.cipher.apply_keystream(&mut length_field);
        }

        let packet_length = u32::from_be_bytes(length_field) as usize;
        if packet_length > MAX_PACKET_SIZE {
            return Err(PicoError::Protocol(format!(
                "Packet too large: {} bytes (maximum {})",
                packet_length, MAX_PACKET_SIZE
            )));
        }

        let mut packet = vec![0u8; 4 + packet_length];
        packet[..4].copy_from_slice(&length_field);
        self.stream.read_exact(&mut packet[4..]).await?;

        if let Some(keys) = self.incoming.as_mut() {
            keys.cipher.apply_keystream(&mut packet[4..]);

            let mut mac = vec![0u8; keys.mac.algorithm().mac_size()];
            self.stream.read_exact(&mut mac).await?;
            keys.mac.verify(self.recv_seq, &packet, &mac)?;
        }

        self.recv_seq = self.recv_seq.wrapping_add(1);
        Ok(Packet::from_bytes(&packet)?.into_payload())
    }

    /// Receives the next message the caller needs to see.
    ///
    /// - DISCONNECT becomes [`PicoError::Disconnected`]
    /// - IGNORE, DEBUG and UNIMPLEMENTED are dropped
    /// - GLOBAL_REQUEST is answered with REQUEST_FAILURE when the peer wants
    ///   a reply, then dropped
    pub async fn next_message(&mut self) -> PicoResult<Vec<u8>> {
        loop {
            let payload = self.receive_packet().await?;

            match MessageType::of(&payload) {
                Some(MessageType::Disconnect) => {
                    let msg = Disconnect::from_bytes(&payload)?;
                    warn!(
                        reason = msg.reason_code(),
                        description = msg.description(),
                        "Peer disconnected"
                    );
                    return Err(msg.into());
                }
                Some(MessageType::Ignore) => {
                    trace!("Dropping SSH_MSG_IGNORE");
                }
                Some(MessageType::Debug) => {
                    let text = parse_bool(&payload, 1)
                        .and_then(|(_, offset)| parse_utf8(&payload, offset))
                        .map(|(text, _)| text)
                        .unwrap_or_default();
                    debug!(message = %text, "Dropping SSH_MSG_DEBUG");
                }
                Some(MessageType::Unimplemented) => {
                    let seq = parse_uint32(&payload, 1).map(|(seq, _)| seq).ok();
                    debug!(?seq, "Peer reported SSH_MSG_UNIMPLEMENTED");
                }
                Some(MessageType::GlobalRequest) => {
                    let (name, offset) = parse_utf8(&payload, 1)?;
                    let (want_reply, _) = parse_bool(&payload, offset)?;
                    debug!(request = %name, want_reply, "Declining global request");
                    if want_reply {
                        self.send_packet(&[MessageType::RequestFailure as u8])
                            .await?;
                    }
                }
                _ if payload.is_empty() => {
                    return Err(PicoError::Protocol("Empty packet payload".to_string()));
                }
                _ => return Ok(payload),
            }
        }
    }

    /// Receives the next message and checks its type.
    pub async fn expect_message(&mut self, expected: MessageType) -> PicoResult<Vec<u8>> {
        let payload = self.next_message().await?;
        match MessageType::of(&payload) {
            Some(actual) if actual == expected => Ok(payload),
            Some(actual) => Err(PicoError::Protocol(format!(
                "Expected {}, got {}",
                expected, actual
            ))),
            None => Err(PicoError::Protocol(format!(
                "Expected {}, got unknown message type {}",
                expected, payload[0]
            ))),
        }
    }

    /// Drops the keys and closes the write side of the stream.
    pub async fn shutdown(&mut self) -> PicoResult<()> {
        self.outgoing = None;
        self.incoming = None;
        self.stream.shutdown().await?;
        Ok(())
    }
}
