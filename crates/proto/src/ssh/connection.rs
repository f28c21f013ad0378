//! SSH connection protocol messages (RFC 4254).
//!
//! Only what a single exec session needs:
//! - Session channel open, confirmation and failure
//! - Flow control (window adjust)
//! - Data and extended (stderr) data
//! - EOF, close, success and failure notices
//! - Channel requests: `exec`, `exit-status`; anything else is kept by name
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::connection::{ChannelOpen, ChannelRequest, ChannelRequestType};
//!
//! let open = ChannelOpen::session(0, 2 * 1024 * 1024, 32 * 1024);
//! assert_eq!(open.to_bytes()[0], 90);
//!
//! let exec = ChannelRequest::new(
//!     7,
//!     ChannelRequestType::Exec { command: "uptime".to_string() },
//!     true,
//! );
//! let parsed = ChannelRequest::from_bytes(&exec.to_bytes()).unwrap();
//! assert_eq!(parsed, exec);
//! ```

use bytes::{BufMut, BytesMut};
use picoware_platform::{PicoError, PicoResult};

use super::message::MessageType;
use super::wire::{parse_bool, parse_string, parse_uint32, parse_utf8, write_bool, write_string};

/// Channel type used for command execution.
pub const SESSION_CHANNEL: &str = "session";

/// Extended data type code for stderr (RFC 4254 Section 5.2).
pub const EXTENDED_DATA_STDERR: u32 = 1;

fn check_type(data: &[u8], expected: MessageType) -> PicoResult<()> {
    match data.first() {
        Some(&b) if b == expected as u8 => Ok(()),
        Some(&b) => Err(PicoError::Protocol(format!(
            "Invalid message type: expected {}, got {}",
            expected, b
        ))),
        None => Err(PicoError::Protocol(format!("{} message is empty", expected))),
    }
}

/// SSH_MSG_CHANNEL_OPEN (RFC 4254 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpen {
    channel_type: String,
    sender_channel: u32,
    initial_window_size: u32,
    maximum_packet_size: u32,
}

impl ChannelOpen {
    /// Opens a `session` channel.
    pub fn session(sender_channel: u32, initial_window_size: u32, maximum_packet_size: u32) -> Self {
        Self {
            channel_type: SESSION_CHANNEL.to_string(),
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        }
    }

    /// Returns the channel type name.
    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    /// Returns the sender's channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Returns the initial window size.
    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    /// Returns the maximum packet size.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ChannelOpen as u8);
        write_string(&mut buf, self.channel_type.as_bytes());
        buf.put_u32(self.sender_channel);
        buf.put_u32(self.initial_window_size);
        buf.put_u32(self.maximum_packet_size);
        buf.to_vec()
    }

    /// Parses the message. Type-specific trailing fields are ignored.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        check_type(data, MessageType::ChannelOpen)?;
        let (channel_type, offset) = parse_utf8(data, 1)?;
        let (sender_channel, offset) = parse_uint32(data, offset)?;
        let (initial_window_size, offset) = parse_uint32(data, offset)?;
        let (maximum_packet_size, _) = parse_uint32(data, offset)?;
        Ok(Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        })
    }
}

/// SSH_MSG_CHANNEL_OPEN_CONFIRMATION.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpenConfirmation {
    recipient_channel: u32,
    sender_channel: u32,
    initial_window_size: u32,
    maximum_packet_size: u32,
}

impl ChannelOpenConfirmation {
    /// Creates a confirmation.
    pub fn new(
        recipient_channel: u32,
        sender_channel: u32,
        initial_window_size: u32,
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            recipient_channel,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        }
    }

    /// Returns our channel number, echoed back.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the peer's channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Returns the peer's initial window.
    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    /// Returns the peer's maximum packet size.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(17);
        buf.put_u8(MessageType::ChannelOpenConfirmation as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.sender_channel);
        buf.put_u32(self.initial_window_size);
        buf.put_u32(self.maximum_packet_size);
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        check_type(data, MessageType::ChannelOpenConfirmation)?;
        let (recipient_channel, offset) = parse_uint32(data, 1)?;
        let (sender_channel, offset) = parse_uint32(data, offset)?;
        let (initial_window_size, offset) = parse_uint32(data, offset)?;
        let (maximum_packet_size, _) = parse_uint32(data, offset)?;
        Ok(Self::new(
            recipient_channel,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        ))
    }
}

/// SSH_MSG_CHANNEL_OPEN_FAILURE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpenFailure {
    recipient_channel: u32,
    reason_code: u32,
    description: String,
}

impl ChannelOpenFailure {
    /// SSH_OPEN_ADMINISTRATIVELY_PROHIBITED
    pub const ADMINISTRATIVELY_PROHIBITED: u32 = 1;
    /// SSH_OPEN_CONNECT_FAILED
    pub const CONNECT_FAILED: u32 = 2;
    /// SSH_OPEN_UNKNOWN_CHANNEL_TYPE
    pub const UNKNOWN_CHANNEL_TYPE: u32 = 3;
    /// SSH_OPEN_RESOURCE_SHORTAGE
    pub const RESOURCE_SHORTAGE: u32 = 4;

    /// Creates a failure message.
    pub fn new(recipient_channel: u32, reason_code: u32, description: &str) -> Self {
        Self {
            recipient_channel,
            reason_code,
            description: description.to_string(),
        }
    }

    /// Returns the recipient channel.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the reason code.
    pub fn reason_code(&self) -> u32 {
        self.reason_code
    }

    /// Returns the server's description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns a readable reason.
    pub fn reason(&self) -> &'static str {
        match self.reason_code {
            Self::ADMINISTRATIVELY_PROHIBITED => "administratively prohibited",
            Self::CONNECT_FAILED => "connect failed",
            Self::UNKNOWN_CHANNEL_TYPE => "unknown channel type",
            Self::RESOURCE_SHORTAGE => "resource shortage",
            _ => "unknown reason",
        }
    }

    /// Serializes the message with an empty language tag.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ChannelOpenFailure as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.reason_code);
        write_string(&mut buf, self.description.as_bytes());
        write_string(&mut buf, b"");
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        check_type(data, MessageType::ChannelOpenFailure)?;
        let (recipient_channel, offset) = parse_uint32(data, 1)?;
        let (reason_code, offset) = parse_uint32(data, offset)?;
        let (description, _) = parse_utf8(data, offset)?;
        Ok(Self {
            recipient_channel,
            reason_code,
            description,
        })
    }
}

impl From<ChannelOpenFailure> for PicoError {
    fn from(failure: ChannelOpenFailure) -> Self {
        PicoError::Channel(format!(
            "Channel open failed ({}): {}",
            failure.reason(),
            failure.description
        ))
    }
}

/// SSH_MSG_CHANNEL_WINDOW_ADJUST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWindowAdjust {
    recipient_channel: u32,
    bytes_to_add: u32,
}

impl ChannelWindowAdjust {
    /// Creates a window adjust message.
    pub fn new(recipient_channel: u32, bytes_to_add: u32) -> Self {
        Self {
            recipient_channel,
            bytes_to_add,
        }
    }

    /// Returns the recipient channel.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the window credit to add.
    pub fn bytes_to_add(&self) -> u32 {
        self.bytes_to_add
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(9);
        buf.put_u8(MessageType::ChannelWindowAdjust as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.bytes_to_add);
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        check_type(data, MessageType::ChannelWindowAdjust)?;
        let (recipient_channel, offset) = parse_uint32(data, 1)?;
        let (bytes_to_add, _) = parse_uint32(data, offset)?;
        Ok(Self::new(recipient_channel, bytes_to_add))
    }
}

/// SSH_MSG_CHANNEL_DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    recipient_channel: u32,
    data: Vec<u8>,
}

impl ChannelData {
    /// Creates a data message.
    pub fn new(recipient_channel: u32, data: Vec<u8>) -> Self {
        Self {
            recipient_channel,
            data,
        }
    }

    /// Returns the recipient channel.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(9 + self.data.len());
        buf.put_u8(MessageType::ChannelData as u8);
        buf.put_u32(self.recipient_channel);
        write_string(&mut buf, &self.data);
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        check_type(data, MessageType::ChannelData)?;
        let (recipient_channel, offset) = parse_uint32(data, 1)?;
        let (payload, _) = parse_string(data, offset)?;
        Ok(Self::new(recipient_channel, payload))
    }
}

/// SSH_MSG_CHANNEL_EXTENDED_DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelExtendedData {
    recipient_channel: u32,
    data_type_code: u32,
    data: Vec<u8>,
}

impl ChannelExtendedData {
    /// Creates an extended data message.
    pub fn new(recipient_channel: u32, data_type_code: u32, data: Vec<u8>) -> Self {
        Self {
            recipient_channel,
            data_type_code,
            data,
        }
    }

    /// Creates a stderr data message.
    pub fn stderr(recipient_channel: u32, data: Vec<u8>) -> Self {
        Self::new(recipient_channel, EXTENDED_DATA_STDERR, data)
    }

    /// Returns the recipient channel.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the data type code (1 is stderr).
    pub fn data_type_code(&self) -> u32 {
        self.data_type_code
    }

    /// Returns true for stderr data.
    pub fn is_stderr(&self) -> bool {
        self.data_type_code == EXTENDED_DATA_STDERR
    }

    /// Returns the data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(13 + self.data.len());
        buf.put_u8(MessageType::ChannelExtendedData as u8);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.data_type_code);
        write_string(&mut buf, &self.data);
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        check_type(data, MessageType::ChannelExtendedData)?;
        let (recipient_channel, offset) = parse_uint32(data, 1)?;
        let (data_type_code, offset) = parse_uint32(data, offset)?;
        let (payload, _) = parse_string(data, offset)?;
        Ok(Self::new(recipient_channel, data_type_code, payload))
    }
}

/// Channel messages that carry only a recipient channel: EOF, CLOSE,
/// SUCCESS and FAILURE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelNotice {
    kind: MessageType,
    recipient_channel: u32,
}

impl ChannelNotice {
    /// SSH_MSG_CHANNEL_EOF
    pub fn eof(recipient_channel: u32) -> Self {
        Self {
            kind: MessageType::ChannelEof,
            recipient_channel,
        }
    }

    /// SSH_MSG_CHANNEL_CLOSE
    pub fn close(recipient_channel: u32) -> Self {
        Self {
            kind: MessageType::ChannelClose,
            recipient_channel,
        }
    }

    /// SSH_MSG_CHANNEL_SUCCESS
    pub fn success(recipient_channel: u32) -> Self {
        Self {
            kind: MessageType::ChannelSuccess,
            recipient_channel,
        }
    }

    /// SSH_MSG_CHANNEL_FAILURE
    pub fn failure(recipient_channel: u32) -> Self {
        Self {
            kind: MessageType::ChannelFailure,
            recipient_channel,
        }
    }

    /// Returns which notice this is.
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Returns the recipient channel.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(self.kind as u8);
        buf.put_u32(self.recipient_channel);
        buf.to_vec()
    }

    /// Parses any of the four notices.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        let kind = match MessageType::of(data) {
            Some(
                kind @ (MessageType::ChannelEof
                | MessageType::ChannelClose
                | MessageType::ChannelSuccess
                | MessageType::ChannelFailure),
            ) => kind,
            _ => {
                return Err(PicoError::Protocol(format!(
                    "Not a channel notice: {:?}",
                    data.first()
                )))
            }
        };
        let (recipient_channel, _) = parse_uint32(data, 1)?;
        Ok(Self {
            kind,
            recipient_channel,
        })
    }
}

/// Channel request type (RFC 4254 Section 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequestType {
    /// Execute a command.
    Exec {
        /// Command line
        command: String,
    },
    /// Command exit status, sent by the server.
    ExitStatus {
        /// Exit status
        exit_status: u32,
    },
    /// Any other request, kept by name only.
    Other {
        /// Request type name
        name: String,
    },
}

impl ChannelRequestType {
    /// Returns the request type name.
    pub fn name(&self) -> &str {
        match self {
            ChannelRequestType::Exec { .. } => "exec",
            ChannelRequestType::ExitStatus { .. } => "exit-status",
            ChannelRequestType::Other { name } => name,
        }
    }
}

/// SSH_MSG_CHANNEL_REQUEST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    recipient_channel: u32,
    request_type: ChannelRequestType,
    want_reply: bool,
}

impl ChannelRequest {
    /// Creates a channel request.
    pub fn new(recipient_channel: u32, request_type: ChannelRequestType, want_reply: bool) -> Self {
        Self {
            recipient_channel,
            request_type,
            want_reply,
        }
    }

    /// Returns the recipient channel.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the request type.
    pub fn request_type(&self) -> &ChannelRequestType {
        &self.request_type
    }

    /// Returns whether the sender wants a reply.
    pub fn want_reply(&self) -> bool {
        self.want_reply
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::ChannelRequest as u8);
        buf.put_u32(self.recipient_channel);
        write_string(&mut buf, self.request_type.name().as_bytes());
        write_bool(&mut buf, self.want_reply);

        match &self.request_type {
            ChannelRequestType::Exec { command } => write_string(&mut buf, command.as_bytes()),
            ChannelRequestType::ExitStatus { exit_status } => buf.put_u32(*exit_status),
            ChannelRequestType::Other { .. } => {}
        }

        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        check_type(data, MessageType::ChannelRequest)?;
        let (recipient_channel, offset) = parse_uint32(data, 1)?;
        let (name, offset) = parse_utf8(data, offset)?;
        let (want_reply, offset) = parse_bool(data, offset)?;

        let request_type = match name.as_str() {
            "exec" => {
                let (command, _) = parse_utf8(data, offset)?;
                ChannelRequestType::Exec { command }
            }
            "exit-status" => {
                let (exit_status, _) = parse_uint32(data, offset)?;
                ChannelRequestType::ExitStatus { exit_status }
            }
            _ => ChannelRequestType::Other { name },
        };

        Ok(Self::new(recipient_channel, request_type, want_reply))
    }
}
