//! Message numbers the client sends or dispatches on.
//!
//! Only the numbers this engine handles are listed; anything else decodes to
//! `None` and is handled by the caller (usually as a protocol error or
//! ignored noise).
//!
//! Numbers 30 and 31 mean different things per key-exchange method. There is
//! one variant per number plus method-specific aliases:
//!
//! ```rust
//! use picoware_proto::ssh::message::MessageType;
//!
//! assert_eq!(MessageType::KEX_DH_GEX_GROUP, MessageType::KexdhReply);
//! assert_eq!(MessageType::of(&[20, 0, 0]), Some(MessageType::KexInit));
//! ```

use std::fmt;

/// First byte of an SSH payload.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Disconnect = 1,
    Ignore = 2,
    /// Sent by a peer that did not understand one of our packets.
    Unimplemented = 3,
    Debug = 4,
    ServiceRequest = 5,
    ServiceAccept = 6,

    KexInit = 20,
    NewKeys = 21,

    /// KEXDH_INIT and KEX_ECDH_INIT.
    KexdhInit = 30,
    /// KEXDH_REPLY, KEX_ECDH_REPLY and KEX_DH_GEX_GROUP.
    KexdhReply = 31,
    KexDhGexInit = 32,
    KexDhGexReply = 33,
    KexDhGexRequest = 34,

    UserauthRequest = 50,
    UserauthFailure = 51,
    UserauthSuccess = 52,
    UserauthBanner = 53,

    /// Server-initiated; answered with [`RequestFailure`](Self::RequestFailure).
    GlobalRequest = 80,
    RequestFailure = 82,

    ChannelOpen = 90,
    ChannelOpenConfirmation = 91,
    ChannelOpenFailure = 92,
    ChannelWindowAdjust = 93,
    ChannelData = 94,
    /// Data type 1 carries stderr.
    ChannelExtendedData = 95,
    ChannelEof = 96,
    ChannelClose = 97,
    ChannelRequest = 98,
    ChannelSuccess = 99,
    ChannelFailure = 100,
}

const KNOWN: [MessageType; 30] = [
    MessageType::Disconnect,
    MessageType::Ignore,
    MessageType::Unimplemented,
    MessageType::Debug,
    MessageType::ServiceRequest,
    MessageType::ServiceAccept,
    MessageType::KexInit,
    MessageType::NewKeys,
    MessageType::KexdhInit,
    MessageType::KexdhReply,
    MessageType::KexDhGexInit,
    MessageType::KexDhGexReply,
    MessageType::KexDhGexRequest,
    MessageType::UserauthRequest,
    MessageType::UserauthFailure,
    MessageType::UserauthSuccess,
    MessageType::UserauthBanner,
    MessageType::GlobalRequest,
    MessageType::RequestFailure,
    MessageType::ChannelOpen,
    MessageType::ChannelOpenConfirmation,
    MessageType::ChannelOpenFailure,
    MessageType::ChannelWindowAdjust,
    MessageType::ChannelData,
    MessageType::ChannelExtendedData,
    MessageType::ChannelEof,
    MessageType::ChannelClose,
    MessageType::ChannelRequest,
    MessageType::ChannelSuccess,
    MessageType::ChannelFailure,
];

impl MessageType {
    /// RFC 5656 name for 30.
    pub const KEX_ECDH_INIT: MessageType = MessageType::KexdhInit;
    /// RFC 5656 name for 31.
    pub const KEX_ECDH_REPLY: MessageType = MessageType::KexdhReply;
    /// RFC 4419 name for 31.
    pub const KEX_DH_GEX_GROUP: MessageType = MessageType::KexdhReply;

    /// Decodes a message number.
    pub fn from_u8(byte: u8) -> Option<Self> {
        KNOWN.iter().copied().find(|known| *known as u8 == byte)
    }

    /// Message type of a payload; `None` when empty or unknown.
    pub fn of(payload: &[u8]) -> Option<Self> {
        payload.first().copied().and_then(Self::from_u8)
    }

    /// Name without the `SSH_MSG_` prefix.
    pub fn name(&self) -> &'static str {
        use MessageType::*;
        match self {
            Disconnect => "DISCONNECT",
            Ignore => "IGNORE",
            Unimplemented => "UNIMPLEMENTED",
            Debug => "DEBUG",
            ServiceRequest => "SERVICE_REQUEST",
            ServiceAccept => "SERVICE_ACCEPT",
            KexInit => "KEXINIT",
            NewKeys => "NEWKEYS",
            KexdhInit => "KEXDH_INIT",
            KexdhReply => "KEXDH_REPLY",
            KexDhGexInit => "KEX_DH_GEX_INIT",
            KexDhGexReply => "KEX_DH_GEX_REPLY",
            KexDhGexRequest => "KEX_DH_GEX_REQUEST",
            UserauthRequest => "USERAUTH_REQUEST",
            UserauthFailure => "USERAUTH_FAILURE",
            UserauthSuccess => "USERAUTH_SUCCESS",
            UserauthBanner => "USERAUTH_BANNER",
            GlobalRequest => "GLOBAL_REQUEST",
            RequestFailure => "REQUEST_FAILURE",
            ChannelOpen => "CHANNEL_OPEN",
            ChannelOpenConfirmation => "CHANNEL_OPEN_CONFIRMATION",
            ChannelOpenFailure => "CHANNEL_OPEN_FAILURE",
            ChannelWindowAdjust => "CHANNEL_WINDOW_ADJUST",
            ChannelData => "CHANNEL_DATA",
            ChannelExtendedData => "CHANNEL_EXTENDED_DATA",
            ChannelEof => "CHANNEL_EOF",
            ChannelClose => "CHANNEL_CLOSE",
            ChannelRequest => "CHANNEL_REQUEST",
            ChannelSuccess => "CHANNEL_SUCCESS",
            ChannelFailure => "CHANNEL_FAILURE",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SSH_MSG_{}({})", self.name(), *self as u8)
    }
}
