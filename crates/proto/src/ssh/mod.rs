//! SSH-2 client engine (RFC 4251-4254).
//!
//! # Architecture
//!
//! The implementation is layered, leaves first:
//!
//! 1. **Wire primitives** ([`wire`], [`crypto`]) - `string`/`mpint`/name-list
//!    encoding, HMAC, AES-CTR
//! 2. **Packet layer** ([`packet`]) - Binary packet protocol (RFC 4253 Section 6)
//! 3. **Negotiation** ([`version`], [`kex`]) - Identification lines and KEXINIT
//! 4. **Key exchange** ([`kex_dh`], [`exchange`]) - Curve25519, DH group 14,
//!    DH group exchange, and key derivation
//! 5. **Transport** ([`transport`]) - Encrypted, authenticated packet I/O
//! 6. **Authentication** ([`auth`]) - Password method (RFC 4252)
//! 7. **Connection** ([`connection`], [`channel`], [`output`]) - Session
//!    channel running one command at a time (RFC 4254)
//! 8. **Client** ([`client`]) - Connect, execute, disconnect
//!
//! # Security Considerations
//!
//! - **Input Validation**: Declared packet lengths above 35000 bytes are
//!   rejected before any allocation
//! - **MAC first**: Every encrypted packet is authenticated before it is parsed
//! - **Memory Safety**: Secrets are zeroized on drop using [`zeroize`]
//! - **Host keys are not verified**: the fingerprint is logged and exposed,
//!   but the signature is not checked
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::Packet;
//!
//! let packet = Packet::new(b"SSH-MSG-KEXINIT payload".to_vec(), 8).unwrap();
//! let bytes = packet.to_bytes();
//!
//! let parsed = Packet::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.payload(), b"SSH-MSG-KEXINIT payload");
//! ```
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol
//! - [RFC 4419](https://datatracker.ietf.org/doc/html/rfc4419) - DH Group Exchange
//! - [RFC 8731](https://datatracker.ietf.org/doc/html/rfc8731) - Curve25519 key exchange

pub mod auth;
pub mod channel;
pub mod client;
pub mod connection;
pub mod crypto;
pub mod exchange;
pub mod kex;
pub mod kex_dh;
pub mod message;
pub mod output;
pub mod packet;
pub mod transport;
pub mod version;
pub mod wire;

// Re-export main types
pub use auth::{AuthBanner, AuthFailure, AuthRequest, ServiceMessage};
pub use channel::{ChannelParams, ExecOutput, SshChannel};
pub use client::{ClientState, SshClient, SshClientConfig};
pub use connection::{
    ChannelData, ChannelExtendedData, ChannelNotice, ChannelOpen, ChannelOpenConfirmation,
    ChannelOpenFailure, ChannelRequest, ChannelRequestType, ChannelWindowAdjust,
};
pub use crypto::{CipherAlgorithm, CtrBackend, HashAlgorithm, MacAlgorithm};
pub use exchange::{GexRequest, KexMethod, KexOutput, KexReply, KeyExchange};
pub use kex::{negotiate, negotiate_algorithm, KexInit, NegotiatedAlgorithms, NewKeys};
pub use kex_dh::{derive_key, Curve25519Exchange, DhExchange, SessionKeys, SharedSecret};
pub use message::MessageType;
pub use packet::Packet;
pub use transport::{Disconnect, DisconnectReason, Transport};
pub use version::Version;
