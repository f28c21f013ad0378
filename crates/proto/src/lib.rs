//! Protocol implementations for Picoware.
//!
//! - **SSH** - an SSH-2 client engine: version exchange, Curve25519 and
//!   Diffie-Hellman key exchange, AES-CTR + HMAC transport, password
//!   authentication and remote command execution
//!
//! # Features
//!
//! - `ssh` (default) - SSH client support
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::Packet;
//!
//! // Create and serialize an SSH packet
//! let packet = Packet::new(b"SSH message payload".to_vec(), 8).unwrap();
//! let wire_format = packet.to_bytes();
//!
//! // Parse from wire format
//! let parsed = Packet::from_bytes(&wire_format).unwrap();
//! assert_eq!(parsed.payload(), b"SSH message payload");
//! ```
//!
//! # Security
//!
//! - Cryptographic primitives come from RustCrypto and `x25519-dalek`
//! - Constant-time MAC comparison
//! - Secure memory handling with `zeroize`
//! - Server host keys are NOT verified
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;
