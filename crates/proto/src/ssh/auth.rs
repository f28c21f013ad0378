//! SSH authentication protocol (RFC 4252), password method only.
//!
//! The client asks for the `ssh-userauth` service, sends a single password
//! request and then waits for the outcome, logging any banners the server
//! sends meanwhile:
//!
//! ```text
//! C: SERVICE_REQUEST "ssh-userauth"      S: SERVICE_ACCEPT
//! C: USERAUTH_REQUEST "password"         S: USERAUTH_BANNER*  then
//!                                           USERAUTH_SUCCESS | USERAUTH_FAILURE
//! ```
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::auth::AuthRequest;
//!
//! let request = AuthRequest::password("alice", "secret");
//! let bytes = request.to_bytes();
//! assert_eq!(bytes[0], 50);
//!
//! let parsed = AuthRequest::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.user_name(), "alice");
//! ```

use bytes::{BufMut, BytesMut};
use picoware_platform::{PicoError, PicoResult};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::message::MessageType;
use super::transport::Transport;
use super::wire::{parse_bool, parse_name_list, parse_utf8, write_bool, write_string};

/// Service requested before authentication.
pub const USERAUTH_SERVICE: &str = "ssh-userauth";

/// Service started once authenticated.
pub const CONNECTION_SERVICE: &str = "ssh-connection";

/// SSH_MSG_SERVICE_REQUEST / SSH_MSG_SERVICE_ACCEPT (RFC 4253 Section 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMessage {
    kind: MessageType,
    service_name: String,
}

impl ServiceMessage {
    /// Builds a SERVICE_REQUEST.
    pub fn request(service_name: &str) -> Self {
        Self {
            kind: MessageType::ServiceRequest,
            service_name: service_name.to_string(),
        }
    }

    /// Builds a SERVICE_ACCEPT.
    pub fn accept(service_name: &str) -> Self {
        Self {
            kind: MessageType::ServiceAccept,
            service_name: service_name.to_string(),
        }
    }

    /// Returns the message type (request or accept).
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Returns the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.kind as u8);
        write_string(&mut buf, self.service_name.as_bytes());
        buf.to_vec()
    }

    /// Parses a SERVICE_REQUEST or SERVICE_ACCEPT.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        let kind = match MessageType::of(data) {
            Some(kind @ (MessageType::ServiceRequest | MessageType::ServiceAccept)) => kind,
            _ => {
                return Err(PicoError::Protocol(
                    "Expected SSH_MSG_SERVICE_REQUEST or SSH_MSG_SERVICE_ACCEPT".to_string(),
                ))
            }
        };
        let (service_name, _) = parse_utf8(data, 1)?;
        Ok(Self { kind, service_name })
    }
}

/// SSH_MSG_USERAUTH_REQUEST for the "password" method (RFC 4252 Section 8).
///
/// The password is wiped from memory when the request is dropped.
#[derive(Clone)]
pub struct AuthRequest {
    user_name: String,
    service_name: String,
    password: Zeroizing<String>,
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("user_name", &self.user_name)
            .field("service_name", &self.service_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AuthRequest {
    /// Creates a password request for the `ssh-connection` service.
    pub fn password(user_name: &str, password: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            service_name: CONNECTION_SERVICE.to_string(),
            password: Zeroizing::new(password.to_string()),
        }
    }

    /// Returns the user name.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Returns the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the password.
    pub fn secret(&self) -> &str {
        &self.password
    }

    /// Serializes the request.
    ///
    /// ```text
    /// byte      SSH_MSG_USERAUTH_REQUEST (50)
    /// string    user name
    /// string    service name
    /// string    "password"
    /// boolean   FALSE
    /// string    plaintext password
    /// ```
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::UserauthRequest as u8);
        write_string(&mut buf, self.user_name.as_bytes());
        write_string(&mut buf, self.service_name.as_bytes());
        write_string(&mut buf, b"password");
        write_bool(&mut buf, false);
        write_string(&mut buf, self.password.as_bytes());
        Zeroizing::new(buf.to_vec())
    }

    /// Parses a password request.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        if MessageType::of(data) != Some(MessageType::UserauthRequest) {
            return Err(PicoError::Protocol(
                "Expected SSH_MSG_USERAUTH_REQUEST".to_string(),
            ));
        }

        let (user_name, offset) = parse_utf8(data, 1)?;
        let (service_name, offset) = parse_utf8(data, offset)?;
        let (method, offset) = parse_utf8(data, offset)?;
        if method != "password" {
            return Err(PicoError::Protocol(format!(
                "Unsupported authentication method: {}",
                method
            )));
        }
        let (_change, offset) = parse_bool(data, offset)?;
        let (password, _) = parse_utf8(data, offset)?;

        Ok(Self {
            user_name,
            service_name,
            password: Zeroizing::new(password),
        })
    }
}

/// SSH_MSG_USERAUTH_FAILURE (RFC 4252 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    methods_can_continue: Vec<String>,
    partial_success: bool,
}

impl AuthFailure {
    /// Creates a failure message.
    pub fn new(methods: Vec<String>, partial_success: bool) -> Self {
        Self {
            methods_can_continue: methods,
            partial_success,
        }
    }

    /// Returns the methods that can continue.
    pub fn methods_can_continue(&self) -> &[String] {
        &self.methods_can_continue
    }

    /// Returns whether partial success was achieved.
    pub fn partial_success(&self) -> bool {
        self.partial_success
    }

    /// Serializes the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::UserauthFailure as u8);
        write_string(&mut buf, self.methods_can_continue.join(",").as_bytes());
        write_bool(&mut buf, self.partial_success);
        buf.to_vec()
    }

    /// Parses the message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        if MessageType::of(data) != Some(MessageType::UserauthFailure) {
            return Err(PicoError::Protocol(
                "Expected SSH_MSG_USERAUTH_FAILURE".to_string(),
            ));
        }
        let (methods_can_continue, offset) = parse_name_list(data, 1)?;
        let (partial_success, _) = parse_bool(data, offset)?;
        Ok(Self {
            methods_can_continue,
            partial_success,
        })
    }
}

impl From<AuthFailure> for PicoError {
    fn from(failure: AuthFailure) -> Self {
        PicoError::Authentication {
            methods: failure.methods_can_continue,
            partial_success: failure.partial_success,
        }
    }
}

/// SSH_MSG_USERAUTH_BANNER (RFC 4252 Section 5.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthBanner {
    message: String,
}

impl AuthBanner {
    /// Creates a banner.
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// Returns the banner text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Serializes the banner with an empty language tag.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageType::UserauthBanner as u8);
        write_string(&mut buf, self.message.as_bytes());
        write_string(&mut buf, b"");
        buf.to_vec()
    }

    /// Parses the banner. The language tag is ignored.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        if MessageType::of(data) != Some(MessageType::UserauthBanner) {
            return Err(PicoError::Protocol(
                "Expected SSH_MSG_USERAUTH_BANNER".to_string(),
            ));
        }
        let (message, _) = parse_utf8(data, 1)?;
        Ok(Self { message })
    }
}

/// Requests the `ssh-userauth` service and authenticates with a password.
///
/// # Errors
///
/// - [`PicoError::Authentication`] with the server's method list on
///   USERAUTH_FAILURE
/// - [`PicoError::Protocol`] on any other unexpected message
pub async fn authenticate_password(
    transport: &mut Transport,
    user_name: &str,
    password: &str,
) -> PicoResult<()> {
    transport
        .send_packet(&ServiceMessage::request(USERAUTH_SERVICE).to_bytes())
        .await?;
    let accept = transport.expect_message(MessageType::ServiceAccept).await?;
    let accept = ServiceMessage::from_bytes(&accept)?;
    debug!(service = accept.service_name(), "Service accepted");

    let request = AuthRequest::password(user_name, password);
    transport.send_packet(&request.to_bytes()).await?;

    loop {
        let payload = transport.next_message().await?;
        match MessageType::of(&payload) {
            Some(MessageType::UserauthBanner) => {
                let banner = AuthBanner::from_bytes(&payload)?;
                info!(banner = %banner.message().trim_end(), "Server banner");
            }
            Some(MessageType::UserauthSuccess) => {
                info!(user = user_name, "Password authentication succeeded");
                return Ok(());
            }
            Some(MessageType::UserauthFailure) => {
                let failure = AuthFailure::from_bytes(&payload)?;
                warn!(
                    user = user_name,
                    methods = %failure.methods_can_continue().join(","),
                    partial = failure.partial_success(),
                    "Password authentication failed"
                );
                return Err(failure.into());
            }
            _ => {
                return Err(PicoError::Protocol(format!(
                    "Unexpected message during authentication: type {}",
                    payload[0]
                )))
            }
        }
    }
}
