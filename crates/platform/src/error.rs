//! Error types for the Picoware SSH engine

use std::fmt;

/// Unified error type for all engine operations
#[derive(Debug)]
pub enum PicoError {
    /// I/O error (socket connect/read/write, connection closed mid-read)
    Io(std::io::Error),

    /// A connect or read exceeded its deadline
    Timeout(String),

    /// Configuration error
    Config(String),

    /// Protocol error (unexpected message, malformed frame, negotiation failure)
    Protocol(String),

    /// Security error (MAC mismatch, degenerate key-exchange values)
    Security(String),

    /// The server rejected our credentials
    Authentication {
        /// Methods the server is willing to continue with
        methods: Vec<String>,
        /// Partial success flag from SSH_MSG_USERAUTH_FAILURE
        partial_success: bool,
    },

    /// The peer sent SSH_MSG_DISCONNECT
    Disconnected {
        /// Disconnect reason code (RFC 4253 Section 11.1)
        reason_code: u32,
        /// Human-readable description supplied by the peer
        description: String,
    },

    /// Command-level channel failure (open failure, missing confirmation)
    Channel(String),

    /// The operation was abandoned because the client disconnected
    Cancelled(String),
}

impl PicoError {
    /// Returns true if the error leaves the transport unusable.
    ///
    /// After an I/O failure, a MAC failure or a peer disconnect the packet
    /// sequence and keystream can no longer be trusted, so the session must be
    /// torn down. Everything else is scoped to the operation that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PicoError::Io(_) | PicoError::Security(_) | PicoError::Disconnected { .. }
        )
    }

    /// Returns true if this is a read/connect timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PicoError::Timeout(_))
    }
}

impl fmt::Display for PicoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PicoError::Io(e) => write!(f, "IO error: {}", e),
            PicoError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            PicoError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PicoError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            PicoError::Security(msg) => write!(f, "Security error: {}", msg),
            PicoError::Authentication {
                methods,
                partial_success,
            } => {
                write!(
                    f,
                    "Authentication failed; server accepts: {}",
                    methods.join(",")
                )?;
                if *partial_success {
                    write!(f, " (partial success)")?;
                }
                Ok(())
            }
            PicoError::Disconnected {
                reason_code,
                description,
            } => write!(
                f,
                "Disconnected by peer (reason {}): {}",
                reason_code, description
            ),
            PicoError::Channel(msg) => write!(f, "Channel error: {}", msg),
            PicoError::Cancelled(msg) => write!(f, "Operation cancelled: {}", msg),
        }
    }
}

impl std::error::Error for PicoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PicoError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PicoError {
    fn from(err: std::io::Error) -> Self {
        PicoError::Io(err)
    }
}

/// Result type for engine operations
pub type PicoResult<T> = Result<T, PicoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PicoError::Config("Invalid configuration".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration"
        );
    }

    #[test]
    fn test_authentication_display_lists_methods() {
        let err = PicoError::Authentication {
            methods: vec!["publickey".to_string(), "password".to_string()],
            partial_success: false,
        };
        assert_eq!(
            err.to_string(),
            "Authentication failed; server accepts: publickey,password"
        );
    }

    #[test]
    fn test_disconnected_display() {
        let err = PicoError::Disconnected {
            reason_code: 11,
            description: "bye".to_string(),
        };
        assert_eq!(err.to_string(), "Disconnected by peer (reason 11): bye");
    }

    #[test]
    fn test_cancelled_display() {
        let err = PicoError::Cancelled("disconnect requested".to_string());
        assert_eq!(err.to_string(), "Operation cancelled: disconnect requested");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed");
        let err: PicoError = io_err.into();
        assert!(matches!(err, PicoError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PicoError::Security("MAC verification failed".into()).is_fatal());
        assert!(PicoError::Io(std::io::ErrorKind::BrokenPipe.into()).is_fatal());
        assert!(!PicoError::Channel("open failed".into()).is_fatal());
        assert!(!PicoError::Timeout("read".into()).is_fatal());
        assert!(PicoError::Timeout("read".into()).is_timeout());
        assert!(!PicoError::Cancelled("disconnect requested".into()).is_fatal());
    }
}
