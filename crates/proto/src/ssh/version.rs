//! SSH protocol version exchange (RFC 4253 Section 4.2).
//!
//! Both sides send an identification string:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! The server may send other lines before its identification string; they
//! are skipped, up to [`MAX_PRE_BANNER_LINES`].
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::version::Version;
//!
//! let version = Version::picoware();
//! assert_eq!(version.to_string(), "SSH-2.0-Picoware_1.6.9");
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_9.6 Debian-1").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_9.6");
//! assert_eq!(parsed.comments(), Some("Debian-1"));
//! ```

use picoware_platform::{PicoError, PicoResult};

/// Maximum length of SSH version string (RFC 4253 Section 4.2).
pub const MAX_VERSION_LENGTH: usize = 255;

/// Number of non-identification lines tolerated before the server's
/// `SSH-` line.
pub const MAX_PRE_BANNER_LINES: usize = 32;

/// Software version this client announces.
pub const DEFAULT_SOFTWARE_VERSION: &str = "Picoware_1.6.9";

/// SSH protocol version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    proto_version: String,
    software_version: String,
    comments: Option<String>,
}

impl Version {
    /// Creates a protocol 2.0 identification with the given software version.
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// Returns this client's identification, `SSH-2.0-Picoware_1.6.9`.
    pub fn picoware() -> Self {
        Self::new(DEFAULT_SOFTWARE_VERSION, None)
    }

    /// Returns true if `line` is an identification line rather than a
    /// pre-banner line.
    pub fn is_identification(line: &str) -> bool {
        line.starts_with("SSH-")
    }

    /// Parses an SSH version string.
    ///
    /// # Errors
    ///
    /// Returns [`PicoError::Protocol`] if:
    /// - Line is too long (> 255 characters)
    /// - Line doesn't start with "SSH-"
    /// - Protocol version is not "2.0" or "1.99"
    /// - Line contains null bytes
    pub fn parse(line: &str) -> PicoResult<Self> {
        let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

        if line.len() > MAX_VERSION_LENGTH {
            return Err(PicoError::Protocol(format!(
                "Version string too long: {} bytes (max {})",
                line.len(),
                MAX_VERSION_LENGTH
            )));
        }

        if line.contains('\0') {
            return Err(PicoError::Protocol(
                "Version string contains null byte".to_string(),
            ));
        }

        if !Self::is_identification(line) {
            return Err(PicoError::Protocol(format!(
                "Invalid version string: must start with 'SSH-', got '{}'",
                line
            )));
        }

        let mut parts = line.splitn(3, '-');
        let (proto_version, rest) = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(proto), Some(rest)) => (proto, rest),
            _ => {
                return Err(PicoError::Protocol(format!(
                    "Invalid version string format: '{}'",
                    line
                )))
            }
        };

        if proto_version != "2.0" && proto_version != "1.99" {
            return Err(PicoError::Protocol(format!(
                "Unsupported protocol version: '{}' (expected '2.0' or '1.99')",
                proto_version
            )));
        }

        let (software_version, comments) = match rest.split_once(' ') {
            Some((software, comments)) => (software.to_string(), Some(comments.trim().to_string())),
            None => (rest.to_string(), None),
        };

        if software_version.is_empty() {
            return Err(PicoError::Protocol(format!(
                "Missing software version: '{}'",
                line
            )));
        }

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version,
            comments,
        })
    }

    /// Returns the protocol version (e.g., "2.0").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version (e.g., "OpenSSH_9.6").
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Converts to wire format (with CR LF).
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\r\n", self).into_bytes()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.proto_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picoware_identification() {
        let version = Version::picoware();
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.to_wire_format(), b"SSH-2.0-Picoware_1.6.9\r\n");
    }

    #[test]
    fn test_version_parse_with_comments() {
        let version = Version::parse("SSH-2.0-OpenSSH_8.9 Ubuntu-3ubuntu0.1\r\n").unwrap();
        assert_eq!(version.software(), "OpenSSH_8.9");
        assert_eq!(version.comments(), Some("Ubuntu-3ubuntu0.1"));
    }

    #[test]
    fn test_version_parse_accepts_1_99() {
        let version = Version::parse("SSH-1.99-Cisco-1.25").unwrap();
        assert_eq!(version.proto_version(), "1.99");
        assert_eq!(version.software(), "Cisco-1.25");
    }

    #[test]
    fn test_pre_banner_lines_are_not_identification() {
        assert!(!Version::is_identification("Welcome to the lab server"));
        assert!(!Version::is_identification(""));
        assert!(Version::is_identification("SSH-2.0-dropbear"));
    }

    #[test]
    fn test_version_parse_unsupported_protocol() {
        match Version::parse("SSH-1.0-OldClient") {
            Err(PicoError::Protocol(msg)) => {
                assert!(msg.contains("Unsupported protocol version"));
            }
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_version_parse_rejects_malformed() {
        assert!(Version::parse("INVALID-2.0-Test").is_err());
        assert!(Version::parse("SSH-2.0").is_err());
        assert!(Version::parse("SSH-2.0-").is_err());
        assert!(Version::parse("SSH-2.0-Test\0Bad").is_err());
        assert!(Version::parse(&format!("SSH-2.0-{}", "A".repeat(300))).is_err());
    }
}
