//! SSH algorithm negotiation (RFC 4253 Section 7).
//!
//! This module implements:
//! - SSH_MSG_KEXINIT message
//! - SSH_MSG_NEWKEYS message
//! - Algorithm negotiation (client preference wins)
//!
//! # Key Exchange Flow
//!
//! 1. Both sides send SSH_MSG_KEXINIT
//! 2. Algorithm negotiation (first client entry the server also lists)
//! 3. Key exchange (see [`exchange`](super::exchange))
//! 4. Both sides send SSH_MSG_NEWKEYS
//! 5. Switch to encrypted communication
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::kex::{negotiate, KexInit};
//!
//! let client = KexInit::client_default();
//! let server = KexInit::with_algorithms(
//!     &["diffie-hellman-group14-sha1"],
//!     &["ssh-rsa"],
//!     &["aes256-ctr"],
//!     &["hmac-sha1"],
//! );
//!
//! let chosen = negotiate(&client, &server).unwrap();
//! assert_eq!(chosen.kex(), "diffie-hellman-group14-sha1");
//! assert_eq!(chosen.cipher_client_to_server().name(), "aes256-ctr");
//! ```

use bytes::{BufMut, BytesMut};
use picoware_platform::{PicoError, PicoResult};
use rand::RngCore;

use super::crypto::{CipherAlgorithm, MacAlgorithm};
use super::message::MessageType;
use super::wire::{parse_bool, parse_name_list, parse_uint32, write_bool, write_name_list};

/// Key exchange methods offered by this client, most preferred first.
pub const KEX_ALGORITHMS: &[&str] = &[
    "curve25519-sha256",
    "curve25519-sha256@libssh.org",
    "diffie-hellman-group-exchange-sha256",
    "diffie-hellman-group14-sha256",
    "diffie-hellman-group14-sha1",
];

/// Host key algorithms offered. The host key is parsed but not verified, so
/// this list only steers which blob the server sends.
pub const HOST_KEY_ALGORITHMS: &[&str] = &[
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "rsa-sha2-512",
    "rsa-sha2-256",
    "ssh-rsa",
];

/// Ciphers offered, both directions.
pub const CIPHER_ALGORITHMS: &[&str] = &["aes128-ctr", "aes256-ctr"];

/// MACs offered, both directions.
pub const MAC_ALGORITHMS: &[&str] = &["hmac-sha2-256", "hmac-sha1"];

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
///
/// Each algorithm list is ordered by preference (most preferred first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    cookie: [u8; 16],
    kex_algorithms: Vec<String>,
    server_host_key_algorithms: Vec<String>,
    encryption_algorithms_client_to_server: Vec<String>,
    encryption_algorithms_server_to_client: Vec<String>,
    mac_algorithms_client_to_server: Vec<String>,
    mac_algorithms_server_to_client: Vec<String>,
    compression_algorithms_client_to_server: Vec<String>,
    compression_algorithms_server_to_client: Vec<String>,
    languages_client_to_server: Vec<String>,
    languages_server_to_client: Vec<String>,
    first_kex_packet_follows: bool,
}

impl KexInit {
    /// Creates this client's KEXINIT with its fixed preference lists and no
    /// compression.
    pub fn client_default() -> Self {
        Self::with_algorithms(
            KEX_ALGORITHMS,
            HOST_KEY_ALGORITHMS,
            CIPHER_ALGORITHMS,
            MAC_ALGORITHMS,
        )
    }

    /// Creates a KEXINIT with a fresh random cookie and the given lists.
    ///
    /// Cipher and MAC lists are used for both directions; compression is
    /// always `none`.
    pub fn with_algorithms(kex: &[&str], host_key: &[&str], ciphers: &[&str], macs: &[&str]) -> Self {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        Self {
            cookie,
            kex_algorithms: names(kex),
            server_host_key_algorithms: names(host_key),
            encryption_algorithms_client_to_server: names(ciphers),
            encryption_algorithms_server_to_client: names(ciphers),
            mac_algorithms_client_to_server: names(macs),
            mac_algorithms_server_to_client: names(macs),
            compression_algorithms_client_to_server: names(&["none"]),
            compression_algorithms_server_to_client: names(&["none"]),
            languages_client_to_server: vec![],
            languages_server_to_client: vec![],
            first_kex_packet_follows: false,
        }
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; 16] {
        &self.cookie
    }

    /// Returns the key exchange algorithms.
    pub fn kex_algorithms(&self) -> &[String] {
        &self.kex_algorithms
    }

    /// Returns the server host key algorithms.
    pub fn server_host_key_algorithms(&self) -> &[String] {
        &self.server_host_key_algorithms
    }

    /// Returns the client-to-server encryption algorithms.
    pub fn encryption_algorithms_client_to_server(&self) -> &[String] {
        &self.encryption_algorithms_client_to_server
    }

    /// Returns the server-to-client encryption algorithms.
    pub fn encryption_algorithms_server_to_client(&self) -> &[String] {
        &self.encryption_algorithms_server_to_client
    }

    /// Returns the client-to-server MAC algorithms.
    pub fn mac_algorithms_client_to_server(&self) -> &[String] {
        &self.mac_algorithms_client_to_server
    }

    /// Returns the server-to-client MAC algorithms.
    pub fn mac_algorithms_server_to_client(&self) -> &[String] {
        &self.mac_algorithms_server_to_client
    }

    /// Returns the first_kex_packet_follows flag.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Sets the first_kex_packet_follows flag.
    pub fn set_first_kex_packet_follows(&mut self, follows: bool) {
        self.first_kex_packet_follows = follows;
    }

    /// Serializes the KEXINIT message (payload, message byte included).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(MessageType::KexInit as u8);
        buf.put_slice(&self.cookie);

        write_name_list(&mut buf, &self.kex_algorithms);
        write_name_list(&mut buf, &self.server_host_key_algorithms);
        write_name_list(&mut buf, &self.encryption_algorithms_client_to_server);
        write_name_list(&mut buf, &self.encryption_algorithms_server_to_client);
        write_name_list(&mut buf, &self.mac_algorithms_client_to_server);
        write_name_list(&mut buf, &self.mac_algorithms_server_to_client);
        write_name_list(&mut buf, &self.compression_algorithms_client_to_server);
        write_name_list(&mut buf, &self.compression_algorithms_server_to_client);
        write_name_list(&mut buf, &self.languages_client_to_server);
        write_name_list(&mut buf, &self.languages_server_to_client);

        write_bool(&mut buf, self.first_kex_packet_follows);

        // uint32 reserved
        buf.put_u32(0);

        buf.to_vec()
    }

    /// Parses a KEXINIT message.
    ///
    /// # Errors
    ///
    /// Returns [`PicoError::Protocol`] if:
    /// - Message type is not SSH_MSG_KEXINIT (20)
    /// - Message is truncated anywhere
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        match data.first() {
            None => return Err(PicoError::Protocol("KEXINIT message is empty".to_string())),
            Some(&b) if b != MessageType::KexInit as u8 => {
                return Err(PicoError::Protocol(format!(
                    "Invalid message type: expected 20 (SSH_MSG_KEXINIT), got {}",
                    b
                )))
            }
            Some(_) => {}
        }

        if data.len() < 17 {
            return Err(PicoError::Protocol(format!(
                "KEXINIT message too short: {} bytes (minimum 17)",
                data.len()
            )));
        }

        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(&data[1..17]);

        let (kex_algorithms, offset) = parse_name_list(data, 17)?;
        let (server_host_key_algorithms, offset) = parse_name_list(data, offset)?;
        let (encryption_algorithms_client_to_server, offset) = parse_name_list(data, offset)?;
        let (encryption_algorithms_server_to_client, offset) = parse_name_list(data, offset)?;
        let (mac_algorithms_client_to_server, offset) = parse_name_list(data, offset)?;
        let (mac_algorithms_server_to_client, offset) = parse_name_list(data, offset)?;
        let (compression_algorithms_client_to_server, offset) = parse_name_list(data, offset)?;
        let (compression_algorithms_server_to_client, offset) = parse_name_list(data, offset)?;
        let (languages_client_to_server, offset) = parse_name_list(data, offset)?;
        let (languages_server_to_client, offset) = parse_name_list(data, offset)?;
        let (first_kex_packet_follows, offset) = parse_bool(data, offset)?;
        let _reserved = parse_uint32(data, offset)?;

        Ok(Self {
            cookie,
            kex_algorithms,
            server_host_key_algorithms,
            encryption_algorithms_client_to_server,
            encryption_algorithms_server_to_client,
            mac_algorithms_client_to_server,
            mac_algorithms_server_to_client,
            compression_algorithms_client_to_server,
            compression_algorithms_server_to_client,
            languages_client_to_server,
            languages_server_to_client,
            first_kex_packet_follows,
        })
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// ```rust
/// use picoware_proto::ssh::kex::NewKeys;
///
/// assert_eq!(NewKeys::new().to_bytes(), vec![21]);
/// assert!(NewKeys::from_bytes(&[21]).is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NewKeys;

impl NewKeys {
    /// Creates a new SSH_MSG_NEWKEYS message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes the NEWKEYS message to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::NewKeys as u8]
    }

    /// Parses a NEWKEYS message.
    pub fn from_bytes(data: &[u8]) -> PicoResult<Self> {
        match data.first() {
            Some(&b) if b == MessageType::NewKeys as u8 => Ok(Self),
            Some(&b) => Err(PicoError::Protocol(format!(
                "Invalid message type: expected 21 (SSH_MSG_NEWKEYS), got {}",
                b
            ))),
            None => Err(PicoError::Protocol("NEWKEYS message is empty".to_string())),
        }
    }
}

/// Picks the first algorithm in `client_list` that also appears in
/// `server_list` (RFC 4253 Section 7.1).
///
/// # Errors
///
/// Returns [`PicoError::Protocol`] naming `category` if there is no common
/// algorithm.
pub fn negotiate_algorithm(
    category: &str,
    client_list: &[String],
    server_list: &[String],
) -> PicoResult<String> {
    client_list
        .iter()
        .find(|alg| server_list.contains(alg))
        .cloned()
        .ok_or_else(|| {
            PicoError::Protocol(format!(
                "No common {} algorithm: client={:?}, server={:?}",
                category, client_list, server_list
            ))
        })
}

/// Returns true if the server sent a guessed KEX packet that must be
/// discarded because its guess was wrong (RFC 4253 Section 7).
pub fn server_guess_is_wrong(client: &KexInit, server: &KexInit) -> bool {
    server.first_kex_packet_follows
        && (client.kex_algorithms.first() != server.kex_algorithms.first()
            || client.server_host_key_algorithms.first()
                != server.server_host_key_algorithms.first())
}

/// Algorithms chosen for one connection.
///
/// Built once by [`negotiate`]; there is no re-keying, so it never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedAlgorithms {
    kex: String,
    host_key: String,
    cipher_client_to_server: CipherAlgorithm,
    cipher_server_to_client: CipherAlgorithm,
    mac_client_to_server: MacAlgorithm,
    mac_server_to_client: MacAlgorithm,
}

impl NegotiatedAlgorithms {
    /// Key exchange method name.
    pub fn kex(&self) -> &str {
        &self.kex
    }

    /// Host key algorithm name.
    pub fn host_key(&self) -> &str {
        &self.host_key
    }

    /// Cipher for packets we send.
    pub fn cipher_client_to_server(&self) -> CipherAlgorithm {
        self.cipher_client_to_server
    }

    /// Cipher for packets we receive.
    pub fn cipher_server_to_client(&self) -> CipherAlgorithm {
        self.cipher_server_to_client
    }

    /// MAC for packets we send.
    pub fn mac_client_to_server(&self) -> MacAlgorithm {
        self.mac_client_to_server
    }

    /// MAC for packets we receive.
    pub fn mac_server_to_client(&self) -> MacAlgorithm {
        self.mac_server_to_client
    }
}

impl std::fmt::Display for NegotiatedAlgorithms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "kex={} hostkey={} c2s={}+{} s2c={}+{}",
            self.kex,
            self.host_key,
            self.cipher_client_to_server.name(),
            self.mac_client_to_server.name(),
            self.cipher_server_to_client.name(),
            self.mac_server_to_client.name()
        )
    }
}

/// Negotiates every category independently, client preference first.
pub fn negotiate(client: &KexInit, server: &KexInit) -> PicoResult<NegotiatedAlgorithms> {
    let kex = negotiate_algorithm("key exchange", &client.kex_algorithms, &server.kex_algorithms)?;
    let host_key = negotiate_algorithm(
        "host key",
        &client.server_host_key_algorithms,
        &server.server_host_key_algorithms,
    )?;

    let cipher = |category: &str, c: &[String], s: &[String]| -> PicoResult<CipherAlgorithm> {
        let name = negotiate_algorithm(category, c, s)?;
        CipherAlgorithm::from_name(&name)
            .ok_or_else(|| PicoError::Protocol(format!("Unsupported cipher: {}", name)))
    };
    let mac = |category: &str, c: &[String], s: &[String]| -> PicoResult<MacAlgorithm> {
        let name = negotiate_algorithm(category, c, s)?;
        MacAlgorithm::from_name(&name)
            .ok_or_else(|| PicoError::Protocol(format!("Unsupported MAC: {}", name)))
    };

    Ok(NegotiatedAlgorithms {
        kex,
        host_key,
        cipher_client_to_server: cipher(
            "client-to-server cipher",
            &client.encryption_algorithms_client_to_server,
            &server.encryption_algorithms_client_to_server,
        )?,
        cipher_server_to_client: cipher(
            "server-to-client cipher",
            &client.encryption_algorithms_server_to_client,
            &server.encryption_algorithms_server_to_client,
        )?,
        mac_client_to_server: mac(
            "client-to-server MAC",
            &client.mac_algorithms_client_to_server,
            &server.mac_algorithms_client_to_server,
        )?,
        mac_server_to_client: mac(
            "server-to-client MAC",
            &client.mac_algorithms_server_to_client,
            &server.mac_algorithms_server_to_client,
        )?,
    })
}
