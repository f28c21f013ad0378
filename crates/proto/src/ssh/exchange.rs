//! Key exchange methods driven over a [`Transport`].
//!
//! Three methods are supported, selected by the negotiated name:
//!
//! | Name | Method | Hash |
//! |------|--------|------|
//! | `curve25519-sha256`, `curve25519-sha256@libssh.org` | X25519 ECDH (RFC 8731) | SHA-256 |
//! | `diffie-hellman-group14-sha256` | fixed 2048-bit group (RFC 3526) | SHA-256 |
//! | `diffie-hellman-group14-sha1` | fixed 2048-bit group | SHA-1 |
//! | `diffie-hellman-group-exchange-sha256` | server-chosen group (RFC 4419) | SHA-256 |
//!
//! Every method produces the same [`KexOutput`]: the shared secret `K`, the
//! exchange hash `H` and the hash algorithm used for key derivation.
//!
//! Message number 31 carries a different payload depending on the active
//! method (ECDH reply, DH reply or GEX group). [`KexReply`] keeps those apart
//! by parsing against a [`KexReplyKind`] chosen by the method, never by the
//! message number alone.
//!
//! The host key blob and signature are parsed but not verified.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use num_bigint::BigUint;
use picoware_platform::{PicoError, PicoResult};
use tracing::{debug, info};

use super::crypto::{HashAlgorithm, SshHasher};
use super::kex_dh::{Curve25519Exchange, DhExchange, SharedSecret};
use super::message::MessageType;
use super::transport::Transport;
use super::wire::{parse_mpint_unsigned, parse_string, parse_utf8, write_mpint, write_string};

/// Group size bounds sent in SSH_MSG_KEX_DH_GEX_REQUEST (bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GexRequest {
    /// Smallest acceptable group.
    pub min: u32,
    /// Preferred group size.
    pub preferred: u32,
    /// Largest acceptable group.
    pub max: u32,
}

impl Default for GexRequest {
    fn default() -> Self {
        Self {
            min: 2048,
            preferred: 2048,
            max: 4096,
        }
    }
}

/// Data both sides exchanged before the key exchange proper.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeContext<'a> {
    /// `V_C`, our identification line without CR LF.
    pub client_version: &'a str,
    /// `V_S`, the server identification line without CR LF.
    pub server_version: &'a str,
    /// `I_C`, our KEXINIT payload.
    pub client_kexinit: &'a [u8],
    /// `I_S`, the server KEXINIT payload.
    pub server_kexinit: &'a [u8],
}

impl ExchangeContext<'_> {
    /// Starts the exchange hash: `V_C, V_S, I_C, I_S, K_S`.
    fn start_hash(&self, hash: HashAlgorithm, host_key: &[u8]) -> SshHasher {
        let mut hasher = SshHasher::new(hash);
        hasher
            .string(self.client_version.as_bytes())
            .string(self.server_version.as_bytes())
            .string(self.client_kexinit)
            .string(self.server_kexinit)
            .string(host_key);
        hasher
    }
}

/// Result of a completed key exchange.
pub struct KexOutput {
    /// Shared secret `K`.
    pub shared_secret: SharedSecret,
    /// Exchange hash `H`.
    pub exchange_hash: Vec<u8>,
    /// Hash used for `H` and key derivation.
    pub hash: HashAlgorithm,
    /// Server host key blob `K_S`.
    pub host_key: Vec<u8>,
}

impl std::fmt::Debug for KexOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KexOutput")
            .field("exchange_hash", &hex::encode(&self.exchange_hash))
            .field("hash", &self.hash)
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

/// Which payload shape a KEX reply is expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexReplyKind {
    /// SSH_MSG_KEX_ECDH_REPLY (31).
    Ecdh,
    /// SSH_MSG_KEXDH_REPLY (31).
    Dh,
    /// SSH_MSG_KEX_DH_GEX_GROUP (31).
    GexGroup,
    /// SSH_MSG_KEX_DH_GEX_REPLY (33).
    GexReply,
}

impl KexReplyKind {
    fn message_type(self) -> MessageType {
        match self {
            KexReplyKind::Ecdh => MessageType::KEX_ECDH_REPLY,
            KexReplyKind::Dh => MessageType::KexdhReply,
            KexReplyKind::GexGroup => MessageType::KEX_DH_GEX_GROUP,
            KexReplyKind::GexReply => MessageType::KexDhGexReply,
        }
    }
}

/// A parsed server key exchange message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KexReply {
    /// `string K_S, string Q_S, string signature`
    Ecdh {
        /// Host key blob.
        host_key: Vec<u8>,
        /// Server ephemeral X25519 public value.
        server_public: Vec<u8>,
        /// Signature over `H` (unverified).
        signature: Vec<u8>,
    },
    /// `string K_S, mpint f, string signature`
    Dh {
        /// Host key blob.
        host_key: Vec<u8>,
        /// Server public value.
        f: BigUint,
        /// Signature over `H` (unverified).
        signature: Vec<u8>,
    },
    /// `mpint p, mpint g`
    GexGroup {
        /// Group prime.
        p: BigUint,
        /// Group generator.
        g: BigUint,
    },
}

impl KexReply {
    /// Parses `payload` as the reply shape `kind`.
    pub fn parse(kind: KexReplyKind, payload: &[u8]) -> PicoResult<Self> {
        let expected = kind.message_type();
        match payload.first() {
            Some(&b) if b == expected as u8 => {}
            Some(&b) => {
                return Err(PicoError::Protocol(format!(
                    "Expected {}, got message type {}",
                    expected, b
                )))
            }
            None => return Err(PicoError::Protocol("Empty KEX reply".to_string())),
        }

        match kind {
            KexReplyKind::Ecdh => {
                let (host_key, offset) = parse_string(payload, 1)?;
                let (server_public, offset) = parse_string(payload, offset)?;
                let (signature, _) = parse_string(payload, offset)?;
                Ok(KexReply::Ecdh {
                    host_key,
                    server_public,
                    signature,
                })
            }
            KexReplyKind::Dh | KexReplyKind::GexReply => {
                let (host_key, offset) = parse_string(payload, 1)?;
                let (f, offset) = parse_mpint_unsigned(payload, offset)?;
                let (signature, _) = parse_string(payload, offset)?;
                Ok(KexReply::Dh {
                    host_key,
                    f,
                    signature,
                })
            }
            KexReplyKind::GexGroup => {
                let (p, offset) = parse_mpint_unsigned(payload, 1)?;
                let (g, _) = parse_mpint_unsigned(payload, offset)?;
                Ok(KexReply::GexGroup { p, g })
            }
        }
    }
}

/// Returns the algorithm name at the start of a host key blob.
pub fn host_key_algorithm(host_key: &[u8]) -> PicoResult<String> {
    parse_utf8(host_key, 0).map(|(name, _)| name)
}

/// Returns `SHA256:<hex>` over the host key blob.
pub fn host_key_fingerprint(host_key: &[u8]) -> String {
    format!(
        "SHA256:{}",
        hex::encode(HashAlgorithm::Sha256.digest(&[host_key]))
    )
}

fn log_host_key(host_key: &[u8]) {
    let algorithm = host_key_algorithm(host_key).unwrap_or_else(|_| "unknown".to_string());
    info!(
        algorithm = %algorithm,
        fingerprint = %host_key_fingerprint(host_key),
        "Server host key received (not verified)"
    );
}

/// One key exchange method.
#[async_trait]
pub trait KeyExchange: Send {
    /// Runs the method-specific messages after KEXINIT and before NEWKEYS.
    async fn run(
        &mut self,
        transport: &mut Transport,
        ctx: &ExchangeContext<'_>,
    ) -> PicoResult<KexOutput>;
}

/// curve25519-sha256 (RFC 8731).
#[derive(Debug, Default)]
pub struct Curve25519Kex;

#[async_trait]
impl KeyExchange for Curve25519Kex {
    async fn run(
        &mut self,
        transport: &mut Transport,
        ctx: &ExchangeContext<'_>,
    ) -> PicoResult<KexOutput> {
        let exchange = Curve25519Exchange::new();

        let mut init = BytesMut::new();
        init.put_u8(MessageType::KEX_ECDH_INIT as u8);
        write_string(&mut init, exchange.public_key());
        transport.send_packet(&init).await?;

        let payload = transport.next_message().await?;
        let KexReply::Ecdh {
            host_key,
            server_public,
            ..
        } = KexReply::parse(KexReplyKind::Ecdh, &payload)?
        else {
            return Err(PicoError::Protocol("Malformed ECDH reply".to_string()));
        };
        log_host_key(&host_key);

        let shared_secret = exchange.compute_shared_secret(&server_public)?;

        let hash = HashAlgorithm::Sha256;
        let mut hasher = ctx.start_hash(hash, &host_key);
        hasher
            .string(exchange.public_key())
            .string(&server_public)
            .update(&shared_secret.to_mpint());

        Ok(KexOutput {
            shared_secret,
            exchange_hash: hasher.finish(),
            hash,
            host_key,
        })
    }
}

/// diffie-hellman-group14-sha256 / -sha1.
#[derive(Debug)]
pub struct DhGroup14Kex {
    hash: HashAlgorithm,
}

impl DhGroup14Kex {
    /// Creates the exchange with the given hash.
    pub fn new(hash: HashAlgorithm) -> Self {
        Self { hash }
    }
}

#[async_trait]
impl KeyExchange for DhGroup14Kex {
    async fn run(
        &mut self,
        transport: &mut Transport,
        ctx: &ExchangeContext<'_>,
    ) -> PicoResult<KexOutput> {
        let dh = DhExchange::group14();
        finish_dh(transport, ctx, dh, self.hash, None).await
    }
}

/// diffie-hellman-group-exchange-sha256 (RFC 4419).
#[derive(Debug)]
pub struct DhGexKex {
    request: GexRequest,
}

impl DhGexKex {
    /// Creates the exchange with the group size bounds to request.
    pub fn new(request: GexRequest) -> Self {
        Self { request }
    }
}

#[async_trait]
impl KeyExchange for DhGexKex {
    async fn run(
        &mut self,
        transport: &mut Transport,
        ctx: &ExchangeContext<'_>,
    ) -> PicoResult<KexOutput> {
        let request = self.request;

        let mut msg = BytesMut::new();
        msg.put_u8(MessageType::KexDhGexRequest as u8);
        msg.put_u32(request.min);
        msg.put_u32(request.preferred);
        msg.put_u32(request.max);
        transport.send_packet(&msg).await?;

        let payload = transport.next_message().await?;
        let KexReply::GexGroup { p, g } = KexReply::parse(KexReplyKind::GexGroup, &payload)?
        else {
            return Err(PicoError::Protocol("Malformed GEX group".to_string()));
        };

        if p.bits() < u64::from(request.min) {
            return Err(PicoError::Security(format!(
                "DH group too small: {} bits (requested at least {})",
                p.bits(),
                request.min
            )));
        }
        debug!(bits = p.bits(), "Server chose DH group");

        let dh = DhExchange::new(p, g)?;
        finish_dh(transport, ctx, dh, HashAlgorithm::Sha256, Some(request)).await
    }
}

/// Sends `e`, receives `f` and computes `K` and `H`.
///
/// With `gex` set, the GEX message numbers are used and `min, n, max, p, g`
/// go into the hash ahead of `e`.
async fn finish_dh(
    transport: &mut Transport,
    ctx: &ExchangeContext<'_>,
    dh: DhExchange,
    hash: HashAlgorithm,
    gex: Option<GexRequest>,
) -> PicoResult<KexOutput> {
    let (init_type, reply_kind) = match gex {
        Some(_) => (MessageType::KexDhGexInit, KexReplyKind::GexReply),
        None => (MessageType::KexdhInit, KexReplyKind::Dh),
    };

    let mut init = BytesMut::new();
    init.put_u8(init_type as u8);
    write_mpint(&mut init, dh.public_key());
    transport.send_packet(&init).await?;

    let payload = transport.next_message().await?;
    let KexReply::Dh { host_key, f, .. } = KexReply::parse(reply_kind, &payload)? else {
        return Err(PicoError::Protocol("Malformed DH reply".to_string()));
    };
    log_host_key(&host_key);

    let shared_secret = dh.compute_shared_secret(&f)?;

    let mut hasher = ctx.start_hash(hash, &host_key);
    if let Some(request) = gex {
        hasher
            .uint32(request.min)
            .uint32(request.preferred)
            .uint32(request.max)
            .mpint(dh.prime())
            .mpint(dh.generator());
    }
    hasher
        .mpint(dh.public_key())
        .mpint(&f)
        .update(&shared_secret.to_mpint());

    Ok(KexOutput {
        shared_secret,
        exchange_hash: hasher.finish(),
        hash,
        host_key,
    })
}

/// The supported key exchange methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexMethod {
    /// curve25519-sha256 and its libssh.org alias.
    Curve25519Sha256,
    /// diffie-hellman-group14 with SHA-256 or SHA-1.
    DhGroup14(HashAlgorithm),
    /// diffie-hellman-group-exchange-sha256.
    DhGroupExchangeSha256(GexRequest),
}

impl KexMethod {
    /// Maps a negotiated name to a method.
    pub fn from_name(name: &str, gex: GexRequest) -> PicoResult<Self> {
        match name {
            "curve25519-sha256" | "curve25519-sha256@libssh.org" => Ok(KexMethod::Curve25519Sha256),
            "diffie-hellman-group14-sha256" | "diffie-hellman-group14-sha1" => {
                let hash = if name.contains("sha256") {
                    HashAlgorithm::Sha256
                } else {
                    HashAlgorithm::Sha1
                };
                Ok(KexMethod::DhGroup14(hash))
            }
            "diffie-hellman-group-exchange-sha256" => Ok(KexMethod::DhGroupExchangeSha256(gex)),
            other => Err(PicoError::Protocol(format!(
                "Unsupported key exchange method: {}",
                other
            ))),
        }
    }

    /// Hash used for `H` and key derivation.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            KexMethod::Curve25519Sha256 | KexMethod::DhGroupExchangeSha256(_) => {
                HashAlgorithm::Sha256
            }
            KexMethod::DhGroup14(hash) => *hash,
        }
    }

    fn exchanger(&self) -> Box<dyn KeyExchange> {
        match *self {
            KexMethod::Curve25519Sha256 => Box::new(Curve25519Kex),
            KexMethod::DhGroup14(hash) => Box::new(DhGroup14Kex::new(hash)),
            KexMethod::DhGroupExchangeSha256(request) => Box::new(DhGexKex::new(request)),
        }
    }

    /// Runs the method over `transport`.
    pub async fn run(
        &self,
        transport: &mut Transport,
        ctx: &ExchangeContext<'_>,
    ) -> PicoResult<KexOutput> {
        debug!(method = ?self, "Starting key exchange");
        self.exchanger().run(transport, ctx).await
    }
}
