//! Diffie-Hellman primitives and key derivation (RFC 4253, RFC 8268, RFC 8731).
//!
//! This module implements:
//! - Finite-field Diffie-Hellman over an arbitrary safe-prime group, with the
//!   fixed 2048-bit MODP group 14 (RFC 3526) built in
//! - X25519 (RFC 7748)
//! - Session key derivation (RFC 4253 Section 7.2)
//!
//! The message exchange that drives these primitives lives in
//! [`exchange`](super::exchange).
//!
//! # Security
//!
//! - Private scalars, exponents and shared secrets are zeroized on drop.
//!   DH exponents and raw `f^x mod p` results are held in a [`BigUint`]
//!   wrapper that clears every limb before it is freed. Temporaries created
//!   inside `num-bigint` (random sampling, `modpow` scratch space) are out of
//!   reach and are not wiped.
//! - Peer public values are range-checked; an all-zero X25519 output is
//!   rejected
//! - DH exponents are 128 bits regardless of group size. This keeps the
//!   modular exponentiation cheap at the cost of margin against
//!   discrete-log attacks.
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::kex_dh::Curve25519Exchange;
//!
//! let client = Curve25519Exchange::new();
//! let server = Curve25519Exchange::new();
//!
//! let k1 = client.compute_shared_secret(server.public_key()).unwrap();
//! let k2 = server.compute_shared_secret(client.public_key()).unwrap();
//! assert_eq!(k1.as_bytes(), k2.as_bytes());
//! ```

use std::ops::Deref;
use std::sync::atomic::{compiler_fence, Ordering};

use num_bigint::{BigUint, RandBigInt};
use once_cell::sync::Lazy;
use picoware_platform::{PicoError, PicoResult};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::crypto::{CipherContext, CtrBackend, DirectionKeys, HashAlgorithm, MacContext, SshHasher};
use super::kex::NegotiatedAlgorithms;
use super::wire;

/// Bits of randomness in a DH private exponent.
pub const DH_EXPONENT_BITS: u64 = 128;

/// Length of X25519 scalars, points and outputs.
pub const X25519_KEY_LEN: usize = 32;

/// The X25519 base point, u = 9.
pub const X25519_BASEPOINT: [u8; X25519_KEY_LEN] = x25519_dalek::X25519_BASEPOINT_BYTES;

const GROUP14_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

static GROUP14_PRIME: Lazy<BigUint> =
    Lazy::new(|| BigUint::parse_bytes(GROUP14_PRIME_HEX.as_bytes(), 16).unwrap_or_default());

/// Returns the RFC 3526 group 14 prime (2048 bits).
pub fn group14_prime() -> &'static BigUint {
    &GROUP14_PRIME
}

/// Returns the group 14 generator, 2.
pub fn group14_generator() -> BigUint {
    BigUint::from(2u32)
}

/// Shared secret `K`, held as a big-endian magnitude.
pub struct SharedSecret(Zeroizing<Vec<u8>>);

impl SharedSecret {
    /// Wraps big-endian bytes.
    pub fn from_be_bytes(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Returns the big-endian bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `K` encoded as an SSH `mpint`.
    pub fn to_mpint(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(wire::encode_mpint_bytes(&self.0))
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedSecret").field(&"<redacted>").finish()
    }
}

/// A secret [`BigUint`] that is wiped when dropped.
///
/// Bits are cleared lowest first. The limb vector only shrinks once its top
/// limb is zero, and by then every lower limb is already zero.
struct SecretUint(BigUint);

impl SecretUint {
    fn wipe(&mut self) {
        for bit in 0..self.0.bits() {
            self.0.set_bit(bit, false);
        }
        compiler_fence(Ordering::SeqCst);
    }
}

impl Deref for SecretUint {
    type Target = BigUint;

    fn deref(&self) -> &BigUint {
        &self.0
    }
}

impl Drop for SecretUint {
    fn drop(&mut self) {
        self.wipe();
    }
}

/// Finite-field Diffie-Hellman key pair over a group `(p, g)`.
pub struct DhExchange {
    prime: BigUint,
    generator: BigUint,
    private_key: SecretUint,
    public_key: BigUint,
}

impl std::fmt::Debug for DhExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhExchange")
            .field("prime_bits", &self.prime.bits())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl DhExchange {
    /// Generates a key pair in group 14.
    pub fn group14() -> Self {
        Self::generate(group14_prime().clone(), group14_generator())
    }

    /// Generates a key pair in a server-supplied group.
    ///
    /// # Errors
    ///
    /// Returns [`PicoError::Security`] if `g` is not in `[2, p-2]` or `p` is
    /// too small to hold a 128-bit exponent.
    pub fn new(prime: BigUint, generator: BigUint) -> PicoResult<Self> {
        if prime.bits() <= DH_EXPONENT_BITS {
            return Err(PicoError::Security(format!(
                "DH prime too small: {} bits",
                prime.bits()
            )));
        }
        let two = BigUint::from(2u32);
        if generator < two || generator > &prime - &two {
            return Err(PicoError::Security(
                "DH generator out of range".to_string(),
            ));
        }
        Ok(Self::generate(prime, generator))
    }

    fn generate(prime: BigUint, generator: BigUint) -> Self {
        let low = BigUint::from(2u32);
        let high = BigUint::from(1u32) << DH_EXPONENT_BITS;
        let private_key = SecretUint(OsRng.gen_biguint_range(&low, &high));
        let public_key = generator.modpow(&private_key, &prime);

        Self {
            prime,
            generator,
            private_key,
            public_key,
        }
    }

    /// Returns `e = g^x mod p`.
    pub fn public_key(&self) -> &BigUint {
        &self.public_key
    }

    /// Returns the group prime.
    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    /// Returns the group generator.
    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// Computes `K = f^x mod p`.
    ///
    /// # Errors
    ///
    /// Returns [`PicoError::Security`] if `f < 2` or `f >= p - 1`.
    pub fn compute_shared_secret(&self, peer_public: &BigUint) -> PicoResult<SharedSecret> {
        let one = BigUint::from(1u32);
        if peer_public <= &one || peer_public >= &(&self.prime - &one) {
            return Err(PicoError::Security(
                "Invalid peer DH public value: out of range".to_string(),
            ));
        }

        let shared = SecretUint(peer_public.modpow(&self.private_key, &self.prime));
        Ok(SharedSecret::from_be_bytes(shared.to_bytes_be()))
    }
}

/// X25519 scalar multiplication (RFC 7748 Section 5), with clamping.
pub fn x25519(scalar: [u8; X25519_KEY_LEN], u: [u8; X25519_KEY_LEN]) -> [u8; X25519_KEY_LEN] {
    x25519_dalek::x25519(scalar, u)
}

/// Ephemeral X25519 key pair for curve25519-sha256.
pub struct Curve25519Exchange {
    private_key: Zeroizing<[u8; X25519_KEY_LEN]>,
    public_key: [u8; X25519_KEY_LEN],
}

impl std::fmt::Debug for Curve25519Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Curve25519Exchange")
            .field("public_key", &hex::encode(self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl Curve25519Exchange {
    /// Generates a key pair from 32 random bytes.
    pub fn new() -> Self {
        let mut private_key = Zeroizing::new([0u8; X25519_KEY_LEN]);
        OsRng.fill_bytes(&mut private_key[..]);
        Self::from_private_key(private_key)
    }

    /// Builds a key pair from a known scalar.
    pub fn from_private_key(private_key: Zeroizing<[u8; X25519_KEY_LEN]>) -> Self {
        let public_key = x25519(*private_key, X25519_BASEPOINT);
        Self {
            private_key,
            public_key,
        }
    }

    /// Returns `Q_C`, the 32-byte public value.
    pub fn public_key(&self) -> &[u8; X25519_KEY_LEN] {
        &self.public_key
    }

    /// Computes the shared secret with the peer's public value.
    ///
    /// The raw X25519 output is used directly as the big-endian bytes of `K`
    /// (RFC 8731 Section 3.1).
    ///
    /// # Errors
    ///
    /// - [`PicoError::Protocol`] if the peer value is not 32 bytes
    /// - [`PicoError::Security`] if the result is all zero (low-order point)
    pub fn compute_shared_secret(&self, peer_public: &[u8]) -> PicoResult<SharedSecret> {
        let peer: [u8; X25519_KEY_LEN] = peer_public.try_into().map_err(|_| {
            PicoError::Protocol(format!(
                "Invalid X25519 public value length: {} (expected {})",
                peer_public.len(),
                X25519_KEY_LEN
            ))
        })?;

        let shared = Zeroizing::new(x25519(*self.private_key, peer));
        if bool::from(shared.ct_eq(&[0u8; X25519_KEY_LEN])) {
            return Err(PicoError::Security(
                "X25519 shared secret is all zero (low-order peer point)".to_string(),
            ));
        }

        Ok(SharedSecret::from_be_bytes(shared.to_vec()))
    }
}

impl Default for Curve25519Exchange {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives one key (RFC 4253 Section 7.2).
///
/// ```text
/// K1 = HASH(K || H || letter || session_id)
/// K2 = HASH(K || H || K1)
/// K3 = HASH(K || H || K1 || K2)
/// key = K1 || K2 || K3 || ...   (truncated to key_length)
/// ```
///
/// `K` is hashed in its `mpint` encoding.
pub fn derive_key(
    hash: HashAlgorithm,
    shared_secret: &SharedSecret,
    exchange_hash: &[u8],
    session_id: &[u8],
    letter: u8,
    key_length: usize,
) -> Zeroizing<Vec<u8>> {
    let k_mpint = shared_secret.to_mpint();
    let mut key = Zeroizing::new(Vec::with_capacity(key_length + hash.digest_len()));

    let mut hasher = SshHasher::new(hash);
    hasher
        .update(&k_mpint)
        .update(exchange_hash)
        .update(&[letter])
        .update(session_id);
    key.extend_from_slice(&hasher.finish());

    while key.len() < key_length {
        let mut hasher = SshHasher::new(hash);
        hasher.update(&k_mpint).update(exchange_hash).update(&key);
        key.extend_from_slice(&hasher.finish());
    }

    key.truncate(key_length);
    key
}

/// The six keys derived after a key exchange.
pub struct SessionKeys {
    iv_client_to_server: Zeroizing<Vec<u8>>,
    iv_server_to_client: Zeroizing<Vec<u8>>,
    key_client_to_server: Zeroizing<Vec<u8>>,
    key_server_to_client: Zeroizing<Vec<u8>>,
    mac_client_to_server: Zeroizing<Vec<u8>>,
    mac_server_to_client: Zeroizing<Vec<u8>>,
    algorithms: NegotiatedAlgorithms,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("algorithms", &self.algorithms)
            .field("keys", &"<redacted>")
            .finish()
    }
}

impl SessionKeys {
    /// Derives IVs (A, B), cipher keys (C, D) and MAC keys (E, F) sized for
    /// the negotiated algorithms.
    pub fn derive(
        hash: HashAlgorithm,
        shared_secret: &SharedSecret,
        exchange_hash: &[u8],
        session_id: &[u8],
        algorithms: &NegotiatedAlgorithms,
    ) -> Self {
        let derive = |letter: u8, len: usize| {
            derive_key(hash, shared_secret, exchange_hash, session_id, letter, len)
        };
        let c2s = algorithms.cipher_client_to_server();
        let s2c = algorithms.cipher_server_to_client();

        Self {
            iv_client_to_server: derive(b'A', c2s.iv_size()),
            iv_server_to_client: derive(b'B', s2c.iv_size()),
            key_client_to_server: derive(b'C', c2s.key_size()),
            key_server_to_client: derive(b'D', s2c.key_size()),
            mac_client_to_server: derive(b'E', algorithms.mac_client_to_server().key_size()),
            mac_server_to_client: derive(b'F', algorithms.mac_server_to_client().key_size()),
            algorithms: algorithms.clone(),
        }
    }

    /// Builds the cipher and MAC for client-to-server packets.
    pub fn client_to_server(&self, backend: CtrBackend) -> PicoResult<DirectionKeys> {
        Ok(DirectionKeys {
            cipher: CipherContext::new(
                self.algorithms.cipher_client_to_server(),
                backend,
                &self.key_client_to_server,
                &self.iv_client_to_server,
            )?,
            mac: MacContext::new(
                self.algorithms.mac_client_to_server(),
                &self.mac_client_to_server,
            )?,
        })
    }

    /// Builds the cipher and MAC for server-to-client packets.
    pub fn server_to_client(&self, backend: CtrBackend) -> PicoResult<DirectionKeys> {
        Ok(DirectionKeys {
            cipher: CipherContext::new(
                self.algorithms.cipher_server_to_client(),
                backend,
                &self.key_server_to_client,
                &self.iv_server_to_client,
            )?,
            mac: MacContext::new(
                self.algorithms.mac_server_to_client(),
                &self.mac_server_to_client,
            )?,
        })
    }
}
