//! SSH cryptographic operations.
//!
//! This module implements the symmetric primitives used once the transport
//! is keyed:
//! - AES-128-CTR, AES-256-CTR (stream ciphers with separate MAC)
//! - HMAC-SHA256, HMAC-SHA1 (MAC algorithms)
//! - SHA-1 / SHA-256 running hashes for exchange hashes and key derivation
//!
//! # CTR backends
//!
//! Counter mode is normally driven by the `ctr` crate ([`CtrBackend::Native`]).
//! [`CtrBackend::EcbKeystream`] instead runs the AES block cipher in ECB mode
//! over a big-endian 128-bit counter and serves partial blocks from a cached
//! keystream. Both produce identical output.
//!
//! # Example
//!
//! ```rust
//! use picoware_proto::ssh::crypto::{CipherAlgorithm, CipherContext, CtrBackend};
//!
//! let key = [0x11u8; 16];
//! let iv = [0x22u8; 16];
//! let mut enc = CipherContext::new(CipherAlgorithm::Aes128Ctr, CtrBackend::Native, &key, &iv).unwrap();
//! let mut dec = CipherContext::new(CipherAlgorithm::Aes128Ctr, CtrBackend::EcbKeystream, &key, &iv).unwrap();
//!
//! let mut data = b"SSH_MSG_CHANNEL_DATA".to_vec();
//! enc.apply_keystream(&mut data);
//! dec.apply_keystream(&mut data);
//! assert_eq!(data, b"SSH_MSG_CHANNEL_DATA");
//! ```

use aes::{Aes128, Aes256};
use bytes::BytesMut;
use cipher::{Block, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use picoware_platform::{PicoError, PicoResult};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use super::wire;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const AES_BLOCK_SIZE: usize = 16;

/// Cipher algorithm for SSH encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// AES-128-CTR stream cipher (requires separate MAC)
    Aes128Ctr,
    /// AES-256-CTR stream cipher (requires separate MAC)
    Aes256Ctr,
}

impl CipherAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Aes128Ctr => "aes128-ctr",
            CipherAlgorithm::Aes256Ctr => "aes256-ctr",
        }
    }

    /// Returns the key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Ctr => 16,
            CipherAlgorithm::Aes256Ctr => 32,
        }
    }

    /// Returns the IV size in bytes.
    pub fn iv_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    /// Returns the cipher block size used for packet alignment.
    pub fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    /// Parses cipher algorithm from name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "aes128-ctr" => Some(CipherAlgorithm::Aes128Ctr),
            "aes256-ctr" => Some(CipherAlgorithm::Aes256Ctr),
            _ => None,
        }
    }
}

/// How the AES-CTR keystream is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CtrBackend {
    /// Counter mode from the `ctr` crate
    #[default]
    Native,
    /// AES-ECB over an explicit big-endian counter block
    EcbKeystream,
}

/// AES in ECB mode used as a CTR keystream generator.
struct EcbCtr<C: BlockEncrypt> {
    cipher: C,
    counter: [u8; AES_BLOCK_SIZE],
    keystream: [u8; AES_BLOCK_SIZE],
    used: usize,
}

impl<C: BlockEncrypt> EcbCtr<C> {
    fn new(cipher: C, iv: &[u8]) -> Self {
        let mut counter = [0u8; AES_BLOCK_SIZE];
        counter.copy_from_slice(&iv[..AES_BLOCK_SIZE]);
        Self {
            cipher,
            counter,
            keystream: [0u8; AES_BLOCK_SIZE],
            used: AES_BLOCK_SIZE,
        }
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.used == AES_BLOCK_SIZE {
                self.refill();
            }
            *byte ^= self.keystream[self.used];
            self.used += 1;
        }
    }

    fn refill(&mut self) {
        let mut block = Block::<C>::clone_from_slice(&self.counter);
        self.cipher.encrypt_block(&mut block);
        self.keystream.copy_from_slice(&block);
        block.as_mut_slice().zeroize();
        increment_counter(&mut self.counter);
        self.used = 0;
    }
}

impl<C: BlockEncrypt> Drop for EcbCtr<C> {
    fn drop(&mut self) {
        self.counter.zeroize();
        self.keystream.zeroize();
    }
}

/// Increments a 128-bit big-endian counter by one, carrying from the last
/// byte towards the first.
pub fn increment_counter(counter: &mut [u8; AES_BLOCK_SIZE]) {
    for byte in counter.iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

enum CtrState {
    Aes128(Box<Aes128Ctr>),
    Aes256(Box<Aes256Ctr>),
    Aes128Ecb(Box<EcbCtr<Aes128>>),
    Aes256Ecb(Box<EcbCtr<Aes256>>),
}

/// One direction of AES-CTR encryption.
///
/// Encryption and decryption are the same operation; each context owns its
/// own counter block and must only be used for one direction.
pub struct CipherContext {
    algorithm: CipherAlgorithm,
    backend: CtrBackend,
    state: CtrState,
}

impl std::fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContext")
            .field("algorithm", &self.algorithm)
            .field("backend", &self.backend)
            .field("state", &"<redacted>")
            .finish()
    }
}

impl CipherContext {
    /// Creates a cipher context from derived key material.
    ///
    /// `key` and `iv` may be longer than required; only the leading bytes
    /// are used.
    pub fn new(
        algorithm: CipherAlgorithm,
        backend: CtrBackend,
        key: &[u8],
        iv: &[u8],
    ) -> PicoResult<Self> {
        if key.len() < algorithm.key_size() {
            return Err(PicoError::Security(format!(
                "Insufficient key material for {}: expected {}, got {}",
                algorithm.name(),
                algorithm.key_size(),
                key.len()
            )));
        }
        if iv.len() < algorithm.iv_size() {
            return Err(PicoError::Security(format!(
                "Insufficient IV material for {}: expected {}, got {}",
                algorithm.name(),
                algorithm.iv_size(),
                iv.len()
            )));
        }

        let key = &key[..algorithm.key_size()];
        let iv = &iv[..algorithm.iv_size()];
        let invalid = |_| PicoError::Security("Invalid cipher key length".to_string());

        let state = match (algorithm, backend) {
            (CipherAlgorithm::Aes128Ctr, CtrBackend::Native) => {
                CtrState::Aes128(Box::new(Aes128Ctr::new_from_slices(key, iv).map_err(invalid)?))
            }
            (CipherAlgorithm::Aes256Ctr, CtrBackend::Native) => {
                CtrState::Aes256(Box::new(Aes256Ctr::new_from_slices(key, iv).map_err(invalid)?))
            }
            (CipherAlgorithm::Aes128Ctr, CtrBackend::EcbKeystream) => CtrState::Aes128Ecb(
                Box::new(EcbCtr::new(Aes128::new_from_slice(key).map_err(invalid)?, iv)),
            ),
            (CipherAlgorithm::Aes256Ctr, CtrBackend::EcbKeystream) => CtrState::Aes256Ecb(
                Box::new(EcbCtr::new(Aes256::new_from_slice(key).map_err(invalid)?, iv)),
            ),
        };

        Ok(Self {
            algorithm,
            backend,
            state,
        })
    }

    /// XORs `data` in place with the next `data.len()` keystream bytes.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        match &mut self.state {
            CtrState::Aes128(c) => c.apply_keystream(data),
            CtrState::Aes256(c) => c.apply_keystream(data),
            CtrState::Aes128Ecb(c) => c.apply_keystream(data),
            CtrState::Aes256Ecb(c) => c.apply_keystream(data),
        }
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Returns the keystream backend.
    pub fn backend(&self) -> CtrBackend {
        self.backend
    }
}

/// Hash function used by a key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1 (20-byte digest)
    Sha1,
    /// SHA-256 (32-byte digest)
    Sha256,
}

impl HashAlgorithm {
    /// Returns the digest length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }

    /// Returns the conventional name.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Hashes the concatenation of `parts`.
    pub fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        let mut hasher = SshHasher::new(*self);
        for part in parts {
            hasher.update(part);
        }
        hasher.finish()
    }
}

enum DigestState {
    Sha1(Sha1),
    Sha256(Sha256),
}

/// Incremental hash with helpers for SSH wire types.
///
/// Exchange hashes are built by feeding fields in protocol order:
///
/// ```rust
/// use picoware_proto::ssh::crypto::{HashAlgorithm, SshHasher};
///
/// let mut h = SshHasher::new(HashAlgorithm::Sha256);
/// h.string(b"SSH-2.0-Picoware_1.6.9");
/// h.mpint_bytes(&[0x80, 0x01]);
/// assert_eq!(h.finish().len(), 32);
/// ```
pub struct SshHasher {
    state: DigestState,
}

impl SshHasher {
    /// Creates a hasher for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha1 => DigestState::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
        };
        Self { state }
    }

    /// Feeds raw bytes.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        match &mut self.state {
            DigestState::Sha1(h) => h.update(data),
            DigestState::Sha256(h) => h.update(data),
        }
        self
    }

    /// Feeds a big-endian `uint32`.
    pub fn uint32(&mut self, value: u32) -> &mut Self {
        self.update(&value.to_be_bytes())
    }

    /// Feeds an SSH `string`.
    pub fn string(&mut self, data: &[u8]) -> &mut Self {
        self.uint32(data.len() as u32);
        self.update(data)
    }

    /// Feeds an unsigned magnitude as an SSH `mpint`.
    pub fn mpint_bytes(&mut self, magnitude: &[u8]) -> &mut Self {
        let mut buf = BytesMut::with_capacity(magnitude.len() + 5);
        wire::write_mpint_bytes(&mut buf, magnitude);
        self.update(&buf);
        buf.as_mut().zeroize();
        self
    }

    /// Feeds a big integer as an SSH `mpint`.
    pub fn mpint(&mut self, value: &BigUint) -> &mut Self {
        let magnitude = Zeroizing::new(value.to_bytes_be());
        self.mpint_bytes(&magnitude)
    }

    /// Consumes the hasher and returns the digest.
    pub fn finish(self) -> Vec<u8> {
        match self.state {
            DigestState::Sha1(h) => h.finalize().to_vec(),
            DigestState::Sha256(h) => h.finalize().to_vec(),
        }
    }
}

/// Computes HMAC over the concatenation of `parts` (RFC 2104).
///
/// Both instantiations use a 64-byte block; keys longer than the block are
/// hashed first, shorter keys are zero-padded.
pub fn hmac(algorithm: HashAlgorithm, key: &[u8], parts: &[&[u8]]) -> PicoResult<Vec<u8>> {
    let invalid = |_| PicoError::Security("Invalid HMAC key".to_string());

    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).map_err(invalid)?;
            for part in parts {
                mac.update(part);
            }
            Ok(mac.finalize().into_bytes().to_vec())
        }
        HashAlgorithm::Sha1 => {
            let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key).map_err(invalid)?;
            for part in parts {
                mac.update(part);
            }
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// MAC algorithm for SSH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    /// HMAC-SHA256
    HmacSha256,
    /// HMAC-SHA1
    HmacSha1,
}

impl MacAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            MacAlgorithm::HmacSha256 => "hmac-sha2-256",
            MacAlgorithm::HmacSha1 => "hmac-sha1",
        }
    }

    /// Returns the key size in bytes.
    pub fn key_size(&self) -> usize {
        self.hash().digest_len()
    }

    /// Returns the MAC output size in bytes.
    pub fn mac_size(&self) -> usize {
        self.hash().digest_len()
    }

    /// Returns the underlying hash function.
    pub fn hash(&self) -> HashAlgorithm {
        match self {
            MacAlgorithm::HmacSha256 => HashAlgorithm::Sha256,
            MacAlgorithm::HmacSha1 => HashAlgorithm::Sha1,
        }
    }

    /// Parses MAC algorithm from name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hmac-sha2-256" => Some(MacAlgorithm::HmacSha256),
            "hmac-sha1" => Some(MacAlgorithm::HmacSha1),
            _ => None,
        }
    }
}

/// One direction of packet authentication.
pub struct MacContext {
    algorithm: MacAlgorithm,
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for MacContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacContext")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl MacContext {
    /// Creates a MAC context from derived key material.
    pub fn new(algorithm: MacAlgorithm, key_material: &[u8]) -> PicoResult<Self> {
        if key_material.len() < algorithm.key_size() {
            return Err(PicoError::Security(format!(
                "Insufficient key material for MAC: expected {}, got {}",
                algorithm.key_size(),
                key_material.len()
            )));
        }

        Ok(Self {
            algorithm,
            key: Zeroizing::new(key_material[..algorithm.key_size()].to_vec()),
        })
    }

    /// Computes the MAC of `packet` (unencrypted, length field included)
    /// under sequence number `sequence`.
    pub fn compute(&self, sequence: u32, packet: &[u8]) -> PicoResult<Vec<u8>> {
        let mut mac = hmac(
            self.algorithm.hash(),
            &self.key,
            &[&sequence.to_be_bytes(), packet],
        )?;
        mac.truncate(self.algorithm.mac_size());
        Ok(mac)
    }

    /// Verifies a received MAC in constant time.
    pub fn verify(&self, sequence: u32, packet: &[u8], received_mac: &[u8]) -> PicoResult<()> {
        let computed = self.compute(sequence, packet)?;

        if computed.len() != received_mac.len() {
            return Err(PicoError::Security("MAC length mismatch".to_string()));
        }

        if computed.ct_eq(received_mac).into() {
            Ok(())
        } else {
            Err(PicoError::Security("MAC verification failed".to_string()))
        }
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> MacAlgorithm {
        self.algorithm
    }
}

/// Cipher and MAC protecting one direction of the transport.
#[derive(Debug)]
pub struct DirectionKeys {
    /// Keystream for this direction
    pub cipher: CipherContext,
    /// Packet authentication for this direction
    pub mac: MacContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    #[test]
    fn test_cipher_algorithm_properties() {
        assert_eq!(CipherAlgorithm::Aes128Ctr.name(), "aes128-ctr");
        assert_eq!(CipherAlgorithm::Aes128Ctr.key_size(), 16);
        assert_eq!(CipherAlgorithm::Aes256Ctr.key_size(), 32);
        assert_eq!(CipherAlgorithm::Aes256Ctr.iv_size(), 16);
        assert_eq!(
            CipherAlgorithm::from_name("aes256-ctr"),
            Some(CipherAlgorithm::Aes256Ctr)
        );
        assert!(CipherAlgorithm::from_name("aes128-cbc").is_none());
    }

    #[test]
    fn test_mac_algorithm_properties() {
        assert_eq!(MacAlgorithm::HmacSha256.key_size(), 32);
        assert_eq!(MacAlgorithm::HmacSha256.mac_size(), 32);
        assert_eq!(MacAlgorithm::HmacSha1.key_size(), 20);
        assert_eq!(MacAlgorithm::HmacSha1.mac_size(), 20);
        assert_eq!(
            MacAlgorithm::from_name("hmac-sha1"),
            Some(MacAlgorithm::HmacSha1)
        );
        assert!(MacAlgorithm::from_name("hmac-md5").is_none());
    }

    #[test]
    fn test_hmac_sha256_rfc4231() {
        // Test case 1
        let mac = hmac(HashAlgorithm::Sha256, &[0x0b; 20], &[b"Hi There"]).unwrap();
        assert_eq!(
            hex::encode(mac),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );

        // Test case 6: key longer than the block size
        let mac = hmac(
            HashAlgorithm::Sha256,
            &[0xaa; 131],
            &[b"Test Using Larger Than Block-Size Key - Hash Key First"],
        )
        .unwrap();
        assert_eq!(
            hex::encode(mac),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn test_hmac_sha1_rfc2202() {
        let mac = hmac(HashAlgorithm::Sha1, &[0x0b; 20], &[b"Hi There"]).unwrap();
        assert_eq!(hex::encode(mac), "b617318655057264e28bc0b6fb378c8ef146be00");

        let mac = hmac(
            HashAlgorithm::Sha1,
            &[0xaa; 80],
            &[b"Test Using Larger Than Block-Size Key - Hash Key First"],
        )
        .unwrap();
        assert_eq!(hex::encode(mac), "aa4ae5e15272d00e95705637ce8a3b55ed402112");
    }

    #[test]
    fn test_hmac_parts_are_concatenated() {
        let joined = hmac(HashAlgorithm::Sha256, b"k", &[b"Hi There"]).unwrap();
        let split = hmac(HashAlgorithm::Sha256, b"k", &[b"Hi ", b"There"]).unwrap();
        assert_eq!(joined, split);
    }

    #[test]
    fn test_mac_compute_and_verify() {
        let mac_key = MacContext::new(MacAlgorithm::HmacSha256, &[7u8; 32]).unwrap();
        let data = b"\x00\x00\x00\x0c\x0a\x05payload";

        let mac = mac_key.compute(3, data).unwrap();
        assert_eq!(mac.len(), 32);
        assert!(mac_key.verify(3, data, &mac).is_ok());

        // Wrong sequence number
        assert!(matches!(
            mac_key.verify(4, data, &mac),
            Err(PicoError::Security(_))
        ));

        // Any flipped bit is rejected
        let mut tampered = mac.clone();
        tampered[31] ^= 0x01;
        assert!(mac_key.verify(3, data, &tampered).is_err());

        let mut tampered_data = data.to_vec();
        tampered_data[6] ^= 0x80;
        assert!(mac_key.verify(3, &tampered_data, &mac).is_err());
    }

    #[test]
    fn test_mac_key_too_short() {
        let result = MacContext::new(MacAlgorithm::HmacSha1, &[0u8; 10]);
        assert!(matches!(result, Err(PicoError::Security(_))));
    }

    #[test]
    fn test_mac_debug_redacts_key() {
        let mac_key = MacContext::new(MacAlgorithm::HmacSha1, &[0x41; 20]).unwrap();
        let debug = format!("{:?}", mac_key);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("65"));
    }

    #[test]
    fn test_increment_counter_carry() {
        let mut counter = [0u8; 16];
        counter[15] = 0xff;
        counter[14] = 0xff;
        increment_counter(&mut counter);
        assert_eq!(counter[13], 1);
        assert_eq!(counter[14], 0);
        assert_eq!(counter[15], 0);

        let mut max = [0xffu8; 16];
        increment_counter(&mut max);
        assert_eq!(max, [0u8; 16]);
    }

    #[test]
    fn test_aes128_ctr_nist_vector_both_backends() {
        // NIST SP 800-38A F.5.1, first two blocks; the counter ends in
        // ...feff so the second block exercises a carry.
        let key = unhex("2b7e151628aed2a6abf7158809cf4f3c");
        let iv = unhex("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff");
        let plaintext = unhex("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51");
        let expected = "874d6191b620e3261bef6864990db6ce9806f66b7970fdff8617187bb9fffdff";

        for backend in [CtrBackend::Native, CtrBackend::EcbKeystream] {
            let mut ctx =
                CipherContext::new(CipherAlgorithm::Aes128Ctr, backend, &key, &iv).unwrap();
            let mut data = plaintext.clone();
            ctx.apply_keystream(&mut data);
            assert_eq!(hex::encode(&data), expected, "backend {:?}", backend);
        }
    }

    #[test]
    fn test_ecb_fallback_matches_native_across_full_wrap() {
        let iv = [0xffu8; 16];
        for algorithm in [CipherAlgorithm::Aes128Ctr, CipherAlgorithm::Aes256Ctr] {
            let key = vec![0x5a; algorithm.key_size()];
            let mut native =
                CipherContext::new(algorithm, CtrBackend::Native, &key, &iv).unwrap();
            let mut fallback =
                CipherContext::new(algorithm, CtrBackend::EcbKeystream, &key, &iv).unwrap();

            let message: Vec<u8> = (0..200u8).collect();
            let mut a = message.clone();
            native.apply_keystream(&mut a);

            // Feed the fallback in uneven chunks to hit the partial-block cache.
            let mut b = message.clone();
            let (first, rest) = b.split_at_mut(4);
            fallback.apply_keystream(first);
            let (second, third) = rest.split_at_mut(29);
            fallback.apply_keystream(second);
            fallback.apply_keystream(third);

            assert_eq!(a, b);
            assert_ne!(a, message);
        }
    }

    #[test]
    fn test_cipher_rejects_short_key() {
        let result = CipherContext::new(
            CipherAlgorithm::Aes256Ctr,
            CtrBackend::Native,
            &[0u8; 16],
            &[0u8; 16],
        );
        assert!(matches!(result, Err(PicoError::Security(_))));
    }

    #[test]
    fn test_hasher_wire_helpers() {
        let mut h = SshHasher::new(HashAlgorithm::Sha256);
        h.string(b"abc").uint32(5).mpint_bytes(&[0x00, 0x80]);
        let digest = h.finish();

        let expected = HashAlgorithm::Sha256.digest(&[
            &[0, 0, 0, 3],
            b"abc",
            &[0, 0, 0, 5],
            &[0, 0, 0, 2, 0x00, 0x80],
        ]);
        assert_eq!(digest, expected);
        assert_eq!(HashAlgorithm::Sha1.digest(&[b"abc"]).len(), 20);
    }
}
