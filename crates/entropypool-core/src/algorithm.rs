//! Named algorithm capabilities: secure random source, message digest, cipher.
//!
//! The pool never hard-codes a primitive. It asks an [`AlgorithmFactory`] to
//! resolve a name, keeps the live handle, and persists the name so the same
//! capability can be re-acquired when the pool file is loaded again.
//!
//! [`DefaultFactory`] resolves:
//! - secure random: `OsRng` (operating system, via `getrandom`) and `StdRng`
//!   (`rand`'s standard CSPRNG seeded from the OS)
//! - digest: the SHA-2 family (`sha2`) and SHA-3 / Keccak (`sha3`)
//! - cipher: an identifier only. The mixing pipeline never encrypts.

use rand::rngs::StdRng;
use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use sha2::digest::DynDigest;

use crate::error::{AlgorithmKind, PoolError, Result};

pub const DEFAULT_SECURE_RANDOM: &str = "StdRng";
pub const DEFAULT_DIGEST: &str = "Keccak-512";
pub const DEFAULT_CIPHER: &str = "Threefish-1024/EAX/NoPadding";
/// Digest substituted in pools too small for [`DEFAULT_DIGEST`].
pub const SMALL_POOL_DIGEST: &str = "SHA-256";

const BLOCK_CIPHERS: &[&str] = &[
    "AES",
    "ChaCha20",
    "Threefish-256",
    "Threefish-512",
    "Threefish-1024",
    "Twofish",
    "Serpent",
];
const CIPHER_MODES: &[&str] = &["ECB", "CBC", "CFB", "OFB", "CTR", "GCM", "EAX", "OCB", "Poly1305"];
const CIPHER_PADDINGS: &[&str] = &["NoPadding", "PKCS5Padding", "PKCS7Padding", "ISO10126Padding"];

// ---------------------------------------------------------------------------
// Secure random
// ---------------------------------------------------------------------------

/// A cryptographically secure random byte source.
pub trait SecureRandom: Send {
    /// Fill `dest` with fresh random bytes.
    fn fill(&mut self, dest: &mut [u8]) -> Result<()>;

    /// Uniformly distributed index in `[0, upper]`.
    fn index(&mut self, upper: usize) -> Result<usize> {
        if upper == 0 {
            return Ok(0);
        }
        let range = upper as u64 + 1;
        // Reject the top partial bucket so every residue is equally likely.
        let limit = u64::MAX - (u64::MAX % range);
        loop {
            let mut word = [0u8; 8];
            self.fill(&mut word)?;
            let v = u64::from_le_bytes(word);
            if v < limit {
                return Ok((v % range) as usize);
            }
        }
    }
}

/// The operating system's random source. Every call reaches the OS.
#[derive(Debug, Default)]
pub struct OsSecureRandom;

impl SecureRandom for OsSecureRandom {
    fn fill(&mut self, dest: &mut [u8]) -> Result<()> {
        getrandom::fill(dest).map_err(|e| PoolError::Primitive(format!("OS random source: {e}")))
    }
}

/// Adapter for any `rand` CSPRNG.
#[derive(Debug)]
pub struct RngSecureRandom<R>(R);

impl<R: RngCore + CryptoRng + Send> RngSecureRandom<R> {
    pub fn new(rng: R) -> Self {
        Self(rng)
    }
}

impl<R: RngCore + CryptoRng + Send> SecureRandom for RngSecureRandom<R> {
    fn fill(&mut self, dest: &mut [u8]) -> Result<()> {
        self.0.fill_bytes(dest);
        Ok(())
    }

    fn index(&mut self, upper: usize) -> Result<usize> {
        Ok(self.0.random_range(0..=upper))
    }
}

/// A resolved secure random source and the name it was resolved from.
pub struct SecureRandomHandle {
    name: String,
    inner: Box<dyn SecureRandom>,
}

impl SecureRandomHandle {
    pub fn new(name: impl Into<String>, inner: Box<dyn SecureRandom>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fill(&mut self, dest: &mut [u8]) -> Result<()> {
        self.inner.fill(dest)
    }

    pub fn index(&mut self, upper: usize) -> Result<usize> {
        self.inner.index(upper)
    }
}

impl std::fmt::Debug for SecureRandomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecureRandomHandle").field(&self.name).finish()
    }
}

// ---------------------------------------------------------------------------
// Message digest
// ---------------------------------------------------------------------------

/// A resolved message digest and the name it was resolved from.
pub struct DigestHandle {
    name: String,
    inner: Box<dyn DynDigest + Send>,
}

impl DigestHandle {
    pub fn new(name: impl Into<String>, inner: Box<dyn DynDigest + Send>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Digest output length in bytes.
    pub fn output_len(&self) -> usize {
        self.inner.output_size()
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn update_i32(&mut self, value: i32) {
        self.inner.update(&value.to_be_bytes());
    }

    pub fn update_i64(&mut self, value: i64) {
        self.inner.update(&value.to_be_bytes());
    }

    /// Write the digest into `out` (exactly [`output_len`](Self::output_len)
    /// bytes) and reset for the next message.
    pub fn finalize_into(&mut self, out: &mut [u8]) -> Result<()> {
        self.inner
            .finalize_into_reset(out)
            .map_err(|e| PoolError::Primitive(format!("digest {}: {e}", self.name)))
    }
}

impl std::fmt::Debug for DigestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestHandle")
            .field("name", &self.name)
            .field("output_len", &self.output_len())
            .finish()
    }
}

fn new_digest(name: &str) -> Option<Box<dyn DynDigest + Send>> {
    let digest: Box<dyn DynDigest + Send> = match name.to_ascii_uppercase().as_str() {
        "SHA-256" | "SHA256" => Box::new(sha2::Sha256::default()),
        "SHA-384" | "SHA384" => Box::new(sha2::Sha384::default()),
        "SHA-512" | "SHA512" => Box::new(sha2::Sha512::default()),
        "SHA3-256" => Box::new(sha3::Sha3_256::default()),
        "SHA3-384" => Box::new(sha3::Sha3_384::default()),
        "SHA3-512" => Box::new(sha3::Sha3_512::default()),
        "KECCAK-256" => Box::new(sha3::Keccak256::default()),
        "KECCAK-512" => Box::new(sha3::Keccak512::default()),
        _ => return None,
    };
    Some(digest)
}

/// The default digest for a pool of `pool_size` bytes: [`DEFAULT_DIGEST`]
/// when its output fits, [`SMALL_POOL_DIGEST`] otherwise.
pub(crate) fn default_digest_for(pool_size: usize) -> &'static str {
    match new_digest(DEFAULT_DIGEST) {
        Some(d) if d.output_size() <= pool_size => DEFAULT_DIGEST,
        _ => SMALL_POOL_DIGEST,
    }
}

// ---------------------------------------------------------------------------
// Cipher
// ---------------------------------------------------------------------------

/// A cipher identifier of the form `Cipher[/Mode[/Padding]]`.
///
/// Carried and persisted with the pool but never used to encrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherHandle {
    name: String,
    block_cipher: &'static str,
}

impl CipherHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_cipher(&self) -> &'static str {
        self.block_cipher
    }
}

fn parse_cipher(name: &str) -> Option<CipherHandle> {
    let mut parts = name.split('/');
    let cipher = parts.next()?;
    let block_cipher = BLOCK_CIPHERS
        .iter()
        .find(|c| c.eq_ignore_ascii_case(cipher))?;
    if let Some(mode) = parts.next() {
        CIPHER_MODES.iter().find(|m| m.eq_ignore_ascii_case(mode))?;
    }
    if let Some(padding) = parts.next() {
        CIPHER_PADDINGS
            .iter()
            .find(|p| p.eq_ignore_ascii_case(padding))?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(CipherHandle {
        name: name.to_string(),
        block_cipher,
    })
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Turns algorithm names into live capabilities.
pub trait AlgorithmFactory {
    fn secure_random(&self, name: &str) -> Result<SecureRandomHandle>;
    fn digest(&self, name: &str) -> Result<DigestHandle>;
    fn cipher(&self, name: &str) -> Result<CipherHandle>;
}

fn unsupported(kind: AlgorithmKind, name: &str) -> PoolError {
    PoolError::UnsupportedAlgorithm {
        kind,
        name: name.to_string(),
    }
}

/// Resolves the algorithms built into this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFactory;

impl AlgorithmFactory for DefaultFactory {
    fn secure_random(&self, name: &str) -> Result<SecureRandomHandle> {
        let inner: Box<dyn SecureRandom> = match name.to_ascii_lowercase().as_str() {
            "osrng" | "os" => Box::new(OsSecureRandom),
            "stdrng" => {
                let rng = StdRng::try_from_os_rng()
                    .map_err(|e| PoolError::Primitive(format!("seeding StdRng: {e}")))?;
                Box::new(RngSecureRandom::new(rng))
            }
            _ => return Err(unsupported(AlgorithmKind::SecureRandom, name)),
        };
        Ok(SecureRandomHandle::new(name, inner))
    }

    fn digest(&self, name: &str) -> Result<DigestHandle> {
        new_digest(name)
            .map(|d| DigestHandle::new(name, d))
            .ok_or_else(|| unsupported(AlgorithmKind::Digest, name))
    }

    fn cipher(&self, name: &str) -> Result<CipherHandle> {
        parse_cipher(name).ok_or_else(|| unsupported(AlgorithmKind::Cipher, name))
    }
}

/// Like [`DefaultFactory`], but every secure random source is a `StdRng`
/// seeded from a fixed value, so pool output is reproducible.
///
/// Only for tests and simulations: a reproducible pool holds no secrets.
#[derive(Debug, Clone, Copy)]
pub struct SeededFactory {
    seed: u64,
}

impl SeededFactory {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl AlgorithmFactory for SeededFactory {
    fn secure_random(&self, name: &str) -> Result<SecureRandomHandle> {
        // Keep name validation identical to the default factory.
        DefaultFactory.secure_random(name)?;
        let rng = StdRng::seed_from_u64(self.seed);
        Ok(SecureRandomHandle::new(name, Box::new(RngSecureRandom::new(rng))))
    }

    fn digest(&self, name: &str) -> Result<DigestHandle> {
        DefaultFactory.digest(name)
    }

    fn cipher(&self, name: &str) -> Result<CipherHandle> {
        DefaultFactory.cipher(name)
    }
}

// ---------------------------------------------------------------------------
// Fallback resolution
// ---------------------------------------------------------------------------

/// A name that could not be resolved and the default used in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmFallback {
    pub kind: AlgorithmKind,
    pub requested: String,
    pub substituted: &'static str,
}

impl std::fmt::Display for AlgorithmFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:?} cannot be instantiated, using default {:?}",
            self.kind, self.requested, self.substituted
        )
    }
}

/// Resolve `name`; if that fails with an unsupported-algorithm error, resolve
/// `default` instead and report the substitution. Failure of the default is
/// returned as the original error.
pub(crate) fn resolve_with_fallback<T>(
    kind: AlgorithmKind,
    name: &str,
    default: &'static str,
    resolve: impl Fn(&str) -> Result<T>,
) -> Result<(T, Option<AlgorithmFallback>)> {
    match resolve(name) {
        Ok(handle) => Ok((handle, None)),
        Err(err @ PoolError::UnsupportedAlgorithm { .. }) => {
            let handle = resolve(default).map_err(|_| err)?;
            let fallback = AlgorithmFallback {
                kind,
                requested: name.to_string(),
                substituted: default,
            };
            log::warn!("{fallback}");
            Ok((handle, Some(fallback)))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Secure random
    // -----------------------------------------------------------------------

    #[test]
    fn test_default_factory_resolves_secure_randoms() {
        for name in ["StdRng", "stdrng", "OsRng", "OS"] {
            let mut rng = DefaultFactory.secure_random(name).unwrap();
            assert_eq!(rng.name(), name);
            let mut buf = [0u8; 64];
            rng.fill(&mut buf).unwrap();
            assert!(buf.iter().any(|&b| b != 0));
        }
    }

    #[test]
    fn test_unknown_secure_random_is_unsupported() {
        let err = DefaultFactory
            .secure_random("SP800CTR/AES/256/Strong/16777216")
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::UnsupportedAlgorithm {
                kind: AlgorithmKind::SecureRandom,
                ..
            }
        ));
    }

    #[test]
    fn test_index_stays_in_range() {
        let mut os = OsSecureRandom;
        let mut seeded = RngSecureRandom::new(StdRng::seed_from_u64(1));
        for upper in [0usize, 1, 2, 7, 255, 65260] {
            for _ in 0..50 {
                assert!(os.index(upper).unwrap() <= upper);
                assert!(seeded.index(upper).unwrap() <= upper);
            }
        }
    }

    #[test]
    fn test_default_index_covers_small_range() {
        let mut os = OsSecureRandom;
        let mut seen = [false; 4];
        for _ in 0..1000 {
            seen[os.index(3).unwrap()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_seeded_factory_is_reproducible() {
        let mut a = SeededFactory::new(9).secure_random("StdRng").unwrap();
        let mut b = SeededFactory::new(9).secure_random("StdRng").unwrap();
        let (mut x, mut y) = ([0u8; 32], [0u8; 32]);
        a.fill(&mut x).unwrap();
        b.fill(&mut y).unwrap();
        assert_eq!(x, y);
    }

    // -----------------------------------------------------------------------
    // Digest
    // -----------------------------------------------------------------------

    #[test]
    fn test_digest_output_lengths() {
        let cases = [
            ("SHA-256", 32),
            ("SHA-384", 48),
            ("SHA-512", 64),
            ("SHA3-256", 32),
            ("SHA3-512", 64),
            ("Keccak-256", 32),
            ("Keccak-512", 64),
        ];
        for (name, len) in cases {
            let d = DefaultFactory.digest(name).unwrap();
            assert_eq!(d.output_len(), len, "{name}");
        }
    }

    #[test]
    fn test_digest_known_vector() {
        let mut d = DefaultFactory.digest("SHA-256").unwrap();
        d.update(b"abc");
        let mut out = [0u8; 32];
        d.finalize_into(&mut out).unwrap();
        assert_eq!(
            out[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "SHA-256(abc) prefix"
        );
    }

    #[test]
    fn test_digest_resets_after_finalize() {
        let mut d = DefaultFactory.digest("SHA-512").unwrap();
        let (mut a, mut b) = ([0u8; 64], [0u8; 64]);
        d.update_i64(42);
        d.finalize_into(&mut a).unwrap();
        d.update_i64(42);
        d.finalize_into(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_wrong_output_buffer_is_primitive_error() {
        let mut d = DefaultFactory.digest("SHA-256").unwrap();
        let mut out = [0u8; 16];
        assert!(matches!(
            d.finalize_into(&mut out),
            Err(PoolError::Primitive(_))
        ));
    }

    #[test]
    fn test_default_digest_shrinks_for_small_pools() {
        assert_eq!(default_digest_for(65261), DEFAULT_DIGEST);
        assert_eq!(default_digest_for(64), DEFAULT_DIGEST);
        assert_eq!(default_digest_for(63), SMALL_POOL_DIGEST);
        assert_eq!(default_digest_for(40), SMALL_POOL_DIGEST);
    }

    #[test]
    fn test_unknown_digest_is_unsupported() {
        assert!(DefaultFactory.digest("MD5").is_err());
    }

    // -----------------------------------------------------------------------
    // Cipher
    // -----------------------------------------------------------------------

    #[test]
    fn test_cipher_identifiers() {
        let c = DefaultFactory.cipher(DEFAULT_CIPHER).unwrap();
        assert_eq!(c.block_cipher(), "Threefish-1024");
        assert_eq!(c.name(), DEFAULT_CIPHER);
        assert!(DefaultFactory.cipher("AES").is_ok());
        assert!(DefaultFactory.cipher("aes/gcm/nopadding").is_ok());
        assert!(DefaultFactory.cipher("Rot13").is_err());
        assert!(DefaultFactory.cipher("AES/XTS").is_err());
        assert!(DefaultFactory.cipher("AES/CBC/NoPadding/Extra").is_err());
    }

    // -----------------------------------------------------------------------
    // Fallback
    // -----------------------------------------------------------------------

    #[test]
    fn test_fallback_substitutes_default() {
        let (handle, fallback) = resolve_with_fallback(
            AlgorithmKind::Digest,
            "Whirlpool",
            DEFAULT_DIGEST,
            |n| DefaultFactory.digest(n),
        )
        .unwrap();
        assert_eq!(handle.name(), DEFAULT_DIGEST);
        let fallback = fallback.unwrap();
        assert_eq!(fallback.requested, "Whirlpool");
        assert_eq!(fallback.substituted, DEFAULT_DIGEST);
    }

    #[test]
    fn test_fallback_not_used_when_resolvable() {
        let (handle, fallback) =
            resolve_with_fallback(AlgorithmKind::Digest, "SHA-256", DEFAULT_DIGEST, |n| {
                DefaultFactory.digest(n)
            })
            .unwrap();
        assert_eq!(handle.name(), "SHA-256");
        assert!(fallback.is_none());
    }

    #[test]
    fn test_fallback_fails_when_default_unresolvable() {
        let result = resolve_with_fallback(AlgorithmKind::Cipher, "Rot13", "Rot26", |n| {
            DefaultFactory.cipher(n)
        });
        assert!(matches!(
            result,
            Err(PoolError::UnsupportedAlgorithm { ref name, .. }) if name == "Rot13"
        ));
    }
}
