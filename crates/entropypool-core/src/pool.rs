//! The entropy pool: buffer, cursors, counters and the inject/extract protocol.
//!
//! Lifecycle:
//! 1. Create fresh (zeroed or seeded buffer) or restore from a pool file
//! 2. `inject` caller bytes with an entropy claim; a full buffer triggers `mix`
//! 3. `extract` folds the buffer into the requested length, then mixes again
//! 4. Drop overwrites the buffer with zeros
//!
//! A pool has a single owner and no internal locking. Wrap it in a `Mutex`
//! to share it; every public operation runs to completion before returning.

use serde::Serialize;
use zeroize::Zeroize;

use crate::algorithm::{
    AlgorithmFactory, AlgorithmFallback, CipherHandle, DEFAULT_CIPHER,
    DEFAULT_SECURE_RANDOM, DefaultFactory, DigestHandle, SecureRandomHandle, default_digest_for,
    resolve_with_fallback,
};
use crate::codec::PoolImage;
use crate::config::PoolConfig;
use crate::error::{AlgorithmKind, PersistError, PoolError, Result};
use crate::mixer::{self, MixReport};
use crate::tracked::{Tracked, TrackedCount, now_millis};

/// Largest buffer a pool file can describe (its length is stored as `i32`).
pub const MAX_POOL_SIZE: usize = i32::MAX as usize;

/// A fixed-size pool of accumulated entropy.
pub struct EntropyPool {
    pub(crate) buffer: Vec<u8>,
    pub(crate) hash_x: usize,
    pub(crate) hash_y: usize,
    write_pointer: usize,
    pub(crate) created_at: i64,
    pub(crate) access_count: TrackedCount,
    pub(crate) mix_count: TrackedCount,
    pub(crate) secure_random: Tracked<SecureRandomHandle>,
    pub(crate) digest: Tracked<DigestHandle>,
    pub(crate) cipher: Tracked<CipherHandle>,
    pub(crate) injected: Tracked<u64>,
    pub(crate) extracted: Tracked<u64>,
    poisoned: bool,
}

impl EntropyPool {
    /// Create a zeroed pool, resolving names with [`DefaultFactory`].
    pub fn new(size: usize, secure_random: &str, digest: &str, cipher: &str) -> Result<Self> {
        Self::with_factory(size, secure_random, digest, cipher, &DefaultFactory)
    }

    /// Create a zeroed pool of the default size with the default algorithms.
    pub fn with_defaults() -> Result<Self> {
        Self::from_config(&PoolConfig::default(), &DefaultFactory)
    }

    /// Create a zeroed pool, resolving names with `factory`. Any unresolvable
    /// name fails construction.
    pub fn with_factory(
        size: usize,
        secure_random: &str,
        digest: &str,
        cipher: &str,
        factory: &dyn AlgorithmFactory,
    ) -> Result<Self> {
        Self::from_handles(
            size,
            factory.secure_random(secure_random)?,
            factory.digest(digest)?,
            factory.cipher(cipher)?,
            None,
        )
    }

    pub fn from_config(config: &PoolConfig, factory: &dyn AlgorithmFactory) -> Result<Self> {
        Self::from_config_seeded(config, factory, None)
    }

    /// Create a pool whose buffer starts with `seed` (truncated to the pool
    /// size, zero-filled after it).
    pub fn from_config_seeded(
        config: &PoolConfig,
        factory: &dyn AlgorithmFactory,
        seed: Option<&[u8]>,
    ) -> Result<Self> {
        let (secure_random, digest, cipher) = if config.fallback_to_defaults {
            let (sr, _) = resolve_with_fallback(
                AlgorithmKind::SecureRandom,
                &config.secure_random,
                DEFAULT_SECURE_RANDOM,
                |n| factory.secure_random(n),
            )?;
            let (d, _) =
                resolve_with_fallback(
                    AlgorithmKind::Digest,
                    &config.digest,
                    default_digest_for(config.size),
                    |n| factory.digest(n),
                )?;
            let (c, _) =
                resolve_with_fallback(AlgorithmKind::Cipher, &config.cipher, DEFAULT_CIPHER, |n| {
                    factory.cipher(n)
                })?;
            (sr, d, c)
        } else {
            (
                factory.secure_random(&config.secure_random)?,
                factory.digest(&config.digest)?,
                factory.cipher(&config.cipher)?,
            )
        };
        Self::from_handles(config.size, secure_random, digest, cipher, seed)
    }

    fn from_handles(
        size: usize,
        secure_random: SecureRandomHandle,
        digest: DigestHandle,
        cipher: CipherHandle,
        seed: Option<&[u8]>,
    ) -> Result<Self> {
        if size == 0 || size > MAX_POOL_SIZE {
            return Err(PoolError::InvalidSize(size));
        }
        check_digest_fits(&digest, size)?;

        let mut buffer = vec![0u8; size];
        if let Some(seed) = seed {
            let n = seed.len().min(size);
            buffer[..n].copy_from_slice(&seed[..n]);
        }

        log::debug!(
            "new {size}-byte pool ({}, {}, {})",
            secure_random.name(),
            digest.name(),
            cipher.name()
        );
        Ok(Self {
            buffer,
            hash_x: 0,
            hash_y: 0,
            write_pointer: 0,
            created_at: now_millis(),
            access_count: TrackedCount::new(),
            mix_count: TrackedCount::new(),
            secure_random: Tracked::new(secure_random),
            digest: Tracked::new(digest),
            cipher: Tracked::new(cipher),
            injected: Tracked::new(0),
            extracted: Tracked::new(0),
            poisoned: false,
        })
    }

    /// Rebuild a pool from decoded file fields, checking every invariant.
    /// Unresolvable algorithm names fall back to the defaults; the
    /// substitutions are returned.
    pub(crate) fn restore(
        image: PoolImage,
        factory: &dyn AlgorithmFactory,
    ) -> Result<(Self, Vec<AlgorithmFallback>), PersistError> {
        let PoolImage {
            created_at,
            access_count,
            secure_random,
            digest,
            cipher,
            injected,
            extracted,
            mix_count,
            hash_x,
            hash_y,
            buffer: mut stored,
        } = image;

        let n = stored.len();
        if n == 0 || n > MAX_POOL_SIZE {
            return Err(PersistError::InvalidState(format!("pool size {n}")));
        }
        if hash_x >= n || hash_y >= n {
            return Err(PersistError::InvalidState(format!(
                "cursors ({hash_x}, {hash_y}) outside a {n}-byte pool"
            )));
        }
        let capacity = n as u64 * 8;
        if injected.value() > capacity {
            return Err(PersistError::InvalidState(format!(
                "{} injected bits exceed capacity {capacity}",
                injected.value()
            )));
        }
        if extracted.value() > injected.value() {
            return Err(PersistError::InvalidState(format!(
                "{} extracted bits exceed {} injected",
                extracted.value(),
                injected.value()
            )));
        }

        let mut fallbacks = Vec::new();
        let secure_random = restore_algorithm(
            AlgorithmKind::SecureRandom,
            &secure_random,
            DEFAULT_SECURE_RANDOM,
            &mut fallbacks,
            |n| factory.secure_random(n),
        )?;
        let digest = restore_algorithm(
            AlgorithmKind::Digest,
            &digest,
            default_digest_for(n),
            &mut fallbacks,
            |n| factory.digest(n),
        )?;
        let cipher = restore_algorithm(
            AlgorithmKind::Cipher,
            &cipher,
            DEFAULT_CIPHER,
            &mut fallbacks,
            |n| factory.cipher(n),
        )?;
        check_digest_fits(digest.get(), n)?;

        let pool = Self {
            buffer: std::mem::take(&mut *stored),
            hash_x,
            hash_y,
            write_pointer: 0,
            created_at,
            access_count,
            mix_count,
            secure_random,
            digest,
            cipher,
            injected,
            extracted,
            poisoned: false,
        };
        Ok((pool, fallbacks))
    }

    // -----------------------------------------------------------------------
    // Inject / extract / mix
    // -----------------------------------------------------------------------

    /// XOR `bytes` into the buffer at the write pointer, mixing every time the
    /// pointer wraps, then credit `claimed_entropy_bits` (capped at capacity).
    ///
    /// The claim is the caller's estimate and is not checked.
    pub fn inject(&mut self, bytes: &[u8], claimed_entropy_bits: u32) -> Result<()> {
        self.ensure_usable()?;
        if bytes.is_empty() {
            return Err(PoolError::EmptyInjection);
        }

        let n = self.buffer.len();
        let mut rest = bytes;
        while !rest.is_empty() {
            let take = (n - self.write_pointer).min(rest.len());
            let window = &mut self.buffer[self.write_pointer..self.write_pointer + take];
            for (dst, src) in window.iter_mut().zip(&rest[..take]) {
                *dst ^= src;
            }
            self.write_pointer += take;
            rest = &rest[take..];
            if self.write_pointer == n {
                self.write_pointer = 0;
                self.mix()?;
            }
        }

        let capacity = self.capacity_bits();
        self.injected
            .modify(|bits| *bits = bits.saturating_add(claimed_entropy_bits as u64).min(capacity));
        log::trace!(
            "injected {} bytes claiming {claimed_entropy_bits} bits, {} available",
            bytes.len(),
            self.available_entropy_bits()
        );
        Ok(())
    }

    /// Fold the whole buffer into `num_bytes` output bytes, then mix.
    ///
    /// Fails without touching the pool if fewer than `num_bytes * 8` bits are
    /// available. Output byte `i % num_bytes` receives pool byte `i`, so a
    /// request longer than the pool would leave its tail zero; the entropy
    /// check rules that out because available bits never exceed `N * 8`.
    pub fn extract(&mut self, num_bytes: u32) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        if num_bytes == 0 {
            return Err(PoolError::EmptyExtraction);
        }
        let requested = num_bytes as u64 * 8;
        let available = self.available_entropy_bits();
        if requested > available {
            return Err(PoolError::InsufficientEntropy {
                requested,
                available,
            });
        }

        self.flush()?;
        let len = num_bytes as usize;
        let mut out = zeroize::Zeroizing::new(vec![0u8; len]);
        for (i, byte) in self.buffer.iter().enumerate() {
            out[i % len] ^= byte;
        }
        self.mix()?;

        let total = self
            .extracted
            .value()
            .checked_add(requested)
            .expect("extracted entropy counter overflowed");
        self.extracted.set(total);
        Ok(std::mem::take(&mut *out))
    }

    /// Run whiten, permute and rehash once.
    ///
    /// A failure leaves the buffer part-way through the pipeline with no
    /// earlier state to return to, so the pool refuses all further use.
    pub fn mix(&mut self) -> Result<MixReport> {
        self.ensure_usable()?;
        match mixer::run(self) {
            Ok(report) => {
                self.mix_count.count();
                self.write_pointer = 0;
                log::debug!(
                    "mix #{} took {:?} (whiten {:?}, permute {:?}, rehash {:?})",
                    self.mix_count.get(),
                    report.total(),
                    report.whiten,
                    report.permute,
                    report.rehash
                );
                Ok(report)
            }
            Err(err) => {
                self.poisoned = true;
                log::error!("mix failed, pool disabled: {err}");
                Err(err)
            }
        }
    }

    /// Mix only if injected bytes are still waiting to be folded in.
    pub fn flush(&mut self) -> Result<Option<MixReport>> {
        if self.write_pointer == 0 {
            self.ensure_usable()?;
            return Ok(None);
        }
        self.mix().map(Some)
    }

    /// Record an access (done automatically on every load).
    pub fn touch(&mut self) {
        self.access_count.count();
    }

    // -----------------------------------------------------------------------
    // Algorithm replacement
    // -----------------------------------------------------------------------

    pub fn set_secure_random(&mut self, name: &str, factory: &dyn AlgorithmFactory) -> Result<()> {
        self.ensure_usable()?;
        let handle = factory.secure_random(name)?;
        log::info!("secure random {} -> {name}", self.secure_random.get().name());
        self.secure_random.set(handle);
        Ok(())
    }

    /// Replace the digest. Refused if its output is longer than the pool.
    pub fn set_digest(&mut self, name: &str, factory: &dyn AlgorithmFactory) -> Result<()> {
        self.ensure_usable()?;
        let handle = factory.digest(name)?;
        check_digest_fits(&handle, self.buffer.len())?;
        log::info!("message digest {} -> {name}", self.digest.get().name());
        self.digest.set(handle);
        Ok(())
    }

    pub fn set_cipher(&mut self, name: &str, factory: &dyn AlgorithmFactory) -> Result<()> {
        self.ensure_usable()?;
        let handle = factory.cipher(name)?;
        log::info!("cipher {} -> {name}", self.cipher.get().name());
        self.cipher.set(handle);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Buffer length in bytes.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity_bits(&self) -> u64 {
        self.buffer.len() as u64 * 8
    }

    pub fn available_entropy_bits(&self) -> u64 {
        self.injected.value().saturating_sub(self.extracted.value())
    }

    pub fn injected_entropy(&self) -> &Tracked<u64> {
        &self.injected
    }

    pub fn extracted_entropy(&self) -> &Tracked<u64> {
        &self.extracted
    }

    pub fn mix_count(&self) -> &TrackedCount {
        &self.mix_count
    }

    pub fn access_count(&self) -> &TrackedCount {
        &self.access_count
    }

    pub fn secure_random(&self) -> &Tracked<SecureRandomHandle> {
        &self.secure_random
    }

    pub fn digest(&self) -> &Tracked<DigestHandle> {
        &self.digest
    }

    pub fn cipher(&self) -> &Tracked<CipherHandle> {
        &self.cipher
    }

    pub fn hash_x(&self) -> usize {
        self.hash_x
    }

    pub fn hash_y(&self) -> usize {
        self.hash_y
    }

    /// Injected bytes not yet folded in by a mix.
    pub fn write_pointer(&self) -> usize {
        self.write_pointer
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn summary(&self) -> PoolSummary {
        PoolSummary {
            size: self.size(),
            capacity_bits: self.capacity_bits(),
            available_bits: self.available_entropy_bits(),
            injected_bits: self.injected.value(),
            extracted_bits: self.extracted.value(),
            mix_count: self.mix_count.get(),
            access_count: self.access_count.get(),
            secure_random: self.secure_random.get().name().to_string(),
            digest: self.digest.get().name().to_string(),
            cipher: self.cipher.get().name().to_string(),
            created_at: self.created_at,
            poisoned: self.poisoned,
        }
    }

    pub(crate) fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(PoolError::Poisoned)
        } else {
            Ok(())
        }
    }
}

/// Resolve a stored algorithm name, keeping its modification history even
/// when the default has to stand in for it.
fn restore_algorithm<T>(
    kind: AlgorithmKind,
    stored: &Tracked<String>,
    default: &'static str,
    fallbacks: &mut Vec<AlgorithmFallback>,
    resolve: impl Fn(&str) -> Result<T>,
) -> Result<Tracked<T>> {
    let (handle, fallback) = resolve_with_fallback(kind, stored.get(), default, resolve)?;
    fallbacks.extend(fallback);
    Ok(Tracked::from_parts(
        handle,
        stored.modify_count(),
        stored.modify_date(),
    ))
}

fn check_digest_fits(digest: &DigestHandle, pool_size: usize) -> Result<()> {
    let digest_len = digest.output_len();
    if digest_len > pool_size {
        return Err(PoolError::DigestTooLarge {
            digest_len,
            pool_size,
        });
    }
    Ok(())
}

impl Drop for EntropyPool {
    fn drop(&mut self) {
        self.buffer.zeroize();
    }
}

impl std::fmt::Debug for EntropyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntropyPool")
            .field("size", &self.buffer.len())
            .field("hash_x", &self.hash_x)
            .field("hash_y", &self.hash_y)
            .field("write_pointer", &self.write_pointer)
            .field("available_bits", &self.available_entropy_bits())
            .field("mix_count", &self.mix_count.get())
            .field("secure_random", &self.secure_random.get().name())
            .field("digest", &self.digest.get().name())
            .field("cipher", &self.cipher.get().name())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a pool without its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub size: usize,
    pub capacity_bits: u64,
    pub available_bits: u64,
    pub injected_bits: u64,
    pub extracted_bits: u64,
    pub mix_count: u32,
    pub access_count: u32,
    pub secure_random: String,
    pub digest: String,
    pub cipher: String,
    pub created_at: i64,
    pub poisoned: bool,
}

impl std::fmt::Display for PoolSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bytes, {}/{} bits available, mixed {} times, accessed {} times ({}, {}, {})",
            self.size,
            self.available_bits,
            self.capacity_bits,
            self.mix_count,
            self.access_count,
            self.secure_random,
            self.digest,
            self.cipher
        )?;
        if self.poisoned {
            write!(f, " [poisoned]")?;
        }
        Ok(())
    }
}
