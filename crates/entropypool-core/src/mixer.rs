//! The mixing pipeline: whiten, permute, rehash.
//!
//! `mix()` runs the three stages in a fixed order over the pool buffer. The
//! stage set is closed, so the pipeline is a constant array of plain
//! functions rather than a trait object list.
//!
//! The rehash stage walks two cursors over the buffer. `hash_x` moves
//! linearly by one digest length per iteration, so `ceil(N / D)` iterations
//! rewrite every byte at least once. `hash_y` jumps by an amount read back
//! from the freshly written digest, giving a second window per iteration that
//! is hard to predict.

use std::time::{Duration, Instant};

use serde::Serialize;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{PoolError, Result};
use crate::host::{HostCounters, monotonic_nanos};
use crate::pool::EntropyPool;
use crate::tracked::{Tracked, TrackedCount, now_millis};

type Stage = fn(&mut EntropyPool) -> Result<()>;

const PIPELINE: [(&str, Stage); 3] = [
    ("whiten", whiten as Stage),
    ("permute", permute as Stage),
    ("rehash", rehash as Stage),
];

/// Time spent in each stage of one `mix()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MixReport {
    pub whiten: Duration,
    pub permute: Duration,
    pub rehash: Duration,
}

impl MixReport {
    pub fn total(&self) -> Duration {
        self.whiten + self.permute + self.rehash
    }
}

/// Run all stages in order. On error the buffer is left part-way mixed.
pub(crate) fn run(pool: &mut EntropyPool) -> Result<MixReport> {
    let mut timings = [Duration::ZERO; 3];
    for (slot, (name, stage)) in timings.iter_mut().zip(PIPELINE) {
        let start = Instant::now();
        stage(pool)?;
        *slot = start.elapsed();
        log::trace!("{name}: {:?}", *slot);
    }
    let [whiten, permute, rehash] = timings;
    Ok(MixReport {
        whiten,
        permute,
        rehash,
    })
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// XOR every byte with a fresh random byte.
pub(crate) fn whiten(pool: &mut EntropyPool) -> Result<()> {
    let mut pad = Zeroizing::new(vec![0u8; pool.buffer.len()]);
    pool.secure_random.get_mut().fill(&mut pad)?;
    for (byte, r) in pool.buffer.iter_mut().zip(pad.iter()) {
        *byte ^= r;
    }
    Ok(())
}

/// Fisher-Yates shuffle driven by the secure random source.
pub(crate) fn permute(pool: &mut EntropyPool) -> Result<()> {
    let rng = pool.secure_random.get_mut();
    for i in (1..pool.buffer.len()).rev() {
        let j = rng.index(i)?;
        if j > i {
            return Err(PoolError::Primitive(format!(
                "secure random {} returned index {j} outside [0, {i}]",
                rng.name()
            )));
        }
        pool.buffer.swap(i, j);
    }
    Ok(())
}

/// Digest-driven rewrite of the whole buffer.
pub(crate) fn rehash(pool: &mut EntropyPool) -> Result<()> {
    let d = pool.digest.get().output_len();
    let audit = audit_record(pool);
    let digest = &mut pool.digest;
    let mut cursors = (pool.hash_x, pool.hash_y);

    walk(&mut pool.buffer, &mut cursors, d, |(x, y), windows, block| {
        let host = HostCounters::sample();
        let digest = digest.get_mut();
        digest.reset();
        digest.update_i64(now_millis());
        digest.update_i64(monotonic_nanos());
        digest.update_i32(host.processors as i32);
        digest.update_i64(host.free_memory as i64);
        digest.update_i64(host.max_memory as i64);
        digest.update_i64(host.total_memory as i64);
        digest.update(&audit);
        digest.update_i32(x as i32);
        digest.update_i32(y as i32);
        for window in windows {
            digest.update(window);
        }
        digest.finalize_into(block)
    })?;

    (pool.hash_x, pool.hash_y) = cursors;
    Ok(())
}

/// Advance both cursors for `ceil(N / D)` iterations.
///
/// Each iteration `next_block` sees the current cursors and the `D`-byte
/// windows at `hash_x` and `hash_y` (each split at the wraparound), and fills
/// a `D`-byte block that is written back at `hash_x`.
fn walk<F>(buffer: &mut [u8], cursors: &mut (usize, usize), d: usize, mut next_block: F) -> Result<()>
where
    F: FnMut((usize, usize), [&[u8]; 4], &mut [u8]) -> Result<()>,
{
    let n = buffer.len();
    let (mut x, mut y) = *cursors;
    let mut block = Zeroizing::new(vec![0u8; d]);

    for _ in 0..n.div_ceil(d) {
        let (x_head, x_tail) = read_window(buffer, x, d);
        let (y_head, y_tail) = read_window(buffer, y, d);
        next_block((x, y), [x_head, x_tail, y_head, y_tail], &mut block)?;
        write_window(buffer, x, &block);
        block[..].zeroize();

        let hi = buffer[x] as usize;
        let lo = buffer[(x + 1) % n] as usize;
        y = (y + ((hi << 8) | lo)) % n;
        x = (x + d) % n;
    }

    *cursors = (x, y);
    Ok(())
}

/// Everything about the pool that stays fixed during one rehash, in the
/// order it is fed to the digest.
fn audit_record(pool: &EntropyPool) -> Vec<u8> {
    fn count(out: &mut Vec<u8>, c: &TrackedCount) {
        out.extend_from_slice(&(c.get() as i32).to_be_bytes());
        out.extend_from_slice(&c.count_date().to_be_bytes());
    }
    fn algorithm<T>(out: &mut Vec<u8>, name: &str, t: &Tracked<T>) {
        out.extend_from_slice(&(name.len() as u32).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(t.modify_count() as i32).to_be_bytes());
        out.extend_from_slice(&t.modify_date().to_be_bytes());
    }
    fn entropy(out: &mut Vec<u8>, t: &Tracked<u64>) {
        out.extend_from_slice(&(t.value() as i64).to_be_bytes());
        out.extend_from_slice(&(t.modify_count() as i32).to_be_bytes());
        out.extend_from_slice(&t.modify_date().to_be_bytes());
    }

    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(&pool.created_at.to_be_bytes());
    count(&mut out, &pool.access_count);
    algorithm(&mut out, pool.secure_random.get().name(), &pool.secure_random);
    algorithm(&mut out, pool.digest.get().name(), &pool.digest);
    algorithm(&mut out, pool.cipher.get().name(), &pool.cipher);
    entropy(&mut out, &pool.injected);
    entropy(&mut out, &pool.extracted);
    count(&mut out, &pool.mix_count);
    out.extend_from_slice(&(pool.buffer.len() as i32).to_be_bytes());
    out
}

// ---------------------------------------------------------------------------
// Wraparound windows
// ---------------------------------------------------------------------------

/// Lengths of a `len`-byte window at `offset`: the part up to the end of an
/// `n`-byte buffer, then the part continuing from index 0. Needs `len <= n`.
fn split(n: usize, offset: usize, len: usize) -> (usize, usize) {
    let head = len.min(n - offset);
    (head, len - head)
}

pub(crate) fn read_window(buffer: &[u8], offset: usize, len: usize) -> (&[u8], &[u8]) {
    let (head, tail) = split(buffer.len(), offset, len);
    (&buffer[offset..offset + head], &buffer[..tail])
}

pub(crate) fn write_window(buffer: &mut [u8], offset: usize, data: &[u8]) {
    let (head, tail) = split(buffer.len(), offset, data.len());
    buffer[offset..offset + head].copy_from_slice(&data[..head]);
    buffer[..tail].copy_from_slice(&data[head..]);
}
