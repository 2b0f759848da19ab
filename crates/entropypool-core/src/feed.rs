//! Feeding files and directory trees into a pool.
//!
//! Files are read in chunks of at most [`CHUNK_SIZE`] bytes so memory use
//! stays bounded regardless of file size. Every chunk is injected claiming
//! eight bits per byte; the pool caps the total at its capacity. The pool is
//! mixed once after each file and once after each directory.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use zeroize::Zeroizing;

use crate::error::FeedError;
use crate::pool::EntropyPool;

pub const CHUNK_SIZE: usize = 1 << 20;

/// What a feed call consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedReport {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
    pub mixes: u64,
    /// Directory entries that could not be read and were passed over.
    pub skipped: u64,
}

impl std::ops::AddAssign for FeedReport {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.directories += other.directories;
        self.bytes += other.bytes;
        self.mixes += other.mixes;
        self.skipped += other.skipped;
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> FeedError + '_ {
    move |source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Feed a file, or a directory tree.
pub fn inject_path(pool: &mut EntropyPool, path: impl AsRef<Path>) -> Result<FeedReport, FeedError> {
    let path = path.as_ref();
    let meta = fs::metadata(path).map_err(io_error(path))?;
    if meta.is_dir() {
        inject_directory(pool, path)
    } else {
        inject_file(pool, path)
    }
}

/// Feed one file in bounded chunks, then mix.
pub fn inject_file(pool: &mut EntropyPool, path: impl AsRef<Path>) -> Result<FeedReport, FeedError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(io_error(path))?;
    let mut chunk = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut report = FeedReport::default();

    loop {
        let n = match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_error(path)(e)),
        };
        pool.inject(&chunk[..n], (n * 8) as u32)?;
        report.bytes += n as u64;
    }

    pool.mix()?;
    report.files = 1;
    report.mixes = 1;
    log::debug!("fed {} ({} bytes)", path.display(), report.bytes);
    Ok(report)
}

/// Feed every file under `dir`, in sorted order, then mix.
///
/// Entries that cannot be read are skipped with a warning. Symbolic links
/// to directories are not followed.
pub fn inject_directory(
    pool: &mut EntropyPool,
    dir: impl AsRef<Path>,
) -> Result<FeedReport, FeedError> {
    let dir = dir.as_ref();
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error(dir))?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                log::warn!("skipping entry in {}: {e}", dir.display());
                None
            }
        })
        .collect();
    entries.sort();

    let mut report = FeedReport::default();
    for path in entries {
        let Ok(link_meta) = fs::symlink_metadata(&path) else {
            report.skipped += 1;
            continue;
        };
        let result = if link_meta.is_dir() {
            inject_directory(pool, &path)
        } else if link_meta.is_file() || fs::metadata(&path).is_ok_and(|m| m.is_file()) {
            inject_file(pool, &path)
        } else {
            log::debug!("skipping {}: not a regular file", path.display());
            continue;
        };
        match result {
            Ok(sub) => report += sub,
            Err(FeedError::Io { path, source }) => {
                log::warn!("skipping {}: {source}", path.display());
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    pool.mix()?;
    report.directories += 1;
    report.mixes += 1;
    log::debug!(
        "fed directory {} ({} files, {} bytes)",
        dir.display(),
        report.files,
        report.bytes
    );
    Ok(report)
}
