//! Saving and loading pool files.
//!
//! A save never leaves a half-written canonical file: the new contents go to
//! a temporary sibling first and are synced, the current canonical file is
//! renamed to the backup path (replacing the previous backup), and only then
//! is the temporary file renamed into place.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use zeroize::Zeroizing;

use crate::algorithm::{AlgorithmFactory, DefaultFactory};
use crate::codec::{self, Header, Layout, LoadWarning};
use crate::error::PersistError;
use crate::pool::EntropyPool;

/// Canonical, backup and temporary locations of one pool file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPaths {
    pub canonical: PathBuf,
    pub backup: PathBuf,
    pub temp: PathBuf,
}

impl PoolPaths {
    /// `<stem>.bak` and `<stem>.tmp` next to `path`.
    pub fn for_pool(path: impl AsRef<Path>) -> Self {
        let canonical = path.as_ref().to_path_buf();
        let backup = sibling(&canonical, "bak");
        let temp = sibling(&canonical, "tmp");
        Self {
            canonical,
            backup,
            temp,
        }
    }
}

fn sibling(canonical: &Path, extension: &str) -> PathBuf {
    let candidate = canonical.with_extension(extension);
    if candidate == canonical {
        let mut name = canonical.as_os_str().to_os_string();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    } else {
        candidate
    }
}

/// How to write a pool file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub layout: Layout,
    /// Free text stored in the tagged layout's `COMMENT` record.
    pub comment: Option<String>,
}

/// A loaded pool and everything noticed while loading it.
#[derive(Debug)]
pub struct LoadReport {
    pub pool: EntropyPool,
    pub header: Header,
    pub comment: Option<String>,
    pub warnings: Vec<LoadWarning>,
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

/// Save in the tagged layout with sibling backup and temp paths.
pub fn save_to_file(pool: &mut EntropyPool, path: impl AsRef<Path>) -> Result<(), PersistError> {
    save_to_paths(pool, &PoolPaths::for_pool(path), &SaveOptions::default())
}

/// Serialize, write the temp file, then swap it in.
///
/// Injected bytes still waiting for a mix are folded in first, so the file
/// never holds unmixed input.
pub fn save_to_paths(
    pool: &mut EntropyPool,
    paths: &PoolPaths,
    options: &SaveOptions,
) -> Result<(), PersistError> {
    let start = Instant::now();
    pool.flush()?;
    let bytes = codec::encode(pool, options.layout, options.comment.as_deref())?;
    write_temp(&paths.temp, &bytes)?;
    commit(paths)?;
    log::debug!(
        "saved {} ({} layout, {} bytes) in {:?}",
        paths.canonical.display(),
        options.layout,
        bytes.len(),
        start.elapsed()
    );
    Ok(())
}

fn write_temp(temp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    write_temp_with(temp, |file| {
        file.write_all(bytes)?;
        file.sync_all()
    })
}

/// Create `temp` and fill it; on failure the partial file is removed so no
/// pool bytes are left behind.
fn write_temp_with(
    temp: &Path,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut file = File::create(temp)?;
    let result = fill(&mut file);
    if result.is_err() {
        drop(file);
        if let Err(e) = fs::remove_file(temp) {
            log::warn!("could not remove partial {}: {e}", temp.display());
        }
    }
    result
}

fn commit(paths: &PoolPaths) -> std::io::Result<()> {
    match fs::rename(&paths.canonical, &paths.backup) {
        Ok(()) => log::trace!("previous pool kept at {}", paths.backup.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::rename(&paths.temp, &paths.canonical)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load with [`DefaultFactory`].
pub fn load_from_file(path: impl AsRef<Path>) -> Result<LoadReport, PersistError> {
    load_with(path, &DefaultFactory)
}

/// Decode a pool file, resolve its algorithm names through `factory`, and
/// count the access.
pub fn load_with(
    path: impl AsRef<Path>,
    factory: &dyn AlgorithmFactory,
) -> Result<LoadReport, PersistError> {
    let path = path.as_ref();
    let start = Instant::now();
    let bytes = Zeroizing::new(fs::read(path)?);
    let decoded = codec::decode(&bytes)?;
    let (mut pool, fallbacks) = EntropyPool::restore(decoded.image, factory)?;
    pool.touch();

    let mut warnings = decoded.warnings;
    warnings.extend(fallbacks.into_iter().map(LoadWarning::AlgorithmFallback));
    log::debug!(
        "loaded {} ({}, {}) in {:?}",
        path.display(),
        decoded.header.layout,
        decoded.header.version,
        start.elapsed()
    );
    Ok(LoadReport {
        pool,
        header: decoded.header,
        comment: decoded.comment,
        warnings,
    })
}

/// Load the canonical file, or the backup if the canonical file is missing
/// (a save interrupted between its two renames leaves exactly that).
pub fn load_from_paths(
    paths: &PoolPaths,
    factory: &dyn AlgorithmFactory,
) -> Result<LoadReport, PersistError> {
    match load_with(&paths.canonical, factory) {
        Err(PersistError::Io(e)) if e.kind() == ErrorKind::NotFound && paths.backup.exists() => {
            let warning = LoadWarning::FromBackup(paths.backup.clone());
            log::warn!("{warning}");
            let mut report = load_with(&paths.backup, factory)?;
            report.warnings.push(warning);
            Ok(report)
        }
        other => other,
    }
}

/// Read only the header of a pool file.
pub fn read_header(path: impl AsRef<Path>) -> Result<Header, PersistError> {
    let bytes = fs::read(path)?;
    codec::read_header(&bytes)
}
