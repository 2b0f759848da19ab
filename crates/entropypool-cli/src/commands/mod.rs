pub mod config;
pub mod create;
pub mod extract;
pub mod info;
pub mod inject;
pub mod mix;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use entropypool_core::{
    ConfigError, DefaultFactory, EntropyPool, FeedError, Layout, LoadReport, PersistError,
    PoolError, PoolPaths, SaveOptions, load_from_paths, save_to_paths,
};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{} already exists (pass --force to replace it)", .0.display())]
    Exists(PathBuf),
    #[error("no pool at {} (run `entropypool create` first)", .0.display())]
    NoPool(PathBuf),
}

pub type CommandResult<T = ()> = Result<T, CommandError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    Fixed,
    Tagged,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Fixed => Layout::Fixed,
            LayoutArg::Tagged => Layout::Tagged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Hex,
    Raw,
}

/// A pool loaded from disk, with the options needed to write it back the
/// way it was found.
pub struct OpenPool {
    pub pool: EntropyPool,
    pub options: SaveOptions,
}

impl OpenPool {
    /// Load the pool at `path`, falling back to its backup. Load warnings
    /// are logged.
    pub fn load(path: &Path) -> CommandResult<Self> {
        let report = load_report(path)?;
        for warning in &report.warnings {
            log::warn!("{}: {warning}", path.display());
        }
        Ok(Self {
            pool: report.pool,
            options: SaveOptions {
                layout: report.header.layout,
                comment: report.comment,
            },
        })
    }

    pub fn save(&mut self, path: &Path) -> CommandResult {
        save_to_paths(&mut self.pool, &PoolPaths::for_pool(path), &self.options)?;
        Ok(())
    }
}

/// Load the pool at `path` (or its backup), reporting a missing pool as
/// [`CommandError::NoPool`].
pub fn load_report(path: &Path) -> CommandResult<LoadReport> {
    match load_from_paths(&PoolPaths::for_pool(path), &DefaultFactory) {
        Err(PersistError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            Err(CommandError::NoPool(path.to_path_buf()))
        }
        other => Ok(other?),
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Argument conversions
    // -----------------------------------------------------------------------

    #[test]
    fn test_layout_arg_maps_to_layout() {
        assert_eq!(Layout::from(LayoutArg::Fixed), Layout::Fixed);
        assert_eq!(Layout::from(LayoutArg::Tagged), Layout::Tagged);
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xa5, 0xff]), "000fa5ff");
        assert_eq!(to_hex(&[]), "");
    }

    // -----------------------------------------------------------------------
    // OpenPool
    // -----------------------------------------------------------------------

    #[test]
    fn test_load_missing_pool_says_so() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("absent.bin");
        match OpenPool::load(&path) {
            Err(CommandError::NoPool(p)) => assert_eq!(p, path),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("loaded a pool that does not exist"),
        }
    }

    #[test]
    fn test_save_keeps_layout_and_comment() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pool.bin");
        let mut pool = EntropyPool::new(256, "StdRng", "SHA-256", "AES").unwrap();
        let options = SaveOptions {
            layout: Layout::Fixed,
            comment: None,
        };
        save_to_paths(&mut pool, &PoolPaths::for_pool(&path), &options).unwrap();

        let mut open = OpenPool::load(&path).unwrap();
        assert_eq!(open.options, options);
        open.save(&path).unwrap();

        let reopened = OpenPool::load(&path).unwrap();
        assert_eq!(reopened.options.layout, Layout::Fixed);
        assert_eq!(reopened.pool.access_count().get(), 2);
    }
}
