//! # entropypool-core
//!
//! A software entropy pool: a fixed-size buffer that accumulates
//! unpredictability from caller bytes, files and directory trees, and yields
//! it back on demand while tracking how much unspent entropy remains.
//!
//! ## Quick Start
//!
//! ```no_run
//! use entropypool_core::{EntropyPool, load_from_file, save_to_file};
//!
//! let mut pool = EntropyPool::with_defaults()?;
//! pool.inject(b"keyboard timings, sensor noise, ...", 64)?;
//! let key = pool.extract(8)?;
//! assert_eq!(key.len(), 8);
//!
//! save_to_file(&mut pool, "entropypool.bin")?;
//! let report = load_from_file("entropypool.bin")?;
//! for warning in &report.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! Bytes in → Injector → Pool buffer → Mixing pipeline → Extractor → bytes out
//!
//! Every `mix()` runs three stages over the whole buffer:
//! - **Whiten**: XOR each byte with a fresh byte from the secure random source.
//! - **Permute**: Fisher-Yates shuffle driven by the same source.
//! - **Rehash**: walk a linear and a content-derived cursor over the buffer,
//!   rewriting digest-sized windows with a digest of the windows, the pool's
//!   own counters, and host counters.
//!
//! The pool file format and the atomic, backup-keeping save live in
//! [`codec`] and [`persist`].

pub mod algorithm;
pub mod codec;
pub mod config;
pub mod error;
pub mod feed;
pub mod host;
pub mod mixer;
pub mod persist;
pub mod pool;
pub mod tracked;

pub use algorithm::{
    AlgorithmFactory, AlgorithmFallback, CipherHandle, DefaultFactory, DigestHandle,
    SecureRandom, SecureRandomHandle, SeededFactory,
};
pub use codec::{CURRENT_VERSION, Header, Layout, LoadWarning, Release, Version};
pub use config::{DEFAULT_POOL_SIZE, PoolConfig};
pub use error::{AlgorithmKind, ConfigError, FeedError, PersistError, PoolError};
pub use feed::{FeedReport, inject_directory, inject_file, inject_path};
pub use mixer::MixReport;
pub use persist::{
    LoadReport, PoolPaths, SaveOptions, load_from_file, load_from_paths, load_with, read_header,
    save_to_file, save_to_paths,
};
pub use pool::{EntropyPool, PoolSummary};
pub use tracked::{Tracked, TrackedCount};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
