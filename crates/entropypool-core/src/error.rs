//! Error types for pool operations and pool-file persistence.

use crate::codec::Version;

/// Which algorithm capability a name was resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    SecureRandom,
    Digest,
    Cipher,
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecureRandom => write!(f, "secure random"),
            Self::Digest => write!(f, "message digest"),
            Self::Cipher => write!(f, "cipher"),
        }
    }
}

/// Errors raised by construction, injection, extraction and mixing.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid pool size {0}: must be between 1 and 2147483647 bytes")]
    InvalidSize(usize),
    #[error("unsupported {kind} algorithm: {name:?}")]
    UnsupportedAlgorithm { kind: AlgorithmKind, name: String },
    #[error("digest output ({digest_len} bytes) does not fit in a pool of {pool_size} bytes")]
    DigestTooLarge { digest_len: usize, pool_size: usize },
    #[error("cannot inject an empty byte sequence")]
    EmptyInjection,
    #[error("cannot extract zero bytes")]
    EmptyExtraction,
    #[error("more entropy requested than is available: {requested} > {available} bits")]
    InsufficientEntropy { requested: u64, available: u64 },
    #[error("cryptographic primitive failed: {0}")]
    Primitive(String),
    #[error("pool is unusable after a failed mix")]
    Poisoned,
}

/// Errors raised while reading or writing a pool file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not an entropy pool file")]
    InvalidHeader,
    #[error("unsupported pool file version {version}: {reason}")]
    UnsupportedVersion { version: Version, reason: &'static str },
    #[error("unknown release channel byte: {0:#04x}")]
    UnknownRelease(u8),
    #[error("pool file is truncated")]
    Truncated,
    #[error("pool file is corrupt: {0}")]
    Corrupt(String),
    #[error("tag {tag} repeated with a different value")]
    DuplicateTag { tag: String },
    #[error("required tag {tag} missing")]
    MissingTag { tag: &'static str },
    #[error("pool file holds an inconsistent state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors raised while feeding files into a pool.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors raised while reading a [`PoolConfig`](crate::PoolConfig) file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
}

impl PersistError {
    /// Map an I/O error from a body read: a short read means the file ended early.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(err)
        }
    }
}

pub type Result<T, E = PoolError> = std::result::Result<T, E>;
