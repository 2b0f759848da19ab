//! Pool construction settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithm::{DEFAULT_CIPHER, DEFAULT_DIGEST, DEFAULT_SECURE_RANDOM};
use crate::error::ConfigError;

/// Default buffer length in bytes.
///
/// Of the lengths in `[65261, 65275)`, 65261 shares the fewest factors with
/// 64, so digest-sized strides wander across the whole buffer before lining
/// up again.
pub const DEFAULT_POOL_SIZE: usize = 65261;

/// Settings for a freshly created pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Buffer length in bytes.
    pub size: usize,
    /// Secure random source name.
    pub secure_random: String,
    /// Message digest name.
    pub digest: String,
    /// Cipher identifier.
    pub cipher: String,
    /// Substitute the default for any name the factory cannot resolve,
    /// instead of failing.
    pub fallback_to_defaults: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            secure_random: DEFAULT_SECURE_RANDOM.to_string(),
            digest: DEFAULT_DIGEST.to_string(),
            cipher: DEFAULT_CIPHER.to_string(),
            fallback_to_defaults: false,
        }
    }
}

impl PoolConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let c = PoolConfig::default();
        assert_eq!(c.size, 65261);
        assert_eq!(c.secure_random, "StdRng");
        assert_eq!(c.digest, "Keccak-512");
        assert_eq!(c.cipher, "Threefish-1024/EAX/NoPadding");
        assert!(!c.fallback_to_defaults);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let c = PoolConfig::from_json_str(r#"{"size": 4096, "digest": "SHA-256"}"#).unwrap();
        assert_eq!(c.size, 4096);
        assert_eq!(c.digest, "SHA-256");
        assert_eq!(c.secure_random, DEFAULT_SECURE_RANDOM);
    }

    #[test]
    fn test_from_json_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pool.json");
        std::fs::write(&path, r#"{"fallback_to_defaults": true}"#).unwrap();
        let c = PoolConfig::from_json_file(&path).unwrap();
        assert!(c.fallback_to_defaults);
        assert_eq!(c.size, DEFAULT_POOL_SIZE);
    }

    #[test]
    fn test_bad_json_is_a_syntax_error() {
        let err = PoolConfig::from_json_str("{size: nope}").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_file_errors_keep_their_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = PoolConfig::from_json_file(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));

        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{"size": "large"}"#).unwrap();
        let bad = PoolConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(bad, ConfigError::Json(ref e) if e.is_data()));
    }
}
