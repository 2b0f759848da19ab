//! Binary pool file format.
//!
//! Every pool file starts with the 11-byte magic `ENTROPYPOOL`. Two body
//! layouts follow it:
//!
//! - **Tagged** (written by default): a run of records, each a 16-byte
//!   zero-padded ASCII tag, a big-endian `u32` payload length, the payload,
//!   then padding up to the next 16-byte stream offset. Records may come in
//!   any order and unknown tags are skipped.
//! - **Fixed**: title, version and every pool field in one fixed order.
//!
//! The layout is detected from the five bytes after the magic: a tagged file
//! continues the 16-byte `ENTROPYPOOL` tag with padding, a fixed file starts
//! its length-prefixed title there.
//!
//! All integers are big-endian. Strings are a `u16` byte length followed by
//! UTF-8.

mod fixed;
mod tagged;

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use zeroize::Zeroizing;

use crate::algorithm::AlgorithmFallback;
use crate::error::PersistError;
use crate::pool::EntropyPool;
use crate::tracked::{Tracked, TrackedCount};

pub const MAGIC: &[u8; 11] = b"ENTROPYPOOL";
pub const TITLE: &str = "EntropyPool";
pub const CURRENT_VERSION: Version = Version::new(2, 0, Release::Alpha, 1);

/// Tags and padding are aligned to this many bytes.
pub const TAG_LENGTH: usize = 16;

/// The only major version this crate reads and writes.
const SUPPORTED_MAJOR: u8 = 2;

type Reader<'a> = Cursor<&'a [u8]>;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Release channel of a format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Release {
    Stable,
    ReleaseCandidate,
    Beta,
    Alpha,
    Milestone,
    Development,
}

impl Release {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Stable => 0x00,
            Self::ReleaseCandidate => 0xCC,
            Self::Beta => 0xBB,
            Self::Alpha => 0xAA,
            Self::Milestone => 0x88,
            Self::Development => 0x11,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, PersistError> {
        Ok(match byte {
            0x00 => Self::Stable,
            0xCC => Self::ReleaseCandidate,
            0xBB => Self::Beta,
            0xAA => Self::Alpha,
            0x88 => Self::Milestone,
            0x11 => Self::Development,
            other => return Err(PersistError::UnknownRelease(other)),
        })
    }

    fn label(self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::ReleaseCandidate => "RC",
            Self::Beta => "Beta",
            Self::Alpha => "Alpha",
            Self::Milestone => "Milestone",
            Self::Development => "Development",
        }
    }
}

/// Pool file format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub release: Release,
    pub revision: u32,
}

impl Version {
    pub const fn new(major: u8, minor: u8, release: Release, revision: u32) -> Self {
        Self {
            major,
            minor,
            release,
            revision,
        }
    }

    /// Fail unless this crate can decode a body of this version.
    pub fn check_supported(self) -> Result<(), PersistError> {
        let reason = match self.major.cmp(&SUPPORTED_MAJOR) {
            std::cmp::Ordering::Equal => return Ok(()),
            std::cmp::Ordering::Less => "too old",
            std::cmp::Ordering::Greater => "too new",
        };
        Err(PersistError::UnsupportedVersion {
            version: self,
            reason,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} {} (r{})",
            self.major,
            self.minor,
            self.release.label(),
            self.revision
        )
    }
}

// ---------------------------------------------------------------------------
// Layout, header, diagnostics
// ---------------------------------------------------------------------------

/// Body layout of a pool file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Fixed,
    #[default]
    Tagged,
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Tagged => write!(f, "tagged"),
        }
    }
}

/// What a pool file says about itself before the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub layout: Layout,
    pub title: String,
    pub version: Version,
}

/// A problem found while loading that did not stop the load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// A stored algorithm name could not be resolved; the default was used.
    AlgorithmFallback(AlgorithmFallback),
    /// A tagged record with an unrecognized tag was skipped.
    UnknownTag(String),
    /// Bytes left over after the pool was fully decoded.
    TrailingBytes(usize),
    /// The canonical file was missing and this backup was loaded instead.
    FromBackup(std::path::PathBuf),
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlgorithmFallback(fallback) => write!(f, "{fallback}"),
            Self::UnknownTag(tag) => write!(f, "skipped unknown tag {tag:?}"),
            Self::TrailingBytes(n) => write!(f, "{n} extraneous bytes after pool data"),
            Self::FromBackup(path) => write!(f, "pool file missing, loaded backup {}", path.display()),
        }
    }
}

/// Stored pool fields, decoded but not yet checked against each other.
pub(crate) struct PoolImage {
    pub created_at: i64,
    pub access_count: TrackedCount,
    pub secure_random: Tracked<String>,
    pub digest: Tracked<String>,
    pub cipher: Tracked<String>,
    pub injected: Tracked<u64>,
    pub extracted: Tracked<u64>,
    pub mix_count: TrackedCount,
    pub hash_x: usize,
    pub hash_y: usize,
    pub buffer: Zeroizing<Vec<u8>>,
}

pub(crate) struct Decoded {
    pub header: Header,
    pub comment: Option<String>,
    pub image: PoolImage,
    pub warnings: Vec<LoadWarning>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Serialize `pool` in the given layout. The comment is only stored by the
/// tagged layout.
pub(crate) fn encode(
    pool: &EntropyPool,
    layout: Layout,
    comment: Option<&str>,
) -> Result<Zeroizing<Vec<u8>>, PersistError> {
    let mut out = Zeroizing::new(Vec::with_capacity(pool.size() + 512));
    match layout {
        Layout::Fixed => {
            if comment.is_some() {
                log::debug!("fixed layout has no comment field, comment dropped");
            }
            fixed::encode(pool, &mut out)?;
        }
        Layout::Tagged => tagged::encode(pool, comment, &mut out)?,
    }
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Decoded, PersistError> {
    let layout = detect_layout(bytes)?;
    let mut reader = Cursor::new(bytes);
    let mut warnings = Vec::new();
    let (header, comment, image) = match layout {
        Layout::Fixed => {
            let (header, image) = fixed::decode(&mut reader)?;
            (header, None, image)
        }
        Layout::Tagged => tagged::decode(&mut reader, &mut warnings)?,
    };

    let trailing = bytes.len() - reader.position() as usize;
    if trailing > 0 {
        let warning = LoadWarning::TrailingBytes(trailing);
        log::warn!("{warning}");
        warnings.push(warning);
    }

    Ok(Decoded {
        header,
        comment,
        image,
        warnings,
    })
}

/// Decode only the header of a pool file.
pub fn read_header(bytes: &[u8]) -> Result<Header, PersistError> {
    let mut reader = Cursor::new(bytes);
    match detect_layout(bytes)? {
        Layout::Fixed => fixed::read_header(&mut reader),
        Layout::Tagged => tagged::read_header(&mut reader),
    }
}

fn is_padding(byte: u8) -> bool {
    byte == 0x00 || byte == b' '
}

fn detect_layout(bytes: &[u8]) -> Result<Layout, PersistError> {
    if !bytes.starts_with(MAGIC) {
        return Err(PersistError::InvalidHeader);
    }
    let Some(probe) = bytes.get(MAGIC.len()..TAG_LENGTH) else {
        return Err(PersistError::Truncated);
    };
    if probe.iter().all(|&b| is_padding(b)) {
        Ok(Layout::Tagged)
    } else {
        Ok(Layout::Fixed)
    }
}

// ---------------------------------------------------------------------------
// Wire primitives
// ---------------------------------------------------------------------------

fn read_u8(r: &mut Reader) -> Result<u8, PersistError> {
    r.read_u8().map_err(PersistError::from_read)
}

fn read_i32(r: &mut Reader) -> Result<i32, PersistError> {
    r.read_i32::<BigEndian>().map_err(PersistError::from_read)
}

fn read_i64(r: &mut Reader) -> Result<i64, PersistError> {
    r.read_i64::<BigEndian>().map_err(PersistError::from_read)
}

fn non_negative(value: i32, what: &str) -> Result<u32, PersistError> {
    u32::try_from(value)
        .map_err(|_| PersistError::InvalidState(format!("negative {what}: {value}")))
}

pub(crate) fn read_str(r: &mut Reader) -> Result<String, PersistError> {
    let len = r
        .read_u16::<BigEndian>()
        .map_err(PersistError::from_read)? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes).map_err(PersistError::from_read)?;
    String::from_utf8(bytes).map_err(|_| PersistError::Corrupt("string is not valid UTF-8".into()))
}

pub(crate) fn write_str(w: &mut Vec<u8>, value: &str) -> Result<(), PersistError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        PersistError::Corrupt(format!("string of {} bytes is too long to store", value.len()))
    })?;
    w.write_u16::<BigEndian>(len)?;
    w.extend_from_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn read_version(r: &mut Reader) -> Result<Version, PersistError> {
    let major = read_u8(r)?;
    let minor = read_u8(r)?;
    let release = Release::from_byte(read_u8(r)?)?;
    let revision = r
        .read_u32::<BigEndian>()
        .map_err(PersistError::from_read)?;
    Ok(Version::new(major, minor, release, revision))
}

pub(crate) fn write_version(w: &mut Vec<u8>, version: Version) -> Result<(), PersistError> {
    w.write_u8(version.major)?;
    w.write_u8(version.minor)?;
    w.write_u8(version.release.to_byte())?;
    w.write_u32::<BigEndian>(version.revision)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Field records
// ---------------------------------------------------------------------------

/// `count: i32, date: i64`
pub(crate) fn read_count(r: &mut Reader, what: &str) -> Result<TrackedCount, PersistError> {
    let count = non_negative(read_i32(r)?, what)?;
    let date = read_i64(r)?;
    Ok(TrackedCount::from_parts(count, date))
}

pub(crate) fn write_count(w: &mut Vec<u8>, count: &TrackedCount) -> Result<(), PersistError> {
    w.write_i32::<BigEndian>(count.get() as i32)?;
    w.write_i64::<BigEndian>(count.count_date())?;
    Ok(())
}

/// `name: str, modify_count: i32, modify_date: i64`
pub(crate) fn read_algorithm(r: &mut Reader, what: &str) -> Result<Tracked<String>, PersistError> {
    let name = read_str(r)?;
    let modify_count = non_negative(read_i32(r)?, what)?;
    let modify_date = read_i64(r)?;
    Ok(Tracked::from_parts(name, modify_count, modify_date))
}

pub(crate) fn write_algorithm<T>(
    w: &mut Vec<u8>,
    name: &str,
    tracked: &Tracked<T>,
) -> Result<(), PersistError> {
    write_str(w, name)?;
    w.write_i32::<BigEndian>(tracked.modify_count() as i32)?;
    w.write_i64::<BigEndian>(tracked.modify_date())?;
    Ok(())
}

/// `bits: i64, modify_count: i32, modify_date: i64`
pub(crate) fn read_entropy(r: &mut Reader, what: &str) -> Result<Tracked<u64>, PersistError> {
    let bits = read_i64(r)?;
    let bits = u64::try_from(bits)
        .map_err(|_| PersistError::InvalidState(format!("negative {what}: {bits}")))?;
    let modify_count = non_negative(read_i32(r)?, what)?;
    let modify_date = read_i64(r)?;
    Ok(Tracked::from_parts(bits, modify_count, modify_date))
}

pub(crate) fn write_entropy(w: &mut Vec<u8>, bits: &Tracked<u64>) -> Result<(), PersistError> {
    w.write_i64::<BigEndian>(bits.value() as i64)?;
    w.write_i32::<BigEndian>(bits.modify_count() as i32)?;
    w.write_i64::<BigEndian>(bits.modify_date())?;
    Ok(())
}

/// `hash_x: i32, hash_y: i32`
pub(crate) fn read_cursors(r: &mut Reader) -> Result<(usize, usize), PersistError> {
    let x = non_negative(read_i32(r)?, "hash_x")?;
    let y = non_negative(read_i32(r)?, "hash_y")?;
    Ok((x as usize, y as usize))
}

pub(crate) fn write_cursors(w: &mut Vec<u8>, pool: &EntropyPool) -> Result<(), PersistError> {
    w.write_i32::<BigEndian>(pool.hash_x() as i32)?;
    w.write_i32::<BigEndian>(pool.hash_y() as i32)?;
    Ok(())
}

/// `length: i32, bytes`
pub(crate) fn read_buffer(r: &mut Reader) -> Result<Zeroizing<Vec<u8>>, PersistError> {
    let len = non_negative(read_i32(r)?, "pool length")? as usize;
    // Bound the allocation by what is actually left in the stream.
    let remaining = r.get_ref().len() - r.position() as usize;
    if len > remaining {
        return Err(PersistError::Truncated);
    }
    let mut buffer = Zeroizing::new(vec![0u8; len]);
    r.read_exact(&mut buffer).map_err(PersistError::from_read)?;
    Ok(buffer)
}

pub(crate) fn write_buffer(w: &mut Vec<u8>, pool: &EntropyPool) -> Result<(), PersistError> {
    let bytes = pool.buffer();
    w.write_i32::<BigEndian>(bytes.len() as i32)?;
    w.extend_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_display() {
        assert_eq!(CURRENT_VERSION.to_string(), "2.0 Alpha (r1)");
        let rc = Version::new(3, 1, Release::ReleaseCandidate, 7);
        assert_eq!(rc.to_string(), "3.1 RC (r7)");
    }

    #[test]
    fn test_release_bytes_round_trip() {
        for release in [
            Release::Stable,
            Release::ReleaseCandidate,
            Release::Beta,
            Release::Alpha,
            Release::Milestone,
            Release::Development,
        ] {
            assert_eq!(Release::from_byte(release.to_byte()).unwrap(), release);
        }
        assert!(matches!(
            Release::from_byte(0x42),
            Err(PersistError::UnknownRelease(0x42))
        ));
    }

    #[test]
    fn test_check_supported() {
        assert!(CURRENT_VERSION.check_supported().is_ok());
        let old = Version::new(1, 9, Release::Stable, 0);
        assert!(matches!(
            old.check_supported(),
            Err(PersistError::UnsupportedVersion { reason: "too old", .. })
        ));
        let new = Version::new(3, 0, Release::Stable, 0);
        assert!(matches!(
            new.check_supported(),
            Err(PersistError::UnsupportedVersion { reason: "too new", .. })
        ));
    }

    #[test]
    fn test_detect_layout() {
        let mut tagged = MAGIC.to_vec();
        tagged.extend_from_slice(&[0, 0, b' ', 0, 0]);
        assert_eq!(detect_layout(&tagged).unwrap(), Layout::Tagged);

        let mut fixed = MAGIC.to_vec();
        write_str(&mut fixed, TITLE).unwrap();
        assert_eq!(detect_layout(&fixed).unwrap(), Layout::Fixed);

        assert!(matches!(
            detect_layout(b"NOTAPOOLFILE....."),
            Err(PersistError::InvalidHeader)
        ));
        assert!(matches!(
            detect_layout(b"ENTROPYPOOL"),
            Err(PersistError::Truncated)
        ));
    }

    #[test]
    fn test_str_round_trip_and_errors() {
        let mut buf = Vec::new();
        write_str(&mut buf, "Keccak-512").unwrap();
        assert_eq!(&buf[..2], &[0, 10]);
        let mut r = Cursor::new(buf.as_slice());
        assert_eq!(read_str(&mut r).unwrap(), "Keccak-512");

        let mut r = Cursor::new(&[0u8, 5, b'a'][..]);
        assert!(matches!(read_str(&mut r), Err(PersistError::Truncated)));

        let mut r = Cursor::new(&[0u8, 1, 0xFF][..]);
        assert!(matches!(read_str(&mut r), Err(PersistError::Corrupt(_))));

        let long = "x".repeat(70_000);
        assert!(write_str(&mut Vec::new(), &long).is_err());
    }

    #[test]
    fn test_negative_fields_are_invalid_state() {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(-1).unwrap();
        buf.write_i64::<BigEndian>(0).unwrap();
        let mut r = Cursor::new(buf.as_slice());
        assert!(matches!(
            read_count(&mut r, "mix count"),
            Err(PersistError::InvalidState(_))
        ));

        let mut buf = Vec::new();
        buf.write_i64::<BigEndian>(-8).unwrap();
        let mut r = Cursor::new(buf.as_slice());
        assert!(matches!(
            read_entropy(&mut r, "injected entropy"),
            Err(PersistError::InvalidState(_))
        ));
    }

    #[test]
    fn test_buffer_length_beyond_stream_is_truncated() {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(i32::MAX).unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        let mut r = Cursor::new(buf.as_slice());
        assert!(matches!(read_buffer(&mut r), Err(PersistError::Truncated)));
    }
}
