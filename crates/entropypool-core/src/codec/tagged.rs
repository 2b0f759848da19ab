//! Tagged layout: self-describing records in any order.

use std::collections::BTreeMap;
use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use super::{
    CURRENT_VERSION, Header, Layout, LoadWarning, PoolImage, Reader, TAG_LENGTH, TITLE, Version,
    is_padding, read_algorithm, read_buffer, read_count, read_cursors, read_entropy, read_i64,
    read_str, read_version, write_algorithm, write_buffer, write_count, write_cursors,
    write_entropy, write_str, write_version,
};
use crate::error::PersistError;
use crate::pool::EntropyPool;

const ENTROPYPOOL: &str = "ENTROPYPOOL";
const VERSION: &str = "VERSION";
const COMMENT: &str = "COMMENT";
const DATE: &str = "DATE";
const COUNT: &str = "COUNT";
const SECURERANDOM: &str = "SECURERANDOM";
const MESSAGEDIGEST: &str = "MESSAGEDIGEST";
const CIPHER: &str = "CIPHER";
const ENTROPY: &str = "ENTROPY";
const HASH: &str = "HASH";
const POOL: &str = "POOL";

const KNOWN_TAGS: &[&str] = &[
    ENTROPYPOOL,
    VERSION,
    COMMENT,
    DATE,
    COUNT,
    SECURERANDOM,
    MESSAGEDIGEST,
    CIPHER,
    ENTROPY,
    HASH,
    POOL,
];

/// Length of the record prefix: tag plus payload length.
const RECORD_HEADER: usize = TAG_LENGTH + 4;

fn required_tags(version: Version) -> &'static [&'static str] {
    match version.major {
        2 => &[
            ENTROPYPOOL,
            VERSION,
            DATE,
            COUNT,
            SECURERANDOM,
            MESSAGEDIGEST,
            CIPHER,
            ENTROPY,
            HASH,
            POOL,
        ],
        _ => &[ENTROPYPOOL, VERSION],
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

pub(super) fn encode(
    pool: &EntropyPool,
    comment: Option<&str>,
    out: &mut Vec<u8>,
) -> Result<(), PersistError> {
    record(out, ENTROPYPOOL, |w| write_str(w, TITLE))?;
    record(out, VERSION, |w| write_version(w, CURRENT_VERSION))?;
    if let Some(comment) = comment {
        record(out, COMMENT, |w| write_str(w, comment))?;
    }
    record(out, DATE, |w| {
        w.write_i64::<BigEndian>(pool.created_at())?;
        Ok(())
    })?;
    record(out, COUNT, |w| {
        write_count(w, pool.access_count())?;
        write_count(w, pool.mix_count())
    })?;
    record(out, SECURERANDOM, |w| {
        write_algorithm(w, pool.secure_random().get().name(), pool.secure_random())
    })?;
    record(out, MESSAGEDIGEST, |w| {
        write_algorithm(w, pool.digest().get().name(), pool.digest())
    })?;
    record(out, CIPHER, |w| {
        write_algorithm(w, pool.cipher().get().name(), pool.cipher())
    })?;
    record(out, ENTROPY, |w| {
        write_entropy(w, pool.injected_entropy())?;
        write_entropy(w, pool.extracted_entropy())
    })?;
    record(out, HASH, |w| write_cursors(w, pool))?;
    record(out, POOL, |w| write_buffer(w, pool))
}

/// Append one record: tag, payload length, payload, padding.
fn record(
    out: &mut Vec<u8>,
    tag: &str,
    payload: impl FnOnce(&mut Vec<u8>) -> Result<(), PersistError>,
) -> Result<(), PersistError> {
    let mut name = [0u8; TAG_LENGTH];
    name[..tag.len()].copy_from_slice(tag.as_bytes());
    out.extend_from_slice(&name);

    let len_at = out.len();
    out.write_u32::<BigEndian>(0)?;
    let start = out.len();
    payload(out)?;
    let len = u32::try_from(out.len() - start)
        .map_err(|_| PersistError::Corrupt(format!("{tag} payload too large")))?;
    BigEndian::write_u32(&mut out[len_at..start], len);

    let padded = out.len().next_multiple_of(TAG_LENGTH);
    out.resize(padded, 0);
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Read the next record, or `None` at a clean end of stream.
fn next_record<'a>(r: &mut Reader<'a>) -> Result<Option<(String, &'a [u8])>, PersistError> {
    let data: &'a [u8] = *r.get_ref();
    let pos = r.position() as usize;
    if pos >= data.len() {
        return Ok(None);
    }
    if data.len() - pos < RECORD_HEADER {
        return Err(PersistError::Truncated);
    }

    let tag = parse_tag(&data[pos..pos + TAG_LENGTH])?;
    let len = BigEndian::read_u32(&data[pos + TAG_LENGTH..pos + RECORD_HEADER]) as usize;
    let start = pos + RECORD_HEADER;
    let end = start.checked_add(len).ok_or(PersistError::Truncated)?;
    let padded_end = end.next_multiple_of(TAG_LENGTH);
    if padded_end > data.len() {
        return Err(PersistError::Truncated);
    }
    if !data[end..padded_end].iter().all(|&b| is_padding(b)) {
        return Err(PersistError::Corrupt(format!(
            "non-padding bytes after {tag} record"
        )));
    }

    r.set_position(padded_end as u64);
    Ok(Some((tag, &data[start..end])))
}

fn parse_tag(raw: &[u8]) -> Result<String, PersistError> {
    let end = raw
        .iter()
        .rposition(|&b| !is_padding(b))
        .map_or(0, |i| i + 1);
    let name = &raw[..end];
    if name.is_empty() || !name.iter().all(|b| b.is_ascii_graphic()) {
        return Err(PersistError::Corrupt(format!(
            "malformed tag at record boundary: {raw:02x?}"
        )));
    }
    Ok(String::from_utf8_lossy(name).into_owned())
}

/// Decode a payload with `read`, which must consume all of it.
fn parse_payload<'a, T>(
    tag: &str,
    payload: &'a [u8],
    read: impl FnOnce(&mut Reader<'a>) -> Result<T, PersistError>,
) -> Result<T, PersistError> {
    let mut r = Cursor::new(payload);
    let value = read(&mut r).map_err(|e| match e {
        PersistError::Truncated => PersistError::Corrupt(format!("{tag} payload too short")),
        other => other,
    })?;
    let left = payload.len() - r.position() as usize;
    if left > 0 {
        return Err(PersistError::Corrupt(format!(
            "{tag} payload has {left} unexpected bytes"
        )));
    }
    Ok(value)
}

fn first_missing(seen: &BTreeMap<String, &[u8]>, version: Version) -> Option<&'static str> {
    required_tags(version)
        .iter()
        .copied()
        .find(|tag| !seen.contains_key(*tag))
}

/// Collect records until every tag required by the declared version is
/// present. Returns the raw payloads by tag.
fn collect<'a>(
    r: &mut Reader<'a>,
    warnings: &mut Vec<LoadWarning>,
) -> Result<(Version, BTreeMap<String, &'a [u8]>), PersistError> {
    let mut seen: BTreeMap<String, &'a [u8]> = BTreeMap::new();
    let mut version: Option<Version> = None;

    loop {
        if let Some(v) = version {
            if first_missing(&seen, v).is_none() {
                return Ok((v, seen));
            }
        }

        let Some((tag, payload)) = next_record(r)? else {
            let missing = match version {
                Some(v) => first_missing(&seen, v).unwrap_or(VERSION),
                None => VERSION,
            };
            return Err(PersistError::MissingTag { tag: missing });
        };

        if let Some(previous) = seen.get(&tag) {
            if *previous != payload {
                return Err(PersistError::DuplicateTag { tag });
            }
            log::debug!("tag {tag} repeated with identical value");
            continue;
        }

        if !KNOWN_TAGS.contains(&tag.as_str()) {
            let warning = LoadWarning::UnknownTag(tag);
            log::warn!("{warning}");
            warnings.push(warning);
            continue;
        }

        if tag == VERSION {
            let v = parse_payload(VERSION, payload, read_version)?;
            v.check_supported()?;
            version = Some(v);
        }
        log::trace!("tag {tag}: {} byte payload", payload.len());
        seen.insert(tag, payload);
    }
}

fn payload<'a>(seen: &BTreeMap<String, &'a [u8]>, tag: &'static str) -> Result<&'a [u8], PersistError> {
    seen.get(tag)
        .copied()
        .ok_or(PersistError::MissingTag { tag })
}

pub(super) fn read_header(r: &mut Reader) -> Result<Header, PersistError> {
    let mut title = None;
    while let Some((tag, payload)) = next_record(r)? {
        match tag.as_str() {
            ENTROPYPOOL => title = Some(parse_payload(ENTROPYPOOL, payload, read_str)?),
            VERSION => {
                let version = parse_payload(VERSION, payload, read_version)?;
                return Ok(Header {
                    layout: Layout::Tagged,
                    title: title.unwrap_or_default(),
                    version,
                });
            }
            _ => {}
        }
    }
    Err(PersistError::MissingTag { tag: VERSION })
}

pub(super) fn decode(
    r: &mut Reader,
    warnings: &mut Vec<LoadWarning>,
) -> Result<(Header, Option<String>, PoolImage), PersistError> {
    let (version, seen) = collect(r, warnings)?;

    let title = parse_payload(ENTROPYPOOL, payload(&seen, ENTROPYPOOL)?, read_str)?;
    let comment = match seen.get(COMMENT) {
        Some(p) => Some(parse_payload(COMMENT, p, read_str)?),
        None => None,
    };
    let created_at = parse_payload(DATE, payload(&seen, DATE)?, read_i64)?;
    let (access_count, mix_count) = parse_payload(COUNT, payload(&seen, COUNT)?, |r| {
        Ok((read_count(r, "access count")?, read_count(r, "mix count")?))
    })?;
    let secure_random = parse_payload(SECURERANDOM, payload(&seen, SECURERANDOM)?, |r| {
        read_algorithm(r, "secure random modify count")
    })?;
    let digest = parse_payload(MESSAGEDIGEST, payload(&seen, MESSAGEDIGEST)?, |r| {
        read_algorithm(r, "message digest modify count")
    })?;
    let cipher = parse_payload(CIPHER, payload(&seen, CIPHER)?, |r| {
        read_algorithm(r, "cipher modify count")
    })?;
    let (injected, extracted) = parse_payload(ENTROPY, payload(&seen, ENTROPY)?, |r| {
        Ok((
            read_entropy(r, "injected entropy")?,
            read_entropy(r, "extracted entropy")?,
        ))
    })?;
    let (hash_x, hash_y) = parse_payload(HASH, payload(&seen, HASH)?, read_cursors)?;
    let buffer = parse_payload(POOL, payload(&seen, POOL)?, read_buffer)?;

    let header = Header {
        layout: Layout::Tagged,
        title,
        version,
    };
    let image = PoolImage {
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
        buffer,
    };
    Ok((header, comment, image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Release;

    fn record_bytes(tag: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        record(&mut out, tag, |w| {
            w.extend_from_slice(payload);
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn test_record_is_padded_to_tag_length() {
        let out = record_bytes("DATE", &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(out.len(), 32);
        assert_eq!(&out[..4], b"DATE");
        assert!(out[4..16].iter().all(|&b| b == 0));
        assert_eq!(&out[16..20], &[0, 0, 0, 8]);
        assert_eq!(&out[20..28], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(out[28..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_next_record_reads_back_payload() {
        let mut stream = record_bytes("COMMENT", b"abc");
        stream.extend(record_bytes("HASH", &[0; 8]));
        let mut r = Cursor::new(stream.as_slice());
        let (tag, payload) = next_record(&mut r).unwrap().unwrap();
        assert_eq!(tag, "COMMENT");
        assert_eq!(payload, b"abc");
        let (tag, payload) = next_record(&mut r).unwrap().unwrap();
        assert_eq!(tag, "HASH");
        assert_eq!(payload.len(), 8);
        assert!(next_record(&mut r).unwrap().is_none());
    }

    #[test]
    fn test_space_padded_tag_is_accepted() {
        let mut stream = b"HASH            ".to_vec();
        stream.extend_from_slice(&[0, 0, 0, 0]);
        stream.extend_from_slice(&[b' '; 12]);
        let mut r = Cursor::new(stream.as_slice());
        let (tag, payload) = next_record(&mut r).unwrap().unwrap();
        assert_eq!(tag, "HASH");
        assert!(payload.is_empty());
    }

    #[test]
    fn test_record_cut_short_is_truncated() {
        let stream = record_bytes("POOL", &[9; 40]);
        let mut r = Cursor::new(&stream[..50]);
        assert!(matches!(next_record(&mut r), Err(PersistError::Truncated)));
        let mut r = Cursor::new(&stream[..10]);
        assert!(matches!(next_record(&mut r), Err(PersistError::Truncated)));
    }

    #[test]
    fn test_garbage_padding_is_corrupt() {
        let mut stream = record_bytes("DATE", &[0; 8]);
        let last = stream.len() - 1;
        stream[last] = 0x7F;
        let mut r = Cursor::new(stream.as_slice());
        assert!(matches!(next_record(&mut r), Err(PersistError::Corrupt(_))));
    }

    #[test]
    fn test_blank_tag_is_corrupt() {
        assert!(parse_tag(&[0u8; TAG_LENGTH]).is_err());
        assert!(parse_tag(b"BAD\x01TAG\0\0\0\0\0\0\0\0\0").is_err());
    }

    #[test]
    fn test_payload_must_be_fully_consumed() {
        let err = parse_payload(DATE, &[0u8; 9], read_i64).unwrap_err();
        assert!(matches!(err, PersistError::Corrupt(_)));
        let err = parse_payload(DATE, &[0u8; 4], read_i64).unwrap_err();
        assert!(matches!(err, PersistError::Corrupt(_)));
    }

    #[test]
    fn test_header_found_after_leading_records() {
        let mut title = Vec::new();
        write_str(&mut title, TITLE).unwrap();
        let mut version = Vec::new();
        write_version(&mut version, CURRENT_VERSION).unwrap();

        let mut stream = record_bytes(ENTROPYPOOL, &title);
        stream.extend(record_bytes(COMMENT, &title));
        stream.extend(record_bytes(VERSION, &version));
        let header = read_header(&mut Cursor::new(stream.as_slice())).unwrap();
        assert_eq!(header.title, TITLE);
        assert_eq!(header.version, CURRENT_VERSION);
        assert_eq!(header.layout, Layout::Tagged);
    }

    #[test]
    fn test_stream_without_version_is_missing_tag() {
        let stream = record_bytes(ENTROPYPOOL, &[0, 0]);
        let mut warnings = Vec::new();
        let err = collect(&mut Cursor::new(stream.as_slice()), &mut warnings).unwrap_err();
        assert!(matches!(err, PersistError::MissingTag { tag: "VERSION" }));
    }

    #[test]
    fn test_conflicting_duplicate_is_rejected() {
        let mut stream = record_bytes(ENTROPYPOOL, &[0, 0]);
        stream.extend(record_bytes(DATE, &[0; 8]));
        stream.extend(record_bytes(DATE, &[1; 8]));
        let mut warnings = Vec::new();
        let err = collect(&mut Cursor::new(stream.as_slice()), &mut warnings).unwrap_err();
        assert!(matches!(err, PersistError::DuplicateTag { ref tag } if tag == "DATE"));
    }

    #[test]
    fn test_identical_duplicate_is_accepted() {
        let mut version = Vec::new();
        write_version(&mut version, CURRENT_VERSION).unwrap();
        let mut stream = record_bytes(ENTROPYPOOL, &[0, 0]);
        stream.extend(record_bytes(VERSION, &version));
        stream.extend(record_bytes(DATE, &[7; 8]));
        stream.extend(record_bytes(VERSION, &version));
        stream.extend(record_bytes(DATE, &[7; 8]));
        for tag in [COUNT, SECURERANDOM, MESSAGEDIGEST, CIPHER, ENTROPY, HASH, POOL] {
            stream.extend(record_bytes(tag, &[1, 2, 3]));
        }

        let mut warnings = Vec::new();
        let (v, seen) = collect(&mut Cursor::new(stream.as_slice()), &mut warnings).unwrap();
        assert_eq!(v, CURRENT_VERSION);
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[DATE], &[7u8; 8][..]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unsupported_version_stops_collection() {
        let mut version = Vec::new();
        write_version(&mut version, Version::new(1, 0, Release::Stable, 0)).unwrap();
        let mut stream = record_bytes(ENTROPYPOOL, &[0, 0]);
        stream.extend(record_bytes(VERSION, &version));
        let mut warnings = Vec::new();
        let err = collect(&mut Cursor::new(stream.as_slice()), &mut warnings).unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedVersion { .. }));
    }
}
