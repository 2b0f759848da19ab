//! Fixed-order layout: every field once, in one order, no tags.

use std::io::Read;

use super::{
    CURRENT_VERSION, Header, Layout, MAGIC, PoolImage, Reader, TITLE, read_algorithm, read_buffer,
    read_count, read_cursors, read_entropy, read_i64, read_str, read_version, write_algorithm,
    write_buffer, write_count, write_cursors, write_entropy, write_str, write_version,
};
use crate::error::PersistError;
use crate::pool::EntropyPool;

pub(super) fn encode(pool: &EntropyPool, out: &mut Vec<u8>) -> Result<(), PersistError> {
    out.extend_from_slice(MAGIC);
    write_str(out, TITLE)?;
    write_version(out, CURRENT_VERSION)?;

    out.extend_from_slice(&pool.created_at().to_be_bytes());
    write_count(out, pool.access_count())?;
    write_algorithm(out, pool.secure_random().get().name(), pool.secure_random())?;
    write_algorithm(out, pool.digest().get().name(), pool.digest())?;
    write_algorithm(out, pool.cipher().get().name(), pool.cipher())?;
    write_entropy(out, pool.injected_entropy())?;
    write_entropy(out, pool.extracted_entropy())?;
    write_count(out, pool.mix_count())?;
    write_cursors(out, pool)?;
    write_buffer(out, pool)
}

pub(super) fn read_header(r: &mut Reader) -> Result<Header, PersistError> {
    let mut magic = [0u8; MAGIC.len()];
    r.read_exact(&mut magic).map_err(PersistError::from_read)?;
    if &magic != MAGIC {
        return Err(PersistError::InvalidHeader);
    }
    let title = read_str(r)?;
    let version = read_version(r)?;
    Ok(Header {
        layout: Layout::Fixed,
        title,
        version,
    })
}

pub(super) fn decode(r: &mut Reader) -> Result<(Header, PoolImage), PersistError> {
    let header = read_header(r)?;
    header.version.check_supported()?;

    let created_at = read_i64(r)?;
    let access_count = read_count(r, "access count")?;
    let secure_random = read_algorithm(r, "secure random modify count")?;
    let digest = read_algorithm(r, "message digest modify count")?;
    let cipher = read_algorithm(r, "cipher modify count")?;
    let injected = read_entropy(r, "injected entropy")?;
    let extracted = read_entropy(r, "extracted entropy")?;
    let mix_count = read_count(r, "mix count")?;
    let (hash_x, hash_y) = read_cursors(r)?;
    let buffer = read_buffer(r)?;

    Ok((
        header,
        PoolImage {
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
        },
    ))
}
