use std::io::Write;
use std::path::Path;

use super::{CommandResult, OpenPool, OutputFormat, to_hex};

pub fn run(path: &Path, bytes: u32, format: OutputFormat, out: &mut dyn Write) -> CommandResult {
    let mut open = OpenPool::load(path)?;
    let output = open.pool.extract(bytes)?;
    // Nothing is printed until the advanced state is on disk.
    open.save(path)?;

    match format {
        OutputFormat::Hex => writeln!(out, "{}", to_hex(&output))?,
        OutputFormat::Raw => {
            out.write_all(&output)?;
            out.flush()?;
        }
    }
    log::info!(
        "extracted {bytes} bytes, {} bits left",
        open.pool.available_entropy_bits()
    );
    Ok(())
}
