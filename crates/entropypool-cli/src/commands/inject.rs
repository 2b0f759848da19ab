use std::io::Write;
use std::path::{Path, PathBuf};

use entropypool_core::{EntropyPool, FeedReport, SaveOptions, inject_path};

use super::{CommandError, CommandResult, OpenPool};

pub fn run(path: &Path, inputs: &[PathBuf], out: &mut dyn Write) -> CommandResult {
    let mut open = match OpenPool::load(path) {
        Ok(open) => open,
        Err(CommandError::NoPool(_)) => {
            log::info!("no pool at {}, creating a default one", path.display());
            OpenPool {
                pool: EntropyPool::with_defaults()?,
                options: SaveOptions::default(),
            }
        }
        Err(e) => return Err(e),
    };

    let mut total = FeedReport::default();
    for input in inputs {
        total += inject_path(&mut open.pool, input)?;
    }
    open.save(path)?;

    writeln!(
        out,
        "injected {} bytes from {} files ({} skipped), {} mixes",
        total.bytes, total.files, total.skipped, total.mixes
    )?;
    writeln!(out, "{}", open.pool.summary())?;
    Ok(())
}
