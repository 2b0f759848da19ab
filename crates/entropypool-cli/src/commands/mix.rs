use std::io::Write;
use std::path::Path;
use std::time::Duration;

use super::{CommandResult, OpenPool};

pub fn run(path: &Path, rounds: u32, out: &mut dyn Write) -> CommandResult {
    let mut open = OpenPool::load(path)?;
    let mut elapsed = Duration::ZERO;
    for _ in 0..rounds {
        elapsed += open.pool.mix()?.total();
    }
    open.save(path)?;

    writeln!(
        out,
        "mixed {rounds} times in {elapsed:?} (pool mixed {} times in total)",
        open.pool.mix_count().get()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::create;
    use entropypool_core::Layout;

    #[test]
    fn test_mix_rounds_are_counted_and_saved() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pool.bin");
        create::run(&path, &create::CreateArgs::small(Layout::Fixed), &mut Vec::new()).unwrap();

        let mut out = Vec::new();
        run(&path, 3, &mut out).unwrap();
        run(&path, 2, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("mixed 3 times"));
        assert!(text.contains("pool mixed 5 times in total"));

        let open = OpenPool::load(&path).unwrap();
        assert_eq!(open.pool.mix_count().get(), 5);
        assert_eq!(open.pool.available_entropy_bits(), 0);
    }

    #[test]
    fn test_zero_rounds_still_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pool.bin");
        create::run(&path, &create::CreateArgs::small(Layout::Tagged), &mut Vec::new()).unwrap();
        run(&path, 0, &mut Vec::new()).unwrap();
        let open = OpenPool::load(&path).unwrap();
        assert_eq!(open.pool.mix_count().get(), 0);
        assert_eq!(open.pool.access_count().get(), 2);
    }
}
