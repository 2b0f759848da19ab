use std::io::Write;

use entropypool_core::PoolConfig;

use super::CommandResult;

pub fn run(out: &mut dyn Write) -> CommandResult {
    let json = serde_json::to_string_pretty(&PoolConfig::default())?;
    writeln!(out, "{json}")?;
    Ok(())
}
