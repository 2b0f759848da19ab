use std::io::Write;
use std::path::{Path, PathBuf};

use entropypool_core::{
    DefaultFactory, EntropyPool, Layout, PoolConfig, PoolPaths, SaveOptions, save_to_paths,
};

use super::{CommandError, CommandResult};

pub struct CreateArgs {
    pub config: Option<PathBuf>,
    pub size: Option<usize>,
    pub secure_random: Option<String>,
    pub digest: Option<String>,
    pub cipher: Option<String>,
    pub fallback: bool,
    pub force: bool,
    pub layout: Layout,
    pub comment: Option<String>,
}

impl CreateArgs {
    fn pool_config(&self) -> CommandResult<PoolConfig> {
        let mut config = match &self.config {
            Some(path) => PoolConfig::from_json_file(path)?,
            None => PoolConfig::default(),
        };
        if let Some(size) = self.size {
            config.size = size;
        }
        if let Some(name) = &self.secure_random {
            config.secure_random.clone_from(name);
        }
        if let Some(name) = &self.digest {
            config.digest.clone_from(name);
        }
        if let Some(name) = &self.cipher {
            config.cipher.clone_from(name);
        }
        config.fallback_to_defaults |= self.fallback;
        Ok(config)
    }
}

pub fn run(path: &Path, args: &CreateArgs, out: &mut dyn Write) -> CommandResult {
    let paths = PoolPaths::for_pool(path);
    if !args.force && paths.canonical.exists() {
        return Err(CommandError::Exists(paths.canonical));
    }

    let config = args.pool_config()?;
    let mut pool = EntropyPool::from_config(&config, &DefaultFactory)?;
    let options = SaveOptions {
        layout: args.layout,
        comment: args.comment.clone(),
    };
    save_to_paths(&mut pool, &paths, &options)?;

    log::info!("created {} ({} layout)", path.display(), args.layout);
    writeln!(out, "created {}: {}", path.display(), pool.summary())?;
    Ok(())
}

#[cfg(test)]
impl CreateArgs {
    /// A 512-byte SHA-256/AES pool, quick to mix.
    pub(crate) fn small(layout: Layout) -> Self {
        Self {
            config: None,
            size: Some(512),
            secure_random: None,
            digest: Some("SHA-256".into()),
            cipher: Some("AES".into()),
            fallback: false,
            force: false,
            layout,
            comment: None,
        }
    }
}
