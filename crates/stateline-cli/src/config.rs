//! Layered configuration: an optional `stateline.toml` file supplies the
//! base [`Settings`], CLI flags override individual fields on top of it
//! (spec §6).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use stateline_engine::Settings;

use crate::Cli;

pub fn load(config_path: Option<&Path>) -> Result<Settings> {
    match config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
        }
        None => Ok(Settings::default()),
    }
}

/// Applies the CLI's optional overrides onto `settings`. Only flags the
/// user actually passed (`Some`/`true`) take effect; everything else keeps
/// whatever the config file (or the `Settings` default) already set.
pub fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(n) = cli.nstacks {
        settings.nstacks = n;
    }
    if let Some(n) = cli.nchains {
        settings.nchains = n;
    }
    if let Some(n) = cli.ndims {
        settings.ndims = n;
    }
    if let Some(path) = &cli.database_path {
        settings.chain_store.database_path = path.clone();
    }
    if cli.recover {
        settings.chain_store.recover_from_disk = true;
    }
    if let Some(interval) = cli.swap_interval {
        settings.sampler.swap_interval = interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_path_falls_back_to_defaults() {
        let settings = load(None).unwrap();
        assert_eq!(settings.nstacks, Settings::default().nstacks);
    }
}
