//! `refetch config` – show where the config lives and what it resolves to.

use anyhow::Result;
use refetch_core::config::{self, RefetchConfig};
use std::path::Path;

pub fn run_config(explicit: Option<&Path>, cfg: &RefetchConfig) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
