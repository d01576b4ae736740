//! `cpdl config` – show config path and effective values.

use anyhow::Result;
use cpdl_core::config::{self, CpdlConfig};

pub fn run_config(cfg: &CpdlConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
