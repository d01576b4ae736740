use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::executor::DEFAULT_CHUNK_SIZE;
use crate::network::CurlOptions;
use crate::size_guard::{WIFI_CONFIG_MAX_BYTES, WIFI_CONFIG_MIME_TYPE};

fn default_directly_open() -> BTreeMap<String, u64> {
    let mut m = BTreeMap::new();
    m.insert(WIFI_CONFIG_MIME_TYPE.to_string(), WIFI_CONFIG_MAX_BYTES);
    m
}

/// Global configuration loaded from `~/.config/cpdl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpdlConfig {
    /// Bytes read per loop iteration (cancellation and progress granularity).
    pub chunk_size: usize,
    /// User-Agent sent when a request does not carry one.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Connection tuning for the curl network.
    #[serde(default)]
    pub curl: CurlOptions,
    /// "Directly open" MIME types and their maximum size in bytes.
    #[serde(default = "default_directly_open")]
    pub directly_open: BTreeMap<String, u64>,
}

impl Default for CpdlConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            user_agent: None,
            curl: CurlOptions::default(),
            directly_open: default_directly_open(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("cpdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CpdlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = CpdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CpdlConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
