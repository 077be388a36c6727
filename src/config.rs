use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Process-wide settings, loaded once at startup and never mutated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Authors (`owner`) or repositories (`owner/repo`) that may be fetched.
    /// Empty allows everything not on the blacklist.
    #[serde(default, rename = "white_list")]
    pub whitelist: Vec<String>,
    /// Authors or repositories that are always refused.
    #[serde(default, rename = "black_list")]
    pub blacklist: Vec<String>,
    /// Responses declaring a larger `Content-Length` (in bytes) are not
    /// proxied; the client is redirected to GitHub instead.  `0` disables
    /// the check.
    #[serde(default)]
    pub size_limit: u64,
    /// SOCKS5 proxy (`host:port`) for all upstream connections.
    #[serde(default, rename = "socks5")]
    pub upstream_proxy: Option<String>,
}

impl Config {
    /// The configured SOCKS5 endpoint, treating an empty string as absent.
    pub fn socks5(&self) -> Option<&str> {
        self.upstream_proxy
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The enforced size ceiling, if any.
    pub fn size_limit(&self) -> Option<u64> {
        (self.size_limit > 0).then_some(self.size_limit)
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a JSON file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("failed to load config file: {}", path.display()))
}

/// Parse and validate a JSON config document.
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = serde_json::from_str(contents).context("invalid config JSON")?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    for entry in config.whitelist.iter().chain(&config.blacklist) {
        anyhow::ensure!(
            !entry.trim().is_empty(),
            "white_list/black_list entries must not be empty"
        );
        anyhow::ensure!(
            entry.split('/').all(|part| !part.is_empty()),
            "invalid list entry {entry:?}: expected `author` or `author/repo`"
        );
    }
    if let Some(addr) = config.socks5() {
        let (host, port) = addr
            .rsplit_once(':')
            .with_context(|| format!("socks5 address {addr:?} must be host:port"))?;
        anyhow::ensure!(!host.is_empty(), "socks5 address {addr:?} has no host");
        port.parse::<u16>()
            .with_context(|| format!("socks5 address {addr:?} has an invalid port"))?;
    }
    Ok(())
}
