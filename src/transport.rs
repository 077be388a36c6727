//! The shared upstream HTTP client.
//!
//! Built exactly once at startup from [`Config`]; a change of upstream proxy
//! requires a restart.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::Config;

/// Idle connections kept per upstream host.
const POOL_MAX_IDLE_PER_HOST: usize = 10;
/// Idle connections are evicted after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound on TCP connect plus SOCKS5 negotiation.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How upstream connections are established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "address", rename_all = "lowercase")]
pub enum TransportMode {
    Direct,
    Socks5(String),
}

impl TransportMode {
    pub fn from_config(config: &Config) -> Self {
        match config.socks5() {
            Some(addr) => Self::Socks5(addr.to_owned()),
            None => Self::Direct,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Socks5(addr) => write!(f, "socks5://{addr}"),
        }
    }
}

/// Build the pooled client used for every upstream request.
///
/// Redirects are handed back to the client untouched, and proxy settings
/// from the environment are ignored so that only the config decides the
/// route.
pub fn build_client(mode: &TransportMode) -> Result<reqwest::Client> {
    let builder = reqwest::Client::builder()
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none());

    let builder = match mode {
        TransportMode::Direct => builder.no_proxy(),
        TransportMode::Socks5(addr) => {
            // socks5h: hostnames are resolved by the proxy.
            let proxy = reqwest::Proxy::all(format!("socks5h://{addr}"))
                .with_context(|| format!("invalid SOCKS5 proxy address: {addr}"))?;
            builder.proxy(proxy)
        }
    };

    builder.build().context("failed to build upstream HTTP client")
}
