use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_HEDERA_MIRROR_URL: &str = "https://mainnet-public.mirrornode.hedera.com/api/v1";
pub const DEFAULT_BLOCKBERRY_URL: &str = "https://api.blockberry.one/sui/v1";
pub const DEFAULT_SUI_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";
pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// Everything the server needs, read once at start-up
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub hedera_mirror_url: String,
    pub hedera_api_key: Option<String>,
    pub blockberry_url: String,
    pub blockberry_api_key: Option<String>,
    pub sui_rpc_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
    pub ai_timeout: Duration,
    pub http_timeout: Duration,
    pub name_cache_capacity: usize,
    pub name_cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            hedera_mirror_url: DEFAULT_HEDERA_MIRROR_URL.to_string(),
            hedera_api_key: None,
            blockberry_url: DEFAULT_BLOCKBERRY_URL.to_string(),
            blockberry_api_key: None,
            sui_rpc_url: DEFAULT_SUI_RPC_URL.to_string(),
            gemini_api_key: None,
            gemini_api_url: DEFAULT_GEMINI_API_URL.to_string(),
            ai_timeout: Duration::from_secs(20),
            http_timeout: Duration::from_secs(15),
            name_cache_capacity: 10_000,
            name_cache_ttl: Duration::from_secs(3_600),
        }
    }
}

impl Config {
    /// Reads the process environment, falling back to mainnet defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Config {
            bind_addr: parse_or(&text, "BIND_ADDR", defaults.bind_addr)?,
            hedera_mirror_url: text("HEDERA_MIRROR_URL").unwrap_or(defaults.hedera_mirror_url),
            hedera_api_key: text("HEDERA_API_KEY"),
            blockberry_url: text("BLOCKBERRY_URL").unwrap_or(defaults.blockberry_url),
            blockberry_api_key: text("BLOCKBERRY_API_KEY"),
            sui_rpc_url: text("SUI_RPC_URL").unwrap_or(defaults.sui_rpc_url),
            gemini_api_key: text("GOOGLE_GEMINI_API_KEY"),
            gemini_api_url: text("GEMINI_API_URL").unwrap_or(defaults.gemini_api_url),
            ai_timeout: Duration::from_secs(parse_or(&text, "AI_TIMEOUT_SECS", 20u64)?),
            http_timeout: Duration::from_secs(parse_or(&text, "HTTP_TIMEOUT_SECS", 15u64)?),
            name_cache_capacity: parse_or(&text, "NAME_CACHE_CAPACITY", defaults.name_cache_capacity)?,
            name_cache_ttl: Duration::from_secs(parse_or(&text, "NAME_CACHE_TTL_SECS", 3_600u64)?),
        })
    }
}

fn parse_or<T, F>(text: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match text(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}
