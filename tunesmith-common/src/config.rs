//! Configuration loading and resolution
//!
//! Every key resolves through the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`TUNESMITH_*`)
//! 3. TOML config file (`~/.config/tunesmith/config.toml`)
//! 4. Compiled default (fallback)
//!
//! The provider API key has no compiled default and must be supplied by one
//! of the first three tiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable prefix for all gateway settings
pub const ENV_PREFIX: &str = "TUNESMITH_";

/// Default provider base URL (KIE.AI music generation API)
pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.kie.ai";

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5740";

/// Default poll interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default poll attempt budget
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;

/// Default timeout for provider submit/poll requests
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for audio asset downloads
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Raw TOML config file contents (all keys optional)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub api_key: Option<String>,
    pub provider_base_url: Option<String>,
    pub callback_url: Option<String>,
    pub listen_addr: Option<String>,
    pub db_path: Option<String>,
    pub audio_dir: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub poll_max_attempts: Option<u32>,
    pub force_vocals: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
}

/// Command-line overrides passed down from the binary's argument parser
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Explicit config file path (replaces the default lookup)
    pub config_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub listen_addr: Option<String>,
    pub callback_url: Option<String>,
    pub db_path: Option<String>,
    pub audio_dir: Option<String>,
}

/// Fully resolved gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Provider bearer token
    pub api_key: String,
    /// Provider base URL (no trailing slash)
    pub provider_base_url: String,
    /// Externally reachable callback URL; when absent the provider is not
    /// asked to call back and resolution relies on polling alone
    pub callback_url: Option<String>,
    /// HTTP listen address for the gateway itself
    pub listen_addr: String,
    /// SQLite database file path
    pub db_path: PathBuf,
    /// Directory for materialized audio assets
    pub audio_dir: PathBuf,
    /// Seconds between poll attempts for one task
    pub poll_interval_secs: u64,
    /// Poll attempts per task before giving up
    pub poll_max_attempts: u32,
    /// When true, override the caller's `instrumental` flag to `false`
    /// (always request vocals). Off by default.
    pub force_vocals: bool,
    /// Timeout for provider submit/poll requests
    pub request_timeout_secs: u64,
    /// Timeout for audio asset downloads
    pub download_timeout_secs: u64,
}

impl GatewayConfig {
    /// Resolve the full configuration from CLI overrides, environment,
    /// TOML file, and compiled defaults.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = load_toml_config(cli.config_path.as_deref())?;

        let api_key = cli
            .api_key
            .clone()
            .or_else(|| env_string("API_KEY"))
            .or_else(|| file.api_key.clone())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "Provider API key not configured. Supply one of:\n\
                     1. Command line: --api-key your-key\n\
                     2. Environment: TUNESMITH_API_KEY=your-key\n\
                     3. TOML config: ~/.config/tunesmith/config.toml (api_key = \"your-key\")"
                        .to_string(),
                )
            })?;

        let provider_base_url = env_string("PROVIDER_BASE_URL")
            .or_else(|| file.provider_base_url.clone())
            .unwrap_or_else(|| DEFAULT_PROVIDER_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let callback_url = cli
            .callback_url
            .clone()
            .or_else(|| env_string("CALLBACK_URL"))
            .or_else(|| file.callback_url.clone())
            .filter(|u| !u.trim().is_empty());

        let listen_addr = cli
            .listen_addr
            .clone()
            .or_else(|| env_string("LISTEN_ADDR"))
            .or_else(|| file.listen_addr.clone())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let db_path = cli
            .db_path
            .clone()
            .or_else(|| env_string("DB_PATH"))
            .or_else(|| file.db_path.clone())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let audio_dir = cli
            .audio_dir
            .clone()
            .or_else(|| env_string("AUDIO_DIR"))
            .or_else(|| file.audio_dir.clone())
            .map(PathBuf::from)
            .unwrap_or_else(default_audio_dir);

        let poll_interval_secs = env_parse("POLL_INTERVAL_SECS")
            .or(file.poll_interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .max(1);

        let poll_max_attempts = env_parse("POLL_MAX_ATTEMPTS")
            .or(file.poll_max_attempts)
            .unwrap_or(DEFAULT_POLL_MAX_ATTEMPTS)
            .max(1);

        let force_vocals = env_parse("FORCE_VOCALS")
            .or(file.force_vocals)
            .unwrap_or(false);

        let request_timeout_secs = env_parse("REQUEST_TIMEOUT_SECS")
            .or(file.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
            .max(1);

        let download_timeout_secs = env_parse("DOWNLOAD_TIMEOUT_SECS")
            .or(file.download_timeout_secs)
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS)
            .max(1);

        if callback_url.is_none() {
            warn!("No callback URL configured; task resolution relies on polling alone");
        }

        Ok(Self {
            api_key,
            provider_base_url,
            callback_url,
            listen_addr,
            db_path,
            audio_dir,
            poll_interval_secs,
            poll_max_attempts,
            force_vocals,
            request_timeout_secs,
            download_timeout_secs,
        })
    }
}

/// Read a string setting from the environment
fn env_string(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
}

/// Read and parse a setting from the environment, warning on parse failure
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}{}: {:?}", ENV_PREFIX, key, raw);
            None
        }
    }
}

/// Load the TOML config file, or defaults when no file exists.
///
/// An explicit path that cannot be read is an error; a missing default-path
/// file is not.
fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(TomlConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tunesmith").join("config.toml"))
}

/// OS-dependent default database path
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tunesmith").join("tunesmith.db"))
        .unwrap_or_else(|| PathBuf::from("./tunesmith.db"))
}

/// OS-dependent default audio directory
pub fn default_audio_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tunesmith").join("audio"))
        .unwrap_or_else(|| PathBuf::from("./tunesmith_audio"))
}
