//! Configuration loading and root folder resolution
//!
//! Every setting has a compiled default; a missing TOML file is logged and
//! ignored so a fresh checkout starts with zero configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the data folder
pub const ROOT_FOLDER_ENV: &str = "CASEAI_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "caseai.db";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub feed: FeedSection,
    pub providers: ProviderSection,
    pub responder: ResponderSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub max_connections: u32,
    /// Pool acquire bound; exceeding it fails the operation instead of queuing
    pub acquire_timeout_ms: u64,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 3000,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseSection {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSection {
    /// Liveness re-query interval while waiting for notifications
    pub poll_interval_ms: u64,
    /// Storage retries before the stream gives up
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    /// Buffered hints per notification channel
    pub channel_capacity: usize,
    pub keep_alive_secs: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            retry_attempts: 4,
            retry_base_ms: 100,
            channel_capacity: 64,
            keep_alive_secs: 15,
        }
    }
}

impl FeedSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff before retry number `attempt` (0-based), doubling each time
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub deepgram_base_url: String,
    /// Normally supplied through DEEPGRAM_API_KEY instead of the file
    pub deepgram_api_key: Option<String>,
    pub default_voice: String,
    pub synthesis_timeout_secs: u64,
    pub transcription_timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            deepgram_base_url: "https://api.deepgram.com".to_string(),
            deepgram_api_key: None,
            default_voice: "aura-asteria-en".to_string(),
            synthesis_timeout_secs: 15,
            transcription_timeout_secs: 30,
        }
    }
}

impl ProviderSection {
    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderSection {
    pub enabled: bool,
    pub reply_delay_ms: u64,
}

impl Default for ResponderSection {
    fn default() -> Self {
        Self {
            enabled: true,
            reply_delay_ms: 750,
        }
    }
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("caseai").join("caseai.toml"))
}

/// Load TOML configuration
///
/// An explicit path that does not exist is an error. The platform default
/// path is optional: when missing, defaults are used with a warning.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(Error::Config(format!("Config file not found: {}", p.display())));
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                warn!("No config file found, using compiled defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = parse_toml_config(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse configuration text
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default data folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("caseai"))
        .unwrap_or_else(|| PathBuf::from("./caseai_data"))
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}
