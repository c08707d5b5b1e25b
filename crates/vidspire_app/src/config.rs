//! Settings layering: built-in defaults, then `<state-dir>/vidspire.ron`,
//! then environment and command-line overrides.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use vidspire_engine::{ChannelSettings, EngineConfig};

pub const CONFIG_FILENAME: &str = "vidspire.ron";
pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("invalid {field} `{value}`: {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

/// Optional settings read from the config file. Anything left out keeps its
/// default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub socket_url: Option<String>,
    pub watchdog_ms: Option<u64>,
    pub max_poll_attempts: Option<u32>,
    pub usage_refresh_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

/// Values from the environment or flags; these win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub socket_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub engine: EngineConfig,
}

pub fn load(state_dir: &Path, overrides: Overrides) -> Result<Settings, ConfigError> {
    let file = read_file_config(&state_dir.join(CONFIG_FILENAME))?;
    resolve(state_dir, file, overrides)
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn resolve(
    state_dir: &Path,
    file: FileConfig,
    overrides: Overrides,
) -> Result<Settings, ConfigError> {
    let api_url = parse_url(
        "api url",
        overrides
            .api_url
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
    )?;
    let socket_url = parse_url(
        "socket url",
        overrides
            .socket_url
            .or(file.socket_url)
            .unwrap_or_else(|| DEFAULT_SOCKET_URL.to_string()),
    )?;

    let mut engine = EngineConfig::new(api_url, socket_url);
    let defaults = ChannelSettings::default();
    engine.channel.watchdog = file
        .watchdog_ms
        .map(|ms| non_zero("watchdog_ms", ms).map(Duration::from_millis))
        .transpose()?
        .unwrap_or(defaults.watchdog);
    engine.channel.max_poll_attempts = file
        .max_poll_attempts
        .unwrap_or(defaults.max_poll_attempts);
    if let Some(secs) = file.usage_refresh_secs {
        engine.usage_refresh = Duration::from_secs(non_zero("usage_refresh_secs", secs)?);
    }
    if let Some(secs) = file.request_timeout_secs {
        engine.backend.request_timeout =
            Duration::from_secs(non_zero("request_timeout_secs", secs)?);
    }

    Ok(Settings {
        state_dir: state_dir.to_path_buf(),
        engine,
    })
}

fn parse_url(field: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl {
        field,
        value,
        source,
    })
}

fn non_zero(field: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroInterval { field })
    } else {
        Ok(value)
    }
}
