use std::path::Path;
use std::str::FromStr;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use sb_http::DispatcherConfig;
use serde::Deserialize;
use tracing::Level;

/// Prefix of environment overrides, e.g. `SB_API_KEY`, `SB_RETRY__MAX_ATTEMPTS`
pub const ENV_PREFIX: &str = "SB";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub dispatcher: DispatcherConfig,

    /// Directory for the hourly log files (default: `logs`)
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Used when `RUST_LOG` is unset (default: `info`)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl AppConfig {
    /// `log_level` as a tracing level, `INFO` if unparseable
    pub fn level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::INFO)
    }
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load `.env`, then the optional config file, then `SB_` environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    if let Ok(env_file) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", env_file.display());
    }

    let config = Config::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__").try_parsing(true))
        .build()?;

    config.try_deserialize()
}

/// Load the config file alone, without `.env` or environment overrides
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let config = Config::builder().add_source(File::from(path.as_ref())).build()?;

    config.try_deserialize()
}
