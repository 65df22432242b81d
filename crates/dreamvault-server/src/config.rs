use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, bail};
use tracing::{info, warn};

use dreamvault_ai::client::DEFAULT_BASE_URL;

/// JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub app_url: String,
    pub storage_dir: PathBuf,
    /// Create missing tables, columns and the avatar bucket on startup.
    pub auto_setup: bool,
    pub share_cleanup_secs: u64,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("DREAMVAULT_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("DREAMVAULT_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let share_cleanup_secs = match try_load(&lookup, "DREAMVAULT_SHARE_CLEANUP_SECS", 3600u64) {
            0 => {
                warn!("DREAMVAULT_SHARE_CLEANUP_SECS must be positive, using 3600");
                3600
            }
            secs => secs,
        };

        Ok(Self {
            host: try_load(&lookup, "DREAMVAULT_HOST", "0.0.0.0".to_string()),
            port: try_load(&lookup, "DREAMVAULT_PORT", 3000),
            db_path: PathBuf::from(try_load(&lookup, "DREAMVAULT_DB_PATH", "dreamvault.db".to_string())),
            jwt_secret,
            app_url: try_load(&lookup, "DREAMVAULT_APP_URL", "https://dreamvault.app".to_string())
                .trim_end_matches('/')
                .to_string(),
            storage_dir: PathBuf::from(try_load(&lookup, "DREAMVAULT_STORAGE_DIR", "./storage".to_string())),
            auto_setup: try_load(&lookup, "DREAMVAULT_AUTO_SETUP", true),
            share_cleanup_secs,
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            openai_base_url: try_load(&lookup, "OPENAI_BASE_URL", DEFAULT_BASE_URL.to_string()),
        })
    }
}

/// Parses `key`, falling back to `default` when it is unset or malformed.
fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
        default
    })
}
