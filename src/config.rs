//! Application-level configuration loading, including admin tokens and the edit-lock TTL.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GAME_NIGHT_BACK_CONFIG_PATH";
/// Fallback edit-lock TTL, matching the historical five minute takeover window.
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    admin_tokens: Vec<AdminToken>,
    lock_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
/// One pre-shared admin credential: a bearer token mapped to a stable admin id.
struct AdminToken {
    token: String,
    id: u32,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        admin_tokens = app_config.admin_tokens.len(),
                        lock_timeout_secs = app_config.lock_timeout.as_secs(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Resolve an upgrade token to a stable admin id, if the token is known.
    pub fn resolve_admin(&self, token: &str) -> Option<u32> {
        self.admin_tokens
            .iter()
            .find(|candidate| candidate.token == token)
            .map(|candidate| candidate.id)
    }

    /// Time after which an unreleased edit lock may be taken over.
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            admin_tokens: Vec::new(),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
impl AppConfig {
    /// Build a configuration for tests without touching the filesystem.
    pub fn for_tests(admin_tokens: Vec<(String, u32)>, lock_timeout: Duration) -> Self {
        Self {
            admin_tokens: admin_tokens
                .into_iter()
                .map(|(token, id)| AdminToken { token, id })
                .collect(),
            lock_timeout,
        }
    }
}

/// On-disk representation of [`AppConfig`].
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    admin_tokens: Vec<AdminToken>,
    lock_timeout_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            admin_tokens: raw.admin_tokens,
            lock_timeout: Duration::from_secs(
                raw.lock_timeout_secs.unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS),
            ),
        }
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
