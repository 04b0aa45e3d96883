//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::services::score_sync::DEFAULT_SYNC_DELAY;
use crate::state::DEFAULT_TRANSITION_TIMEOUT;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RACLETTE_CONFIG_PATH";
/// Environment variable that overrides the configured store backend.
const STORE_ENV: &str = "RACLETTE_STORE";
/// Default location of the local session file.
const DEFAULT_SESSION_PATH: &str = "data/session.json";
/// Number of ranks shown at the ceremony.
pub const DEFAULT_PODIUM_SIZE: usize = 3;

/// Backend holding the shared competition documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process store; nothing is shared between kiosks.
    #[default]
    Memory,
    /// CouchDB database shared by every kiosk.
    Couch,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "couch" | "couchdb" => Ok(StoreKind::Couch),
            other => Err(format!("unknown store kind `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub store: StoreKind,
    pub session_path: PathBuf,
    pub score_sync_delay: Duration,
    pub transition_timeout: Option<Duration>,
    pub podium_size: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents)
                .inspect(|config| {
                    info!(
                        path = %path.display(),
                        store = ?config.store,
                        sync_delay_ms = config.score_sync_delay.as_millis() as u64,
                        "loaded config"
                    )
                })
                .unwrap_or_else(|err| {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }),
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
        };

        config.with_env_overrides()
    }

    /// Parse a JSON configuration document. Missing keys take their default value.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = env::var(STORE_ENV) {
            match raw.parse() {
                Ok(kind) => self.store = kind,
                Err(err) => warn!(env = STORE_ENV, error = %err, "ignoring store override"),
            }
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            session_path: PathBuf::from(DEFAULT_SESSION_PATH),
            score_sync_delay: DEFAULT_SYNC_DELAY,
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
            podium_size: DEFAULT_PODIUM_SIZE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    store: Option<StoreKind>,
    session_path: Option<PathBuf>,
    score_sync_delay_ms: Option<u64>,
    /// `0` disables the timeout.
    transition_timeout_ms: Option<u64>,
    podium_size: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            store: value.store.unwrap_or(defaults.store),
            session_path: value.session_path.unwrap_or(defaults.session_path),
            score_sync_delay: value
                .score_sync_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.score_sync_delay),
            transition_timeout: match value.transition_timeout_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.transition_timeout,
            },
            podium_size: value
                .podium_size
                .filter(|size| *size > 0)
                .unwrap_or(defaults.podium_size),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
