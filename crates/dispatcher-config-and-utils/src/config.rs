//! Configuration management for the dispatcher.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default time between two dispatch cycles.
pub const DEFAULT_TICK_PERIOD_MS: u64 = 60_000;

/// Default quiet period after the first connectivity failure.
pub const DEFAULT_QUIET_PERIOD_BASE_SECS: u64 = 300;

/// Default cap for escalated quiet periods.
pub const DEFAULT_QUIET_PERIOD_MAX_SECS: u64 = 3_600;

/// Upper bound for any configured quiet period (one week).
pub const MAX_QUIET_PERIOD_SECS: u64 = 7 * 24 * 3_600;

/// Default number of generic delivery failures before a build is discarded.
pub const DEFAULT_DISCARD_THRESHOLD: u32 = 2;

const ENV_LOG_LEVEL: &str = "RESULT_DISPATCHER_LOG_LEVEL";
const ENV_PERIOD_MS: &str = "RESULT_DISPATCHER_PERIOD_MS";
const ENV_BUILDS_DIR: &str = "RESULT_DISPATCHER_BUILDS_DIR";

/// Query parameter of the UI location carrying `<sharedSpace>/<workspace>`.
const SHARED_SPACE_PARAM: &str = "p";

/// Main dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Time between two dispatch cycles, in milliseconds.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    /// Quiet period after a first connectivity failure, in seconds.
    #[serde(default = "default_quiet_period_base_secs")]
    pub quiet_period_base_secs: u64,
    /// Upper bound for escalated quiet periods, in seconds.
    #[serde(default = "default_quiet_period_max_secs")]
    pub quiet_period_max_secs: u64,
    /// Generic delivery failures tolerated before a build is discarded.
    #[serde(default = "default_discard_threshold")]
    pub discard_threshold: u32,
    /// Root directory holding per-build artifacts.
    #[serde(default)]
    pub builds_dir: Option<PathBuf>,
    /// Analytics server settings, absent until the host configures them.
    #[serde(default)]
    pub server: Option<ServerSettings>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_tick_period_ms() -> u64 {
    DEFAULT_TICK_PERIOD_MS
}

fn default_quiet_period_base_secs() -> u64 {
    DEFAULT_QUIET_PERIOD_BASE_SECS
}

fn default_quiet_period_max_secs() -> u64 {
    DEFAULT_QUIET_PERIOD_MAX_SECS
}

fn default_discard_threshold() -> u32 {
    DEFAULT_DISCARD_THRESHOLD
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            quiet_period_base_secs: DEFAULT_QUIET_PERIOD_BASE_SECS,
            quiet_period_max_secs: DEFAULT_QUIET_PERIOD_MAX_SECS,
            discard_threshold: DEFAULT_DISCARD_THRESHOLD,
            builds_dir: None,
            server: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from `<base>/config.json`, falling back to defaults.
    ///
    /// Environment variables are applied on top of whatever was loaded.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL).and_then(non_empty) {
            self.log_level = level;
        }
        if let Some(period) = lookup(ENV_PERIOD_MS)
            .and_then(non_empty)
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
        {
            self.tick_period_ms = period;
        }
        if let Some(dir) = lookup(ENV_BUILDS_DIR).and_then(non_empty) {
            self.builds_dir = Some(PathBuf::from(dir));
        }
    }

    /// Time between two dispatch cycles.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    /// Quiet period applied after the first connectivity failure.
    pub fn quiet_period_base(&self) -> Duration {
        Duration::from_secs(self.quiet_period_base_secs.min(MAX_QUIET_PERIOD_SECS))
    }

    /// Upper bound for escalated quiet periods.
    pub fn quiet_period_max(&self) -> Duration {
        let base = self.quiet_period_base_secs.min(MAX_QUIET_PERIOD_SECS);
        Duration::from_secs(self.quiet_period_max_secs.clamp(base, MAX_QUIET_PERIOD_SECS))
    }

    /// Resolve the build artifacts root, defaulting to `<base>/builds`.
    pub fn builds_dir_or_default(&self, paths: &Paths) -> PathBuf {
        self.builds_dir
            .clone()
            .unwrap_or_else(|| paths.builds_dir())
    }

    /// Parse the configured server settings, if any.
    pub fn server_config(&self) -> CoreResult<Option<ServerConfig>> {
        self.server
            .as_ref()
            .map(ServerConfig::from_settings)
            .transpose()
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Server settings as entered by the host's configuration form.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// UI URL, e.g. `http://host:8080/ui/?p=1001/1002`.
    pub ui_location: String,
    /// Account name.
    pub username: String,
    /// Account secret.
    pub secret: String,
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("ui_location", &self.ui_location)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Resolved server coordinates and credentials.
///
/// This is the key under which remote clients are obtained.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServerConfig {
    /// Server base URL without the UI suffix, e.g. `http://host:8080`.
    pub location: String,
    /// Shared space identifier.
    pub shared_space_id: String,
    /// Account name.
    pub username: String,
    /// Account secret.
    pub secret: String,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("location", &self.location)
            .field("shared_space_id", &self.shared_space_id)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl ServerConfig {
    /// Build a server config from raw form settings.
    pub fn from_settings(settings: &ServerSettings) -> CoreResult<Self> {
        Self::from_ui_location(&settings.ui_location, &settings.username, &settings.secret)
    }

    /// Derive location and shared space from a UI URL.
    ///
    /// `http://host:8080/prefix/ui/?p=1001/1002` yields location
    /// `http://host:8080/prefix` and shared space `1001`.
    pub fn from_ui_location(
        ui_location: &str,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> CoreResult<Self> {
        let url = Url::parse(ui_location.trim())?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CoreError::server_location(
                ui_location,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();
        let ui_index = segments
            .iter()
            .position(|segment| *segment == "ui")
            .ok_or_else(|| CoreError::server_location(ui_location, "no /ui path"))?;

        let mut location = url.origin().ascii_serialization();
        for segment in segments[..ui_index].iter().filter(|s| !s.is_empty()) {
            location.push('/');
            location.push_str(segment);
        }

        let shared_space_id = url
            .query_pairs()
            .find(|(name, _)| name == SHARED_SPACE_PARAM)
            .and_then(|(_, value)| {
                value
                    .split('/')
                    .next()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            })
            .ok_or_else(|| CoreError::server_location(ui_location, "no shared space parameter"))?;

        Ok(Self {
            location,
            shared_space_id,
            username: username.into(),
            secret: secret.into(),
        })
    }
}
