//! Configuration management
//!
//! Provides the session's tuning surface with schema versioning and
//! migrations. Configuration is stored in `~/.relisten/config.json`; all
//! values have sane defaults so callers can run entirely from
//! `SessionConfig::default()` without touching disk.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<SessionConfig>> = OnceLock::new();

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Schema version for migrations
    pub version: u32,
    /// Restart timing and backoff settings
    pub restart: RestartConfig,
    /// Duplicate-command suppression settings
    pub debounce: DebounceConfig,
    /// Opaque engine activation hints
    pub engine: EngineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            restart: RestartConfig::default(),
            debounce: DebounceConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// Restart timing configuration
///
/// The base delay is a deliberate throttle between activations; restarting
/// instantly can itself provoke a busy fault from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Delay before re-activating after a result or recoverable error (ms)
    pub base_delay_ms: u64,
    /// Initial delay before rebuilding the engine after a busy fault (ms)
    pub busy_reset_delay_ms: u64,
    /// Upper bound on the busy backoff delay (ms)
    pub busy_backoff_ceiling_ms: u64,
    /// Multiplier applied per consecutive busy fault
    pub busy_backoff_growth: f64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            busy_reset_delay_ms: 2000,
            busy_backoff_ceiling_ms: 3000,
            busy_backoff_growth: 1.5,
        }
    }
}

impl RestartConfig {
    /// The base restart delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Duplicate-command suppression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Window within which a repeated identical command is suppressed (ms)
    pub window_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window_ms: 1000 }
    }
}

impl DebounceConfig {
    /// The suppression window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Engine activation hints
///
/// Passed through to [`SpeechEngine::start`](crate::engine::SpeechEngine::start)
/// verbatim. None of these values affect session control logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Language tag hint (e.g. "en-US"); None lets the engine pick
    pub language: Option<String>,
    /// Prefer on-device recognition when the engine supports it
    pub prefer_offline: bool,
    /// Ask the engine for streaming partial hypotheses
    pub partial_results: bool,
    /// Maximum alternatives requested per utterance
    pub max_results: u32,
    /// Silence length the engine treats as utterance-complete (ms)
    pub complete_silence_ms: u64,
    /// Silence length the engine treats as possibly-complete (ms)
    pub possibly_complete_silence_ms: u64,
    /// Minimum utterance length the engine should capture (ms)
    pub minimum_length_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: None,
            prefer_offline: true,
            partial_results: true,
            max_results: 3,
            complete_silence_ms: 150,
            possibly_complete_silence_ms: 200,
            minimum_length_ms: 500,
        }
    }
}

/// Get the path to the config file (~/.relisten/config.json)
pub fn get_config_path() -> PathBuf {
    home_dir_or_fallback().join(".relisten").join("config.json")
}

/// Get the path to the config directory (~/.relisten)
fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".relisten")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Ensure the config directory exists
fn ensure_config_dir() -> Result<(), String> {
    let dir = get_config_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    Ok(())
}

/// Load configuration from disk
fn load_from_disk() -> Result<SessionConfig, String> {
    let path = get_config_path();

    if !path.exists() {
        tracing::info!("Config file not found, using defaults");
        return Ok(SessionConfig::default());
    }

    let contents =
        fs::read_to_string(&path).map_err(|e| format!("Failed to read config file: {}", e))?;

    let config: SessionConfig =
        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse config: {}", e))?;

    // Run migrations if needed
    let migrated = migrate_config(config)?;

    Ok(migrated)
}

/// Save configuration to disk
fn save_to_disk(config: &SessionConfig) -> Result<(), String> {
    ensure_config_dir()?;

    let path = get_config_path();
    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialise config: {}", e))?;

    fs::write(&path, contents).map_err(|e| format!("Failed to write config file: {}", e))?;

    tracing::info!("Config saved to disk");
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: SessionConfig) -> Result<SessionConfig, String> {
    let original_version = config.version;

    // Apply migrations sequentially
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
        // Save the migrated config
        save_to_disk(&config)?;
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: SessionConfig) -> Result<SessionConfig, String> {
    match config.version {
        // Version 0 -> 1: Initial migration (add any new fields)
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(format!("Unknown config version: {}", v)),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static RwLock<SessionConfig> {
    CONFIG.get_or_init(|| {
        let config = load_from_disk().unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {}", e);
            SessionConfig::default()
        });
        tracing::info!("Config loaded from disk");
        RwLock::new(config)
    })
}

/// Get the current configuration
///
/// The config is cached in memory and loaded from disk on first access.
pub fn get_config() -> SessionConfig {
    get_config_instance().read().clone()
}

/// Update the configuration
///
/// Replaces the current configuration with the provided config and persists
/// it to disk. The version field is automatically updated to the current
/// schema.
pub fn set_config(mut config: SessionConfig) -> Result<(), String> {
    config.version = CURRENT_VERSION;

    // Save to disk first
    save_to_disk(&config)?;

    // Update cached config
    let mut cached = get_config_instance().write();
    *cached = config;

    tracing::info!("Configuration updated");
    Ok(())
}

/// Reset configuration to defaults
///
/// Resets all settings to their default values and persists to disk.
pub fn reset_config() -> Result<SessionConfig, String> {
    let default_config = SessionConfig::default();

    save_to_disk(&default_config)?;

    let mut cached = get_config_instance().write();
    *cached = default_config.clone();

    tracing::info!("Configuration reset to defaults");
    Ok(default_config)
}
