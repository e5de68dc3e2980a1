//! Application-level configuration: presence timings and the participant color palette.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::room::ParticipantColor;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POKER_ROOM_BACK_CONFIG_PATH";

/// Participants write a heartbeat on this period.
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2_000;
/// A participant is stale after this many milliseconds without a heartbeat
/// (three missed beats at the default interval).
const DEFAULT_STALE_THRESHOLD_MS: u64 = 6_000;
/// The presence sweeper scans all rooms on this period.
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 3_000;
/// Delay between everyone marking done and the round auto-closing.
const DEFAULT_AUTO_CLOSE_DEBOUNCE_MS: u64 = 1_500;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    heartbeat_interval: Duration,
    stale_threshold: Duration,
    sweep_interval: Duration,
    auto_close_debounce: Duration,
    colors: Vec<ParticipantColor>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        colors = config.colors.len(),
                        "loaded configuration"
                    );
                    config
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

    /// Period on which participants are expected to heartbeat.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Heartbeat age past which a participant counts as stale.
    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Period of the presence sweeper pass over all rooms.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Debounce between everyone marking done and the round auto-closing.
    pub fn auto_close_debounce(&self) -> Duration {
        self.auto_close_debounce
    }

    /// Palette used to derive participant colors from peer ids.
    pub fn colors(&self) -> &[ParticipantColor] {
        &self.colors
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            stale_threshold: Duration::from_millis(DEFAULT_STALE_THRESHOLD_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            auto_close_debounce: Duration::from_millis(DEFAULT_AUTO_CLOSE_DEBOUNCE_MS),
            colors: default_colors(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    heartbeat_interval_ms: Option<u64>,
    #[serde(default)]
    stale_threshold_ms: Option<u64>,
    #[serde(default)]
    sweep_interval_ms: Option<u64>,
    #[serde(default)]
    auto_close_debounce_ms: Option<u64>,
    #[serde(default)]
    colors: Vec<RawColor>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        let colors = if value.colors.is_empty() {
            defaults.colors
        } else {
            value.colors.into_iter().map(Into::into).collect()
        };

        Self {
            heartbeat_interval: value
                .heartbeat_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.heartbeat_interval),
            stale_threshold: value
                .stale_threshold_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stale_threshold),
            sweep_interval: value
                .sweep_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
            auto_close_debounce: value
                .auto_close_debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.auto_close_debounce),
            colors,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single HSV entry inside the configuration file.
struct RawColor {
    hue: f32,
    saturation: f32,
    value: f32,
}

impl From<RawColor> for ParticipantColor {
    fn from(value: RawColor) -> Self {
        Self {
            h: value.hue,
            s: value.saturation,
            v: value.value,
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

/// Built-in color palette shipped with the binary.
fn default_colors() -> Vec<ParticipantColor> {
    [
        (14.0, 1.0),
        (43.0, 1.0),
        (88.0, 1.0),
        (126.0, 1.0),
        (172.0, 1.0),
        (203.0, 1.0),
        (248.0, 1.0),
        (291.0, 1.0),
        (327.0, 1.0),
        (14.0, 0.6),
        (88.0, 0.6),
        (172.0, 0.6),
        (248.0, 0.6),
        (327.0, 0.6),
    ]
    .into_iter()
    .map(|(h, s)| ParticipantColor { h, s, v: 1.0 })
    .collect()
}
