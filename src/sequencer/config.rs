// Metronome configuration - tempo, meter and scheduling horizon
// Loaded from RON or JSON, merged at start time, validated before use

use super::SchedulerError;
use super::timeline::{Tempo, TimeSignature};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default horizon scheduled ahead of the audio clock (seconds)
pub const DEFAULT_LOOKAHEAD_WINDOW: f64 = 0.5;

/// Default timer period between scheduling passes (milliseconds)
pub const DEFAULT_TICK_INTERVAL_MS: f64 = 25.0;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON serialization error: {0}")]
    RonSerialize(#[from] ron::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Invalid(#[from] SchedulerError),
}

/// Complete metronome configuration
///
/// Owned by the scheduler; `get_config()` hands out clones so callers can
/// never mutate live state behind the scheduler's back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub time_signature: TimeSignature,
    pub tempo: Tempo,
    /// Seconds scheduled ahead of the audio clock on each pass
    pub lookahead_window: f64,
    /// Milliseconds between timer ticks
    pub tick_interval_ms: f64,
    /// Output gain in [0, 1]
    pub volume: f32,
}

impl MetronomeConfig {
    /// Timer period as a `Duration`
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos((self.tick_interval_ms * 1_000_000.0).round() as u64)
    }

    /// Seconds between two consecutive beats at the configured tempo
    pub fn seconds_per_beat(&self) -> f64 {
        self.tempo.seconds_per_beat()
    }

    /// Check the invariants that the typed fields cannot express
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !self.lookahead_window.is_finite() || self.lookahead_window <= 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "lookahead window must be > 0 s, got {}",
                self.lookahead_window
            )));
        }
        if !self.tick_interval_ms.is_finite() || self.tick_interval_ms <= 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "tick interval must be > 0 ms, got {}",
                self.tick_interval_ms
            )));
        }
        if self.tick_interval().is_zero() {
            return Err(SchedulerError::InvalidConfig(format!(
                "tick interval {} ms is below timer resolution",
                self.tick_interval_ms
            )));
        }
        // Each pass must look past the next one, otherwise every pass starts late
        if self.lookahead_window * 1000.0 <= self.tick_interval_ms {
            return Err(SchedulerError::InvalidConfig(format!(
                "lookahead window ({} s) must be longer than the tick interval ({} ms)",
                self.lookahead_window, self.tick_interval_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(SchedulerError::InvalidVolume(self.volume));
        }
        Ok(())
    }

    /// Parse and validate a RON document
    pub fn from_ron_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format from its extension
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let data = std::fs::read_to_string(path)?;

        match extension.to_lowercase().as_str() {
            "ron" => Self::from_ron_str(&data),
            "json" => Self::from_json_str(&data),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            time_signature: TimeSignature::default(),
            tempo: Tempo::default(),
            lookahead_window: DEFAULT_LOOKAHEAD_WINDOW,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            volume: 1.0,
        }
    }
}

/// Partial configuration overlaid on the current one by `start`
///
/// Unset fields keep their current value. Raw numbers are only validated
/// when merged, so a bad update is rejected as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub time_signature: Option<TimeSignature>,
    pub tempo: Option<f64>,
    pub lookahead_window: Option<f64>,
    pub tick_interval_ms: Option<f64>,
    pub volume: Option<f32>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tempo(mut self, bpm: f64) -> Self {
        self.tempo = Some(bpm);
        self
    }

    pub fn time_signature(mut self, time_signature: TimeSignature) -> Self {
        self.time_signature = Some(time_signature);
        self
    }

    pub fn lookahead_window(mut self, seconds: f64) -> Self {
        self.lookahead_window = Some(seconds);
        self
    }

    pub fn tick_interval_ms(mut self, ms: f64) -> Self {
        self.tick_interval_ms = Some(ms);
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Overlay this update on `base`, returning the validated result
    pub fn merge_into(&self, base: &MetronomeConfig) -> Result<MetronomeConfig, SchedulerError> {
        let mut merged = base.clone();
        if let Some(time_signature) = self.time_signature {
            merged.time_signature = time_signature;
        }
        if let Some(bpm) = self.tempo {
            merged.tempo = Tempo::new(bpm)?;
        }
        if let Some(seconds) = self.lookahead_window {
            merged.lookahead_window = seconds;
        }
        if let Some(ms) = self.tick_interval_ms {
            merged.tick_interval_ms = ms;
        }
        if let Some(volume) = self.volume {
            merged.volume = volume;
        }
        merged.validate()?;
        Ok(merged)
    }
}

impl From<MetronomeConfig> for ConfigUpdate {
    fn from(config: MetronomeConfig) -> Self {
        Self {
            time_signature: Some(config.time_signature),
            tempo: Some(config.tempo.bpm()),
            lookahead_window: Some(config.lookahead_window),
            tick_interval_ms: Some(config.tick_interval_ms),
            volume: Some(config.volume),
        }
    }
}
