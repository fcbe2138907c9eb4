//! Prompting configuration and the config store contract.

use crate::error::{NudgeError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Upper bound on the prompting cadence (one week).
pub const MAX_FREQUENCY_HOURS: f64 = 168.0;

/// User-facing prompting settings persisted by the config store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptingConfig {
    /// Whether proactive prompting runs at all.
    pub prompting_enabled: bool,
    /// Target hours between cadence prompts.
    pub prompting_frequency_hours: f64,
}

impl Default for PromptingConfig {
    fn default() -> Self {
        Self {
            prompting_enabled: true,
            prompting_frequency_hours: 2.0,
        }
    }
}

impl PromptingConfig {
    /// Build a config from its two settings.
    #[must_use]
    pub fn new(prompting_enabled: bool, prompting_frequency_hours: f64) -> Self {
        Self {
            prompting_enabled,
            prompting_frequency_hours,
        }
    }

    /// Reject non-finite, non-positive, or absurdly long frequencies.
    pub fn validate(&self) -> Result<()> {
        let hours = self.prompting_frequency_hours;
        if !hours.is_finite() || hours <= 0.0 || hours > MAX_FREQUENCY_HOURS {
            return Err(NudgeError::Config(format!(
                "prompting_frequency_hours must be in (0, {MAX_FREQUENCY_HOURS}], got {hours}"
            )));
        }
        Ok(())
    }

    /// The configured frequency as a duration.
    #[must_use]
    pub fn frequency(&self) -> Duration {
        hours_to_duration(self.prompting_frequency_hours)
    }
}

/// Convert fractional hours to a millisecond-resolution duration.
#[must_use]
pub fn hours_to_duration(hours: f64) -> Duration {
    let millis = (hours * 3_600_000.0).round();
    if millis.is_finite() && millis > 0.0 {
        Duration::milliseconds(millis as i64)
    } else {
        Duration::zero()
    }
}

/// Engine timing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTimings {
    /// Window in which a prompt may be answered before it times out.
    pub response_timeout: Duration,
    /// Delay before a snoozed task is prompted again.
    pub snooze_delay: Duration,
    /// How long a prompted task stays ineligible for selection.
    pub cooldown_window: Duration,
    /// Period of the cooldown sweep.
    pub sweep_interval: Duration,
    /// Maximum absolute jitter applied to the cadence interval.
    pub jitter: Duration,
    /// Fraction of the frequency that must elapse between cadence prompts,
    /// in percent.
    pub min_interval_percent: u32,
    /// Lower bound on the jittered cadence interval.
    pub min_cadence_interval: Duration,
}

impl Default for PromptTimings {
    fn default() -> Self {
        Self {
            response_timeout: Duration::seconds(30),
            snooze_delay: Duration::hours(1),
            cooldown_window: Duration::hours(24),
            sweep_interval: Duration::hours(1),
            jitter: Duration::minutes(15),
            min_interval_percent: 90,
            min_cadence_interval: Duration::minutes(1),
        }
    }
}

impl PromptTimings {
    /// Minimum time since the last prompt before a cadence tick may prompt.
    #[must_use]
    pub fn min_interval(&self, frequency: Duration) -> Duration {
        frequency * self.min_interval_percent as i32 / 100
    }

    /// Reject non-positive periods; a zero period would re-arm a repeating
    /// timer at the instant it fired.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("response_timeout", self.response_timeout),
            ("snooze_delay", self.snooze_delay),
            ("sweep_interval", self.sweep_interval),
            ("min_cadence_interval", self.min_cadence_interval),
        ];
        for (name, period) in periods {
            if period <= Duration::zero() {
                return Err(NudgeError::Config(format!(
                    "{name} must be positive, got {}ms",
                    period.num_milliseconds()
                )));
            }
        }
        if self.jitter < Duration::zero() || self.cooldown_window < Duration::zero() {
            return Err(NudgeError::Config(
                "jitter and cooldown_window must not be negative".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Persistence contract for [`PromptingConfig`].
pub trait ConfigStore: Send + Sync {
    /// Load the current config.
    fn load_config(&self) -> Result<PromptingConfig>;

    /// Persist a new config.
    fn save_config(&self, config: &PromptingConfig) -> Result<()>;
}

/// TOML file-backed config store.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Store backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by the default config path.
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(crate::paths::config_file())
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    /// A missing file yields defaults; unreadable or invalid files are errors.
    fn load_config(&self) -> Result<PromptingConfig> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PromptingConfig::default());
            }
            Err(e) => {
                return Err(NudgeError::Config(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let config: PromptingConfig = toml::from_str(&content)
            .map_err(|e| NudgeError::Config(format!("cannot parse {}: {e}", self.path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn save_config(&self, config: &PromptingConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NudgeError::Config(format!("create config dir: {e}")))?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| NudgeError::Config(format!("serialize config: {e}")))?;

        let tmp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, content)
            .map_err(|e| NudgeError::Config(format!("write config tmp: {e}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| NudgeError::Config(format!("rename config: {e}")))?;
        Ok(())
    }
}

/// Process-local config store.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<PromptingConfig>,
}

impl MemoryConfigStore {
    /// Store seeded with `config`.
    #[must_use]
    pub fn new(config: PromptingConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_config(&self) -> Result<PromptingConfig> {
        Ok(*self.config.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save_config(&self, config: &PromptingConfig) -> Result<()> {
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = *config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PromptingConfig::default();
        assert!(config.prompting_enabled);
        assert!(config.validate().is_ok());
        assert_eq!(config.frequency(), Duration::hours(2));
    }

    #[test]
    fn validate_rejects_bad_frequencies() {
        for hours in [0.0, -1.0, f64::NAN, f64::INFINITY, 500.0] {
            let config = PromptingConfig::new(true, hours);
            assert!(config.validate().is_err(), "{hours} should be rejected");
        }
        assert!(PromptingConfig::new(true, 0.5).validate().is_ok());
    }

    #[test]
    fn min_interval_is_ninety_percent() {
        let timings = PromptTimings::default();
        assert_eq!(
            timings.min_interval(Duration::hours(2)),
            Duration::minutes(108)
        );
    }

    #[test]
    fn timings_reject_zero_periods() {
        assert!(PromptTimings::default().validate().is_ok());

        let zero_sweep = PromptTimings {
            sweep_interval: Duration::zero(),
            ..PromptTimings::default()
        };
        assert!(matches!(zero_sweep.validate(), Err(NudgeError::Config(_))));

        let negative_floor = PromptTimings {
            min_cadence_interval: Duration::seconds(-1),
            ..PromptTimings::default()
        };
        assert!(negative_floor.validate().is_err());

        let no_jitter = PromptTimings {
            jitter: Duration::zero(),
            ..PromptTimings::default()
        };
        assert!(no_jitter.validate().is_ok());
    }

    #[test]
    fn fractional_hours_convert_to_millis() {
        assert_eq!(hours_to_duration(1.5), Duration::minutes(90));
        assert_eq!(hours_to_duration(-3.0), Duration::zero());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested").join("config.toml"));

        assert_eq!(store.load_config().unwrap(), PromptingConfig::default());

        let config = PromptingConfig::new(false, 4.5);
        store.save_config(&config).unwrap();

        assert_eq!(store.load_config().unwrap(), config);
        assert!(!store.path().with_extension("toml.tmp").exists());
    }

    #[test]
    fn file_store_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "prompting_enabled = \"sometimes\"").unwrap();

        let err = FileConfigStore::new(&path).load_config().unwrap_err();
        assert!(matches!(err, NudgeError::Config(_)));
    }

    #[test]
    fn file_store_accepts_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "prompting_frequency_hours = 3.0\n").unwrap();

        let config = FileConfigStore::new(&path).load_config().unwrap();
        assert!(config.prompting_enabled);
        assert_eq!(config.frequency(), Duration::hours(3));
    }
}
