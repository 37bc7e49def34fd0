use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::pump::PumpDirection;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

/// One configuration struct per deployment instead of forked per-board
/// sources: window sizes, thresholds, clamp bounds and the direction-sign
/// policy all live here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PneumaConfig {
    pub session: SessionConfig,
    pub control: ControlConfig,
    pub pump: PumpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Priming-window length from session start (ms); baseline accumulates
    /// until it elapses.
    pub priming_window_ms: u64,
    /// RR-interval window width for RMSSD.
    pub window_size: usize,
    /// Physiological plausibility band for RR intervals (ms).
    pub min_rr_ms: f32,
    pub max_rr_ms: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Minimum |error| before a feedback command is issued.
    pub noise_threshold: f32,
    /// Seconds of actuation per unit of |error|.
    pub pump_multiplier: f32,
    /// Which direction a rising relaxation trend drives.
    pub direction_policy: DirectionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Safety clamp bounds for a single timed command (ms).
    pub min_pump_ms: u64,
    pub max_pump_ms: u64,
}

/// Sign convention mapping the relaxation-trend error to a pump direction.
/// An explicit deployment choice: both conventions exist in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionPolicy {
    /// Rising relaxation (positive error) inflates.
    InflateOnRising,
    /// Rising relaxation deflates.
    DeflateOnRising,
}

impl Default for DirectionPolicy {
    fn default() -> Self {
        Self::InflateOnRising
    }
}

impl DirectionPolicy {
    pub fn direction_for(&self, error: f32) -> PumpDirection {
        let rising = error > 0.0;
        match self {
            Self::InflateOnRising => {
                if rising {
                    PumpDirection::Inflate
                } else {
                    PumpDirection::Deflate
                }
            }
            Self::DeflateOnRising => {
                if rising {
                    PumpDirection::Deflate
                } else {
                    PumpDirection::Inflate
                }
            }
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            priming_window_ms: 180_000,
            window_size: 30,
            min_rr_ms: 200.0,
            max_rr_ms: 2500.0,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.05,
            pump_multiplier: 5.0,
            direction_policy: DirectionPolicy::default(),
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            min_pump_ms: 100,
            max_pump_ms: 5_000,
        }
    }
}

impl PumpConfig {
    /// High-capacity deployment profile (larger bladder, longer strokes).
    pub fn extended() -> Self {
        Self {
            min_pump_ms: 100,
            max_pump_ms: 8_000,
        }
    }
}

impl PneumaConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: PneumaConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    /// Variables are prefixed with PNEUMA_, e.g.
    /// `PNEUMA_CONTROL_NOISE_THRESHOLD=0.08`.
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        use std::env;

        fn parse<T: std::str::FromStr>(name: &str, val: String) -> Result<T, ConfigError> {
            val.parse()
                .map_err(|_| ConfigError::Validation(format!("Invalid {}", name)))
        }

        if let Ok(val) = env::var("PNEUMA_SESSION_PRIMING_WINDOW_MS") {
            self.session.priming_window_ms = parse("PNEUMA_SESSION_PRIMING_WINDOW_MS", val)?;
        }
        if let Ok(val) = env::var("PNEUMA_SESSION_WINDOW_SIZE") {
            self.session.window_size = parse("PNEUMA_SESSION_WINDOW_SIZE", val)?;
        }
        if let Ok(val) = env::var("PNEUMA_CONTROL_NOISE_THRESHOLD") {
            self.control.noise_threshold = parse("PNEUMA_CONTROL_NOISE_THRESHOLD", val)?;
        }
        if let Ok(val) = env::var("PNEUMA_CONTROL_PUMP_MULTIPLIER") {
            self.control.pump_multiplier = parse("PNEUMA_CONTROL_PUMP_MULTIPLIER", val)?;
        }
        if let Ok(val) = env::var("PNEUMA_PUMP_MIN_PUMP_MS") {
            self.pump.min_pump_ms = parse("PNEUMA_PUMP_MIN_PUMP_MS", val)?;
        }
        if let Ok(val) = env::var("PNEUMA_PUMP_MAX_PUMP_MS") {
            self.pump.max_pump_ms = parse("PNEUMA_PUMP_MAX_PUMP_MS", val)?;
        }

        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.priming_window_ms == 0 {
            return Err(ConfigError::Validation(
                "session.priming_window_ms must be positive".to_string(),
            ));
        }
        if self.session.window_size < 2 {
            return Err(ConfigError::Validation(
                "session.window_size must be at least 2".to_string(),
            ));
        }
        if self.session.min_rr_ms <= 0.0 || self.session.min_rr_ms >= self.session.max_rr_ms {
            return Err(ConfigError::Validation(
                "session.min_rr_ms must be in (0, max_rr_ms)".to_string(),
            ));
        }
        if self.control.noise_threshold <= 0.0 || self.control.noise_threshold > 1.0 {
            return Err(ConfigError::Validation(
                "control.noise_threshold must be in (0, 1]".to_string(),
            ));
        }
        if self.control.pump_multiplier <= 0.0 {
            return Err(ConfigError::Validation(
                "control.pump_multiplier must be positive".to_string(),
            ));
        }
        if self.pump.min_pump_ms == 0 || self.pump.min_pump_ms > self.pump.max_pump_ms {
            return Err(ConfigError::Validation(
                "pump.min_pump_ms must be in (0, max_pump_ms]".to_string(),
            ));
        }
        if self.pump.max_pump_ms > 8_000 {
            return Err(ConfigError::Validation(
                "pump.max_pump_ms must be <= 8000".to_string(),
            ));
        }
        Ok(())
    }

    /// Export configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self
            .to_toml_string()
            .map_err(|e| ConfigError::Validation(format!("TOML serialization error: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}
