//! TOML-based service configuration.
//!
//! Stores the tunable inputs of the protocol:
//! - Per-stage timeouts
//! - Admission thresholds for the readiness gate
//! - Daily reveal caps per subscription tier
//!
//! Configuration is stored at `~/.config/unveil/config.toml`. Every value
//! is an input to the coordinator; nothing here is baked into the state
//! machine logic.

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::quota::TierCaps;
use crate::reveal::RevealStage;

/// Per-stage deadline configuration, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_preparation_timeout")]
    pub preparation_timeout_secs: u64,
    #[serde(default = "default_intention_timeout")]
    pub intention_timeout_secs: u64,
    #[serde(default = "default_mutual_readiness_timeout")]
    pub mutual_readiness_timeout_secs: u64,
    #[serde(default = "default_countdown_timeout")]
    pub countdown_timeout_secs: u64,
    /// Post-completion tracking window; expiry only ends tracking.
    #[serde(default = "default_integration_window")]
    pub integration_window_secs: u64,
}

impl StageConfig {
    /// Deadline for a stage, in seconds. The reveal moment itself is
    /// instant.
    pub fn timeout_secs(&self, stage: RevealStage) -> u64 {
        match stage {
            RevealStage::Preparation => self.preparation_timeout_secs,
            RevealStage::Intention => self.intention_timeout_secs,
            RevealStage::MutualReadiness => self.mutual_readiness_timeout_secs,
            RevealStage::Countdown => self.countdown_timeout_secs,
            RevealStage::Reveal => 0,
            RevealStage::Integration => self.integration_window_secs,
        }
    }
}

/// Admission gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Minimum readiness score required to create a reveal.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Below this message count the score is 0.0.
    #[serde(default = "default_min_messages")]
    pub min_messages: u32,
    /// Message count at which volume confidence reaches 1.0.
    #[serde(default = "default_confidence_window")]
    pub confidence_window: u32,
    /// Share of the final score taken from a secondary assessment.
    #[serde(default = "default_secondary_blend")]
    pub secondary_blend: f64,
}

/// Daily reveal caps per tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_free_daily")]
    pub free_daily: u32,
    #[serde(default = "default_plus_daily")]
    pub plus_daily: u32,
    #[serde(default = "default_unlimited_daily")]
    pub unlimited_daily: u32,
}

impl QuotaConfig {
    pub fn caps(&self) -> TierCaps {
        TierCaps {
            free: self.free_daily,
            plus: self.plus_daily,
            unlimited: self.unlimited_daily,
        }
    }
}

/// Service configuration.
///
/// Serialized to/from TOML at `~/.config/unveil/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealConfig {
    #[serde(default)]
    pub stages: StageConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

// Default functions
fn default_preparation_timeout() -> u64 {
    300
}
fn default_intention_timeout() -> u64 {
    180
}
fn default_mutual_readiness_timeout() -> u64 {
    120
}
fn default_countdown_timeout() -> u64 {
    30
}
fn default_integration_window() -> u64 {
    600
}
fn default_threshold() -> f64 {
    0.70
}
fn default_min_messages() -> u32 {
    10
}
fn default_confidence_window() -> u32 {
    15
}
fn default_secondary_blend() -> f64 {
    0.3
}
fn default_free_daily() -> u32 {
    1
}
fn default_plus_daily() -> u32 {
    5
}
fn default_unlimited_daily() -> u32 {
    15
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            preparation_timeout_secs: default_preparation_timeout(),
            intention_timeout_secs: default_intention_timeout(),
            mutual_readiness_timeout_secs: default_mutual_readiness_timeout(),
            countdown_timeout_secs: default_countdown_timeout(),
            integration_window_secs: default_integration_window(),
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_messages: default_min_messages(),
            confidence_window: default_confidence_window(),
            secondary_blend: default_secondary_blend(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_daily: default_free_daily(),
            plus_daily: default_plus_daily(),
            unlimited_daily: default_unlimited_daily(),
        }
    }
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            stages: StageConfig::default(),
            admission: AdmissionConfig::default(),
            quota: QuotaConfig::default(),
        }
    }
}

impl RevealConfig {
    /// Path of the config file.
    pub fn path() -> Result<std::path::PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: std::path::PathBuf::from("~/.config/unveil"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, creating the file with defaults if it is missing.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
        } else {
            let cfg = Self::default();
            cfg.save()?;
            Ok(cfg)
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.admission.threshold) {
            return Err(ConfigError::InvalidValue {
                key: "admission.threshold".into(),
                message: format!("must be in [0.0, 1.0], got {}", self.admission.threshold),
            });
        }
        if !(0.0..=1.0).contains(&self.admission.secondary_blend) {
            return Err(ConfigError::InvalidValue {
                key: "admission.secondary_blend".into(),
                message: format!("must be in [0.0, 1.0], got {}", self.admission.secondary_blend),
            });
        }
        if self.admission.confidence_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "admission.confidence_window".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_parameters() {
        let cfg = RevealConfig::default();
        assert_eq!(cfg.stages.preparation_timeout_secs, 300);
        assert_eq!(cfg.stages.intention_timeout_secs, 180);
        assert_eq!(cfg.stages.mutual_readiness_timeout_secs, 120);
        assert_eq!(cfg.stages.countdown_timeout_secs, 30);
        assert_eq!(cfg.stages.integration_window_secs, 600);
        assert_eq!(cfg.admission.threshold, 0.70);
        assert_eq!(cfg.admission.min_messages, 10);
        assert_eq!(cfg.quota.free_daily, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn reveal_stage_timeout_lookup() {
        let cfg = StageConfig::default();
        assert_eq!(cfg.timeout_secs(RevealStage::Reveal), 0);
        assert_eq!(cfg.timeout_secs(RevealStage::Countdown), 30);
        assert_eq!(cfg.timeout_secs(RevealStage::Integration), 600);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: RevealConfig = toml::from_str(
            r#"
            [admission]
            threshold = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.admission.threshold, 0.8);
        assert_eq!(cfg.admission.min_messages, 10);
        assert_eq!(cfg.stages.countdown_timeout_secs, 30);
    }

    #[test]
    fn toml_round_trip() {
        let mut cfg = RevealConfig::default();
        cfg.stages.countdown_timeout_secs = 10;
        cfg.quota.plus_daily = 7;
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: RevealConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.stages.countdown_timeout_secs, 10);
        assert_eq!(back.quota.plus_daily, 7);
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = RevealConfig::default();
        cfg.admission.threshold = 1.2;
        assert!(cfg.validate().is_err());
    }
}
