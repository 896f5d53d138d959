use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::doom_loop::{DoomLoopDetector, DEFAULT_DOOM_LOOP_THRESHOLD};
use crate::error::AppError;
use crate::planner::{PlannerOptions, DEFAULT_MIN_CONFIDENCE};
use crate::project::{read_json, write_json};

const SETTINGS_VERSION: u32 = 1;

/// Orchestrator settings stored in the app config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts-bindings", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-bindings", ts(export))]
pub struct OrchestratorSettings {
    pub version: u32,
    /// Fast-path recognizers below this confidence are skipped.
    #[serde(default = "default_min_confidence")]
    pub fast_path_min_confidence: f64,
    /// Identical consecutive calls that count as a doom loop.
    #[serde(default = "default_doom_loop_threshold")]
    pub doom_loop_threshold: usize,
    #[serde(default = "enabled")]
    pub playbooks_enabled: bool,
    #[serde(default)]
    pub audit_enabled: bool,
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_doom_loop_threshold() -> usize {
    DEFAULT_DOOM_LOOP_THRESHOLD
}

fn enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            fast_path_min_confidence: DEFAULT_MIN_CONFIDENCE,
            doom_loop_threshold: DEFAULT_DOOM_LOOP_THRESHOLD,
            playbooks_enabled: true,
            audit_enabled: false,
            log_level: default_log_level(),
        }
    }
}

impl OrchestratorSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(0.0..=1.0).contains(&self.fast_path_min_confidence) {
            return Err(AppError::InvalidConfig {
                message: format!(
                    "fast_path_min_confidence must be within 0..=1, got {}",
                    self.fast_path_min_confidence
                ),
            });
        }
        if self.doom_loop_threshold < 2 {
            return Err(AppError::InvalidConfig {
                message: format!(
                    "doom_loop_threshold must be at least 2, got {}",
                    self.doom_loop_threshold
                ),
            });
        }
        if self.log_level.trim().is_empty() {
            return Err(AppError::InvalidConfig {
                message: "log_level must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn planner_options(&self) -> PlannerOptions {
        PlannerOptions {
            min_confidence: self.fast_path_min_confidence,
            playbooks_enabled: self.playbooks_enabled,
        }
    }

    /// Detector sized by `doom_loop_threshold`. A hand-edited file can carry a
    /// window that `save_settings` would have refused.
    pub fn doom_loop_detector(&self) -> Result<DoomLoopDetector, AppError> {
        DoomLoopDetector::new(self.doom_loop_threshold)
    }

    /// Apply a `key=value` override from the CLI.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        let invalid = |what: &str| AppError::InvalidConfig {
            message: format!("invalid value {value:?} for {key}: expected {what}"),
        };
        match key {
            "fast_path_min_confidence" => {
                self.fast_path_min_confidence = value.parse().map_err(|_| invalid("a number"))?;
            }
            "doom_loop_threshold" => {
                self.doom_loop_threshold = value.parse().map_err(|_| invalid("an integer"))?;
            }
            "playbooks_enabled" => {
                self.playbooks_enabled = value.parse().map_err(|_| invalid("true or false"))?;
            }
            "audit_enabled" => {
                self.audit_enabled = value.parse().map_err(|_| invalid("true or false"))?;
            }
            "log_level" => self.log_level = value.to_string(),
            _ => {
                return Err(AppError::InvalidConfig {
                    message: format!("unknown setting '{key}'"),
                })
            }
        }
        self.validate()
    }
}

/// Load settings from the app config directory. Returns None if no settings
/// file exists or it cannot be parsed.
pub fn load_settings(app_config_dir: &Path) -> Option<OrchestratorSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<OrchestratorSettings>(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            None
        }
    }
}

/// Validate and save settings to the app config directory.
pub fn save_settings(app_config_dir: &Path, settings: &OrchestratorSettings) -> Result<(), AppError> {
    settings.validate()?;
    std::fs::create_dir_all(app_config_dir)?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = OrchestratorSettings::default();
        settings.audit_enabled = true;
        settings.fast_path_min_confidence = 0.9;
        save_settings(dir.path(), &settings).unwrap();

        let loaded = load_settings(dir.path()).expect("should load");
        assert_eq!(loaded, settings);
        assert_eq!(loaded.planner_options().min_confidence, 0.9);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(dir.path()).is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            crate::paths::settings_path(dir.path()),
            r#"{ "version": 1, "audit_enabled": true }"#,
        )
        .unwrap();
        let loaded = load_settings(dir.path()).unwrap();
        assert!(loaded.audit_enabled);
        assert_eq!(loaded.doom_loop_threshold, 3);
        assert_eq!(loaded.fast_path_min_confidence, 0.85);
        assert!(loaded.playbooks_enabled);
    }

    #[test]
    fn test_hand_edited_window_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            crate::paths::settings_path(dir.path()),
            r#"{ "version": 1, "doom_loop_threshold": 1 }"#,
        )
        .unwrap();
        let loaded = load_settings(dir.path()).unwrap();
        let err = loaded.doom_loop_detector().unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
        assert!(err.to_string().contains("at least 2"));

        let detector = OrchestratorSettings::default().doom_loop_detector().unwrap();
        assert_eq!(detector.capacity(), 3);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = OrchestratorSettings::default();
        settings.doom_loop_threshold = 1;
        assert_eq!(save_settings(dir.path(), &settings).unwrap_err().code(), "INVALID_CONFIG");
        assert!(load_settings(dir.path()).is_none());

        let mut settings = OrchestratorSettings::default();
        assert!(settings.set("fast_path_min_confidence", "1.5").is_err());
        assert!(settings.set("playbooks_enabled", "maybe").is_err());
        assert!(settings.set("colour", "red").is_err());
        settings.set("doom_loop_threshold", "5").unwrap();
        assert_eq!(settings.doom_loop_threshold, 5);
    }
}
