//! Centralized path definitions for all data files and directories.
//!
//! This module is the single source of truth for leaf filenames and
//! directory names. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "com.cutline.orchestrator";

/// Overrides the config directory (tests, portable installs).
pub const CONFIG_DIR_ENV: &str = "CUTLINE_CONFIG_DIR";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "orchestrator.json";

// ── Directory names ──────────────────────────────────────────────

pub const AUDIT_LOGS_DIR: &str = "audit-logs";

// ── Config-dir functions (take app_config_dir) ───────────────────

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

pub fn audit_logs_dir(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(AUDIT_LOGS_DIR)
}

/// Platform config directory for the app: `$CUTLINE_CONFIG_DIR` if set,
/// else `$XDG_CONFIG_HOME/{APP_ID}`, `%APPDATA%\{APP_ID}` or
/// `~/.config/{APP_ID}`.
pub fn default_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    let base = if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    };
    base.map(|b| b.join(APP_ID))
}
