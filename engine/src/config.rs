//! Engine configuration file.
//!
//! A plain INI with two recognised options:
//!
//! ```ini
//! [General]
//! logLevel = debug
//!
//! [Haptics]
//! globallyDisableHapticFeedback = 0
//! ```
//!
//! The file is created with defaults when missing. Unknown sections and
//! keys are ignored; unparsable values keep their defaults.

use std::fmt;
use std::path::Path;

use ini::Ini;
use tracing::{info, warn};

use crate::error::{EngineError, Result};

const DEFAULT_FILE: &str = "\
; Projectile engine configuration

[General]
; trace, debug, info, warn, error, critical or off
logLevel = debug

[Haptics]
; 1 disables every haptic pulse
globallyDisableHapticFeedback = 0
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    Off,
}

impl LogLevel {
    /// Case-insensitive; `None` for anything unrecognised.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Critical => "error",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub log_level: LogLevel,
    pub globally_disable_haptic_feedback: bool,
}

impl EngineConfig {
    /// Read `path`, writing the default file first when it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, DEFAULT_FILE)?;
            info!("config: wrote defaults to {}", path.display());
        }
        let ini = Ini::load_from_file(path).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_ini(&ini);
        info!(
            "config: logLevel={} globallyDisableHapticFeedback={}",
            config.log_level, config.globally_disable_haptic_feedback
        );
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| EngineError::Config {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        Ok(Self::from_ini(&ini))
    }

    fn from_ini(ini: &Ini) -> Self {
        let mut config = Self::default();
        if let Some(value) = ini.get_from(Some("General"), "logLevel") {
            match LogLevel::parse(value) {
                Some(level) => config.log_level = level,
                None => warn!("config: unknown logLevel '{}', using {}", value, config.log_level),
            }
        }
        if let Some(value) = ini.get_from(Some("Haptics"), "globallyDisableHapticFeedback") {
            match value.trim().parse::<i64>() {
                Ok(flag) => config.globally_disable_haptic_feedback = flag != 0,
                Err(_) => warn!("config: globallyDisableHapticFeedback '{}' is not an integer", value),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.ini");
        let config = EngineConfig::load_or_create(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(path.exists());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("logLevel = debug"));
    }

    #[test]
    fn test_values_are_read() {
        let config = EngineConfig::parse(
            "[General]\nlogLevel = Warning\n[Haptics]\ngloballyDisableHapticFeedback = 1\n",
        )
        .unwrap();
        assert_eq!(config.log_level, LogLevel::Warn);
        assert!(config.globally_disable_haptic_feedback);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config =
            EngineConfig::parse("[General]\nlogLevel = loud\n[Haptics]\ngloballyDisableHapticFeedback = yes\n")
                .unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::parse("critical").map(|l| l.as_filter()), Some("error"));
        assert_eq!(LogLevel::parse("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("OFF"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ini");
        std::fs::write(&path, "[General]\nlogLevel = trace\n").unwrap();
        let config = EngineConfig::load_or_create(&path).unwrap();
        assert_eq!(config.log_level, LogLevel::Trace);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("Haptics"));
    }
}
