use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::error::{ConfigError, FfbError};
use crate::core::plugin::FilenamePlugin;
use crate::core::preset::CUSTOM_PRESET;

pub const SETTINGS_FILE: &str = "settings.toml";
pub const PRESETS_FILE: &str = "presets.toml";

/// Key-value settings; every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_preset: String,
    pub filename_plugin: Option<String>,
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_preset: CUSTOM_PRESET.to_string(),
            filename_plugin: None,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Settings {
            message: e.message().to_string(),
        })
    }

    /// Reads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, FfbError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| FfbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml(&content)?)
    }

    pub fn filename_plugin(&self) -> Result<FilenamePlugin, ConfigError> {
        FilenamePlugin::parse(self.filename_plugin.as_deref())
    }
}

/// `settings/` next to the executable, or relative to the working
/// directory when the executable path is unavailable.
pub fn settings_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("settings")))
        .unwrap_or_else(|| PathBuf::from("settings"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn reads_all_keys() {
        let settings = Settings::from_toml(
            r#"
default_preset = "web"
filename_plugin = "python3 rename.py"
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
"#,
        )
        .unwrap();
        assert_eq!(settings.default_preset, "web");
        assert_eq!(settings.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(settings.ffprobe, "ffprobe");
        assert!(matches!(
            settings.filename_plugin().unwrap(),
            FilenamePlugin::Command { ref program, .. } if program == "python3"
        ));
    }

    #[test]
    fn wrong_type_is_a_settings_error() {
        assert!(matches!(
            Settings::from_toml("ffmpeg = 3"),
            Err(ConfigError::Settings { .. })
        ));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
