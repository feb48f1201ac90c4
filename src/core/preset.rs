//! Named encode presets stored in a versioned TOML document.
//!
//! ```toml
//! VERSION = 1
//!
//! [web]
//! resolution = { width = 1280, height = 720 }
//! framerate = "same as highest"
//! is_vfr = false
//! audio_codec = "aac"
//! video_codec = "same as input"
//! encoding_args = ["-crf", "23"]
//! input_file_args = []
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::core::config::EncodeConfig;
use crate::core::error::{ConfigError, FfbError};
use crate::core::value::{ConfigValue, SelectableValue, Size};

/// The preset name meaning "use the command-line settings".
pub const CUSTOM_PRESET: &str = "custom";

const VERSION_KEY: &str = "VERSION";

/// First document version that requires `input_file_args`.
const INPUT_ARGS_VERSION: i64 = 1;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResolution {
    Text(String),
    Dimensions { width: u32, height: u32 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFrameRate {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, Default)]
pub struct PresetStore {
    version: i64,
    presets: BTreeMap<String, toml::Table>,
}

impl PresetStore {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let document: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            ConfigError::Document {
                message: e.message().to_string(),
            }
        })?;

        let mut store = PresetStore::default();
        for (key, value) in document {
            if key == VERSION_KEY {
                store.version = value.as_integer().ok_or_else(|| ConfigError::Document {
                    message: format!("{VERSION_KEY} must be an integer"),
                })?;
                continue;
            }
            match value {
                toml::Value::Table(table) => {
                    store.presets.insert(key, table);
                }
                _ => tracing::debug!(key = %key, "ignoring non-table entry in preset document"),
            }
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self, FfbError> {
        let content = fs::read_to_string(path).map_err(|source| FfbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content)?)
    }

    /// Loads the document if it exists; a missing or broken file yields an
    /// empty store and a warning.
    pub fn load_or_empty(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no preset document");
            return Self::default();
        }
        match Self::load(path) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(path = %path.display(), "failed to load presets: {err}");
                Self::default()
            }
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<EncodeConfig, ConfigError> {
        let table = self
            .presets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPreset {
                preset: name.to_string(),
            })?;
        let reader = PresetReader { name, table };

        let resolution = match reader.field::<RawResolution>("resolution")? {
            RawResolution::Dimensions { width, height } => {
                ConfigValue::Literal(Size::new(width, height))
            }
            RawResolution::Text(text) => match ConfigValue::parse_reference(&text) {
                Some(reference) => reference,
                None => ConfigValue::Literal(
                    text.parse::<Size>()
                        .map_err(|message| reader.invalid("resolution", message))?,
                ),
            },
        };

        let frame_rate = match reader.field::<RawFrameRate>("framerate")? {
            RawFrameRate::Number(fps) if fps > 0.0 => ConfigValue::Literal(fps),
            RawFrameRate::Number(fps) => {
                return Err(reader.invalid("framerate", format!("{fps} is not a positive rate")))
            }
            RawFrameRate::Text(text) => ConfigValue::parse_reference(&text).ok_or_else(|| {
                reader.invalid("framerate", format!("unknown reference '{text}'"))
            })?,
        };

        let input_file_args = if self.version >= INPUT_ARGS_VERSION {
            reader.field::<Vec<String>>("input_file_args")?
        } else {
            Vec::new()
        };

        Ok(EncodeConfig {
            resolution,
            frame_rate,
            is_variable_frame_rate: reader.field("is_vfr")?,
            audio_codec: SelectableValue::parse(&reader.field::<String>("audio_codec")?),
            video_codec: SelectableValue::parse(&reader.field::<String>("video_codec")?),
            encoding_args: reader.field("encoding_args")?,
            input_file_args,
        })
    }

    /// The config for a job: `custom` selects the command-line settings.
    pub fn config_for(
        &self,
        name: &str,
        custom: &EncodeConfig,
    ) -> Result<EncodeConfig, ConfigError> {
        if name == CUSTOM_PRESET {
            Ok(custom.clone())
        } else {
            self.get(name)
        }
    }
}

struct PresetReader<'a> {
    name: &'a str,
    table: &'a toml::Table,
}

impl PresetReader<'_> {
    fn field<T: DeserializeOwned>(&self, field: &'static str) -> Result<T, ConfigError> {
        let value = self.table.get(field).ok_or_else(|| ConfigError::MissingField {
            preset: self.name.to_string(),
            field,
        })?;
        value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| self.invalid(field, e.message().to_string()))
    }

    fn invalid(&self, field: &'static str, message: String) -> ConfigError {
        ConfigError::InvalidField {
            preset: self.name.to_string(),
            field,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
VERSION = 1

[web]
resolution = { width = 1280, height = 720 }
framerate = 30
is_vfr = false
audio_codec = "aac"
video_codec = "same as input"
encoding_args = ["-crf", "23"]
input_file_args = ["-hwaccel", "auto"]

[archive]
resolution = "same as highest"
framerate = "same as lowest"
is_vfr = true
audio_codec = "same as input"
video_codec = "hevc"
encoding_args = []
input_file_args = []

[broken]
resolution = "same as highest"
framerate = "fast"
is_vfr = false
audio_codec = "aac"
video_codec = "h264"
encoding_args = []
input_file_args = []
"#;

    #[test]
    fn lists_presets_without_version_key() {
        let store = PresetStore::parse(DOCUMENT).unwrap();
        assert_eq!(store.version(), 1);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["archive", "broken", "web"]);
    }

    #[test]
    fn reads_literal_preset() {
        let config = PresetStore::parse(DOCUMENT).unwrap().get("web").unwrap();
        assert_eq!(config.resolution, ConfigValue::Literal(Size::new(1280, 720)));
        assert_eq!(config.frame_rate, ConfigValue::Literal(30.0));
        assert_eq!(config.audio_codec, SelectableValue::Literal("aac".to_string()));
        assert_eq!(config.video_codec, SelectableValue::SameAsInput(String::new()));
        assert_eq!(config.encoding_args, vec!["-crf", "23"]);
        assert_eq!(config.input_file_args, vec!["-hwaccel", "auto"]);
    }

    #[test]
    fn reads_reference_preset() {
        let config = PresetStore::parse(DOCUMENT).unwrap().get("archive").unwrap();
        assert_eq!(config.resolution, ConfigValue::SameAsHighest);
        assert_eq!(config.frame_rate, ConfigValue::SameAsLowest);
        assert!(config.is_variable_frame_rate);
    }

    #[test]
    fn invalid_field_names_preset_and_field() {
        let err = PresetStore::parse(DOCUMENT).unwrap().get("broken").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField { ref preset, field: "framerate", .. } if preset == "broken"
        ));
    }

    #[test]
    fn version_one_requires_input_file_args() {
        let document = r#"
VERSION = 1
[old]
resolution = "same as highest"
framerate = "same as highest"
is_vfr = false
audio_codec = "aac"
video_codec = "h264"
encoding_args = []
"#;
        let store = PresetStore::parse(document).unwrap();
        assert_eq!(
            store.get("old").unwrap_err(),
            ConfigError::MissingField {
                preset: "old".to_string(),
                field: "input_file_args",
            }
        );

        let legacy = PresetStore::parse(&document.replace("VERSION = 1", "VERSION = 0")).unwrap();
        assert!(legacy.get("old").unwrap().input_file_args.is_empty());
    }

    #[test]
    fn unknown_preset_and_custom_selection() {
        let store = PresetStore::parse(DOCUMENT).unwrap();
        assert!(matches!(store.get("missing"), Err(ConfigError::UnknownPreset { .. })));
        let custom = EncodeConfig::default();
        assert_eq!(store.config_for(CUSTOM_PRESET, &custom).unwrap(), custom);
    }

    #[test]
    fn malformed_document_is_a_document_error() {
        assert!(matches!(
            PresetStore::parse("VERSION = ["),
            Err(ConfigError::Document { .. })
        ));
    }

    #[test]
    fn load_or_empty_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::load_or_empty(&dir.path().join("presets.toml"));
        assert!(store.is_empty());

        let path = dir.path().join("real.toml");
        std::fs::write(&path, DOCUMENT).unwrap();
        assert!(!PresetStore::load_or_empty(&path).is_empty());
    }
}
