use crate::core::aggregate::SourceMediaInfo;
use crate::core::value::{ConfigValue, SelectableValue, Size};

/// User-facing encode settings; may still refer to the inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeConfig {
    pub resolution: ConfigValue<Size>,
    pub frame_rate: ConfigValue<f64>,
    pub is_variable_frame_rate: bool,
    pub audio_codec: SelectableValue<String>,
    pub video_codec: SelectableValue<String>,
    pub encoding_args: Vec<String>,
    pub input_file_args: Vec<String>,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            resolution: ConfigValue::SameAsHighest,
            frame_rate: ConfigValue::SameAsHighest,
            is_variable_frame_rate: false,
            audio_codec: SelectableValue::SameAsInput(String::new()),
            video_codec: SelectableValue::SameAsInput(String::new()),
            encoding_args: Vec::new(),
            input_file_args: Vec::new(),
        }
    }
}

impl EncodeConfig {
    /// Every attribute equal to the source; produces a pure stream copy.
    pub fn matching(source: &SourceMediaInfo) -> Self {
        Self {
            resolution: ConfigValue::Literal(source.resolution),
            frame_rate: ConfigValue::Literal(source.frame_rate),
            is_variable_frame_rate: source.is_variable_frame_rate,
            audio_codec: SelectableValue::Literal(source.audio_codec.clone()),
            video_codec: SelectableValue::Literal(source.video_codec.clone()),
            encoding_args: Vec::new(),
            input_file_args: Vec::new(),
        }
    }

    /// Picks the item's own codecs for any unbound "same as input" setting.
    /// A value the user already chose is left alone.
    pub fn bind_input_selection(&mut self, source: &SourceMediaInfo) {
        bind(&mut self.audio_codec, &source.audio_codec);
        bind(&mut self.video_codec, &source.video_codec);
    }
}

fn bind(value: &mut SelectableValue<String>, chosen: &str) {
    if let SelectableValue::SameAsInput(current) = value {
        if current.is_empty() {
            *current = chosen.to_string();
        }
    }
}

/// Encode settings with every reference replaced by a concrete value.
///
/// Only this type can be turned into command-line arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub resolution: Size,
    pub frame_rate: f64,
    pub is_variable_frame_rate: bool,
    pub audio_codec: String,
    pub video_codec: String,
    pub encoding_args: Vec<String>,
    pub input_file_args: Vec<String>,
}

impl ResolvedConfig {
    /// The fallback used when a configuration cannot be resolved: the
    /// source's own values, i.e. a plain stream copy.
    pub fn passthrough(source: &SourceMediaInfo) -> Self {
        Self {
            resolution: source.resolution,
            frame_rate: source.frame_rate,
            is_variable_frame_rate: source.is_variable_frame_rate,
            audio_codec: source.audio_codec.clone(),
            video_codec: source.video_codec.clone(),
            encoding_args: Vec::new(),
            input_file_args: Vec::new(),
        }
    }
}
