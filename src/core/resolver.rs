//! Turns user settings into concrete values and ffmpeg arguments.

use std::path::Path;

use crate::core::aggregate::{AggregateSourceInfo, SourceMediaInfo};
use crate::core::config::{EncodeConfig, ResolvedConfig};
use crate::core::error::ResolutionError;
use crate::core::value::{ConfigValue, SelectableValue};

pub const COPY_CODEC: &str = "copy";

/// Replaces every reference in `config` with a value taken from `context`.
///
/// Literals pass through whatever the context holds. `SameAsInput` yields the
/// value the caller bound into it; the resolver never chooses one itself.
pub fn resolve(
    config: &EncodeConfig,
    context: &AggregateSourceInfo,
) -> Result<ResolvedConfig, ResolutionError> {
    Ok(ResolvedConfig {
        resolution: resolve_ranged("resolution", &config.resolution, context.resolution.as_ref())?,
        frame_rate: resolve_ranged("framerate", &config.frame_rate, context.frame_rate.as_ref())?,
        is_variable_frame_rate: config.is_variable_frame_rate,
        audio_codec: resolve_selectable("audio_codec", &config.audio_codec, &context.audio_codec)?,
        video_codec: resolve_selectable("video_codec", &config.video_codec, &context.video_codec)?,
        encoding_args: config.encoding_args.clone(),
        input_file_args: config.input_file_args.clone(),
    })
}

/// Resolves `config`, falling back to a stream copy of `source` on failure.
/// The error is returned alongside so the caller can report it.
pub fn resolve_or_passthrough(
    config: &EncodeConfig,
    context: &AggregateSourceInfo,
    source: &SourceMediaInfo,
) -> (ResolvedConfig, Option<ResolutionError>) {
    match resolve(config, context) {
        Ok(resolved) => (resolved, None),
        Err(err) => (ResolvedConfig::passthrough(source), Some(err)),
    }
}

fn resolve_ranged<T: Clone>(
    field: &'static str,
    value: &ConfigValue<T>,
    context: Option<&ConfigValue<T>>,
) -> Result<T, ResolutionError> {
    let highest = match value {
        ConfigValue::Literal(literal) => return Ok(literal.clone()),
        ConfigValue::SameAsHighest => true,
        ConfigValue::SameAsLowest => false,
        ConfigValue::Range { .. } => {
            return Err(ResolutionError::ShapeMismatch {
                field,
                expected: "a literal or reference",
                found: value.shape(),
            })
        }
    };

    match context {
        Some(ConfigValue::Range {
            highest: high,
            lowest: low,
        }) => Ok(if highest { high.clone() } else { low.clone() }),
        Some(other) => Err(ResolutionError::ShapeMismatch {
            field,
            expected: "a range",
            found: other.shape(),
        }),
        None => Err(ResolutionError::MissingContext { field }),
    }
}

fn resolve_selectable(
    field: &'static str,
    value: &SelectableValue<String>,
    context: &SelectableValue<String>,
) -> Result<String, ResolutionError> {
    match value {
        SelectableValue::Literal(literal) => Ok(literal.clone()),
        SelectableValue::SameAsInput(chosen) => {
            if !matches!(context, SelectableValue::Set(_)) {
                return Err(ResolutionError::ShapeMismatch {
                    field,
                    expected: "a set",
                    found: context.shape(),
                });
            }
            if chosen.is_empty() {
                return Err(ResolutionError::UnboundInputSelection { field });
            }
            Ok(chosen.clone())
        }
        SelectableValue::Set(_) => Err(ResolutionError::ShapeMismatch {
            field,
            expected: "a literal or reference",
            found: value.shape(),
        }),
    }
}

/// Which resolved attributes differ from the source they will be applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputChanges {
    pub resolution: bool,
    pub audio_codec: bool,
    pub video_codec: bool,
}

impl InputChanges {
    pub fn detect(resolved: &ResolvedConfig, source: &SourceMediaInfo) -> Self {
        Self {
            resolution: resolved.resolution != source.resolution,
            audio_codec: resolved.audio_codec != source.audio_codec,
            video_codec: resolved.video_codec != source.video_codec,
        }
    }
}

/// Builds the transcode argument vector.
///
/// Codecs equal to the source become `copy` and the size flag is only
/// emitted when the resolution actually changes, so nothing is re-encoded
/// without a reason.
pub fn build_arguments(
    resolved: &ResolvedConfig,
    input: &Path,
    output: &Path,
    source: &SourceMediaInfo,
) -> Vec<String> {
    let changes = InputChanges::detect(resolved, source);
    let mut args = Vec::new();

    args.extend(resolved.input_file_args.iter().cloned());

    args.push("-i".to_string());
    args.push(input.to_string_lossy().into_owned());

    args.push("-c:a".to_string());
    args.push(codec_flag(changes.audio_codec, &resolved.audio_codec));

    args.push("-c:v".to_string());
    args.push(codec_flag(changes.video_codec, &resolved.video_codec));

    if changes.resolution {
        args.push("-s".to_string());
        args.push(resolved.resolution.to_string());
    }

    args.extend(resolved.encoding_args.iter().cloned());
    args.push(output.to_string_lossy().into_owned());

    args
}

fn codec_flag(changed: bool, codec: &str) -> String {
    if changed {
        codec.to_string()
    } else {
        COPY_CODEC.to_string()
    }
}
