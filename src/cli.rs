use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ffbatch::core::config::EncodeConfig;
use ffbatch::core::error::FfbError;
use ffbatch::core::value::{ConfigValue, SelectableValue, Size, SAME_AS_INPUT};

#[derive(Debug, Parser)]
#[command(
    name = "ffbatch",
    version,
    about = "Batch ffmpeg transcoding with input-relative settings"
)]
pub struct Cli {
    /// Settings file (default: settings/settings.toml next to the executable)
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Preset document (default: settings/presets.toml next to the executable)
    #[arg(long, global = true, value_name = "FILE")]
    pub presets: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Probe the inputs, then transcode them
    Encode(EncodeArgs),
    /// Print what ffprobe reports for each input and for the whole batch
    Probe(ProbeArgs),
    /// List the presets in the preset document
    Presets,
}

/// Where the inputs come from.
#[derive(Debug, Args)]
pub struct InputArgs {
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Work list with one input path per line
    #[arg(short = 'l', long = "list", value_name = "FILE")]
    pub list: Option<PathBuf>,

    /// Shortest inputs first
    #[arg(long)]
    pub sort: bool,

    /// Print to the console instead of the terminal view
    #[arg(long)]
    pub plain: bool,
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output directory (default: next to each input)
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Preset name; `custom` uses the settings below
    #[arg(short = 'p', long)]
    pub preset: Option<String>,

    /// `highest`, `lowest` or WIDTHxHEIGHT
    #[arg(long, default_value = "highest", value_parser = parse_resolution)]
    pub resolution: ConfigValue<Size>,

    /// `highest`, `lowest` or frames per second
    #[arg(long, default_value = "highest", value_parser = parse_frame_rate)]
    pub framerate: ConfigValue<f64>,

    /// Keep a variable frame rate
    #[arg(long)]
    pub vfr: bool,

    /// Audio codec, or `same` to keep each input's
    #[arg(long, default_value = "same")]
    pub acodec: String,

    /// Video codec, or `same` to keep each input's
    #[arg(long, default_value = "same")]
    pub vcodec: String,

    /// Extra arguments placed before `-i`
    #[arg(long = "input-args", value_name = "ARGS", allow_hyphen_values = true)]
    pub input_args: Option<String>,

    /// Extra encoder arguments
    #[arg(long = "args", value_name = "ARGS", allow_hyphen_values = true)]
    pub encoding_args: Option<String>,

    /// Transcode each item right after probing it, against its own properties
    #[arg(long)]
    pub immediate: bool,

    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

fn parse_reference<T>(value: &str) -> Option<ConfigValue<T>> {
    match value.trim() {
        "highest" => Some(ConfigValue::SameAsHighest),
        "lowest" => Some(ConfigValue::SameAsLowest),
        other => ConfigValue::parse_reference(other),
    }
}

pub fn parse_resolution(value: &str) -> Result<ConfigValue<Size>, String> {
    if let Some(reference) = parse_reference(value) {
        return Ok(reference);
    }
    value.parse::<Size>().map(ConfigValue::Literal)
}

pub fn parse_frame_rate(value: &str) -> Result<ConfigValue<f64>, String> {
    if let Some(reference) = parse_reference(value) {
        return Ok(reference);
    }
    let rate = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid frame rate '{value}': {e}"))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(format!("frame rate must be positive, got '{value}'"));
    }
    Ok(ConfigValue::Literal(rate))
}

fn parse_codec(value: &str) -> SelectableValue<String> {
    if value.trim() == "same" {
        SelectableValue::parse(SAME_AS_INPUT)
    } else {
        SelectableValue::parse(value)
    }
}

fn split_args(value: Option<&str>) -> Result<Vec<String>, FfbError> {
    match value {
        Some(text) => shell_words::split(text).map_err(|err| FfbError::InvalidCommand {
            message: format!("could not split '{text}': {err}"),
        }),
        None => Ok(Vec::new()),
    }
}

impl EncodeArgs {
    /// The settings the `custom` preset stands for.
    pub fn custom_config(&self) -> Result<EncodeConfig, FfbError> {
        let mut encoding_args = split_args(self.encoding_args.as_deref())?;
        encoding_args.extend(self.extra_args.iter().cloned());
        Ok(EncodeConfig {
            resolution: self.resolution.clone(),
            frame_rate: self.framerate.clone(),
            is_variable_frame_rate: self.vfr,
            audio_codec: parse_codec(&self.acodec),
            video_codec: parse_codec(&self.vcodec),
            encoding_args,
            input_file_args: split_args(self.input_args.as_deref())?,
        })
    }
}
