//! ffprobe invocation and JSON output parsing.

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::core::aggregate::SourceMediaInfo;
use crate::core::command::ProcessStep;
use crate::core::error::ProbeError;
use crate::core::value::Size;

pub const PROBE_ARGS: [&str; 7] = [
    "-hide_banner",
    "-show_streams",
    "-show_format",
    "-of",
    "json",
    "-v",
    "quiet",
];

static FRACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)/(\d+)\s*$").unwrap());

pub fn probe_step(ffprobe: &str, path: &Path) -> ProcessStep {
    let mut arguments: Vec<String> = PROBE_ARGS.iter().map(|s| s.to_string()).collect();
    arguments.push(path.to_string_lossy().into_owned());
    ProcessStep::new(ffprobe, arguments)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Maps ffprobe's JSON into a [`SourceMediaInfo`].
///
/// The first video and the first audio stream describe the file.
pub fn parse_probe_output(json: &str) -> Result<SourceMediaInfo, ProbeError> {
    let output: ProbeOutput =
        serde_json::from_str(json).map_err(|e| ProbeError::MalformedOutput(e.to_string()))?;

    let duration = parse_duration(output.format.duration.as_deref())?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::MissingVideoStream)?;
    let audio = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or(ProbeError::MissingAudioStream)?;

    let (width, height) = video.width.zip(video.height).ok_or_else(|| {
        ProbeError::MalformedOutput("video stream has no dimensions".to_string())
    })?;

    let raw_rate = video.r_frame_rate.as_deref().unwrap_or_default();
    let frame_rate = parse_fraction(raw_rate)
        .flatten()
        .ok_or_else(|| {
            ProbeError::MalformedOutput(format!("failed to parse frame rate [{raw_rate}]"))
        })?;

    let average_rate = match video.avg_frame_rate.as_deref() {
        Some(raw) => parse_fraction(raw).ok_or_else(|| {
            ProbeError::MalformedOutput(format!("failed to parse frame rate [{raw}]"))
        })?,
        None => None,
    };

    Ok(SourceMediaInfo {
        resolution: Size::new(width, height),
        frame_rate,
        is_variable_frame_rate: average_rate.is_some_and(|avg| avg != frame_rate),
        audio_codec: codec_name(audio, "audio")?,
        video_codec: codec_name(video, "video")?,
        duration,
    })
}

fn parse_duration(raw: Option<&str>) -> Result<Duration, ProbeError> {
    let raw = raw.unwrap_or_default();
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ProbeError::DurationUnparseable(raw.to_string()))
}

/// `None` when the text is not a fraction, `Some(None)` for a zero
/// denominator (ffprobe's "unknown" rate).
fn parse_fraction(raw: &str) -> Option<Option<f64>> {
    let captures = FRACTION.captures(raw)?;
    let numerator: u64 = captures[1].parse().ok()?;
    let denominator: u64 = captures[2].parse().ok()?;
    if denominator == 0 {
        return Some(None);
    }
    Some(Some(numerator as f64 / denominator as f64))
}

fn codec_name(stream: &ProbeStream, kind: &str) -> Result<String, ProbeError> {
    stream
        .codec_name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ProbeError::MalformedOutput(format!("{kind} stream has no codec name")))
}
