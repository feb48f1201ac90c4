use std::time::Duration;

use crate::core::aggregate::{AggregateSourceInfo, SourceMediaInfo};
use crate::core::config::EncodeConfig;
use crate::core::progress::ProgressReading;

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Remaining time as `01h02m03s`.
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => {
            let total_secs = eta.as_secs();
            format!(
                "{:02}h{:02}m{:02}s",
                total_secs / 3600,
                (total_secs % 3600) / 60,
                total_secs % 60
            )
        }
        None => "--h--m--s".to_string(),
    }
}

/// Media position as `00h01m02s500ms`.
pub fn format_media_time(time: Duration) -> String {
    let total_secs = time.as_secs();
    format!(
        "{:02}h{:02}m{:02}s{:03}ms",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        time.subsec_millis()
    )
}

pub fn format_source_line(info: &SourceMediaInfo) -> String {
    let vfr = if info.is_variable_frame_rate { " (vfr)" } else { "" };
    format!(
        "{} @ {:.3}fps{vfr}, video={}, audio={}, length={}",
        info.resolution,
        info.frame_rate,
        info.video_codec,
        info.audio_codec,
        format_duration(info.duration)
    )
}

pub fn format_aggregate_line(info: &AggregateSourceInfo) -> String {
    if info.is_empty() {
        return "no probed inputs".to_string();
    }
    let resolution = info
        .resolution
        .as_ref()
        .map(|r| r.to_string())
        .unwrap_or_default();
    let frame_rate = info
        .frame_rate
        .as_ref()
        .map(|r| r.to_string())
        .unwrap_or_default();
    let vfr = if info.is_variable_frame_rate { " (vfr)" } else { "" };
    format!(
        "{} item(s): resolution {resolution}, framerate {frame_rate}{vfr}, \
         video {}, audio {}, total length {}",
        info.item_count,
        info.video_codec,
        info.audio_codec,
        format_duration(info.total_duration)
    )
}

pub fn format_config_line(config: &EncodeConfig) -> String {
    format!(
        "resolution={} framerate={} video={} audio={}",
        config.resolution, config.frame_rate, config.video_codec, config.audio_codec
    )
}

/// `2/5`, or just `2` when the plan cannot say how many steps it has.
pub fn format_step_counter(index: usize, total: Option<usize>) -> String {
    match total {
        Some(total) => format!("{}/{total}", index + 1),
        None => format!("{}", index + 1),
    }
}

pub fn format_progress_reading(reading: &ProgressReading) -> String {
    format!(
        "{:>5.1}%  {}  eta {}",
        reading.fraction * 100.0,
        reading.label,
        format_eta(reading.eta)
    )
}
