//! Progress markers in tool output and remaining-time estimation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::command::ProgressAxis;
use crate::core::formatter::format_media_time;

/// Speed samples kept for the moving average.
pub const MAX_SAMPLES: usize = 20;

static TIME_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").unwrap());

/// Parses `HH:MM:SS[.frac]` as printed by ffmpeg.
pub fn parse_ffmpeg_time(value: &str) -> Option<Duration> {
    let mut parts = value.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = Duration::from_secs(hours * 3600 + minutes * 60);
    Some(whole + Duration::try_from_secs_f64(seconds).ok()?)
}

/// Position in milliseconds of the last `time=` marker on stderr, or `-1`.
pub fn ffmpeg_time_position(_stdout: &str, stderr: &str) -> i64 {
    TIME_MARKER
        .captures_iter(stderr)
        .last()
        .and_then(|captures| parse_ffmpeg_time(&captures[1]))
        .and_then(|time| i64::try_from(time.as_millis()).ok())
        .unwrap_or(-1)
}

/// Axis for an ffmpeg step over `[0, duration]` in milliseconds.
pub fn media_time_axis(duration: Duration) -> ProgressAxis {
    let max = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
    ProgressAxis::new(0, max, ffmpeg_time_position).with_formatter(|min, position, max| {
        format!(
            "{} / {}",
            format_media_time(millis(position - min)),
            format_media_time(millis(max - min))
        )
    })
}

fn millis(value: i64) -> Duration {
    Duration::from_millis(u64::try_from(value).unwrap_or(0))
}

/// One accepted progress marker, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReading {
    pub position: i64,
    pub fraction: f64,
    pub label: String,
    pub eta: Option<Duration>,
}

/// Rate-smoothed remaining-time estimate for one running step.
#[derive(Debug)]
pub struct ProgressEstimator {
    axis: ProgressAxis,
    samples: VecDeque<f64>,
    previous: Option<(i64, Instant)>,
    last_estimate: Option<Duration>,
}

impl ProgressEstimator {
    pub fn new(axis: ProgressAxis) -> Self {
        Self {
            axis,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            previous: None,
            last_estimate: None,
        }
    }

    /// Runs the axis parser; `None` when no marker was found.
    pub fn ingest(&self, stdout: &str, stderr: &str) -> Option<i64> {
        let position = self.axis.parse(stdout, stderr);
        (position >= 0).then_some(position)
    }

    /// Records a position; returns the new estimate or `None` when the
    /// sample is rejected or is the first one.
    pub fn observe(&mut self, position: i64, now: Instant) -> Option<Duration> {
        if !self.axis.contains(position) {
            return None;
        }

        let Some((last_position, last_time)) = self.previous else {
            self.previous = Some((position, now));
            return None;
        };

        let elapsed = now.checked_duration_since(last_time)?.as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }

        let speed = (position - last_position) as f64 / elapsed;
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(speed);
        self.previous = Some((position, now));

        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        if mean <= 0.0 {
            return None;
        }

        let remaining = (self.axis.max - position) as f64 / mean;
        let estimate = Duration::try_from_secs_f64(remaining).ok()?;
        self.last_estimate = Some(estimate);
        Some(estimate)
    }

    pub fn last_estimate(&self) -> Option<Duration> {
        self.last_estimate
    }

    /// Feeds one pair of output chunks through the parser and estimator.
    pub fn update(&mut self, stdout: &str, stderr: &str, now: Instant) -> Option<ProgressReading> {
        let position = self.ingest(stdout, stderr)?;
        if !self.axis.contains(position) {
            return None;
        }
        self.observe(position, now);
        Some(ProgressReading {
            position,
            fraction: self.axis.fraction(position),
            label: self.axis.format(position),
            eta: self.last_estimate(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(max: i64) -> ProgressEstimator {
        ProgressEstimator::new(ProgressAxis::new(0, max, ffmpeg_time_position))
    }

    #[test]
    fn parses_time_marker() {
        assert_eq!(ffmpeg_time_position("", "frame=10 time=00:01:02.50 bitrate=1k"), 62_500);
        assert_eq!(ffmpeg_time_position("", "no marker here"), -1);
        assert_eq!(ffmpeg_time_position("time=00:00:01.00", ""), -1);
    }

    #[test]
    fn last_marker_in_chunk_wins() {
        let chunk = "time=00:00:01.00 speed=1x\rframe=2 time=00:00:03.25 speed=1x\r";
        assert_eq!(ffmpeg_time_position("", chunk), 3_250);
    }

    #[test]
    fn parse_ffmpeg_time_rejects_garbage() {
        assert_eq!(parse_ffmpeg_time("01:00:00"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_ffmpeg_time("00:61:00"), None);
        assert_eq!(parse_ffmpeg_time("abc"), None);
    }

    #[test]
    fn ingest_filters_negative_positions() {
        let est = estimator(100_000);
        assert_eq!(est.ingest("", "nothing"), None);
        assert_eq!(est.ingest("", "time=00:01:02.50"), Some(62_500));
    }

    #[test]
    fn first_observation_sets_baseline() {
        let mut est = estimator(10_000);
        let start = Instant::now();
        assert_eq!(est.observe(0, start), None);
        let eta = est.observe(1_000, start + Duration::from_secs(1)).unwrap();
        assert_eq!(eta, Duration::from_secs(9));
        assert_eq!(est.last_estimate(), Some(eta));
    }

    #[test]
    fn rejected_updates_keep_last_estimate() {
        let mut est = estimator(10_000);
        let start = Instant::now();
        est.observe(0, start);
        let eta = est.observe(2_000, start + Duration::from_secs(1));
        assert!(eta.is_some());

        assert_eq!(est.observe(20_000, start + Duration::from_secs(2)), None);
        assert_eq!(est.observe(3_000, start + Duration::from_secs(1)), None);
        assert_eq!(est.last_estimate(), eta);
    }

    #[test]
    fn stalled_progress_does_not_produce_estimate() {
        let mut est = estimator(10_000);
        let start = Instant::now();
        est.observe(5_000, start);
        assert_eq!(est.observe(5_000, start + Duration::from_secs(1)), None);
        assert_eq!(est.last_estimate(), None);
    }

    #[test]
    fn window_is_bounded() {
        let mut est = estimator(1_000_000);
        let start = Instant::now();
        for i in 0..50 {
            est.observe(i * 100, start + Duration::from_secs(i as u64));
        }
        assert_eq!(est.samples.len(), MAX_SAMPLES);
    }

    #[test]
    fn update_returns_reading() {
        let mut est = ProgressEstimator::new(media_time_axis(Duration::from_secs(100)));
        let reading = est.update("", "time=00:00:50.00", Instant::now()).unwrap();
        assert_eq!(reading.position, 50_000);
        assert_eq!(reading.fraction, 0.5);
        assert_eq!(reading.label, "00h00m50s000ms / 00h01m40s000ms");
        assert_eq!(reading.eta, None);
        assert!(est.update("", "time=00:10:00.00", Instant::now()).is_none());
    }
}
