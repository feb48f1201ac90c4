use std::collections::BTreeSet;
use std::time::Duration;

use crate::core::value::{ConfigValue, SelectableValue, Size};

/// What a probe reports about one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMediaInfo {
    pub resolution: Size,
    pub frame_rate: f64,
    pub is_variable_frame_rate: bool,
    pub audio_codec: String,
    pub video_codec: String,
    pub duration: Duration,
}

/// The resolution context: everything the inputs of a batch contain.
///
/// `None` ranges mean the batch is empty; there is nothing to refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSourceInfo {
    pub resolution: Option<ConfigValue<Size>>,
    pub frame_rate: Option<ConfigValue<f64>>,
    pub is_variable_frame_rate: bool,
    pub audio_codec: SelectableValue<String>,
    pub video_codec: SelectableValue<String>,
    pub total_duration: Duration,
    pub item_count: usize,
}

impl AggregateSourceInfo {
    pub fn empty() -> Self {
        Self {
            resolution: None,
            frame_rate: None,
            is_variable_frame_rate: false,
            audio_codec: SelectableValue::Set(BTreeSet::new()),
            video_codec: SelectableValue::Set(BTreeSet::new()),
            total_duration: Duration::ZERO,
            item_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }
}

/// Reduces the probed inputs into ranges and sets.
///
/// Not maintained incrementally: call again whenever the work list changes.
pub fn aggregate(items: &[SourceMediaInfo]) -> AggregateSourceInfo {
    let Some(first) = items.first() else {
        return AggregateSourceInfo::empty();
    };

    let mut highest_resolution = first.resolution;
    let mut lowest_resolution = first.resolution;
    let mut highest_frame_rate = first.frame_rate;
    let mut lowest_frame_rate = first.frame_rate;

    for item in &items[1..] {
        highest_resolution = highest_resolution.max(item.resolution);
        lowest_resolution = lowest_resolution.min(item.resolution);
        if item.frame_rate > highest_frame_rate {
            highest_frame_rate = item.frame_rate;
        }
        if item.frame_rate < lowest_frame_rate {
            lowest_frame_rate = item.frame_rate;
        }
    }

    AggregateSourceInfo {
        resolution: Some(ConfigValue::Range {
            highest: highest_resolution,
            lowest: lowest_resolution,
        }),
        frame_rate: Some(ConfigValue::Range {
            highest: highest_frame_rate,
            lowest: lowest_frame_rate,
        }),
        is_variable_frame_rate: items.iter().any(|item| item.is_variable_frame_rate),
        audio_codec: SelectableValue::Set(
            items.iter().map(|item| item.audio_codec.clone()).collect(),
        ),
        video_codec: SelectableValue::Set(
            items.iter().map(|item| item.video_codec.clone()).collect(),
        ),
        total_duration: items.iter().map(|item| item.duration).sum(),
        item_count: items.len(),
    }
}

#[cfg(test)]
pub(crate) fn source(
    width: u32,
    height: u32,
    fps: f64,
    audio: &str,
    video: &str,
) -> SourceMediaInfo {
    SourceMediaInfo {
        resolution: Size::new(width, height),
        frame_rate: fps,
        is_variable_frame_rate: false,
        audio_codec: audio.to_string(),
        video_codec: video.to_string(),
        duration: Duration::from_secs(60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range<T: Copy>(value: &Option<ConfigValue<T>>) -> (T, T) {
        match value {
            Some(ConfigValue::Range { highest, lowest }) => (*highest, *lowest),
            other => panic!("expected a range, got {}", other.is_some()),
        }
    }

    fn set_len(value: &SelectableValue<String>) -> usize {
        match value {
            SelectableValue::Set(values) => values.len(),
            _ => panic!("expected a set"),
        }
    }

    #[test]
    fn empty_batch_has_no_values() {
        let info = aggregate(&[]);
        assert!(info.is_empty());
        assert_eq!(info.resolution, None);
        assert_eq!(info.frame_rate, None);
        assert_eq!(set_len(&info.audio_codec), 0);
        assert_eq!(info.total_duration, Duration::ZERO);
    }

    #[test]
    fn single_item_collapses_to_itself() {
        let info = aggregate(&[source(1280, 720, 30.0, "aac", "h264")]);
        assert_eq!(range(&info.resolution), (Size::new(1280, 720), Size::new(1280, 720)));
        assert_eq!(range(&info.frame_rate), (30.0, 30.0));
        assert_eq!(set_len(&info.audio_codec), 1);
        assert_eq!(set_len(&info.video_codec), 1);
    }

    #[test]
    fn ranges_and_sets_cover_all_items() {
        let items = [
            source(1280, 720, 29.97, "aac", "h264"),
            source(1920, 1080, 60.0, "opus", "h264"),
            source(640, 480, 24.0, "aac", "hevc"),
        ];
        let info = aggregate(&items);
        let (highest, lowest) = range(&info.resolution);
        assert_eq!(highest, Size::new(1920, 1080));
        assert_eq!(lowest, Size::new(640, 480));
        assert!(highest >= lowest);
        let (fast, slow) = range(&info.frame_rate);
        assert_eq!((fast, slow), (60.0, 24.0));
        assert_eq!(set_len(&info.audio_codec), 2);
        assert_eq!(set_len(&info.video_codec), 2);
        assert!((1..=items.len()).contains(&set_len(&info.audio_codec)));
        assert_eq!(info.total_duration, Duration::from_secs(180));
        assert_eq!(info.item_count, 3);
    }

    #[test]
    fn any_variable_frame_rate_input_marks_the_batch() {
        let mut vfr = source(1280, 720, 30.0, "aac", "h264");
        vfr.is_variable_frame_rate = true;
        let info = aggregate(&[source(1280, 720, 30.0, "aac", "h264"), vfr]);
        assert!(info.is_variable_frame_rate);
    }
}
