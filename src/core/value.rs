//! Encode attributes that are either concrete or defer to the inputs.
//!
//! The same enums describe two things: a per-item user setting (literal or
//! reference) and, inside an aggregate, what the inputs actually contain
//! (a range or a set). Which variants are legal depends on the role; the
//! resolver rejects the wrong ones.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const SAME_AS_HIGHEST: &str = "same as highest";
pub const SAME_AS_LOWEST: &str = "same as lowest";
pub const SAME_AS_INPUT: &str = "same as input";

/// Frame dimensions, ordered by pixel count first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl Ord for Size {
    fn cmp(&self, other: &Self) -> Ordering {
        self.area()
            .cmp(&other.area())
            .then(self.width.cmp(&other.width))
            .then(self.height.cmp(&other.height))
    }
}

impl PartialOrd for Size {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(&['x', 'X'][..])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = width
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid width '{width}': {e}"))?;
        let height = height
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid height '{height}': {e}"))?;
        Ok(Size::new(width, height))
    }
}

/// A numeric attribute such as resolution or frame rate.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue<T> {
    Literal(T),
    SameAsHighest,
    SameAsLowest,
    /// Only found in an aggregate of inputs.
    Range { highest: T, lowest: T },
}

impl<T> ConfigValue<T> {
    /// Maps the textual reference forms used in presets and on the command line.
    pub fn parse_reference(text: &str) -> Option<Self> {
        match text.trim() {
            SAME_AS_HIGHEST => Some(ConfigValue::SameAsHighest),
            SAME_AS_LOWEST => Some(ConfigValue::SameAsLowest),
            _ => None,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            ConfigValue::Literal(_) => "a literal",
            ConfigValue::SameAsHighest => "'same as highest'",
            ConfigValue::SameAsLowest => "'same as lowest'",
            ConfigValue::Range { .. } => "a range",
        }
    }
}

impl<T: fmt::Display> fmt::Display for ConfigValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Literal(value) => write!(f, "{value}"),
            ConfigValue::SameAsHighest => f.write_str(SAME_AS_HIGHEST),
            ConfigValue::SameAsLowest => f.write_str(SAME_AS_LOWEST),
            ConfigValue::Range { highest, lowest } => write!(f, "{lowest}..{highest}"),
        }
    }
}

/// A string attribute such as a codec name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectableValue<T: Ord> {
    Literal(T),
    /// Carries the input value the caller picked to match.
    SameAsInput(T),
    /// Only found in an aggregate of inputs.
    Set(BTreeSet<T>),
}

impl<T: Ord> SelectableValue<T> {
    pub fn shape(&self) -> &'static str {
        match self {
            SelectableValue::Literal(_) => "a literal",
            SelectableValue::SameAsInput(_) => "'same as input'",
            SelectableValue::Set(_) => "a set",
        }
    }
}

impl SelectableValue<String> {
    /// `"same as input"` becomes an unbound reference, anything else a literal.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed == SAME_AS_INPUT {
            SelectableValue::SameAsInput(String::new())
        } else {
            SelectableValue::Literal(trimmed.to_string())
        }
    }
}

impl<T: Ord + fmt::Display> fmt::Display for SelectableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectableValue::Literal(value) => write!(f, "{value}"),
            SelectableValue::SameAsInput(value) => {
                let rendered = value.to_string();
                if rendered.is_empty() {
                    f.write_str(SAME_AS_INPUT)
                } else {
                    write!(f, "{SAME_AS_INPUT} ({rendered})")
                }
            }
            SelectableValue::Set(values) => {
                let joined = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{joined}}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_orders_by_area_then_width() {
        assert!(Size::new(1920, 1080) > Size::new(1280, 720));
        assert!(Size::new(1080, 1920) < Size::new(1920, 1080));
        assert_eq!(Size::new(640, 480).cmp(&Size::new(640, 480)), Ordering::Equal);
    }

    #[test]
    fn size_parses_and_displays() {
        let size: Size = "1920x1080".parse().unwrap();
        assert_eq!(size, Size::new(1920, 1080));
        assert_eq!(size.to_string(), "1920x1080");
        assert!("1920".parse::<Size>().is_err());
        assert!("axb".parse::<Size>().is_err());
    }

    #[test]
    fn reference_strings_map_to_variants() {
        assert_eq!(
            ConfigValue::<Size>::parse_reference("same as highest"),
            Some(ConfigValue::SameAsHighest)
        );
        assert_eq!(
            ConfigValue::<f64>::parse_reference("same as lowest"),
            Some(ConfigValue::SameAsLowest)
        );
        assert_eq!(ConfigValue::<f64>::parse_reference("highest"), None);
        assert_eq!(
            SelectableValue::parse("same as input"),
            SelectableValue::SameAsInput(String::new())
        );
        assert_eq!(
            SelectableValue::parse("hevc"),
            SelectableValue::Literal("hevc".to_string())
        );
    }

    #[test]
    fn display_forms() {
        let range = ConfigValue::Range {
            highest: Size::new(1920, 1080),
            lowest: Size::new(640, 480),
        };
        assert_eq!(range.to_string(), "640x480..1920x1080");
        let set = SelectableValue::Set(BTreeSet::from(["aac".to_string(), "opus".to_string()]));
        assert_eq!(set.to_string(), "{aac, opus}");
        assert_eq!(
            SelectableValue::SameAsInput("aac".to_string()).to_string(),
            "same as input (aac)"
        );
    }
}
