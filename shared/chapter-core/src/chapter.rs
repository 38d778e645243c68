//! Chapter records and millisecond-resolution chapter timestamps

use crate::{ChapterCoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A chapter timestamp, canonically held at millisecond resolution.
///
/// Parsing accepts the Matroska `HH:MM:SS.nnnnnnnnn` form with any number of
/// fractional digits and truncates (never rounds) to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChapterTime {
    millis: u64,
}

impl ChapterTime {
    pub const ZERO: ChapterTime = ChapterTime { millis: 0 };

    pub fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    /// Negative and non-finite inputs collapse to zero.
    pub fn from_secs_f64(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Self::ZERO;
        }
        Self {
            millis: (seconds * 1000.0).floor() as u64,
        }
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.millis as f64 / 1000.0
    }

    /// Parse `H+:MM:SS[.fraction]`
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || ChapterCoreError::InvalidTimestamp(text.to_string());
        let trimmed = text.trim();

        let mut parts = trimmed.split(':');
        let (hours, minutes, seconds) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(m), Some(s), None) => (h, m, s),
            _ => return Err(invalid()),
        };

        let (whole_seconds, fraction) = match seconds.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (seconds, ""),
        };

        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(hours) || !all_digits(minutes) || !all_digits(whole_seconds) {
            return Err(invalid());
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let hours: u64 = hours.parse().map_err(|_| invalid())?;
        let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
        let whole_seconds: u64 = whole_seconds.parse().map_err(|_| invalid())?;
        if minutes >= 60 || whole_seconds >= 60 {
            return Err(invalid());
        }

        // Keep at most three fractional digits, right-padded
        let mut millis_part = 0u64;
        for (i, digit) in fraction.bytes().take(3).enumerate() {
            millis_part += u64::from(digit - b'0') * 10u64.pow(2 - i as u32);
        }

        let millis = hours
            .checked_mul(3600)
            .and_then(|s| s.checked_add(minutes * 60 + whole_seconds))
            .and_then(|s| s.checked_mul(1000))
            .and_then(|ms| ms.checked_add(millis_part))
            .ok_or_else(invalid)?;
        Ok(Self { millis })
    }
}

impl fmt::Display for ChapterTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_seconds = self.millis / 1000;
        let millis = self.millis % 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        write!(f, "{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    }
}

impl FromStr for ChapterTime {
    type Err = ChapterCoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChapterTime {
    type Error = ChapterCoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ChapterTime> for String {
    fn from(value: ChapterTime) -> Self {
        value.to_string()
    }
}

/// One chapter mark of a container.
///
/// The serialized form is the backup sidecar element:
/// `{"uid", "start_time", "end_time", "title"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    uid: String,
    start_time: ChapterTime,
    #[serde(default)]
    end_time: Option<ChapterTime>,
    #[serde(default)]
    title: String,
}

impl Chapter {
    /// Create a chapter. An end time earlier than the start is discarded.
    pub fn new(
        uid: impl Into<String>,
        start_time: ChapterTime,
        end_time: Option<ChapterTime>,
        title: impl Into<String>,
    ) -> Self {
        let uid = uid.into();
        let end_time = match end_time {
            Some(end) if end < start_time => {
                tracing::warn!(
                    "⚠️ Chapter {}: end {} precedes start {}, dropping end time",
                    uid, end, start_time
                );
                None
            }
            other => other,
        };

        Self {
            uid,
            start_time,
            end_time,
            title: title.into(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn start_time(&self) -> ChapterTime {
        self.start_time
    }

    pub fn end_time(&self) -> Option<ChapterTime> {
        self.end_time
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Copy of this chapter carrying a different title
    pub fn with_title(&self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self.clone()
        }
    }

    pub fn start_seconds(&self) -> f64 {
        self.start_time.as_secs_f64()
    }

    pub fn end_seconds(&self) -> Option<f64> {
        self.end_time.map(|t| t.as_secs_f64())
    }

    /// Whether the deserialized record honours `end >= start`
    pub fn is_consistent(&self) -> bool {
        self.end_time.map_or(true, |end| end >= self.start_time)
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.title, self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_truncates_to_milliseconds() {
        let time = ChapterTime::parse("00:01:02.123456789").unwrap();
        assert_eq!(time.as_millis(), 62_123);
        assert_eq!(time.to_string(), "00:01:02.123");

        // 0.9999 must not round up to the next second
        let time = ChapterTime::parse("00:00:09.9999").unwrap();
        assert_eq!(time.to_string(), "00:00:09.999");
    }

    #[test]
    fn test_parse_short_and_missing_fraction() {
        assert_eq!(ChapterTime::parse("00:00:01.5").unwrap().as_millis(), 1_500);
        assert_eq!(ChapterTime::parse("01:00:00").unwrap().as_millis(), 3_600_000);
        assert_eq!(ChapterTime::parse(" 00:00:00.000000000 ").unwrap(), ChapterTime::ZERO);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "", "12", "00:00", "00:61:00.000", "aa:00:00", "00:00:00.1x", "00:00:00:00",
            "99999999999999999:00:00.000",
        ] {
            assert!(ChapterTime::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_from_secs_and_display() {
        assert_eq!(ChapterTime::from_secs_f64(3661.5).to_string(), "01:01:01.500");
        assert_eq!(ChapterTime::from_secs_f64(-4.0), ChapterTime::ZERO);
        assert_eq!(ChapterTime::from_millis(360_000_000).to_string(), "100:00:00.000");
    }

    #[test]
    fn test_chapter_drops_inverted_end() {
        let chapter = Chapter::new(
            "1",
            ChapterTime::from_millis(10_000),
            Some(ChapterTime::from_millis(5_000)),
            "Intro",
        );
        assert_eq!(chapter.end_time(), None);
        assert!(chapter.is_consistent());
    }

    #[test]
    fn test_chapter_json_shape() {
        let chapter = Chapter::new("42", ChapterTime::from_millis(1_000), None, "ハジメテノオト");
        let json = serde_json::to_value(&chapter).unwrap();
        assert_eq!(json["uid"], "42");
        assert_eq!(json["start_time"], "00:00:01.000");
        assert!(json["end_time"].is_null());
        assert_eq!(json["title"], "ハジメテノオト");
    }
}
