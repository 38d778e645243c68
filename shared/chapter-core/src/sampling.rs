//! Sampling policy: where inside a chapter to listen for the song

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chapter length assumed when a chapter carries no end time.
/// Used only for window arithmetic, never written back.
pub const DEFAULT_CHAPTER_SECONDS: f64 = 180.0;

/// Gap kept between the sample and the chapter end for the `end` strategy
const END_MARGIN_SECONDS: f64 = 5.0;

/// Strategy selecting the sub-window of a chapter to sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Fixed offset after the chapter start
    #[default]
    Start,
    /// Centered on the chapter midpoint
    Middle,
    /// Shortly before the chapter end
    End,
    /// At a fraction of the chapter length
    Custom,
}

impl SamplingStrategy {
    pub const ALL: [SamplingStrategy; 4] = [
        SamplingStrategy::Start,
        SamplingStrategy::Middle,
        SamplingStrategy::End,
        SamplingStrategy::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingStrategy::Start => "start",
            SamplingStrategy::Middle => "middle",
            SamplingStrategy::End => "end",
            SamplingStrategy::Custom => "custom",
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(SamplingStrategy::Start),
            "middle" => Ok(SamplingStrategy::Middle),
            "end" => Ok(SamplingStrategy::End),
            "custom" => Ok(SamplingStrategy::Custom),
            other => Err(format!(
                "unknown sampling strategy '{}' (expected start, middle, end or custom)",
                other
            )),
        }
    }
}

/// Audio window to decode for one chapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleWindow {
    pub offset_seconds: f64,
    pub duration_seconds: u32,
}

/// Resolved sampling configuration for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingPolicy {
    pub strategy: SamplingStrategy,
    /// Seconds after chapter start (`start` strategy)
    pub offset: f64,
    /// Fraction of the chapter length (`custom` strategy), not clamped here
    pub percentage: f64,
    /// Sample length in whole seconds
    pub duration: u32,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::Start,
            offset: 5.0,
            percentage: 0.5,
            duration: 3,
        }
    }
}

impl SamplingPolicy {
    /// Compute the sample window for a chapter spanning `start..end` seconds.
    ///
    /// A missing `end` is treated as `start + DEFAULT_CHAPTER_SECONDS`.
    pub fn sample_window(&self, start: f64, end: Option<f64>) -> SampleWindow {
        let end = end.unwrap_or(start + DEFAULT_CHAPTER_SECONDS);
        let duration = f64::from(self.duration);

        let offset_seconds = match self.strategy {
            SamplingStrategy::Start => start + self.offset,
            SamplingStrategy::Middle => (start + end) / 2.0 - duration / 2.0,
            SamplingStrategy::End => start.max(end - duration - END_MARGIN_SECONDS),
            SamplingStrategy::Custom => start + (end - start) * self.percentage,
        };

        SampleWindow {
            offset_seconds,
            duration_seconds: self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: SamplingStrategy) -> SamplingPolicy {
        SamplingPolicy {
            strategy,
            ..SamplingPolicy::default()
        }
    }

    #[test]
    fn test_start_strategy() {
        let window = policy(SamplingStrategy::Start).sample_window(10.0, Some(60.0));
        assert_eq!(window.offset_seconds, 15.0);
        assert_eq!(window.duration_seconds, 3);
    }

    #[test]
    fn test_middle_strategy() {
        let window = policy(SamplingStrategy::Middle).sample_window(0.0, Some(60.0));
        assert_eq!(window.offset_seconds, 28.5);
    }

    #[test]
    fn test_end_strategy() {
        let window = policy(SamplingStrategy::End).sample_window(0.0, Some(60.0));
        assert_eq!(window.offset_seconds, 52.0);

        // Very short chapter stays pinned to its start
        let window = policy(SamplingStrategy::End).sample_window(100.0, Some(104.0));
        assert_eq!(window.offset_seconds, 100.0);
    }

    #[test]
    fn test_custom_strategy() {
        let mut custom = policy(SamplingStrategy::Custom);
        custom.percentage = 0.3;
        let window = custom.sample_window(0.0, Some(100.0));
        assert!((window.offset_seconds - 30.0).abs() < 1e-9);

        // Out-of-range percentages pass through untouched
        custom.percentage = 1.5;
        assert!((custom.sample_window(0.0, Some(100.0)).offset_seconds - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_end_uses_default_length() {
        let window = policy(SamplingStrategy::Middle).sample_window(20.0, None);
        assert_eq!(window.offset_seconds, 20.0 + 90.0 - 1.5);

        let window = policy(SamplingStrategy::End).sample_window(0.0, None);
        assert_eq!(window.offset_seconds, 172.0);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Middle".parse::<SamplingStrategy>().unwrap(), SamplingStrategy::Middle);
        assert!("random".parse::<SamplingStrategy>().is_err());
        for strategy in SamplingStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<SamplingStrategy>().unwrap(), strategy);
        }
    }
}
