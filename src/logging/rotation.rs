use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_appender::rolling::Rotation;

use crate::error::LogLocalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeUnit {
    fn seconds(self) -> u64 {
        match self {
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 60 * 60,
            TimeUnit::Day => 24 * 60 * 60,
            TimeUnit::Week => 7 * 24 * 60 * 60,
        }
    }
}

/// A rotation or retention policy such as `"30 days"`, `"hourly"` or `"never"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    Never,
    Every { count: u32, unit: TimeUnit },
}

static POLICY: OnceLock<Regex> = OnceLock::new();

fn policy_pattern() -> &'static Regex {
    POLICY.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+)\s*(minute|hour|day|week)s?\s*$").expect("static policy regex")
    })
}

impl FromStr for RotationPolicy {
    type Err = LogLocalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let keyword = value.trim().to_ascii_lowercase();
        let every = |unit| Ok(RotationPolicy::Every { count: 1, unit });
        match keyword.as_str() {
            "never" => return Ok(RotationPolicy::Never),
            "minutely" => return every(TimeUnit::Minute),
            "hourly" => return every(TimeUnit::Hour),
            "daily" => return every(TimeUnit::Day),
            _ => {}
        }

        let invalid = || LogLocalError::Config(format!("unrecognised policy '{value}'"));
        let captures = policy_pattern().captures(&keyword).ok_or_else(invalid)?;
        let count: u32 = captures[1].parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }
        let unit = match &captures[2] {
            "minute" => TimeUnit::Minute,
            "hour" => TimeUnit::Hour,
            "day" => TimeUnit::Day,
            _ => TimeUnit::Week,
        };
        Ok(RotationPolicy::Every { count, unit })
    }
}

impl RotationPolicy {
    /// Appender period for this policy. The appender rotates on fixed
    /// boundaries, so the count is folded into the unit's period and a
    /// week-based policy rotates daily.
    pub fn rotation(&self) -> Rotation {
        match self {
            RotationPolicy::Never => Rotation::NEVER,
            RotationPolicy::Every { unit, .. } => match unit {
                TimeUnit::Minute => Rotation::MINUTELY,
                TimeUnit::Hour => Rotation::HOURLY,
                TimeUnit::Day | TimeUnit::Week => Rotation::DAILY,
            },
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            RotationPolicy::Never => None,
            RotationPolicy::Every { count, unit } => {
                Some(Duration::from_secs(u64::from(*count) * unit.seconds()))
            }
        }
    }

    fn period_seconds(&self) -> Option<u64> {
        match self {
            RotationPolicy::Never => None,
            RotationPolicy::Every { unit, .. } => Some(match unit {
                TimeUnit::Week => TimeUnit::Day.seconds(),
                other => other.seconds(),
            }),
        }
    }

    /// Number of rotated files that cover `self` when files rotate per
    /// `rotation`. `None` keeps every file.
    pub fn retained_files(&self, rotation: &RotationPolicy) -> Option<usize> {
        let keep = self.duration()?.as_secs();
        let period = rotation.period_seconds()?;
        let files = keep.div_ceil(period).max(1);
        Some(usize::try_from(files).unwrap_or(usize::MAX))
    }
}
