#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize, serde::Serialize,
)]
pub struct Duration(std::time::Duration);

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Written so that it parses back.
        if self.0.subsec_nanos() == 0 {
            write!(f, "{}s", self.0.as_secs())
        } else {
            write!(f, "{}ms", self.0.as_millis())
        }
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Self(value)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(value: Duration) -> Self {
        value.0
    }
}

impl Duration {
    pub const QUANTUM: Self = Self::of(100, DurationUnit::Milliseconds);
    pub const COMMAND_TIMEOUT: Self = Self::of(30, DurationUnit::Seconds);
    pub const POLL_INTERVAL: Self = Self::of(10, DurationUnit::Seconds);

    pub const fn of(magnitude: u64, unit: DurationUnit) -> Self {
        Self(match unit {
            DurationUnit::Milliseconds => std::time::Duration::from_millis(magnitude),
            DurationUnit::Seconds => std::time::Duration::from_secs(magnitude),
            DurationUnit::Minutes => std::time::Duration::from_secs(magnitude * 60),
        })
    }

    pub fn sleep(&self) {
        std::thread::sleep((*self).into())
    }
}

/// Parses durations such as `250ms`, `30s` or `2m`.
impl std::str::FromStr for Duration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split_at = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| DurationParseError::MissingUnit(s.to_owned()))?;
        let (magnitude, unit) = trimmed.split_at(split_at);
        let magnitude = magnitude
            .parse::<u64>()
            .map_err(|_| DurationParseError::InvalidMagnitude(s.to_owned()))?;
        match unit {
            "ms" => Ok(Self::of(magnitude, DurationUnit::Milliseconds)),
            "s" => Ok(Self::of(magnitude, DurationUnit::Seconds)),
            "m" => magnitude
                .checked_mul(60)
                .map(|seconds| Self::of(seconds, DurationUnit::Seconds))
                .ok_or_else(|| DurationParseError::TooLarge(s.to_owned())),
            _ => Err(DurationParseError::UnknownUnit(unit.to_owned())),
        }
    }
}

pub enum DurationUnit {
    Milliseconds,
    Seconds,
    Minutes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("duration {0:?} has no unit (expected ms, s or m)")]
    MissingUnit(String),
    #[error("duration {0:?} does not start with a whole number")]
    InvalidMagnitude(String),
    #[error("unknown duration unit {0:?} (expected ms, s or m)")]
    UnknownUnit(String),
    #[error("duration {0:?} is too large")]
    TooLarge(String),
}
