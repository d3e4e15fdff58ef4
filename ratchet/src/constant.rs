use std::fmt::{Display, Formatter};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Close,
}

impl Action {
    pub fn sign(self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
            Self::Close => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Close => "CLOSE",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

/// How the true range of a bar pair is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeType {
    /// Both bars' extremes are compared with each other.
    #[default]
    Full,
    /// Only the current bar against the previous close.
    None,
}

/// A span of wall-clock time written the way bar sizes are quoted,
/// e.g. `1 min`, `5 mins`, `1 hour`, `2 days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    seconds: i64,
}

const UNITS: [(i64, &str, &str); 5] = [
    (7 * 86_400, "week", "weeks"),
    (86_400, "day", "days"),
    (3_600, "hour", "hours"),
    (60, "min", "mins"),
    (1, "sec", "secs"),
];

impl Period {
    pub const fn seconds(n: i64) -> Self {
        Self { seconds: n }
    }

    pub const fn minutes(n: i64) -> Self {
        Self { seconds: n * 60 }
    }

    pub const fn hours(n: i64) -> Self {
        Self { seconds: n * 3_600 }
    }

    pub const fn days(n: i64) -> Self {
        Self { seconds: n * 86_400 }
    }

    pub const fn weeks(n: i64) -> Self {
        Self { seconds: n * 7 * 86_400 }
    }

    pub fn as_seconds(self) -> i64 {
        self.seconds
    }

    pub fn as_duration(self) -> Duration {
        Duration::seconds(self.seconds)
    }

    pub fn parse(value: &str) -> Result<Self, AgentError> {
        let raw = value.trim().to_ascii_lowercase();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (count, unit) = raw.split_at(split);
        let count = count
            .parse::<i64>()
            .map_err(|_| AgentError::Parse(format!("invalid period: {value}")))?;
        let scale = match unit.trim() {
            "s" | "sec" | "secs" | "second" | "seconds" => 1,
            "m" | "min" | "mins" | "minute" | "minutes" => 60,
            "h" | "hour" | "hours" => 3_600,
            "d" | "day" | "days" => 86_400,
            "w" | "week" | "weeks" => 7 * 86_400,
            _ => return Err(AgentError::Parse(format!("invalid period unit: {value}"))),
        };
        Ok(Self {
            seconds: count * scale,
        })
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.seconds == 0 {
            return f.write_str("0 secs");
        }
        for (scale, singular, plural) in UNITS {
            if self.seconds % scale == 0 {
                let n = self.seconds / scale;
                let unit = if n == 1 { singular } else { plural };
                return write!(f, "{n} {unit}");
            }
        }
        write!(f, "{} secs", self.seconds)
    }
}

impl TryFrom<String> for Period {
    type Error = AgentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}
