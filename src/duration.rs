//! Duration parsing and human-readable rendering.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt;
use std::str::FromStr;

use crate::{StatsError, StatsResult};

pub const MS_PER_SECOND: u64 = 1000;
pub const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
pub const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
pub const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// A millisecond duration that round-trips through strings like `24h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatsDuration(pub u64);

impl StatsDuration {
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl FromStr for StatsDuration {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(StatsDuration)
    }
}

impl fmt::Display for StatsDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compact_duration(self.0))
    }
}

impl Serialize for StatsDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StatsDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses `500ms`, `90s`, `15m`, `24h` or `2d` into milliseconds.
pub fn parse_duration(input: &str) -> StatsResult<u64> {
    let s = input.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| StatsError::InvalidArgument(format!("duration {input:?} has no unit")))?;
    let (num, unit) = s.split_at(split);
    if num.is_empty() {
        return Err(StatsError::InvalidArgument(format!(
            "duration {input:?} has no value"
        )));
    }
    let value: u64 = num
        .parse()
        .map_err(|e| StatsError::InvalidArgument(format!("invalid duration {input:?}: {e}")))?;
    let scale = match unit {
        "ms" => 1,
        "s" => MS_PER_SECOND,
        "m" => MS_PER_MINUTE,
        "h" => MS_PER_HOUR,
        "d" => MS_PER_DAY,
        other => {
            return Err(StatsError::InvalidArgument(format!(
                "unknown duration unit {other:?} in {input:?}"
            )));
        }
    };
    value
        .checked_mul(scale)
        .ok_or_else(|| StatsError::InvalidArgument(format!("duration {input:?} overflows")))
}

/// Log-style duration, e.g. `+1d2h3m4s5ms`.
pub fn format_duration(ms: u64) -> String {
    if ms == 0 {
        return "0".to_string();
    }
    let mut out = String::from("+");
    let mut rest = ms;
    for (unit, scale) in [
        ("d", MS_PER_DAY),
        ("h", MS_PER_HOUR),
        ("m", MS_PER_MINUTE),
        ("s", MS_PER_SECOND),
    ] {
        let n = rest / scale;
        if n > 0 {
            out.push_str(&format!("{n}{unit}"));
            rest %= scale;
        }
    }
    if rest > 0 {
        out.push_str(&format!("{rest}ms"));
    }
    out
}

/// Coarse elapsed time for headers, e.g. `1d 3h` or `5m 12s`.
pub fn format_elapsed(ms: u64) -> String {
    let days = ms / MS_PER_DAY;
    let hours = (ms % MS_PER_DAY) / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / MS_PER_SECOND;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn compact_duration(ms: u64) -> String {
    for (unit, scale) in [
        ("d", MS_PER_DAY),
        ("h", MS_PER_HOUR),
        ("m", MS_PER_MINUTE),
        ("s", MS_PER_SECOND),
    ] {
        if ms >= scale && ms % scale == 0 {
            return format!("{}{unit}", ms / scale);
        }
    }
    format!("{ms}ms")
}
