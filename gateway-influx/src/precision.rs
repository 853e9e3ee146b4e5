use std::fmt;
use std::str::FromStr;

/// The `precision` query parameter was not one of the supported units.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("precision supplied is not valid: {0}")]
pub struct InvalidPrecision(pub String);

/// Resolution of the timestamps in a line protocol batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Nanoseconds, written as `ns`.
    #[default]
    Nanoseconds,
    /// Microseconds, written as `us`.
    Microseconds,
    /// Milliseconds, written as `ms`.
    Milliseconds,
    /// Seconds, written as `s`.
    Seconds,
}

impl Precision {
    /// Parses the `precision` query parameter. An absent or empty value means nanoseconds.
    pub fn from_query(value: Option<&str>) -> Result<Self, InvalidPrecision> {
        match value {
            None | Some("") => Ok(Self::default()),
            Some(value) => value.parse(),
        }
    }

    /// Returns the number of nanoseconds in one unit of this precision.
    pub const fn nanos_per_unit(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
        }
    }

    /// Scales a timestamp in this precision to nanoseconds.
    ///
    /// Returns `None` if the result does not fit into 64 bits.
    pub fn to_nanos(self, timestamp: i64) -> Option<i64> {
        timestamp.checked_mul(self.nanos_per_unit())
    }

    /// Truncates a nanosecond timestamp to this precision.
    pub fn truncate(self, nanos: i64) -> i64 {
        let unit = self.nanos_per_unit();
        nanos / unit * unit
    }

    /// Returns the canonical name of this precision.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }
}

impl FromStr for Precision {
    type Err = InvalidPrecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ns" => Self::Nanoseconds,
            "us" => Self::Microseconds,
            "ms" => Self::Milliseconds,
            "s" => Self::Seconds,
            other => return Err(InvalidPrecision(other.to_owned())),
        })
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
