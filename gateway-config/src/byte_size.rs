use std::fmt;
use std::str::FromStr;

use human_size::{Byte, Size, SpecificSize};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub use human_size::ParsingError as ByteSizeParseError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// A size in bytes, written in configuration as a plain integer or a human readable string such
/// as `"100KiB"` or `"20MB"`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Creates a byte size from bytes.
    pub const fn bytes(value: u64) -> Self {
        Self(value)
    }

    /// Creates a byte size from kibibytes.
    pub const fn kibibytes(value: u64) -> Self {
        Self(value * KIB)
    }

    /// Creates a byte size from mebibytes.
    pub const fn mebibytes(value: u64) -> Self {
        Self(value * MIB)
    }

    /// Returns the value in bytes.
    pub const fn as_bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Ok(bytes) = value.parse::<u64>() {
            return Ok(Self(bytes));
        }

        let size: Size = value.parse()?;
        let bytes: SpecificSize<Byte> = size.into();
        Ok(Self(bytes.value() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "0B"),
            v if v % MIB == 0 => write!(f, "{}MiB", v / MIB),
            v if v % KIB == 0 => write!(f, "{}KiB", v / KIB),
            v => write!(f, "{v}B"),
        }
    }
}

impl fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteSize({self})")
    }
}

impl From<u64> for ByteSize {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for ByteSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;

        impl de::Visitor<'_> for V {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("data size")
            }

            fn visit_u64<E>(self, value: u64) -> Result<ByteSize, E>
            where
                E: de::Error,
            {
                Ok(ByteSize(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<ByteSize, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(ByteSize)
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Signed(value), &self))
            }

            fn visit_str<E>(self, value: &str) -> Result<ByteSize, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_any(V)
    }
}
