//! Translation of InfluxDB line protocol into Prometheus remote write requests.
//!
//! A batch passes through three steps:
//!
//!  1. [`decode`] parses the line protocol into [`Point`]s.
//!  2. [`convert`] turns every numeric field of a point into a [`Series`] with one sample.
//!  3. [`encode`] serializes the series into a snappy-compressed `WriteRequest`.
//!
//! ```
//! use gateway_influx::{Precision, convert, decode, encode};
//!
//! let points = decode(b"temperature,host=a value=72.5 1000000000", Precision::Seconds).unwrap();
//! let batch = convert(&points).unwrap();
//! assert_eq!(batch.series[0].metric_name(), Some("temperature"));
//!
//! let payload = encode(&batch).unwrap();
//! assert!(!payload.is_empty());
//! ```
#![warn(missing_docs)]

mod convert;
mod encode;
mod line;
mod point;
mod precision;
mod sanitize;

pub mod remote_write;

use chrono::{DateTime, Utc};

pub use self::convert::*;
pub use self::encode::*;
pub use self::line::*;
pub use self::point::*;
pub use self::precision::*;
pub use self::sanitize::*;

/// Decodes a line protocol batch.
///
/// Decoding is all or nothing: the first malformed line fails the whole batch. Points without a
/// timestamp are stamped with the current time.
pub fn decode(data: &[u8], precision: Precision) -> Result<Vec<Point>, ParseError> {
    decode_at(data, precision, Utc::now())
}

/// Decodes a line protocol batch, stamping points without a timestamp with `now`.
pub fn decode_at(
    data: &[u8],
    precision: Precision,
    now: DateTime<Utc>,
) -> Result<Vec<Point>, ParseError> {
    ParsePoints::new(data, precision, now).collect()
}
