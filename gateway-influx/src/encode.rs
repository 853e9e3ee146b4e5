use prost::Message;

use crate::convert::{Series, WriteBatch};
use crate::remote_write;

/// The `Content-Encoding` of an encoded batch.
pub const CONTENT_ENCODING: &str = "snappy";
/// The `Content-Type` of an encoded batch.
pub const CONTENT_TYPE: &str = "application/x-protobuf";
/// The remote write protocol version announced to the backend.
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";

/// Serializing or compressing a batch failed.
///
/// This indicates a bug rather than bad input.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Protobuf serialization failed.
    #[error("failed to serialize write request")]
    Serialize(#[from] prost::EncodeError),
    /// Snappy compression failed.
    #[error("failed to compress write request")]
    Compress(#[from] snap::Error),
}

impl From<&Series> for remote_write::TimeSeries {
    fn from(series: &Series) -> Self {
        Self {
            labels: series
                .labels
                .iter()
                .map(|label| remote_write::Label {
                    name: label.name.clone(),
                    value: label.value.clone(),
                })
                .collect(),
            samples: vec![remote_write::Sample {
                value: series.sample.value,
                timestamp: series.sample.timestamp,
            }],
        }
    }
}

impl From<&WriteBatch> for remote_write::WriteRequest {
    fn from(batch: &WriteBatch) -> Self {
        Self {
            timeseries: batch.series.iter().map(Into::into).collect(),
        }
    }
}

/// Serializes a batch into a snappy-compressed remote write request.
///
/// Snappy is applied in the raw block format, not the framed stream format.
pub fn encode(batch: &WriteBatch) -> Result<Vec<u8>, EncodeError> {
    let request = remote_write::WriteRequest::from(batch);

    let mut buf = Vec::with_capacity(request.encoded_len());
    request.encode(&mut buf)?;

    Ok(snap::raw::Encoder::new().compress_vec(&buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{Label, Sample};

    fn decode(payload: &[u8]) -> remote_write::WriteRequest {
        let raw = snap::raw::Decoder::new().decompress_vec(payload).unwrap();
        remote_write::WriteRequest::decode(raw.as_slice()).unwrap()
    }

    #[test]
    fn test_encode_batch() {
        let batch = WriteBatch {
            series: vec![Series {
                labels: vec![
                    Label {
                        name: "__name__".to_owned(),
                        value: "temperature".to_owned(),
                    },
                    Label {
                        name: "host".to_owned(),
                        value: "a".to_owned(),
                    },
                ],
                sample: Sample {
                    value: 72.5,
                    timestamp: 1_000_000_000_000,
                },
            }],
            skipped_fields: 0,
        };

        let request = decode(&encode(&batch).unwrap());
        assert_eq!(request.timeseries.len(), 1);

        let series = &request.timeseries[0];
        let names: Vec<_> = series.labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["__name__", "host"]);
        assert_eq!(
            series.samples,
            [remote_write::Sample {
                value: 72.5,
                timestamp: 1_000_000_000_000,
            }]
        );
    }

    #[test]
    fn test_encode_empty_batch() {
        let payload = encode(&WriteBatch::default()).unwrap();
        assert!(decode(&payload).timeseries.is_empty());
    }

    #[test]
    fn test_payload_is_raw_snappy() {
        // The raw format starts with the varint length of the uncompressed data, the framed
        // format with a stream identifier chunk.
        let payload = encode(&WriteBatch::default()).unwrap();
        assert_eq!(payload, [0]);
    }
}
