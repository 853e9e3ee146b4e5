use crate::point::Point;
use crate::sanitize::sanitize_name;

/// The reserved label that holds the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// The field whose series is named after the bare measurement.
const VALUE_FIELD: &str = "value";

const NANOS_PER_MILLI: i64 = 1_000_000;

/// A point could not be converted into series.
///
/// Points produced by the line decoder always convert. This is only raised for points that were
/// built programmatically.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// The measurement name is empty.
    #[error("point has an empty measurement name")]
    EmptyMeasurement,
    /// A tag key is empty.
    #[error("point {0:?} has an empty tag key")]
    EmptyTagKey(String),
}

/// A name and value pair identifying a series.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Label {
    /// The sanitized label name.
    pub name: String,
    /// The label value, as written in the input.
    pub value: String,
}

impl Label {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A value at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// The sample value.
    pub value: f64,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: i64,
}

/// A series with exactly one sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    /// Labels sorted by name, including exactly one `__name__` label.
    pub labels: Vec<Label>,
    /// The single sample of this series.
    pub sample: Sample,
}

impl Series {
    /// Returns the value of the `__name__` label.
    pub fn metric_name(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.name == METRIC_NAME_LABEL)
            .map(|label| label.value.as_str())
    }
}

/// All series converted from one inbound batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    /// Series in input order: points in order, fields of a point by ascending key.
    pub series: Vec<Series>,
    /// Number of fields without a numeric representation that produced no series.
    pub skipped_fields: usize,
}

impl WriteBatch {
    /// Returns `true` if the batch holds no series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Converts decoded points into one series per numeric field.
///
/// String and unsigned fields are skipped without error and counted in
/// [`WriteBatch::skipped_fields`]. Points sharing a series are not merged.
pub fn convert(points: &[Point]) -> Result<WriteBatch, ConversionError> {
    let mut batch = WriteBatch::default();

    for point in points {
        if point.measurement().is_empty() {
            return Err(ConversionError::EmptyMeasurement);
        }

        let mut tag_labels = Vec::with_capacity(point.tags().len());
        for (key, value) in point.tags() {
            if key.is_empty() {
                return Err(ConversionError::EmptyTagKey(point.measurement().to_owned()));
            }

            let name = sanitize_name(key);
            if name == METRIC_NAME_LABEL {
                continue;
            }
            tag_labels.push(Label::new(name, value.as_str()));
        }

        let timestamp = point.timestamp() / NANOS_PER_MILLI;

        for (field, value) in point.fields() {
            let Some(value) = value.as_f64() else {
                batch.skipped_fields += 1;
                continue;
            };

            let metric_name = if field == VALUE_FIELD {
                sanitize_name(point.measurement())
            } else {
                sanitize_name(&format!("{}_{field}", point.measurement()))
            };

            let mut labels = Vec::with_capacity(tag_labels.len() + 1);
            labels.push(Label::new(METRIC_NAME_LABEL, metric_name));
            labels.extend(tag_labels.iter().cloned());
            labels.sort_by(|a, b| a.name.cmp(&b.name));
            // Distinct keys can sanitize to the same name, the first one wins.
            labels.dedup_by(|later, earlier| later.name == earlier.name);

            batch.series.push(Series {
                labels,
                sample: Sample { value, timestamp },
            });
        }
    }

    Ok(batch)
}
