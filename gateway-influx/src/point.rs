use std::collections::BTreeMap;

/// The value of a single field in a line protocol point.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A finite 64-bit float, written without suffix.
    Float(f64),
    /// A signed integer, written with an `i` suffix.
    Integer(i64),
    /// A boolean literal.
    Boolean(bool),
    /// A value that has no numeric sample representation, such as a string or an unsigned
    /// integer. Holds the value as written on the wire.
    Unsupported(String),
}

impl FieldValue {
    /// Returns the value as a sample, or `None` for unsupported values.
    ///
    /// Booleans map to `1.0` and `0.0`. Integers are widened, which may lose precision above
    /// 2^53.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(value) => Some(value),
            Self::Integer(value) => Some(value as f64),
            Self::Boolean(value) => Some(if value { 1.0 } else { 0.0 }),
            Self::Unsupported(_) => None,
        }
    }
}

/// One decoded line of the line protocol.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: i64,
}

impl Point {
    /// Creates a point without tags or fields.
    pub fn new(measurement: impl Into<String>, timestamp: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    /// Adds a tag, keeping tags sorted by key. An existing tag with the same key is replaced.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.tags.binary_search_by(|(k, _)| k.as_str().cmp(&key)) {
            Ok(index) => self.tags[index].1 = value,
            Err(index) => self.tags.insert(index, (key, value)),
        }
        self
    }

    /// Adds a field, replacing an existing field with the same key.
    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub(crate) fn from_parts(
        measurement: String,
        tags: Vec<(String, String)>,
        fields: BTreeMap<String, FieldValue>,
        timestamp: i64,
    ) -> Self {
        Self {
            measurement,
            tags,
            fields,
            timestamp,
        }
    }

    /// The measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Tags sorted by key. Keys are unique.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// Fields in ascending key order.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// The timestamp in nanoseconds since the UNIX epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}
