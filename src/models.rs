use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker execution strategy for the parallel orchestrator.
///
/// Both modes produce identical output; they differ only in how workers
/// share the mapped file and the schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunningMode {
    /// Every worker independently re-opens and re-maps the log file and
    /// receives its own copy of the format registry.
    Process,
    /// Workers share the parent's memory mapping and registry snapshot.
    Thread,
}

impl fmt::Display for RunningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunningMode::Process => write!(f, "process"),
            RunningMode::Thread => write!(f, "thread"),
        }
    }
}

/// A decoded field value.
///
/// Signed and unsigned integers are widened to 64 bits; any field with
/// scaling applied (implicit field-code scaling or an explicit FMTU
/// multiplier) becomes a `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    UInt(u64),
    // JSON has no NaN/Infinity; they spill as null and read back as NaN.
    Float(#[serde(deserialize_with = "f64_or_nan")] f64),
    Text(String),
    Array(Vec<i16>),
}

fn f64_or_nan<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Unsigned integer view of the value, if it has one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            Value::UInt(v) => Some(*v),
            Value::Float(v) if *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Array(v) => write!(f, "{:?}", v),
        }
    }
}

/// One decoded telemetry message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedRecord {
    /// Short name of the message type (from its schema, e.g. `GPS`, `IMU`)
    pub message_type: String,
    /// Field values in schema order
    pub fields: Vec<(String, Value)>,
    /// Byte offset at which the frame began, used as the final merge tie-break
    pub offset: usize,
    /// Merge ordering key: the record's own `TimeUS` when present, otherwise
    /// the last `TimeUS` seen earlier in the same segment (0 before any).
    /// Purely an ordering convenience; the record's fields are untouched.
    pub merge_time_us: u64,
}

impl DecodedRecord {
    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// The record's own `TimeUS` microsecond timestamp, if it carries one.
    pub fn time_us(&self) -> Option<u64> {
        self.get("TimeUS").and_then(Value::as_u64)
    }
}

/// Classification of a non-fatal decoding problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A frame referenced a type_id with no schema in the registry
    UnknownType,
    /// A frame's payload ran past the end of its segment
    ShortRead,
    /// A schema's format string contains an unsupported field code
    BadFormat,
    /// Catch-all payload interpretation failure
    DecodeError,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::UnknownType => write!(f, "unknown-type"),
            WarningKind::ShortRead => write!(f, "short-read"),
            WarningKind::BadFormat => write!(f, "bad-format"),
            WarningKind::DecodeError => write!(f, "decode-error"),
        }
    }
}

/// A non-fatal problem encountered while decoding.
///
/// Warnings never abort a run and never affect record ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Segment that produced the warning; `None` for the preload phase
    pub segment_id: Option<usize>,
    /// Byte offset of the offending frame
    pub offset: usize,
    pub kind: WarningKind,
    pub detail: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.segment_id {
            Some(id) => write!(
                f,
                "[segment {}] {} at offset {}: {}",
                id, self.kind, self.offset, self.detail
            ),
            None => write!(
                f,
                "[preload] {} at offset {}: {}",
                self.kind, self.offset, self.detail
            ),
        }
    }
}

/// A half-open `[start, end)` byte range aligned to frame boundaries.
///
/// `start` is a valid frame-start offset; `end` is either EOF or another
/// valid frame-start. Segments are disjoint and cover every valid frame
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
