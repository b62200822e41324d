//! Time-series sink abstraction for daylight samples.
//!
//! The poll loop only talks to the [`Sink`] trait. Submission must not wait on
//! network I/O; delivery, batching, retries and authentication belong to the
//! implementation. The InfluxDB implementation lives in [`influx`] and speaks
//! both the 1.x and 2.x write APIs through one writer.
//!
//! ## Point model
//!
//! A [`Point`] is one row of InfluxDB line protocol:
//!
//! ```text
//! daylight,host=garage daylight=true 1718445600000
//! ```
//!
//! Timestamps are written with millisecond precision, so samples taken less
//! than a second apart never overwrite each other.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub mod influx;

pub use influx::{Credentials, HttpTransport, InfluxWriter, Transport, WriteTarget, WriterOptions};

/// Destination for timestamped measurements.
pub trait Sink {
    /// Queue a point for delivery.
    ///
    /// Returns an error only for local failures such as an unencodable point or
    /// a stopped writer. Delivery failures are reported out of band.
    fn write_point(&self, point: Point) -> Result<()>;

    /// Force delivery of everything queued so far and wait for the outcome.
    fn flush(&self) -> Result<()>;
}

/// A single field value in line protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    fn encode(&self, out: &mut String) {
        match self {
            FieldValue::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
            FieldValue::Int(value) => {
                let _ = write!(out, "{}i", value);
            }
            FieldValue::Float(value) => {
                let _ = write!(out, "{}", value);
            }
            FieldValue::Str(value) => {
                out.push('"');
                for c in value.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

/// One measurement row: name, tags, fields and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags(mut self, tags: &BTreeMap<String, String>) -> Self {
        self.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Encode as a single line of InfluxDB line protocol.
    ///
    /// Tags with empty keys or values are skipped since InfluxDB rejects them.
    pub fn to_line_protocol(&self) -> Result<String> {
        if self.measurement.is_empty() {
            anyhow::bail!("Point has an empty measurement name");
        }
        if self.fields.is_empty() {
            anyhow::bail!("Point '{}' has no fields", self.measurement);
        }
        // Line protocol has no escape for line breaks
        let names = std::iter::once(&self.measurement)
            .chain(self.tags.iter().flat_map(|(k, v)| [k, v]))
            .chain(self.fields.keys());
        for name in names {
            if has_line_break(name) {
                anyhow::bail!("Point '{}' contains a line break in {:?}", self.measurement, name);
            }
        }
        for (key, value) in &self.fields {
            if let FieldValue::Float(number) = value {
                if !number.is_finite() {
                    anyhow::bail!("Field '{}' is not a finite number ({})", key, number);
                }
            }
        }

        let mut line = String::with_capacity(64);
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            value.encode(&mut line);
        }

        let _ = write!(line, " {}", self.timestamp.timestamp_millis());
        Ok(line)
    }
}

/// Whether `text` would split a line protocol row.
pub fn has_line_break(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

fn escape_into(out: &mut String, text: &str, special: &[char]) {
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}
