//! Schema validation of raw records
//!
//! A schema is a declarative table of field constraints. `Schema::validate`
//! coerces each declared field of a raw record (CSV cells arrive as strings)
//! and either returns the whole coerced record or every field error found.
//! No partially coerced record ever leaves this module.

mod coerce;
mod stream;

pub use stream::validate_stream;

use crate::source::RawRecord;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Type constraint of a field
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Non-empty trimmed string
    String,
    /// Integer within optional bounds (inclusive)
    Integer { min: Option<i64>, max: Option<i64> },
    /// Floating point number, `,` accepted as decimal separator
    Float,
    /// `true/false`, `1/0`, `t/f`, `oui/non`, `yes/no`
    Boolean,
    /// `YYYY-MM-DD` or `DD/MM/YYYY`, normalized to `YYYY-MM-DD`
    Date,
    /// Value must belong to the set
    OneOf(&'static [&'static str]),
    /// Code mapped to its full name; full names are accepted as-is
    Mapped(&'static [(&'static str, &'static str)]),
    /// JSON array of strings or comma-separated string
    StringList,
}

/// Constraint on one field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Field constraint table of one record type
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Error on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A record failed its schema
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {schema} record: {}", join_errors(.errors))]
pub struct ValidationError {
    pub schema: &'static str,
    pub errors: Vec<FieldError>,
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Schema {
    /// Coerce and check every declared field
    ///
    /// Absent optional fields come out as `null`; undeclared fields are
    /// dropped.
    pub fn validate(&self, raw: &RawRecord) -> Result<Map<String, Value>, ValidationError> {
        let mut output = Map::with_capacity(self.fields.len());
        let mut errors = Vec::new();

        for spec in self.fields {
            let present = raw.get(spec.name).filter(|v| !coerce::is_blank(v));
            match present {
                None if spec.required => errors.push(FieldError {
                    field: spec.name.to_string(),
                    message: "is required".to_string(),
                }),
                None => {
                    output.insert(spec.name.to_string(), Value::Null);
                }
                Some(value) => match coerce::coerce(value, &spec.kind) {
                    Ok(coerced) => {
                        output.insert(spec.name.to_string(), coerced);
                    }
                    Err(message) => errors.push(FieldError {
                        field: spec.name.to_string(),
                        message,
                    }),
                },
            }
        }

        if errors.is_empty() {
            Ok(output)
        } else {
            Err(ValidationError {
                schema: self.name,
                errors,
            })
        }
    }

    /// Validate and deserialize into the typed record
    pub fn validate_sync<T: DeserializeOwned>(&self, raw: &RawRecord) -> Result<T, ValidationError> {
        let coerced = self.validate(raw)?;
        serde_json::from_value(Value::Object(coerced)).map_err(|e| ValidationError {
            schema: self.name,
            errors: vec![FieldError {
                field: "<record>".to_string(),
                message: e.to_string(),
            }],
        })
    }
}

/// A typed record read from an extract
pub trait SourceRecord: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Constraint table checked before deserialization
    fn schema() -> &'static Schema;

    /// Field the department filter applies to, if any
    fn department_field() -> Option<&'static str> {
        None
    }
}
