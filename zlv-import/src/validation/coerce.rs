//! Per-field coercion rules

use super::FieldKind;
use chrono::NaiveDate;
use serde_json::{Number, Value};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y%m%d"];

/// Null, empty or whitespace-only values count as absent
pub(super) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub(super) fn coerce(value: &Value, kind: &FieldKind) -> Result<Value, String> {
    match kind {
        FieldKind::String => as_text(value).map(Value::String),
        FieldKind::Integer { min, max } => {
            let n = as_integer(value)?;
            if let Some(min) = min {
                if n < *min {
                    return Err(format!("must be at least {}, got {}", min, n));
                }
            }
            if let Some(max) = max {
                if n > *max {
                    return Err(format!("must be at most {}, got {}", max, n));
                }
            }
            Ok(Value::Number(n.into()))
        }
        FieldKind::Float => {
            let f = as_float(value)?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| format!("{} is not a finite number", f))
        }
        FieldKind::Boolean => as_bool(value).map(Value::Bool),
        FieldKind::Date => as_date(value).map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        FieldKind::OneOf(allowed) => {
            let text = as_text(value)?;
            if allowed.contains(&text.as_str()) {
                Ok(Value::String(text))
            } else {
                Err(format!("'{}' is not one of {}", text, allowed.join(", ")))
            }
        }
        FieldKind::Mapped(mapping) => {
            let text = as_text(value)?;
            mapping
                .iter()
                .find(|(code, name)| code.eq_ignore_ascii_case(&text) || *name == text)
                .map(|(_, name)| Value::String(name.to_string()))
                .ok_or_else(|| format!("unknown code '{}'", text))
        }
        FieldKind::StringList => as_list(value).map(|items| {
            Value::Array(items.into_iter().map(Value::String).collect())
        }),
    }
}

fn as_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a string, got {}", other)),
    }
}

fn as_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| format!("expected an integer, got {}", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected an integer, got '{}'", s)),
        other => Err(format!("expected an integer, got {}", other)),
    }
}

fn as_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("expected a number, got {}", n)),
        Value::String(s) => s
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .map_err(|_| format!("expected a number, got '{}'", s)),
        other => Err(format!("expected a number, got {}", other)),
    }
}

fn as_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(format!("expected a boolean, got {}", n)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "oui" | "o" | "yes" | "y" => Ok(true),
            "false" | "f" | "0" | "non" | "n" | "no" => Ok(false),
            _ => Err(format!("expected a boolean, got '{}'", s)),
        },
        other => Err(format!("expected a boolean, got {}", other)),
    }
}

fn as_date(value: &Value) -> Result<NaiveDate, String> {
    let Value::String(s) = value else {
        return Err(format!("expected a date, got {}", value));
    };
    let s = s.trim();
    // Timestamps keep their date part
    let candidate = if s.len() > 10 && s.as_bytes().get(10).is_some_and(|b| *b == b'T' || *b == b' ') {
        &s[..10]
    } else {
        s
    };
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(candidate, format).ok())
        .ok_or_else(|| format!("expected a date, got '{}'", s))
}

fn as_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| !is_blank(item))
            .map(as_text)
            .collect(),
        Value::String(s) => Ok(s
            .trim_matches(|c| c == '{' || c == '}' || c == '[' || c == ']')
            .split(',')
            .map(|item| item.trim().trim_matches('"').to_string())
            .filter(|item| !item.is_empty())
            .collect()),
        other => Err(format!("expected a list, got {}", other)),
    }
}
