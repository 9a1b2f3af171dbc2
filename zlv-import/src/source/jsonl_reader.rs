//! JSON-Lines extract reader

use super::{RawRecord, RecordStream};
use crate::error::{ImportError, ImportResult};
use serde_json::Value;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

pub(super) async fn read(path: &Path) -> ImportResult<RecordStream> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    let stream = async_stream::stream! {
        let mut line_number: u64 = 0;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    yield Err(ImportError::Io(e));
                    break;
                }
            };
            line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            yield parse_line(&line, line_number);
        }
    };

    Ok(Box::pin(stream))
}

fn parse_line(line: &str, line_number: u64) -> ImportResult<RawRecord> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(ImportError::Parse {
            line: line_number,
            message: format!("expected a JSON object, got {}", json_type(&other)),
        }),
        Err(e) => Err(ImportError::Parse {
            line: line_number,
            message: e.to_string(),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
