//! CSV extract reader

use super::{RawRecord, RecordStream};
use crate::error::{ImportError, ImportResult};
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use tokio::sync::mpsc;

/// Stream CSV rows as raw records keyed by header
///
/// Empty cells are left out of the record so that optional fields read as
/// absent.
pub(super) fn read(path: &Path, delimiter: u8, buffer: usize) -> ImportResult<RecordStream> {
    let file = File::open(path)?;
    let (tx, mut rx) = mpsc::channel::<ImportResult<RawRecord>>(buffer.max(1));

    tokio::task::spawn_blocking(move || {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(e) => {
                let _ = tx.blocking_send(Err(ImportError::Csv(e)));
                return;
            }
        };

        for result in reader.records() {
            let item = match result {
                Ok(row) => {
                    let record: RawRecord = headers
                        .iter()
                        .zip(row.iter())
                        .filter(|(_, cell)| !cell.is_empty())
                        .map(|(name, cell)| (name.to_string(), Value::String(cell.to_string())))
                        .collect();
                    Ok(record)
                }
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    let _ = tx.blocking_send(Err(ImportError::Csv(e)));
                    return;
                }
                Err(e) => Err(ImportError::Parse {
                    line: e.position().map(|p| p.line()).unwrap_or(0),
                    message: e.to_string(),
                }),
            };

            // Receiver gone: the consumer stopped pulling
            if tx.blocking_send(item).is_err() {
                return;
            }
        }
    });

    let stream = async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    };

    Ok(Box::pin(stream))
}
