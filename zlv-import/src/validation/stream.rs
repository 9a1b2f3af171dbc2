//! Validation stage

use super::SourceRecord;
use crate::error::{ImportError, ImportResult};
use crate::reporter::ProgressReporter;
use crate::source::RecordStream;
use futures::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Validate raw records into typed records
///
/// Invalid records and malformed lines are reported as failed. With
/// `abort_early` the first failure is yielded as an error and the stream
/// ends; otherwise the record is dropped and validation continues. Read
/// errors are reported and always end the stream with the error.
pub fn validate_stream<T: SourceRecord>(
    records: RecordStream,
    reporter: Arc<ProgressReporter>,
    abort_early: bool,
) -> impl Stream<Item = ImportResult<T>> + Send + 'static {
    async_stream::stream! {
        let mut records = records;
        while let Some(item) = records.next().await {
            match item {
                Ok(raw) => match T::schema().validate_sync::<T>(&raw) {
                    Ok(record) => yield Ok(record),
                    Err(err) => {
                        debug!(error = %err, "Record rejected by schema");
                        reporter.failed(&raw, &err);
                        if abort_early {
                            yield Err(ImportError::Validation(err));
                            break;
                        }
                    }
                },
                Err(err) => {
                    reporter.failed(&source_context(&err), &err);
                    if abort_early || !matches!(err, ImportError::Parse { .. }) {
                        yield Err(err);
                        break;
                    }
                }
            }
        }
    }
}

fn source_context(err: &ImportError) -> Value {
    match err {
        ImportError::Parse { line, .. } => json!({ "line": line }),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawRecord;
    use crate::validation::{FieldKind, FieldSpec, Schema};
    use futures::stream;
    use serde::{Deserialize, Serialize};

    static ITEM_SCHEMA: Schema = Schema {
        name: "item",
        fields: &[FieldSpec::required("id", FieldKind::Integer { min: None, max: None })],
    };

    #[derive(Debug, Serialize, Deserialize)]
    struct Item {
        id: i64,
    }

    impl SourceRecord for Item {
        fn schema() -> &'static Schema {
            &ITEM_SCHEMA
        }
    }

    fn three_records_second_invalid() -> RecordStream {
        let records: Vec<ImportResult<RawRecord>> = vec![
            Ok(json!({"id": "1"}).as_object().cloned().unwrap()),
            Ok(json!({"id": "two"}).as_object().cloned().unwrap()),
            Ok(json!({"id": "3"}).as_object().cloned().unwrap()),
        ];
        Box::pin(stream::iter(records))
    }

    #[tokio::test]
    async fn test_abort_early_stops_after_first_failure() {
        let reporter = Arc::new(ProgressReporter::new("items"));
        let mut validated = Box::pin(validate_stream::<Item>(
            three_records_second_invalid(),
            Arc::clone(&reporter),
            true,
        ));

        let mut reached = Vec::new();
        let mut error = None;
        while let Some(item) = validated.next().await {
            match item {
                Ok(record) => reached.push(record.id),
                Err(e) => error = Some(e),
            }
        }

        assert_eq!(reached, vec![1]);
        assert!(matches!(error, Some(ImportError::Validation(_))));
        assert_eq!(reporter.summary().failed, 1);
    }

    #[tokio::test]
    async fn test_continue_mode_drops_invalid_record() {
        let reporter = Arc::new(ProgressReporter::new("items"));
        let validated: Vec<ImportResult<Item>> = validate_stream::<Item>(
            three_records_second_invalid(),
            Arc::clone(&reporter),
            false,
        )
        .collect()
        .await;

        let ids: Vec<i64> = validated.into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![1, 3]);

        let summary = reporter.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].record, json!({"id": "two"}));
    }

    #[tokio::test]
    async fn test_parse_errors_are_reported() {
        let reporter = Arc::new(ProgressReporter::new("items"));
        let records: RecordStream = Box::pin(stream::iter(vec![Err(ImportError::Parse {
            line: 7,
            message: "unexpected end".to_string(),
        })]));

        let validated: Vec<ImportResult<Item>> =
            validate_stream::<Item>(records, Arc::clone(&reporter), false).collect().await;

        assert!(validated.is_empty());
        assert_eq!(reporter.summary().failures[0].record, json!({"line": 7}));
    }

    #[tokio::test]
    async fn test_read_error_ends_stream_in_continue_mode() {
        let reporter = Arc::new(ProgressReporter::new("items"));
        let records: Vec<ImportResult<RawRecord>> = vec![
            Ok(json!({"id": "1"}).as_object().cloned().unwrap()),
            Err(ImportError::Io(std::io::Error::other("disk gone"))),
            Ok(json!({"id": "3"}).as_object().cloned().unwrap()),
        ];

        let validated: Vec<ImportResult<Item>> =
            validate_stream::<Item>(Box::pin(stream::iter(records)), Arc::clone(&reporter), false)
                .collect()
                .await;

        assert_eq!(validated.len(), 2);
        assert_eq!(validated[0].as_ref().unwrap().id, 1);
        assert!(matches!(validated[1], Err(ImportError::Io(_))));
        assert_eq!(reporter.summary().failed, 1);
    }
}
