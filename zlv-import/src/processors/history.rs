//! Data-year history processor
//!
//! Records list the extracts a housing unit appeared in. Years are
//! normalized to `lovac-YYYY` and merged into the stored list.

use crate::db::housings::find_housing_by_natural_key;
use crate::error::ImportResult;
use crate::models::HistoryRecord;
use crate::workflow::{Change, Processor};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::debug;

const FILE_YEAR_PREFIX: &str = "lovac-";

/// Normalize one file year token
///
/// `2019` and `lovac-2019` both give `lovac-2019`; anything else is `None`.
pub fn normalize_file_year(token: &str) -> Option<String> {
    let token = token.trim();
    let year = token.strip_prefix(FILE_YEAR_PREFIX).unwrap_or(token);
    let valid = year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) && year.starts_with("20");
    valid.then(|| format!("{}{}", FILE_YEAR_PREFIX, year))
}

/// Normalized, sorted, deduplicated years; invalid tokens are dropped
pub fn normalize_file_years<S: AsRef<str>>(tokens: &[S]) -> BTreeSet<String> {
    tokens
        .iter()
        .filter_map(|t| normalize_file_year(t.as_ref()))
        .collect()
}

pub struct HistoryProcessor {
    pool: SqlitePool,
}

impl HistoryProcessor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Processor for HistoryProcessor {
    type Record = HistoryRecord;

    fn name(&self) -> &'static str {
        "history"
    }

    async fn decide(&self, record: &HistoryRecord) -> ImportResult<Option<Change>> {
        let incoming = normalize_file_years(&record.file_years);
        if incoming.is_empty() {
            debug!(local_id = %record.local_id, "No valid file year");
            return Ok(None);
        }

        let key = record.housing_key();
        let Some(housing) = find_housing_by_natural_key(&self.pool, &key).await? else {
            debug!(housing = %key, "Housing not found, history skipped");
            return Ok(None);
        };

        let stored: BTreeSet<String> = housing.data_file_years.iter().cloned().collect();
        let merged: Vec<String> = stored.union(&incoming).cloned().collect();
        if merged == housing.data_file_years {
            return Ok(None);
        }

        Ok(Some(Change::UpdateDataFileYears { key, years: merged }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::housings::tests::housing;
    use crate::db::housings::{save_housing, OnConflict};
    use zlv_common::db::init_memory_database;

    fn record(years: &[&str]) -> HistoryRecord {
        HistoryRecord {
            local_id: "L1".to_string(),
            geo_code: "75056".to_string(),
            file_years: years.iter().map(|y| y.to_string()).collect(),
        }
    }

    #[test]
    fn test_normalize_file_year() {
        assert_eq!(normalize_file_year("2019").as_deref(), Some("lovac-2019"));
        assert_eq!(normalize_file_year(" lovac-2021 ").as_deref(), Some("lovac-2021"));
        assert_eq!(normalize_file_year("ff-2019"), None);
        assert_eq!(normalize_file_year("19"), None);
        assert_eq!(normalize_file_year("lovac-20x1"), None);
    }

    #[test]
    fn test_normalize_sorts_and_dedupes() {
        let years = normalize_file_years(&["2023", "lovac-2019", "2019", "garbage"]);
        assert_eq!(years.into_iter().collect::<Vec<_>>(), vec!["lovac-2019", "lovac-2023"]);
    }

    #[tokio::test]
    async fn test_merges_with_stored_years() {
        let pool = init_memory_database().await.unwrap();
        save_housing(&pool, &housing("L1", "75056", &["lovac-2024"]), OnConflict::Ignore)
            .await
            .unwrap();
        let processor = HistoryProcessor::new(pool);

        let change = processor.decide(&record(&["2019", "lovac-2024"])).await.unwrap();
        assert_eq!(
            change,
            Some(Change::UpdateDataFileYears {
                key: zlv_common::db::HousingKey::new("L1", "75056"),
                years: vec!["lovac-2019".to_string(), "lovac-2024".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_skips_empty_set_missing_housing_and_known_years() {
        let pool = init_memory_database().await.unwrap();
        let processor = HistoryProcessor::new(pool.clone());

        assert_eq!(processor.decide(&record(&["n/a"])).await.unwrap(), None);
        assert_eq!(processor.decide(&record(&["2019"])).await.unwrap(), None);

        save_housing(&pool, &housing("L1", "75056", &["lovac-2019"]), OnConflict::Ignore)
            .await
            .unwrap();
        assert_eq!(processor.decide(&record(&["2019"])).await.unwrap(), None);
    }
}
