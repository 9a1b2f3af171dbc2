//! Housing processor
//!
//! Housing units are keyed by `(local_id, geo_code)`. Unknown units are
//! created; known ones are left alone or merged depending on the conflict
//! mode.

use super::history::normalize_file_year;
use crate::db::housings::{find_housing_by_natural_key, OnConflict};
use crate::error::{ImportError, ImportResult};
use crate::models::SourceHousing;
use crate::workflow::{Change, Processor};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use uuid::Uuid;
use zlv_common::db::{Housing, HousingStatus};

pub struct HousingProcessor {
    pool: SqlitePool,
    on_conflict: OnConflict,
}

impl HousingProcessor {
    pub fn new(pool: SqlitePool, on_conflict: OnConflict) -> Self {
        Self { pool, on_conflict }
    }
}

fn data_file_year(record: &SourceHousing) -> ImportResult<String> {
    normalize_file_year(&record.data_file_year).ok_or_else(|| {
        ImportError::InvalidInput(format!("invalid data file year '{}'", record.data_file_year))
    })
}

fn new_housing(record: &SourceHousing, year: String) -> Housing {
    Housing {
        id: Uuid::new_v4(),
        local_id: record.local_id.clone(),
        geo_code: record.geo_code.clone(),
        invariant: record.invariant.clone(),
        building_id: record.building_id.clone(),
        plot_id: record.plot_id.clone(),
        address_dgfip: record.dgfip_address.clone(),
        longitude: record.longitude,
        latitude: record.latitude,
        kind: record.housing_kind,
        rooms_count: record.rooms_count,
        living_area: record.living_area,
        build_year: record.build_year,
        vacancy_start_year: record.vacancy_start_year,
        uncomfortable: record.uncomfortable,
        taxed: record.taxed,
        occupancy: record.occupancy,
        status: HousingStatus::NeverContacted,
        sub_status: None,
        data_file_years: vec![year],
        data_source: record.data_source.clone(),
    }
}

/// Refresh extract-owned columns and append the extract year
///
/// Follow-up columns (status, sub-status) and the id stay as stored.
fn merge_housing(existing: &Housing, record: &SourceHousing, year: String) -> Housing {
    let mut years: BTreeSet<String> = existing.data_file_years.iter().cloned().collect();
    years.insert(year);

    Housing {
        id: existing.id,
        status: existing.status,
        sub_status: existing.sub_status.clone(),
        data_file_years: years.into_iter().collect(),
        ..new_housing(record, String::new())
    }
}

#[async_trait]
impl Processor for HousingProcessor {
    type Record = SourceHousing;

    fn name(&self) -> &'static str {
        "housings"
    }

    async fn decide(&self, record: &SourceHousing) -> ImportResult<Option<Change>> {
        let year = data_file_year(record)?;

        let Some(existing) = find_housing_by_natural_key(&self.pool, &record.key()).await? else {
            return Ok(Some(Change::CreateHousing(new_housing(record, year))));
        };

        match self.on_conflict {
            OnConflict::Ignore => Ok(None),
            OnConflict::Merge => {
                let merged = merge_housing(&existing, record, year);
                Ok((merged != existing).then_some(Change::UpdateHousing(merged)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::housings::save_housing;
    use zlv_common::db::{init_memory_database, HousingKind, Occupancy};

    fn record(rooms: i64, year: &str) -> SourceHousing {
        SourceHousing {
            local_id: "L1".to_string(),
            geo_code: "75056".to_string(),
            invariant: None,
            building_id: None,
            plot_id: None,
            dgfip_address: None,
            longitude: None,
            latitude: None,
            housing_kind: HousingKind::House,
            rooms_count: Some(rooms),
            living_area: None,
            build_year: None,
            vacancy_start_year: None,
            uncomfortable: None,
            taxed: None,
            occupancy: Occupancy::Vacant,
            data_file_year: year.to_string(),
            data_source: None,
        }
    }

    #[tokio::test]
    async fn test_ignore_mode_skips_existing() {
        let pool = init_memory_database().await.unwrap();
        let processor = HousingProcessor::new(pool.clone(), OnConflict::Ignore);

        let Some(Change::CreateHousing(created)) = processor.decide(&record(3, "2024")).await.unwrap() else {
            panic!("expected a new housing");
        };
        assert_eq!(created.data_file_years, vec!["lovac-2024"]);
        save_housing(&pool, &created, OnConflict::Ignore).await.unwrap();

        assert_eq!(processor.decide(&record(5, "lovac-2025")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_merge_mode_appends_year_and_keeps_status() {
        let pool = init_memory_database().await.unwrap();
        let mut stored = new_housing(&record(3, "2024"), "lovac-2024".to_string());
        stored.status = HousingStatus::InProgress;
        save_housing(&pool, &stored, OnConflict::Ignore).await.unwrap();

        let processor = HousingProcessor::new(pool, OnConflict::Merge);
        let Some(Change::UpdateHousing(merged)) = processor.decide(&record(4, "2025")).await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(merged.id, stored.id);
        assert_eq!(merged.rooms_count, Some(4));
        assert_eq!(merged.status, HousingStatus::InProgress);
        assert_eq!(merged.data_file_years, vec!["lovac-2024", "lovac-2025"]);
    }

    #[tokio::test]
    async fn test_invalid_year_fails() {
        let pool = init_memory_database().await.unwrap();
        let processor = HousingProcessor::new(pool, OnConflict::Ignore);
        assert!(processor.decide(&record(3, "last year")).await.is_err());
    }
}
