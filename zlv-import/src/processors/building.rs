//! Building processor
//!
//! Buildings are written in chunks: one upsert statement per chunk.

use crate::error::ImportResult;
use crate::models::SourceBuilding;
use crate::workflow::{BatchProcessor, Change};
use async_trait::async_trait;
use zlv_common::db::Building;

#[derive(Debug, Default)]
pub struct BuildingProcessor;

impl BuildingProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl From<&SourceBuilding> for Building {
    fn from(record: &SourceBuilding) -> Self {
        Building {
            id: record.building_id.clone(),
            housing_count: record.housing_count,
            vacant_housing_count: record.vacant_housing_count,
            rent_housing_count: record.rent_housing_count.unwrap_or(0),
            rnb_id: record.rnb_id.clone(),
        }
    }
}

#[async_trait]
impl BatchProcessor for BuildingProcessor {
    type Record = SourceBuilding;

    fn name(&self) -> &'static str {
        "buildings"
    }

    async fn decide_batch(&self, records: &[SourceBuilding]) -> ImportResult<Option<Change>> {
        let batch: Vec<Building> = records.iter().map(Building::from).collect();
        Ok((!batch.is_empty()).then_some(Change::SaveBuildings(batch)))
    }
}
