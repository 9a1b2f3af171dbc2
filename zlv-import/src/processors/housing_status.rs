//! Housing status transition
//!
//! Vacant housing missing from the current extract that nobody is following
//! up leaves the vacancy pool: occupancy becomes unknown and status exited.
//! Both changes are recorded as events in the same transaction.

use crate::db::housings::HousingPatch;
use crate::error::ImportResult;
use crate::workflow::{Change, Processor};
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;
use zlv_common::db::{Event, EventKind, Housing, HousingStatus, Occupancy};

pub struct HousingStatusProcessor {
    /// Author of the events
    actor_id: Uuid,
}

impl HousingStatusProcessor {
    pub fn new(actor_id: Uuid) -> Self {
        Self { actor_id }
    }
}

#[async_trait]
impl Processor for HousingStatusProcessor {
    type Record = Housing;

    fn name(&self) -> &'static str {
        "housing-status"
    }

    async fn decide(&self, housing: &Housing) -> ImportResult<Option<Change>> {
        if housing.occupancy != Occupancy::Vacant || housing.status.is_followed_up() {
            return Ok(None);
        }

        let events = vec![
            Event::for_housing(
                EventKind::HousingStatusUpdated,
                housing.id,
                Some(json!({ "status": housing.status, "sub_status": housing.sub_status })),
                Some(json!({ "status": HousingStatus::Exited, "sub_status": null })),
                self.actor_id,
            ),
            Event::for_housing(
                EventKind::HousingOccupancyUpdated,
                housing.id,
                Some(json!({ "occupancy": housing.occupancy })),
                Some(json!({ "occupancy": Occupancy::Unknown })),
                self.actor_id,
            ),
        ];

        Ok(Some(Change::TransitionStatus {
            key: housing.key(),
            patch: HousingPatch {
                occupancy: Some(Occupancy::Unknown),
                status: Some(HousingStatus::Exited),
                sub_status: Some(None),
                data_file_years: None,
            },
            events,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::events::find_events_by_housing;
    use crate::db::housings::tests::housing;
    use crate::db::housings::{find_housing_by_natural_key, save_housing, OnConflict};
    use zlv_common::db::init_memory_database;

    #[tokio::test]
    async fn test_followed_up_or_occupied_housing_is_skipped() {
        let processor = HousingStatusProcessor::new(Uuid::nil());

        let mut followed = housing("L1", "75056", &["lovac-2024"]);
        followed.status = HousingStatus::FirstContact;
        assert_eq!(processor.decide(&followed).await.unwrap(), None);

        let mut rented = housing("L2", "75056", &["lovac-2024"]);
        rented.occupancy = Occupancy::Rent;
        assert_eq!(processor.decide(&rented).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transition_writes_update_and_two_events() {
        let pool = init_memory_database().await.unwrap();
        let mut stored = housing("L1", "75056", &["lovac-2024"]);
        stored.status = HousingStatus::Waiting;
        save_housing(&pool, &stored, OnConflict::Ignore).await.unwrap();

        let processor = HousingStatusProcessor::new(Uuid::nil());
        let change = processor.decide(&stored).await.unwrap().unwrap();
        let mut tx = pool.begin().await.unwrap();
        change.apply(&mut tx).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = find_housing_by_natural_key(&pool, &stored.key()).await.unwrap().unwrap();
        assert_eq!(loaded.status, HousingStatus::Exited);
        assert_eq!(loaded.occupancy, Occupancy::Unknown);

        let events = find_events_by_housing(&pool, stored.id).await.unwrap();
        let mut kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![EventKind::HousingOccupancyUpdated, EventKind::HousingStatusUpdated]);
    }
}
