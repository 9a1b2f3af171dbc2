//! Decisions produced by processors
//!
//! A [`Change`] is computed from one record (or one chunk) and the current
//! state before anything is written. Applying it is a separate step so a
//! dry run can stop after the decision.

use crate::db::events::{delete_events_matching, insert_event, EventFilter};
use crate::db::housing_owners::{delete_link, insert_link, update_rank};
use crate::db::housings::{save_housing, update_housing_fields, HousingPatch, OnConflict};
use crate::db::{buildings, owners};
use crate::error::{ImportError, ImportResult};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;
use zlv_common::db::{Building, Event, Housing, HousingKey, HousingOwner, Owner, OwnerRank};

/// National placeholder link replaced by the departmental owner's rank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub housing_id: Uuid,
    pub national_owner_id: Uuid,
    pub departmental_owner_id: Uuid,
    pub rank: OwnerRank,
}

/// Write decided for one record or chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    CreateOwner(Owner),
    UpdateOwner(Owner),
    CreateHousing(Housing),
    UpdateHousing(Housing),
    /// Create or re-rank a link after demoting the owners that held its rank
    LinkOwner {
        link: HousingOwner,
        demote: Vec<Uuid>,
    },
    UpdateDataFileYears {
        key: HousingKey,
        years: Vec<String>,
    },
    /// Housing update with the audit events describing it
    TransitionStatus {
        key: HousingKey,
        patch: HousingPatch,
        events: Vec<Event>,
    },
    SaveBuildings(Vec<Building>),
    /// Reconciled pairs, plus the event filter applied to each housing
    ReconcileOwners {
        reassignments: Vec<Reassignment>,
        stale_events: EventFilter,
    },
}

impl Change {
    /// Short label for logs and retry messages
    pub fn label(&self) -> &'static str {
        match self {
            Change::CreateOwner(_) => "create owner",
            Change::UpdateOwner(_) => "update owner",
            Change::CreateHousing(_) => "create housing",
            Change::UpdateHousing(_) => "update housing",
            Change::LinkOwner { .. } => "link owner",
            Change::UpdateDataFileYears { .. } => "update data file years",
            Change::TransitionStatus { .. } => "transition housing status",
            Change::SaveBuildings(_) => "save buildings",
            Change::ReconcileOwners { .. } => "reconcile owners",
        }
    }

    /// Write the change on `conn`
    ///
    /// The caller owns the transaction; every statement of one change runs
    /// on the same connection so the change commits or rolls back whole.
    pub async fn apply(&self, conn: &mut SqliteConnection) -> ImportResult<()> {
        match self {
            Change::CreateOwner(owner) | Change::UpdateOwner(owner) => {
                owners::save_owner(&mut *conn, owner).await?;
            }
            Change::CreateHousing(housing) => {
                save_housing(&mut *conn, housing, OnConflict::Ignore).await?;
            }
            Change::UpdateHousing(housing) => {
                save_housing(&mut *conn, housing, OnConflict::Merge).await?;
            }
            Change::LinkOwner { link, demote } => {
                for owner_id in demote {
                    update_rank(&mut *conn, *owner_id, link.housing_id, OwnerRank::PREVIOUS).await?;
                }
                insert_link(&mut *conn, link).await?;
            }
            Change::UpdateDataFileYears { key, years } => {
                let patch = HousingPatch {
                    data_file_years: Some(years.clone()),
                    ..Default::default()
                };
                if !update_housing_fields(&mut *conn, key, &patch).await? {
                    return Err(ImportError::MissingReference(format!("housing {}", key)));
                }
            }
            Change::TransitionStatus { key, patch, events } => {
                if !update_housing_fields(&mut *conn, key, patch).await? {
                    return Err(ImportError::MissingReference(format!("housing {}", key)));
                }
                for event in events {
                    insert_event(&mut *conn, event).await?;
                }
            }
            Change::SaveBuildings(batch) => {
                buildings::save_buildings(&mut *conn, batch).await?;
            }
            Change::ReconcileOwners {
                reassignments,
                stale_events,
            } => {
                for reassignment in reassignments {
                    // The departmental link goes first: its rank is still held
                    // until it is deleted.
                    delete_link(&mut *conn, reassignment.departmental_owner_id, reassignment.housing_id).await?;
                    update_rank(
                        &mut *conn,
                        reassignment.national_owner_id,
                        reassignment.housing_id,
                        reassignment.rank,
                    )
                    .await?;

                    let filter = EventFilter {
                        housing_id: Some(reassignment.housing_id),
                        ..stale_events.clone()
                    };
                    let removed = delete_events_matching(&mut *conn, &filter).await?;
                    debug!(
                        housing_id = %reassignment.housing_id,
                        rank = %reassignment.rank,
                        events_removed = removed,
                        "Reconciled housing owner"
                    );
                }
            }
        }
        Ok(())
    }
}
