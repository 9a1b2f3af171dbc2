//! Owner reconciliation
//!
//! National owners were linked to housing with the awaiting rank before any
//! departmental data existed. Once a pairing tells us which departmental
//! owner (`idpersonne`) a national owner is, each housing where the two are
//! the only current owners is reconciled: the departmental link is deleted
//! and the national link takes its rank. Stale "owner changed" events written
//! by the admin actor during the remediation window are removed with it.
//!
//! Any other link shape is left untouched. Groups with three or more current
//! links are logged for manual review.

use crate::db::events::EventFilter;
use crate::db::housing_owners::{find_active_links_by_idpersonne, find_awaiting_links, find_housing_links, OwnerRef, RankedLink};
use crate::error::ImportResult;
use crate::models::OwnerPairing;
use crate::workflow::{Change, Processor, Reassignment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;
use zlv_common::config::ImportSettings;
use zlv_common::db::{EventKind, OwnerRank};

/// How the current links of one housing relate to a pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupShape {
    /// Exactly the national awaiting link and the departmental active link
    Reconcilable(Reassignment),
    /// Three or more current links
    NeedsReview { links: usize },
    /// Anything else (already reconciled, one side missing, wrong ranks)
    Unmatched,
}

/// Classify the current (non-negative rank) links of one housing
pub fn classify_group(pairing: &OwnerPairing, links: &[RankedLink]) -> GroupShape {
    let current: Vec<&RankedLink> = links.iter().filter(|link| link.rank >= OwnerRank::AWAITING).collect();

    if current.len() >= 3 {
        return GroupShape::NeedsReview { links: current.len() };
    }
    if current.len() != 2 {
        return GroupShape::Unmatched;
    }

    let national = current.iter().find(|link| {
        matches!(link.owner, OwnerRef::National { id } if id == pairing.national_owner_id) && link.rank.is_awaiting()
    });
    let departmental = current.iter().find(|link| {
        matches!(&link.owner, OwnerRef::Departmental { idpersonne, .. } if *idpersonne == pairing.idpersonne)
            && link.rank.is_active()
    });

    match (national, departmental) {
        (Some(national), Some(departmental)) => GroupShape::Reconcilable(Reassignment {
            housing_id: national.housing_id,
            national_owner_id: national.owner.id(),
            departmental_owner_id: departmental.owner.id(),
            rank: departmental.rank,
        }),
        _ => GroupShape::Unmatched,
    }
}

/// Counters over a reconciliation run
///
/// Reconciled housings are counted once their change is committed.
#[derive(Debug, Default)]
pub struct ReconciliationStats {
    housings_reconciled: AtomicU64,
    groups_needing_review: AtomicU64,
}

impl ReconciliationStats {
    pub fn housings_reconciled(&self) -> u64 {
        self.housings_reconciled.load(Ordering::Relaxed)
    }

    pub fn groups_needing_review(&self) -> u64 {
        self.groups_needing_review.load(Ordering::Relaxed)
    }
}

/// Processor turning owner pairings into reconciliation changes
pub struct ReconciliationEngine {
    pool: SqlitePool,
    admin_actor_id: Uuid,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    stats: ReconciliationStats,
}

impl ReconciliationEngine {
    pub fn new(pool: SqlitePool, settings: &ImportSettings) -> Self {
        Self {
            pool,
            admin_actor_id: settings.admin_actor_id,
            window_start: settings.remediation_window_start,
            window_end: settings.remediation_window_end,
            stats: ReconciliationStats::default(),
        }
    }

    pub fn stats(&self) -> &ReconciliationStats {
        &self.stats
    }

    fn stale_events(&self) -> EventFilter {
        EventFilter {
            kind: Some(EventKind::HousingOwnerUpdated),
            housing_id: None,
            created_by: Some(self.admin_actor_id),
            created_from: Some(self.window_start),
            created_to: Some(self.window_end),
        }
    }
}

#[async_trait]
impl Processor for ReconciliationEngine {
    type Record = OwnerPairing;

    fn name(&self) -> &'static str {
        "reconcile-owners"
    }

    async fn decide(&self, pairing: &OwnerPairing) -> ImportResult<Option<Change>> {
        let mut candidates = find_awaiting_links(&self.pool, pairing.national_owner_id).await?;
        candidates.extend(find_active_links_by_idpersonne(&self.pool, &pairing.idpersonne).await?);

        let housing_ids: BTreeSet<Uuid> = candidates.iter().map(|link| link.housing_id).collect();

        let mut reassignments = Vec::new();
        for housing_id in housing_ids {
            let links = find_housing_links(&self.pool, housing_id).await?;
            match classify_group(pairing, &links) {
                GroupShape::Reconcilable(reassignment) => reassignments.push(reassignment),
                GroupShape::NeedsReview { links } => {
                    self.stats.groups_needing_review.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        %housing_id,
                        national_owner_id = %pairing.national_owner_id,
                        idpersonne = %pairing.idpersonne,
                        links,
                        "Housing owners need manual review, left untouched"
                    );
                }
                GroupShape::Unmatched => {
                    debug!(%housing_id, idpersonne = %pairing.idpersonne, "Link shape does not match pairing");
                }
            }
        }

        if reassignments.is_empty() {
            return Ok(None);
        }

        reassignments.sort_by_key(|r| r.rank);
        Ok(Some(Change::ReconcileOwners {
            reassignments,
            stale_events: self.stale_events(),
        }))
    }

    fn committed(&self, change: &Change) {
        if let Change::ReconcileOwners { reassignments, .. } = change {
            self.stats
                .housings_reconciled
                .fetch_add(reassignments.len() as u64, Ordering::Relaxed);
        }
    }
}
