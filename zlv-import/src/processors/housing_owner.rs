//! Housing-owner link processor
//!
//! Joins a departmental owner to a housing unit at an active rank. Whoever
//! else holds that rank on the housing is demoted to the previous-owner rank.

use crate::db::housing_owners::find_housing_links;
use crate::db::housings::find_housing_by_natural_key;
use crate::db::owners::find_owner_by_idpersonne;
use crate::error::{ImportError, ImportResult};
use crate::models::SourceHousingOwner;
use crate::workflow::{Change, Processor};
use async_trait::async_trait;
use sqlx::SqlitePool;
use zlv_common::db::{HousingOwner, OwnerRank};

pub struct HousingOwnerProcessor {
    pool: SqlitePool,
}

impl HousingOwnerProcessor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Processor for HousingOwnerProcessor {
    type Record = SourceHousingOwner;

    fn name(&self) -> &'static str {
        "housing-owners"
    }

    async fn decide(&self, record: &SourceHousingOwner) -> ImportResult<Option<Change>> {
        let rank = OwnerRank::active(record.rank)?;

        let owner = find_owner_by_idpersonne(&self.pool, &record.idpersonne)
            .await?
            .ok_or_else(|| ImportError::MissingReference(format!("owner {}", record.idpersonne)))?;

        let key = record.housing_key();
        let housing = find_housing_by_natural_key(&self.pool, &key)
            .await?
            .ok_or_else(|| ImportError::MissingReference(format!("housing {}", key)))?;

        let links = find_housing_links(&self.pool, housing.id).await?;
        let already_linked = links
            .iter()
            .any(|link| link.owner.id() == owner.id && link.rank == rank);
        if already_linked {
            return Ok(None);
        }

        let demote = links
            .iter()
            .filter(|link| link.rank == rank && link.owner.id() != owner.id)
            .map(|link| link.owner.id())
            .collect();

        Ok(Some(Change::LinkOwner {
            link: HousingOwner {
                owner_id: owner.id,
                housing_id: housing.id,
                housing_geo_code: housing.geo_code,
                rank,
                idprocpte: record.idprocpte.clone(),
                idprodroit: record.idprodroit.clone(),
                property_right: record.property_right.clone(),
            },
            demote,
        }))
    }
}
