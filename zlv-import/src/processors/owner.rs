//! Owner processor
//!
//! Departmental owners are keyed by `idpersonne`. A new person id creates an
//! owner; a known one merges the incoming fields into the stored owner.

use crate::db::owners::find_owner_by_idpersonne;
use crate::error::ImportResult;
use crate::models::SourceOwner;
use crate::workflow::{Change, Processor};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use zlv_common::db::{Owner, OwnerKind};

pub struct OwnerProcessor {
    pool: SqlitePool,
}

impl OwnerProcessor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn new_owner(record: &SourceOwner) -> Owner {
    let now = Utc::now();
    Owner {
        id: Uuid::new_v4(),
        idpersonne: Some(record.idpersonne.clone()),
        full_name: record.full_name.clone(),
        birth_date: record.birth_date,
        administrator: record.administrator.clone(),
        siren: record.siren.clone(),
        address_dgfip: record.dgfip_address.clone(),
        kind: record.kind.unwrap_or_default(),
        data_source: record.data_source.clone(),
        created_at: now,
        updated_at: now,
    }
}

/// Incoming non-null values win; an unspecified kind keeps the stored one
fn merge_owner(existing: &Owner, record: &SourceOwner) -> Owner {
    let kind = match record.kind {
        Some(kind) if kind != OwnerKind::Unspecified => kind,
        _ => existing.kind,
    };

    Owner {
        full_name: record.full_name.clone(),
        birth_date: record.birth_date.or(existing.birth_date),
        administrator: record.administrator.clone().or_else(|| existing.administrator.clone()),
        siren: record.siren.clone().or_else(|| existing.siren.clone()),
        address_dgfip: record.dgfip_address.clone().or_else(|| existing.address_dgfip.clone()),
        kind,
        data_source: record.data_source.clone().or_else(|| existing.data_source.clone()),
        ..existing.clone()
    }
}

#[async_trait]
impl Processor for OwnerProcessor {
    type Record = SourceOwner;

    fn name(&self) -> &'static str {
        "owners"
    }

    async fn decide(&self, record: &SourceOwner) -> ImportResult<Option<Change>> {
        let Some(existing) = find_owner_by_idpersonne(&self.pool, &record.idpersonne).await? else {
            return Ok(Some(Change::CreateOwner(new_owner(record))));
        };

        let merged = merge_owner(&existing, record);
        if merged == existing {
            return Ok(None);
        }

        Ok(Some(Change::UpdateOwner(Owner {
            updated_at: Utc::now(),
            ..merged
        })))
    }
}
