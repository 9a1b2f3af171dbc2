//! Housing-owner link database operations
//!
//! Links are read back as [`RankedLink`]s whose owner side is tagged
//! national or departmental from the presence of `idpersonne`.

use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite};
use uuid::Uuid;
use zlv_common::db::{parse_uuid, HousingOwner, OwnerRank};
use zlv_common::Result;

/// Owner side of a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerRef {
    /// Owner known only to the national file, no departmental id yet
    National { id: Uuid },
    /// Owner imported from a departmental extract
    Departmental { id: Uuid, idpersonne: String },
}

impl OwnerRef {
    pub fn id(&self) -> Uuid {
        match self {
            OwnerRef::National { id } | OwnerRef::Departmental { id, .. } => *id,
        }
    }
}

/// Link joined with its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedLink {
    pub owner: OwnerRef,
    pub housing_id: Uuid,
    pub housing_geo_code: String,
    pub rank: OwnerRank,
}

/// Criteria for [`find_links`]; unset fields do not filter
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub owner_id: Option<Uuid>,
    pub housing_id: Option<Uuid>,
    pub idpersonne: Option<String>,
    pub rank: Option<OwnerRank>,
    pub active_only: bool,
}

/// Find links matching all set criteria, ordered by housing then rank
pub async fn find_links<'e, E>(executor: E, filter: &LinkFilter) -> Result<Vec<RankedLink>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT oh.owner_id, oh.housing_id, oh.housing_geo_code, oh.rank, o.idpersonne
        FROM owners_housing oh
        JOIN owners o ON o.id = oh.owner_id
        WHERE 1 = 1
        "#,
    );
    if let Some(owner_id) = filter.owner_id {
        builder.push(" AND oh.owner_id = ").push_bind(owner_id.to_string());
    }
    if let Some(housing_id) = filter.housing_id {
        builder.push(" AND oh.housing_id = ").push_bind(housing_id.to_string());
    }
    if let Some(idpersonne) = &filter.idpersonne {
        builder.push(" AND o.idpersonne = ").push_bind(idpersonne.clone());
    }
    if let Some(rank) = filter.rank {
        builder.push(" AND oh.rank = ").push_bind(rank.value());
    }
    if filter.active_only {
        builder.push(" AND oh.rank >= 1");
    }
    builder.push(" ORDER BY oh.housing_id, oh.rank");

    let rows = builder.build().fetch_all(executor).await?;
    rows.iter().map(link_from_row).collect()
}

/// Awaiting links (rank 0) of a national owner
pub async fn find_awaiting_links<'e, E>(executor: E, national_owner_id: Uuid) -> Result<Vec<RankedLink>>
where
    E: Executor<'e, Database = Sqlite>,
{
    find_links(
        executor,
        &LinkFilter {
            owner_id: Some(national_owner_id),
            rank: Some(OwnerRank::AWAITING),
            ..Default::default()
        },
    )
    .await
}

/// Active links of the departmental owner with this person id
pub async fn find_active_links_by_idpersonne<'e, E>(executor: E, idpersonne: &str) -> Result<Vec<RankedLink>>
where
    E: Executor<'e, Database = Sqlite>,
{
    find_links(
        executor,
        &LinkFilter {
            idpersonne: Some(idpersonne.to_string()),
            active_only: true,
            ..Default::default()
        },
    )
    .await
}

/// All links of a housing unit
pub async fn find_housing_links<'e, E>(executor: E, housing_id: Uuid) -> Result<Vec<RankedLink>>
where
    E: Executor<'e, Database = Sqlite>,
{
    find_links(
        executor,
        &LinkFilter {
            housing_id: Some(housing_id),
            ..Default::default()
        },
    )
    .await
}

/// Insert a link, or update rank and provenance of the existing one
pub async fn insert_link<'e, E>(executor: E, link: &HousingOwner) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO owners_housing (
            owner_id, housing_id, housing_geo_code, rank, idprocpte, idprodroit, property_right
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(owner_id, housing_id) DO UPDATE SET
            rank = excluded.rank,
            idprocpte = excluded.idprocpte,
            idprodroit = excluded.idprodroit,
            property_right = excluded.property_right
        "#,
    )
    .bind(link.owner_id.to_string())
    .bind(link.housing_id.to_string())
    .bind(&link.housing_geo_code)
    .bind(link.rank.value())
    .bind(&link.idprocpte)
    .bind(&link.idprodroit)
    .bind(&link.property_right)
    .execute(executor)
    .await?;

    Ok(())
}

/// Set the rank of an existing link; returns whether a row changed
pub async fn update_rank<'e, E>(executor: E, owner_id: Uuid, housing_id: Uuid, rank: OwnerRank) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE owners_housing SET rank = ? WHERE owner_id = ? AND housing_id = ?")
        .bind(rank.value())
        .bind(owner_id.to_string())
        .bind(housing_id.to_string())
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a link; returns whether it existed
pub async fn delete_link<'e, E>(executor: E, owner_id: Uuid, housing_id: Uuid) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM owners_housing WHERE owner_id = ? AND housing_id = ?")
        .bind(owner_id.to_string())
        .bind(housing_id.to_string())
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

fn link_from_row(row: &SqliteRow) -> Result<RankedLink> {
    let owner_id: String = row.try_get("owner_id")?;
    let housing_id: String = row.try_get("housing_id")?;
    let rank: i16 = row.try_get("rank")?;
    let idpersonne: Option<String> = row.try_get("idpersonne")?;

    let id = parse_uuid(&owner_id)?;
    let owner = match idpersonne {
        Some(idpersonne) => OwnerRef::Departmental { id, idpersonne },
        None => OwnerRef::National { id },
    };

    Ok(RankedLink {
        owner,
        housing_id: parse_uuid(&housing_id)?,
        housing_geo_code: row.try_get("housing_geo_code")?,
        rank: OwnerRank::new(rank)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::housings::tests::housing;
    use crate::db::housings::{save_housing, OnConflict};
    use crate::db::owners::save_owner;
    use chrono::Utc;
    use sqlx::SqlitePool;
    use zlv_common::db::{init_memory_database, Owner, OwnerKind};

    async fn owner(pool: &SqlitePool, idpersonne: Option<&str>) -> Uuid {
        let now = Utc::now();
        let owner = Owner {
            id: Uuid::new_v4(),
            idpersonne: idpersonne.map(String::from),
            full_name: "DURAND".to_string(),
            birth_date: None,
            administrator: None,
            siren: None,
            address_dgfip: None,
            kind: OwnerKind::Unspecified,
            data_source: None,
            created_at: now,
            updated_at: now,
        };
        save_owner(pool, &owner).await.unwrap();
        owner.id
    }

    fn link(owner_id: Uuid, housing_id: Uuid, rank: OwnerRank) -> HousingOwner {
        HousingOwner {
            owner_id,
            housing_id,
            housing_geo_code: "75056".to_string(),
            rank,
            idprocpte: None,
            idprodroit: None,
            property_right: None,
        }
    }

    #[tokio::test]
    async fn test_owner_ref_tagging() {
        let pool = init_memory_database().await.unwrap();
        let h = housing("L1", "75056", &[]);
        save_housing(&pool, &h, OnConflict::Ignore).await.unwrap();
        let national = owner(&pool, None).await;
        let departmental = owner(&pool, Some("75A1")).await;

        insert_link(&pool, &link(national, h.id, OwnerRank::AWAITING)).await.unwrap();
        insert_link(&pool, &link(departmental, h.id, OwnerRank::active(1).unwrap()))
            .await
            .unwrap();

        let awaiting = find_awaiting_links(&pool, national).await.unwrap();
        assert_eq!(awaiting.len(), 1);
        assert_eq!(awaiting[0].owner, OwnerRef::National { id: national });

        let active = find_active_links_by_idpersonne(&pool, "75A1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(
            active[0].owner,
            OwnerRef::Departmental {
                id: departmental,
                idpersonne: "75A1".to_string()
            }
        );
        assert_eq!(find_housing_links(&pool, h.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_active_rank_is_unique_per_housing() {
        let pool = init_memory_database().await.unwrap();
        let h = housing("L1", "75056", &[]);
        save_housing(&pool, &h, OnConflict::Ignore).await.unwrap();
        let first = owner(&pool, Some("75A1")).await;
        let second = owner(&pool, Some("75A2")).await;
        let rank = OwnerRank::active(1).unwrap();

        insert_link(&pool, &link(first, h.id, rank)).await.unwrap();
        assert!(insert_link(&pool, &link(second, h.id, rank)).await.is_err());

        assert!(update_rank(&pool, first, h.id, OwnerRank::PREVIOUS).await.unwrap());
        insert_link(&pool, &link(second, h.id, rank)).await.unwrap();
        insert_link(&pool, &link(first, h.id, OwnerRank::PREVIOUS)).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_link() {
        let pool = init_memory_database().await.unwrap();
        let h = housing("L1", "75056", &[]);
        save_housing(&pool, &h, OnConflict::Ignore).await.unwrap();
        let o = owner(&pool, Some("75A1")).await;
        insert_link(&pool, &link(o, h.id, OwnerRank::active(2).unwrap())).await.unwrap();

        assert!(delete_link(&pool, o, h.id).await.unwrap());
        assert!(!delete_link(&pool, o, h.id).await.unwrap());
    }
}
