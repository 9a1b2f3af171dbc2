//! Owner database operations

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;
use zlv_common::db::{format_timestamp, parse_timestamp, parse_uuid, Owner};
use zlv_common::{Error, Result};

const OWNER_COLUMNS: &str = r#"
    id, idpersonne, full_name, birth_date, administrator, siren, address_dgfip,
    kind, data_source, created_at, updated_at
"#;

/// Save owner, upserting by `idpersonne`
///
/// On conflict the listed columns take the incoming values; `id` and
/// `created_at` of the existing row are kept. Owners without `idpersonne`
/// (national owners) are always inserted.
pub async fn save_owner<'e, E>(executor: E, owner: &Owner) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO owners (
            id, idpersonne, full_name, birth_date, administrator, siren, address_dgfip,
            kind, data_source, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(idpersonne) DO UPDATE SET
            full_name = excluded.full_name,
            birth_date = excluded.birth_date,
            administrator = excluded.administrator,
            siren = excluded.siren,
            address_dgfip = excluded.address_dgfip,
            kind = excluded.kind,
            data_source = excluded.data_source,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(owner.id.to_string())
    .bind(&owner.idpersonne)
    .bind(&owner.full_name)
    .bind(owner.birth_date.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(&owner.administrator)
    .bind(&owner.siren)
    .bind(&owner.address_dgfip)
    .bind(owner.kind.as_str())
    .bind(&owner.data_source)
    .bind(format_timestamp(&owner.created_at))
    .bind(format_timestamp(&owner.updated_at))
    .execute(executor)
    .await?;

    Ok(())
}

/// Load owner by departmental person id
pub async fn find_owner_by_idpersonne<'e, E>(executor: E, idpersonne: &str) -> Result<Option<Owner>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM owners WHERE idpersonne = ?", OWNER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(idpersonne)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(owner_from_row).transpose()
}

/// Load owner by internal id
pub async fn find_owner_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Owner>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM owners WHERE id = ?", OWNER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(owner_from_row).transpose()
}

/// Number of owners with this person id (0 or 1 while the unique index holds)
pub async fn count_owners_by_idpersonne<'e, E>(executor: E, idpersonne: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM owners WHERE idpersonne = ?")
        .bind(idpersonne)
        .fetch_one(executor)
        .await?;
    Ok(count)
}

fn owner_from_row(row: &SqliteRow) -> Result<Owner> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let birth_date: Option<String> = row.try_get("birth_date")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let birth_date = birth_date
        .map(|d| {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|e| Error::InvalidInput(format!("invalid birth date '{}': {}", d, e)))
        })
        .transpose()?;

    Ok(Owner {
        id: parse_uuid(&id)?,
        idpersonne: row.try_get("idpersonne")?,
        full_name: row.try_get("full_name")?,
        birth_date,
        administrator: row.try_get("administrator")?,
        siren: row.try_get("siren")?,
        address_dgfip: row.try_get("address_dgfip")?,
        kind: kind.parse()?,
        data_source: row.try_get("data_source")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use zlv_common::db::{init_memory_database, OwnerKind};

    fn owner(idpersonne: Option<&str>, name: &str) -> Owner {
        let now = Utc::now();
        Owner {
            id: Uuid::new_v4(),
            idpersonne: idpersonne.map(String::from),
            full_name: name.to_string(),
            birth_date: NaiveDate::from_ymd_opt(1960, 5, 17),
            administrator: None,
            siren: None,
            address_dgfip: Some("1 RUE DE LA PAIX 75002 PARIS".to_string()),
            kind: OwnerKind::Individual,
            data_source: Some("ff-2024".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_owner() {
        let pool = init_memory_database().await.unwrap();
        let saved = owner(Some("75A1"), "DUPONT JEAN");

        save_owner(&pool, &saved).await.unwrap();

        let loaded = find_owner_by_idpersonne(&pool, "75A1").await.unwrap().unwrap();
        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.full_name, "DUPONT JEAN");
        assert_eq!(loaded.birth_date, saved.birth_date);
        assert_eq!(loaded.kind, OwnerKind::Individual);

        let by_id = find_owner_by_id(&pool, saved.id).await.unwrap();
        assert!(by_id.is_some());
    }

    #[tokio::test]
    async fn test_upsert_keeps_original_id() {
        let pool = init_memory_database().await.unwrap();
        let first = owner(Some("75A1"), "DUPONT JEAN");
        save_owner(&pool, &first).await.unwrap();

        let second = owner(Some("75A1"), "DUPONT JEAN PIERRE");
        save_owner(&pool, &second).await.unwrap();

        let loaded = find_owner_by_idpersonne(&pool, "75A1").await.unwrap().unwrap();
        assert_eq!(loaded.id, first.id);
        assert_eq!(loaded.full_name, "DUPONT JEAN PIERRE");
        assert_eq!(count_owners_by_idpersonne(&pool, "75A1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_national_owners_are_always_inserted() {
        let pool = init_memory_database().await.unwrap();
        save_owner(&pool, &owner(None, "MARTIN")).await.unwrap();
        save_owner(&pool, &owner(None, "MARTIN")).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM owners WHERE idpersonne IS NULL")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
