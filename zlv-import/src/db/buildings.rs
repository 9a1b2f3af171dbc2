//! Building database operations

use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqliteConnection};
use zlv_common::db::Building;
use zlv_common::Result;

/// SQLite's default limit on bound parameters per statement
const MAX_BIND_PARAMS: usize = 32_766;
const BINDS_PER_BUILDING: usize = 5;

/// Rows per `INSERT` statement
pub const MAX_BUILDINGS_PER_STATEMENT: usize = MAX_BIND_PARAMS / BINDS_PER_BUILDING;

/// Save a batch of buildings
///
/// Existing buildings get their count columns replaced; `rnb_id` is only
/// overwritten by a non-null value. Large batches are split over several
/// statements on the same connection, so a surrounding transaction still
/// covers the whole batch.
pub async fn save_buildings(conn: &mut SqliteConnection, buildings: &[Building]) -> Result<u64> {
    let mut affected = 0;
    for rows in buildings.chunks(MAX_BUILDINGS_PER_STATEMENT) {
        affected += insert_buildings(&mut *conn, rows).await?;
    }
    Ok(affected)
}

async fn insert_buildings<'e, E>(executor: E, buildings: &[Building]) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO buildings (id, housing_count, vacant_housing_count, rent_housing_count, rnb_id) ",
    );
    builder.push_values(buildings, |mut row, building| {
        row.push_bind(building.id.clone())
            .push_bind(building.housing_count)
            .push_bind(building.vacant_housing_count)
            .push_bind(building.rent_housing_count)
            .push_bind(building.rnb_id.clone());
    });
    builder.push(
        r#"
        ON CONFLICT(id) DO UPDATE SET
            housing_count = excluded.housing_count,
            vacant_housing_count = excluded.vacant_housing_count,
            rent_housing_count = excluded.rent_housing_count,
            rnb_id = COALESCE(excluded.rnb_id, buildings.rnb_id)
        "#,
    );

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected())
}

/// Load building by id
pub async fn find_building<'e, E>(executor: E, id: &str) -> Result<Option<Building>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT id, housing_count, vacant_housing_count, rent_housing_count, rnb_id FROM buildings WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    match row {
        Some(row) => Ok(Some(Building {
            id: row.try_get("id")?,
            housing_count: row.try_get("housing_count")?,
            vacant_housing_count: row.try_get("vacant_housing_count")?,
            rent_housing_count: row.try_get("rent_housing_count")?,
            rnb_id: row.try_get("rnb_id")?,
        })),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zlv_common::db::init_memory_database;

    fn building(id: &str, housing: i64, vacant: i64, rnb_id: Option<&str>) -> Building {
        Building {
            id: id.to_string(),
            housing_count: housing,
            vacant_housing_count: vacant,
            rent_housing_count: 0,
            rnb_id: rnb_id.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_save_batch_and_merge_counts() {
        let pool = init_memory_database().await.unwrap();
        let batch = vec![building("75056B1", 10, 2, Some("RNB1")), building("75056B2", 4, 1, None)];
        assert_eq!(save_buildings(&mut *pool.acquire().await.unwrap(), &batch).await.unwrap(), 2);

        save_buildings(&mut *pool.acquire().await.unwrap(), &[building("75056B1", 12, 3, None)])
            .await
            .unwrap();

        let loaded = find_building(&pool, "75056B1").await.unwrap().unwrap();
        assert_eq!(loaded.housing_count, 12);
        assert_eq!(loaded.vacant_housing_count, 3);
        assert_eq!(loaded.rnb_id.as_deref(), Some("RNB1"));
        assert!(find_building(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = init_memory_database().await.unwrap();
        assert_eq!(save_buildings(&mut *pool.acquire().await.unwrap(), &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_larger_than_one_statement() {
        let pool = init_memory_database().await.unwrap();
        let batch: Vec<Building> = (0..MAX_BUILDINGS_PER_STATEMENT + 10)
            .map(|i| building(&format!("75056B{}", i), i as i64, 0, None))
            .collect();

        let mut tx = pool.begin().await.unwrap();
        let affected = save_buildings(&mut tx, &batch).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(affected as usize, batch.len());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM buildings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count as usize, batch.len());
    }
}
