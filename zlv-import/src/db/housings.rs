//! Housing database operations

use futures::stream::BoxStream;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqlitePool};
use zlv_common::db::{parse_uuid, Housing, HousingKey, HousingStatus, Occupancy};
use zlv_common::Result;

const HOUSING_COLUMNS: &str = r#"
    id, local_id, geo_code, invariant, building_id, plot_id, address_dgfip,
    longitude, latitude, kind, rooms_count, living_area, build_year,
    vacancy_start_year, uncomfortable, taxed, occupancy, status, sub_status,
    data_file_years, data_source
"#;

/// What to do when a housing with the same natural key exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Keep the existing row untouched
    #[default]
    Ignore,
    /// Overwrite the columns owned by the extract
    Merge,
}

/// Partial update of a housing row; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HousingPatch {
    pub occupancy: Option<Occupancy>,
    pub status: Option<HousingStatus>,
    pub sub_status: Option<Option<String>>,
    pub data_file_years: Option<Vec<String>>,
}

impl HousingPatch {
    pub fn is_empty(&self) -> bool {
        self.occupancy.is_none()
            && self.status.is_none()
            && self.sub_status.is_none()
            && self.data_file_years.is_none()
    }
}

/// Save housing keyed by `(local_id, geo_code)`
///
/// Returns `true` when a row was inserted or merged, `false` when an existing
/// row was ignored.
pub async fn save_housing<'e, E>(executor: E, housing: &Housing, on_conflict: OnConflict) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let conflict_clause = match on_conflict {
        OnConflict::Ignore => "ON CONFLICT(local_id, geo_code) DO NOTHING",
        OnConflict::Merge => {
            r#"
            ON CONFLICT(local_id, geo_code) DO UPDATE SET
                invariant = excluded.invariant,
                building_id = excluded.building_id,
                plot_id = excluded.plot_id,
                address_dgfip = excluded.address_dgfip,
                longitude = excluded.longitude,
                latitude = excluded.latitude,
                kind = excluded.kind,
                rooms_count = excluded.rooms_count,
                living_area = excluded.living_area,
                build_year = excluded.build_year,
                vacancy_start_year = excluded.vacancy_start_year,
                uncomfortable = excluded.uncomfortable,
                taxed = excluded.taxed,
                occupancy = excluded.occupancy,
                data_file_years = excluded.data_file_years,
                data_source = excluded.data_source
            "#
        }
    };

    let sql = format!(
        r#"
        INSERT INTO housing ({})
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        {}
        "#,
        HOUSING_COLUMNS, conflict_clause
    );

    let result = sqlx::query(&sql)
        .bind(housing.id.to_string())
        .bind(&housing.local_id)
        .bind(&housing.geo_code)
        .bind(&housing.invariant)
        .bind(&housing.building_id)
        .bind(&housing.plot_id)
        .bind(&housing.address_dgfip)
        .bind(housing.longitude)
        .bind(housing.latitude)
        .bind(housing.kind.as_str())
        .bind(housing.rooms_count)
        .bind(housing.living_area)
        .bind(housing.build_year)
        .bind(housing.vacancy_start_year)
        .bind(housing.uncomfortable)
        .bind(housing.taxed)
        .bind(housing.occupancy.as_str())
        .bind(housing.status.as_i64())
        .bind(&housing.sub_status)
        .bind(serde_json::to_string(&housing.data_file_years)?)
        .bind(&housing.data_source)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load housing by natural key
pub async fn find_housing_by_natural_key<'e, E>(executor: E, key: &HousingKey) -> Result<Option<Housing>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM housing WHERE local_id = ? AND geo_code = ?",
        HOUSING_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(&key.local_id)
        .bind(&key.geo_code)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(housing_from_row).transpose()
}

/// Apply a partial update; returns `false` when nothing matched or the patch is empty
pub async fn update_housing_fields<'e, E>(executor: E, key: &HousingKey, patch: &HousingPatch) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    if patch.is_empty() {
        return Ok(false);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE housing SET ");
    let mut assignments = builder.separated(", ");
    if let Some(occupancy) = patch.occupancy {
        assignments.push("occupancy = ");
        assignments.push_bind_unseparated(occupancy.as_str());
    }
    if let Some(status) = patch.status {
        assignments.push("status = ");
        assignments.push_bind_unseparated(status.as_i64());
    }
    if let Some(sub_status) = &patch.sub_status {
        assignments.push("sub_status = ");
        assignments.push_bind_unseparated(sub_status.clone());
    }
    if let Some(years) = &patch.data_file_years {
        assignments.push("data_file_years = ");
        assignments.push_bind_unseparated(serde_json::to_string(years)?);
    }
    builder.push(" WHERE local_id = ");
    builder.push_bind(&key.local_id);
    builder.push(" AND geo_code = ");
    builder.push_bind(&key.geo_code);

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

/// Stream housing whose `data_file_years` does not contain `year`
///
/// Rows are fetched in pages of `page_size` ordered by id, so no connection
/// is held between pages and callers may write while consuming the stream.
pub fn stream_housings_missing_year(
    pool: SqlitePool,
    year: String,
    page_size: usize,
) -> BoxStream<'static, Result<Housing>> {
    let page_size = page_size.max(1) as i64;

    Box::pin(async_stream::try_stream! {
        let sql = format!(
            r#"
            SELECT {} FROM housing
            WHERE id > ?
              AND NOT EXISTS (SELECT 1 FROM json_each(housing.data_file_years) WHERE value = ?)
            ORDER BY id
            LIMIT ?
            "#,
            HOUSING_COLUMNS
        );

        let mut last_id = String::new();
        loop {
            let rows = sqlx::query(&sql)
                .bind(&last_id)
                .bind(&year)
                .bind(page_size)
                .fetch_all(&pool)
                .await?;

            let fetched = rows.len() as i64;
            for row in &rows {
                let housing = housing_from_row(row)?;
                last_id = housing.id.to_string();
                yield housing;
            }

            if fetched < page_size {
                break;
            }
        }
    })
}

fn housing_from_row(row: &SqliteRow) -> Result<Housing> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let occupancy: String = row.try_get("occupancy")?;
    let status: i64 = row.try_get("status")?;
    let years: String = row.try_get("data_file_years")?;

    Ok(Housing {
        id: parse_uuid(&id)?,
        local_id: row.try_get("local_id")?,
        geo_code: row.try_get("geo_code")?,
        invariant: row.try_get("invariant")?,
        building_id: row.try_get("building_id")?,
        plot_id: row.try_get("plot_id")?,
        address_dgfip: row.try_get("address_dgfip")?,
        longitude: row.try_get("longitude")?,
        latitude: row.try_get("latitude")?,
        kind: kind.parse()?,
        rooms_count: row.try_get("rooms_count")?,
        living_area: row.try_get("living_area")?,
        build_year: row.try_get("build_year")?,
        vacancy_start_year: row.try_get("vacancy_start_year")?,
        uncomfortable: row.try_get("uncomfortable")?,
        taxed: row.try_get("taxed")?,
        occupancy: occupancy.parse()?,
        status: HousingStatus::from_i64(status)?,
        sub_status: row.try_get("sub_status")?,
        data_file_years: serde_json::from_str(&years)?,
        data_source: row.try_get("data_source")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::TryStreamExt;
    use uuid::Uuid;
    use zlv_common::db::{init_memory_database, HousingKind};

    pub(crate) fn housing(local_id: &str, geo_code: &str, years: &[&str]) -> Housing {
        Housing {
            id: Uuid::new_v4(),
            local_id: local_id.to_string(),
            geo_code: geo_code.to_string(),
            invariant: None,
            building_id: None,
            plot_id: None,
            address_dgfip: Some("2 AVENUE FOCH".to_string()),
            longitude: None,
            latitude: None,
            kind: HousingKind::Apartment,
            rooms_count: Some(3),
            living_area: Some(54.5),
            build_year: Some(1932),
            vacancy_start_year: Some(2019),
            uncomfortable: Some(false),
            taxed: None,
            occupancy: Occupancy::Vacant,
            status: HousingStatus::NeverContacted,
            sub_status: None,
            data_file_years: years.iter().map(|y| y.to_string()).collect(),
            data_source: Some("lovac".to_string()),
        }
    }

    #[tokio::test]
    async fn test_ignore_keeps_existing_row() {
        let pool = init_memory_database().await.unwrap();
        let original = housing("L1", "75056", &["lovac-2024"]);
        assert!(save_housing(&pool, &original, OnConflict::Ignore).await.unwrap());

        let mut replay = housing("L1", "75056", &["lovac-2025"]);
        replay.rooms_count = Some(9);
        assert!(!save_housing(&pool, &replay, OnConflict::Ignore).await.unwrap());

        let loaded = find_housing_by_natural_key(&pool, &original.key()).await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_merge_overwrites_extract_columns_only() {
        let pool = init_memory_database().await.unwrap();
        let original = housing("L1", "75056", &["lovac-2024"]);
        save_housing(&pool, &original, OnConflict::Ignore).await.unwrap();
        update_housing_fields(
            &pool,
            &original.key(),
            &HousingPatch {
                status: Some(HousingStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let mut replay = housing("L1", "75056", &["lovac-2024", "lovac-2025"]);
        replay.rooms_count = Some(4);
        assert!(save_housing(&pool, &replay, OnConflict::Merge).await.unwrap());

        let loaded = find_housing_by_natural_key(&pool, &original.key()).await.unwrap().unwrap();
        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.rooms_count, Some(4));
        assert_eq!(loaded.status, HousingStatus::InProgress);
        assert_eq!(loaded.data_file_years, vec!["lovac-2024", "lovac-2025"]);
    }

    #[tokio::test]
    async fn test_empty_patch_is_noop() {
        let pool = init_memory_database().await.unwrap();
        let key = HousingKey::new("L1", "75056");
        assert!(!update_housing_fields(&pool, &key, &HousingPatch::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_stream_missing_year_pages_through_rows() {
        let pool = init_memory_database().await.unwrap();
        for i in 0..5 {
            let years: &[&str] = if i % 2 == 0 { &["lovac-2024"] } else { &["lovac-2024", "lovac-2025"] };
            save_housing(&pool, &housing(&format!("L{}", i), "75056", years), OnConflict::Ignore)
                .await
                .unwrap();
        }

        let missing: Vec<Housing> = stream_housings_missing_year(pool.clone(), "lovac-2025".to_string(), 2)
            .try_collect()
            .await
            .unwrap();

        let mut ids: Vec<String> = missing.into_iter().map(|h| h.local_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["L0", "L2", "L4"]);
    }
}
