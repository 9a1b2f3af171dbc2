//! Shared utilities for zlv-import integration tests

#![allow(dead_code)]

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tempfile::TempDir;
use uuid::Uuid;
use zlv_common::db::{Housing, HousingKind, HousingOwner, HousingStatus, Occupancy, Owner, OwnerKind, OwnerRank};
use zlv_import::db::housing_owners::insert_link;
use zlv_import::db::housings::{save_housing, OnConflict};
use zlv_import::db::owners::save_owner;

/// Create a temporary on-disk database with the schema applied
///
/// Returns (TempDir, SqlitePool); the TempDir must outlive the test.
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let pool = zlv_import::db::init_database(&temp_dir.path().join("zlv_test.db")).await?;
    Ok((temp_dir, pool))
}

/// Write an extract fixture next to the database
pub fn write_fixture(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Insert an owner; `None` gives a national owner
pub async fn seed_owner(pool: &SqlitePool, idpersonne: Option<&str>) -> Uuid {
    let now = Utc::now();
    let owner = Owner {
        id: Uuid::new_v4(),
        idpersonne: idpersonne.map(String::from),
        full_name: idpersonne.unwrap_or("NATIONAL OWNER").to_string(),
        birth_date: None,
        administrator: None,
        siren: None,
        address_dgfip: None,
        kind: OwnerKind::Individual,
        data_source: None,
        created_at: now,
        updated_at: now,
    };
    save_owner(pool, &owner).await.unwrap();
    owner.id
}

pub fn housing(local_id: &str, geo_code: &str, status: HousingStatus, years: &[&str]) -> Housing {
    Housing {
        id: Uuid::new_v4(),
        local_id: local_id.to_string(),
        geo_code: geo_code.to_string(),
        invariant: None,
        building_id: None,
        plot_id: None,
        address_dgfip: None,
        longitude: None,
        latitude: None,
        kind: HousingKind::Apartment,
        rooms_count: Some(2),
        living_area: None,
        build_year: None,
        vacancy_start_year: None,
        uncomfortable: None,
        taxed: None,
        occupancy: Occupancy::Vacant,
        status,
        sub_status: None,
        data_file_years: years.iter().map(|y| y.to_string()).collect(),
        data_source: None,
    }
}

pub async fn seed_housing(pool: &SqlitePool, housing: &Housing) -> Uuid {
    save_housing(pool, housing, OnConflict::Ignore).await.unwrap();
    housing.id
}

pub async fn seed_link(pool: &SqlitePool, owner_id: Uuid, housing_id: Uuid, rank: i16) {
    let link = HousingOwner {
        owner_id,
        housing_id,
        housing_geo_code: "75056".to_string(),
        rank: OwnerRank::new(rank).unwrap(),
        idprocpte: None,
        idprodroit: None,
        property_right: None,
    };
    insert_link(pool, &link).await.unwrap();
}
