//! Database initialization
//!
//! Opens (or creates) the SQLite store and creates the tables used by the
//! import pipeline. Table creation is idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Short busy timeout; longer contention is handled by retry_on_lock
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Set per connection: WAL lets concurrent import processes read while
    // one writes
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// One connection only: every pooled connection to `sqlite::memory:` would
/// otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new().in_memory(true).foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes used by the import pipeline
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_owners_table(pool).await?;
    create_housing_table(pool).await?;
    create_owners_housing_table(pool).await?;
    create_buildings_table(pool).await?;
    create_events_table(pool).await?;
    Ok(())
}

async fn create_owners_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS owners (
            id TEXT PRIMARY KEY,
            idpersonne TEXT UNIQUE,
            full_name TEXT NOT NULL,
            birth_date TEXT,
            administrator TEXT,
            siren TEXT,
            address_dgfip TEXT,
            kind TEXT NOT NULL DEFAULT 'non-renseigne',
            data_source TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_housing_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS housing (
            id TEXT PRIMARY KEY,
            local_id TEXT NOT NULL,
            geo_code TEXT NOT NULL,
            invariant TEXT,
            building_id TEXT,
            plot_id TEXT,
            address_dgfip TEXT,
            longitude REAL,
            latitude REAL,
            kind TEXT NOT NULL,
            rooms_count INTEGER,
            living_area REAL,
            build_year INTEGER,
            vacancy_start_year INTEGER,
            uncomfortable INTEGER,
            taxed INTEGER,
            occupancy TEXT NOT NULL,
            status INTEGER NOT NULL DEFAULT 0,
            sub_status TEXT,
            data_file_years TEXT NOT NULL DEFAULT '[]',
            data_source TEXT,
            UNIQUE (local_id, geo_code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_owners_housing_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS owners_housing (
            owner_id TEXT NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
            housing_id TEXT NOT NULL REFERENCES housing(id) ON DELETE CASCADE,
            housing_geo_code TEXT NOT NULL,
            rank INTEGER NOT NULL,
            idprocpte TEXT,
            idprodroit TEXT,
            property_right TEXT,
            PRIMARY KEY (owner_id, housing_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Active ranks and the awaiting rank are unique per housing
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS owners_housing_rank_idx
        ON owners_housing (housing_id, rank)
        WHERE rank >= 0
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS owners_housing_owner_rank_idx ON owners_housing (owner_id, rank)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_buildings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS buildings (
            id TEXT PRIMARY KEY,
            housing_count INTEGER NOT NULL DEFAULT 0,
            vacant_housing_count INTEGER NOT NULL DEFAULT 0,
            rent_housing_count INTEGER NOT NULL DEFAULT 0,
            rnb_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            housing_id TEXT,
            owner_id TEXT,
            old TEXT,
            new TEXT,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS events_housing_kind_idx ON events (housing_id, kind)")
        .execute(pool)
        .await?;

    Ok(())
}
