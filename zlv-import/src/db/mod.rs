//! Repository gateways
//!
//! The only code that touches the database. Every function takes an
//! `sqlx::Executor`, so the same call runs on the pool or inside a
//! transaction opened by the caller.

pub mod buildings;
pub mod events;
pub mod housing_owners;
pub mod housings;
pub mod owners;

pub use zlv_common::db::{init_database, init_memory_database};
