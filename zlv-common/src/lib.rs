//! # ZLV Common Library
//!
//! Shared code for the ZLV import tooling:
//! - Database initialization and schema
//! - Domain entities (owners, housing, ownership links, buildings, events)
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
