//! zlv-import library interface
//!
//! Streaming import of housing, owner and building extracts into the ZLV
//! store: parse, validate, decide, apply, report.

pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod processors;
pub mod reconciliation;
pub mod reporter;
pub mod source;
pub mod utils;
pub mod validation;
pub mod workflow;

pub use crate::error::{ImportError, ImportResult};
