//! Entity processors
//!
//! One per entity kind. Each looks up the current state for a validated
//! record and decides create, update or skip; writing is left to the
//! pipeline driver.

pub mod building;
pub mod history;
pub mod housing;
pub mod housing_owner;
pub mod housing_status;
pub mod owner;

pub use building::BuildingProcessor;
pub use history::{normalize_file_year, normalize_file_years, HistoryProcessor};
pub use housing::HousingProcessor;
pub use housing_owner::HousingOwnerProcessor;
pub use housing_status::HousingStatusProcessor;
pub use owner::OwnerProcessor;
