//! Source record models

pub mod sources;

pub use sources::{
    HistoryRecord, OwnerPairing, SourceBuilding, SourceHousing, SourceHousingOwner, SourceOwner,
};
