//! Typed source records and their field constraint tables
//!
//! Field names follow the extract columns.

use crate::validation::{FieldKind, FieldSpec, Schema, SourceRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zlv_common::db::{HousingKey, HousingKind, Occupancy, OwnerKind};

/// Owner category codes of the extracts
pub const OWNER_KIND_CODES: &[(&str, &str)] = &[
    ("P", "particulier"),
    ("S", "sci-copro"),
    ("E", "etat-collectivite"),
    ("B", "bailleur-social"),
    ("C", "entreprise"),
    ("A", "autre"),
    ("X", "non-renseigne"),
];

const HOUSING_KIND_CODES: &[(&str, &str)] = &[("A", "APPART"), ("M", "MAISON")];

const OCCUPANCY_CODES: &[&str] = &["V", "L", "B", "P", "RS", "A", "inconnu"];

const COUNT: FieldKind = FieldKind::Integer { min: Some(0), max: None };
const YEAR: FieldKind = FieldKind::Integer { min: Some(1000), max: Some(2100) };
const ACTIVE_RANK: FieldKind = FieldKind::Integer { min: Some(1), max: Some(6) };

// ---------------------------------------------------------------------------
// Owners
// ---------------------------------------------------------------------------

static SOURCE_OWNER_SCHEMA: Schema = Schema {
    name: "owner",
    fields: &[
        FieldSpec::required("idpersonne", FieldKind::String),
        FieldSpec::required("full_name", FieldKind::String),
        FieldSpec::optional("birth_date", FieldKind::Date),
        FieldSpec::optional("administrator", FieldKind::String),
        FieldSpec::optional("siren", FieldKind::String),
        FieldSpec::optional("dgfip_address", FieldKind::String),
        FieldSpec::optional("kind", FieldKind::Mapped(OWNER_KIND_CODES)),
        FieldSpec::optional("data_source", FieldKind::String),
    ],
};

/// Departmental owner line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOwner {
    pub idpersonne: String,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub administrator: Option<String>,
    pub siren: Option<String>,
    pub dgfip_address: Option<String>,
    pub kind: Option<OwnerKind>,
    pub data_source: Option<String>,
}

impl SourceRecord for SourceOwner {
    fn schema() -> &'static Schema {
        &SOURCE_OWNER_SCHEMA
    }

    fn department_field() -> Option<&'static str> {
        Some("idpersonne")
    }
}

// ---------------------------------------------------------------------------
// Housing
// ---------------------------------------------------------------------------

static SOURCE_HOUSING_SCHEMA: Schema = Schema {
    name: "housing",
    fields: &[
        FieldSpec::required("local_id", FieldKind::String),
        FieldSpec::required("geo_code", FieldKind::String),
        FieldSpec::optional("invariant", FieldKind::String),
        FieldSpec::optional("building_id", FieldKind::String),
        FieldSpec::optional("plot_id", FieldKind::String),
        FieldSpec::optional("dgfip_address", FieldKind::String),
        FieldSpec::optional("longitude", FieldKind::Float),
        FieldSpec::optional("latitude", FieldKind::Float),
        FieldSpec::required("housing_kind", FieldKind::Mapped(HOUSING_KIND_CODES)),
        FieldSpec::optional("rooms_count", COUNT),
        FieldSpec::optional("living_area", FieldKind::Float),
        FieldSpec::optional("build_year", YEAR),
        FieldSpec::optional("vacancy_start_year", YEAR),
        FieldSpec::optional("uncomfortable", FieldKind::Boolean),
        FieldSpec::optional("taxed", FieldKind::Boolean),
        FieldSpec::required("occupancy", FieldKind::OneOf(OCCUPANCY_CODES)),
        FieldSpec::required("data_file_year", FieldKind::String),
        FieldSpec::optional("data_source", FieldKind::String),
    ],
};

/// Housing line of the vacancy extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHousing {
    pub local_id: String,
    pub geo_code: String,
    pub invariant: Option<String>,
    pub building_id: Option<String>,
    pub plot_id: Option<String>,
    pub dgfip_address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub housing_kind: HousingKind,
    pub rooms_count: Option<i64>,
    pub living_area: Option<f64>,
    pub build_year: Option<i64>,
    pub vacancy_start_year: Option<i64>,
    pub uncomfortable: Option<bool>,
    pub taxed: Option<bool>,
    pub occupancy: Occupancy,
    pub data_file_year: String,
    pub data_source: Option<String>,
}

impl SourceHousing {
    pub fn key(&self) -> HousingKey {
        HousingKey::new(self.local_id.clone(), self.geo_code.clone())
    }
}

impl SourceRecord for SourceHousing {
    fn schema() -> &'static Schema {
        &SOURCE_HOUSING_SCHEMA
    }

    fn department_field() -> Option<&'static str> {
        Some("geo_code")
    }
}

// ---------------------------------------------------------------------------
// Housing owners
// ---------------------------------------------------------------------------

static SOURCE_HOUSING_OWNER_SCHEMA: Schema = Schema {
    name: "housing owner",
    fields: &[
        FieldSpec::required("idpersonne", FieldKind::String),
        FieldSpec::required("local_id", FieldKind::String),
        FieldSpec::required("geo_code", FieldKind::String),
        FieldSpec::required("rank", ACTIVE_RANK),
        FieldSpec::optional("idprocpte", FieldKind::String),
        FieldSpec::optional("idprodroit", FieldKind::String),
        FieldSpec::optional("property_right", FieldKind::String),
    ],
};

/// Ownership line: departmental owner of a housing unit at an active rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHousingOwner {
    pub idpersonne: String,
    pub local_id: String,
    pub geo_code: String,
    pub rank: i16,
    pub idprocpte: Option<String>,
    pub idprodroit: Option<String>,
    pub property_right: Option<String>,
}

impl SourceHousingOwner {
    pub fn housing_key(&self) -> HousingKey {
        HousingKey::new(self.local_id.clone(), self.geo_code.clone())
    }
}

impl SourceRecord for SourceHousingOwner {
    fn schema() -> &'static Schema {
        &SOURCE_HOUSING_OWNER_SCHEMA
    }

    fn department_field() -> Option<&'static str> {
        Some("geo_code")
    }
}

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

static SOURCE_BUILDING_SCHEMA: Schema = Schema {
    name: "building",
    fields: &[
        FieldSpec::required("building_id", FieldKind::String),
        FieldSpec::required("housing_count", COUNT),
        FieldSpec::required("vacant_housing_count", COUNT),
        FieldSpec::optional("rent_housing_count", COUNT),
        FieldSpec::optional("rnb_id", FieldKind::String),
    ],
};

/// Building line with housing counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBuilding {
    pub building_id: String,
    pub housing_count: i64,
    pub vacant_housing_count: i64,
    pub rent_housing_count: Option<i64>,
    pub rnb_id: Option<String>,
}

impl SourceRecord for SourceBuilding {
    fn schema() -> &'static Schema {
        &SOURCE_BUILDING_SCHEMA
    }

    fn department_field() -> Option<&'static str> {
        Some("building_id")
    }
}

// ---------------------------------------------------------------------------
// Data-year history
// ---------------------------------------------------------------------------

static HISTORY_RECORD_SCHEMA: Schema = Schema {
    name: "history",
    fields: &[
        FieldSpec::required("local_id", FieldKind::String),
        FieldSpec::required("geo_code", FieldKind::String),
        FieldSpec::required("file_years", FieldKind::StringList),
    ],
};

/// Years in which a housing unit appeared in past extracts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub local_id: String,
    pub geo_code: String,
    pub file_years: Vec<String>,
}

impl HistoryRecord {
    pub fn housing_key(&self) -> HousingKey {
        HousingKey::new(self.local_id.clone(), self.geo_code.clone())
    }
}

impl SourceRecord for HistoryRecord {
    fn schema() -> &'static Schema {
        &HISTORY_RECORD_SCHEMA
    }

    fn department_field() -> Option<&'static str> {
        Some("geo_code")
    }
}

// ---------------------------------------------------------------------------
// Owner pairings
// ---------------------------------------------------------------------------

static OWNER_PAIRING_SCHEMA: Schema = Schema {
    name: "owner pairing",
    fields: &[
        FieldSpec::required("national_owner_id", FieldKind::String),
        FieldSpec::required("idpersonne", FieldKind::String),
    ],
};

/// A national placeholder owner matched to its departmental counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerPairing {
    pub national_owner_id: Uuid,
    pub idpersonne: String,
}

impl SourceRecord for OwnerPairing {
    fn schema() -> &'static Schema {
        &OWNER_PAIRING_SCHEMA
    }

    fn department_field() -> Option<&'static str> {
        Some("idpersonne")
    }
}
