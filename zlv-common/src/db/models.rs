//! Domain entities persisted by the import pipeline
//!
//! Enums are stored as TEXT (or INTEGER for housing status), identifiers as
//! TEXT UUIDs, timestamps as fixed-width RFC 3339 strings so that SQL range
//! comparisons on them are lexicographic.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Format a timestamp for storage
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("invalid timestamp '{}': {}", value, e)))
}

/// Parse a stored UUID column
pub fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::InvalidInput(format!("invalid uuid '{}': {}", value, e)))
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum! {
    /// Owner category
    OwnerKind {
        Individual => "particulier",
        Sci => "sci-copro",
        PublicBody => "etat-collectivite",
        SocialLandlord => "bailleur-social",
        Company => "entreprise",
        Other => "autre",
        Unspecified => "non-renseigne",
    }
}

impl Default for OwnerKind {
    fn default() -> Self {
        OwnerKind::Unspecified
    }
}

text_enum! {
    /// Housing type
    HousingKind {
        Apartment => "APPART",
        House => "MAISON",
    }
}

text_enum! {
    /// Occupancy as declared by the tax extract
    Occupancy {
        Vacant => "V",
        Rent => "L",
        ShortRent => "B",
        PrimaryResidence => "P",
        SecondaryResidence => "RS",
        Others => "A",
        Unknown => "inconnu",
    }
}

text_enum! {
    /// Kind of audit event
    EventKind {
        HousingStatusUpdated => "housing:status-updated",
        HousingOccupancyUpdated => "housing:occupancy-updated",
        HousingOwnerUpdated => "housing:owner-updated",
    }
}

/// Follow-up status of a housing unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HousingStatus {
    NeverContacted,
    Waiting,
    FirstContact,
    InProgress,
    Completed,
    Blocked,
    Exited,
}

impl HousingStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            HousingStatus::NeverContacted => 0,
            HousingStatus::Waiting => 1,
            HousingStatus::FirstContact => 2,
            HousingStatus::InProgress => 3,
            HousingStatus::Completed => 4,
            HousingStatus::Blocked => 5,
            HousingStatus::Exited => 6,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        Ok(match value {
            0 => HousingStatus::NeverContacted,
            1 => HousingStatus::Waiting,
            2 => HousingStatus::FirstContact,
            3 => HousingStatus::InProgress,
            4 => HousingStatus::Completed,
            5 => HousingStatus::Blocked,
            6 => HousingStatus::Exited,
            other => {
                return Err(Error::InvalidInput(format!("unknown housing status {}", other)))
            }
        })
    }

    /// Someone is already following this housing up, or the follow-up ended
    pub fn is_followed_up(&self) -> bool {
        !matches!(self, HousingStatus::NeverContacted | HousingStatus::Waiting)
    }
}

/// Ownership precedence of a housing-owner link
///
/// Ranks `1..=6` are active owners. Zero marks a national placeholder
/// awaiting departmental data; negative ranks are inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerRank(i16);

impl OwnerRank {
    pub const PREVIOUS: OwnerRank = OwnerRank(-2);
    pub const AWAITING: OwnerRank = OwnerRank(0);
    pub const MAX_ACTIVE: i16 = 6;

    pub fn new(value: i16) -> Result<Self> {
        if (-2..=Self::MAX_ACTIVE).contains(&value) {
            Ok(OwnerRank(value))
        } else {
            Err(Error::InvalidInput(format!("owner rank {} out of range", value)))
        }
    }

    pub fn active(value: i16) -> Result<Self> {
        if (1..=Self::MAX_ACTIVE).contains(&value) {
            Ok(OwnerRank(value))
        } else {
            Err(Error::InvalidInput(format!("{} is not an active owner rank", value)))
        }
    }

    pub fn value(&self) -> i16 {
        self.0
    }

    pub fn is_active(&self) -> bool {
        self.0 >= 1
    }

    pub fn is_awaiting(&self) -> bool {
        *self == Self::AWAITING
    }
}

impl fmt::Display for OwnerRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of one or more housing units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    /// Departmental person id; `None` for national owners
    pub idpersonne: Option<String>,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub administrator: Option<String>,
    pub siren: Option<String>,
    pub address_dgfip: Option<String>,
    pub kind: OwnerKind,
    pub data_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Natural key of a housing unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HousingKey {
    pub local_id: String,
    pub geo_code: String,
}

impl HousingKey {
    pub fn new(local_id: impl Into<String>, geo_code: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            geo_code: geo_code.into(),
        }
    }
}

impl fmt::Display for HousingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.geo_code, self.local_id)
    }
}

/// Housing unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Housing {
    pub id: Uuid,
    pub local_id: String,
    pub geo_code: String,
    pub invariant: Option<String>,
    pub building_id: Option<String>,
    pub plot_id: Option<String>,
    pub address_dgfip: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub kind: HousingKind,
    pub rooms_count: Option<i64>,
    pub living_area: Option<f64>,
    pub build_year: Option<i64>,
    pub vacancy_start_year: Option<i64>,
    pub uncomfortable: Option<bool>,
    pub taxed: Option<bool>,
    pub occupancy: Occupancy,
    pub status: HousingStatus,
    pub sub_status: Option<String>,
    pub data_file_years: Vec<String>,
    pub data_source: Option<String>,
}

impl Housing {
    pub fn key(&self) -> HousingKey {
        HousingKey::new(self.local_id.clone(), self.geo_code.clone())
    }
}

/// Link between an owner and a housing unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousingOwner {
    pub owner_id: Uuid,
    pub housing_id: Uuid,
    pub housing_geo_code: String,
    pub rank: OwnerRank,
    pub idprocpte: Option<String>,
    pub idprodroit: Option<String>,
    pub property_right: Option<String>,
}

/// Building aggregating housing counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    pub housing_count: i64,
    pub vacant_housing_count: i64,
    pub rent_housing_count: i64,
    pub rnb_id: Option<String>,
}

/// Audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub housing_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl Event {
    /// Event about a housing unit authored by `created_by`
    pub fn for_housing(
        kind: EventKind,
        housing_id: Uuid,
        old: Option<serde_json::Value>,
        new: Option<serde_json::Value>,
        created_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            housing_id: Some(housing_id),
            owner_id: None,
            old,
            new,
            created_at: Utc::now(),
            created_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enum_round_trip() {
        assert_eq!("V".parse::<Occupancy>().unwrap(), Occupancy::Vacant);
        assert_eq!(Occupancy::Unknown.as_str(), "inconnu");
        assert!("Z".parse::<Occupancy>().is_err());
        assert_eq!(EventKind::HousingOwnerUpdated.to_string(), "housing:owner-updated");
        assert!("owner:created".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_owner_rank_bounds() {
        assert!(OwnerRank::new(-3).is_err());
        assert!(OwnerRank::new(7).is_err());
        assert!(OwnerRank::active(0).is_err());
        assert!(OwnerRank::active(1).unwrap().is_active());
        assert!(OwnerRank::AWAITING.is_awaiting());
        assert!(!OwnerRank::PREVIOUS.is_active());
    }

    #[test]
    fn test_followed_up_statuses() {
        assert!(!HousingStatus::NeverContacted.is_followed_up());
        assert!(!HousingStatus::Waiting.is_followed_up());
        assert!(HousingStatus::InProgress.is_followed_up());
        assert!(HousingStatus::Exited.is_followed_up());
        assert_eq!(HousingStatus::from_i64(3).unwrap(), HousingStatus::InProgress);
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = parse_timestamp("2024-09-08T10:00:00Z").unwrap();
        let late = parse_timestamp("2024-09-08T10:00:00.5Z").unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }
}
