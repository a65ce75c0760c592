//! Closed reference lists used by the intake forms.
//!
//! Region and sub-city labels are the ones printed on the paper forms used at the sites; the
//! stored values must match them exactly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raised when a label is not part of a closed list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a known {list}")]
pub struct UnknownLabel {
    pub list: &'static str,
    pub value: String,
}

// ============================================================================
// REGIONS
// ============================================================================

/// Ethiopian first-level administrative regions (and chartered cities).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "Addis Ababa")]
    AddisAbaba,
    Diredawa,
    Afar,
    Amhara,
    #[serde(rename = "Benishangul-Gumuz")]
    BenishangulGumuz,
    #[serde(rename = "Central Ethiopia")]
    CentralEthiopia,
    Gambela,
    Harari,
    Oromia,
    Sidama,
    Somali,
    #[serde(rename = "South Ethiopia")]
    SouthEthiopia,
    #[serde(rename = "Southwest Ethiopia Peoples'")]
    SouthwestEthiopiaPeoples,
    Tigray,
}

impl Region {
    pub const ALL: [Region; 14] = [
        Region::AddisAbaba,
        Region::Diredawa,
        Region::Afar,
        Region::Amhara,
        Region::BenishangulGumuz,
        Region::CentralEthiopia,
        Region::Gambela,
        Region::Harari,
        Region::Oromia,
        Region::Sidama,
        Region::Somali,
        Region::SouthEthiopia,
        Region::SouthwestEthiopiaPeoples,
        Region::Tigray,
    ];

    /// Region pre-selected on a fresh demographics form.
    pub const DEFAULT: Region = Region::AddisAbaba;

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::AddisAbaba => "Addis Ababa",
            Region::Diredawa => "Diredawa",
            Region::Afar => "Afar",
            Region::Amhara => "Amhara",
            Region::BenishangulGumuz => "Benishangul-Gumuz",
            Region::CentralEthiopia => "Central Ethiopia",
            Region::Gambela => "Gambela",
            Region::Harari => "Harari",
            Region::Oromia => "Oromia",
            Region::Sidama => "Sidama",
            Region::Somali => "Somali",
            Region::SouthEthiopia => "South Ethiopia",
            Region::SouthwestEthiopiaPeoples => "Southwest Ethiopia Peoples'",
            Region::Tigray => "Tigray",
        }
    }

    /// Whether sub-city must be picked from [`AddisSubCity`] rather than typed freely.
    pub fn has_sub_city_list(&self) -> bool {
        matches!(self, Region::AddisAbaba)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownLabel {
                list: "region",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// ADDIS ABABA SUB-CITIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddisSubCity {
    AddisKetema,
    AkakyKaliti,
    Arada,
    Bole,
    Gullele,
    Kirkos,
    KolfeKeranio,
    Lideta,
    NifasSilkLafto,
    Yeka,
    LemiKura,
}

impl AddisSubCity {
    pub const ALL: [AddisSubCity; 11] = [
        AddisSubCity::AddisKetema,
        AddisSubCity::AkakyKaliti,
        AddisSubCity::Arada,
        AddisSubCity::Bole,
        AddisSubCity::Gullele,
        AddisSubCity::Kirkos,
        AddisSubCity::KolfeKeranio,
        AddisSubCity::Lideta,
        AddisSubCity::NifasSilkLafto,
        AddisSubCity::Yeka,
        AddisSubCity::LemiKura,
    ];

    /// Sub-city pre-filled when the region is Addis Ababa.
    pub const DEFAULT: AddisSubCity = AddisSubCity::NifasSilkLafto;

    pub fn as_str(&self) -> &'static str {
        match self {
            AddisSubCity::AddisKetema => "Addis Ketema",
            AddisSubCity::AkakyKaliti => "Akaky Kaliti",
            AddisSubCity::Arada => "Arada",
            AddisSubCity::Bole => "Bole",
            AddisSubCity::Gullele => "Gullele",
            AddisSubCity::Kirkos => "Kirkos",
            AddisSubCity::KolfeKeranio => "Kolfe Keranio",
            AddisSubCity::Lideta => "Lideta",
            AddisSubCity::NifasSilkLafto => "Nifas Silk-Lafto",
            AddisSubCity::Yeka => "Yeka",
            AddisSubCity::LemiKura => "Lemi Kura",
        }
    }
}

impl fmt::Display for AddisSubCity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddisSubCity {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AddisSubCity::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownLabel {
                list: "Addis Ababa sub-city",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// CONSULTATIONS
// ============================================================================

/// Consultations that can be ticked on the vitals step.
pub const CONSULTATIONS: [&str; 12] = [
    "General consultation",
    "Blood pressure follow-up",
    "Diabetes screening",
    "HIV counseling",
    "Family planning",
    "Antenatal care (ANC)",
    "Postnatal care (PNC)",
    "Nutrition counseling",
    "Child wellness",
    "TB screening",
    "Malaria diagnosis",
    "Sexual diseases counseling",
];

pub fn is_known_consultation(label: &str) -> bool {
    CONSULTATIONS.contains(&label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_labels_round_trip() {
        for region in Region::ALL {
            assert_eq!(region.as_str().parse::<Region>(), Ok(region));
            let json = serde_json::to_string(&region).unwrap();
            assert_eq!(json, format!("\"{}\"", region.as_str()));
        }
    }

    #[test]
    fn test_unknown_region_is_rejected() {
        let err = "Atlantis".parse::<Region>().unwrap_err();
        assert_eq!(err.list, "region");
        assert_eq!(err.to_string(), "'Atlantis' is not a known region");
    }

    #[test]
    fn test_only_addis_has_sub_city_list() {
        let with_list: Vec<_> = Region::ALL
            .into_iter()
            .filter(Region::has_sub_city_list)
            .collect();
        assert_eq!(with_list, vec![Region::AddisAbaba]);
    }

    #[test]
    fn test_sub_city_parse() {
        assert_eq!(
            "Nifas Silk-Lafto".parse::<AddisSubCity>(),
            Ok(AddisSubCity::NifasSilkLafto)
        );
        assert!("nifas silk-lafto".parse::<AddisSubCity>().is_err());
    }

    #[test]
    fn test_consultation_vocabulary() {
        assert!(is_known_consultation("TB screening"));
        assert!(!is_known_consultation("Dental surgery"));
    }
}
