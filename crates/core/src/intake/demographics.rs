//! Demographics intake step.
//!
//! Collects the patient's identity and address. The three-part name (given, father's,
//! grandfather's) together with sex and age is how patients are identified at the sites, so
//! all of those fields are mandatory.
//!
//! Exact birth dates are not collected. The date of birth is always synthesised from the age
//! as January 1st of `current year - age`.

use crate::reference::{AddisSubCity, Region};
use crate::validation::{is_digits, optional_text, required_text, FieldErrors};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_AGE_YEARS: u8 = 120;

/// Field names used as keys in [`FieldErrors`].
pub mod fields {
    pub const GIVEN_NAME: &str = "given_name";
    pub const FATHER_NAME: &str = "father_name";
    pub const GRANDFATHER_NAME: &str = "grandfather_name";
    pub const SEX: &str = "sex";
    pub const AGE_YEARS: &str = "age_years";
    pub const REGION: &str = "region";
    pub const SUB_CITY_OR_ZONE: &str = "sub_city_or_zone";
    pub const WOREDA: &str = "woreda";
    pub const PHONE: &str = "phone";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Sex::Male),
            "Female" => Ok(Sex::Female),
            _ => Err(()),
        }
    }
}

/// Demographics form state, as typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemographicsForm {
    pub given_name: String,
    pub father_name: String,
    pub grandfather_name: String,
    pub sex: String,
    pub age_years: String,
    pub region: String,
    pub sub_city_or_zone: String,
    pub woreda: String,
    pub phone: String,
}

impl Default for DemographicsForm {
    /// A blank form pre-set to Addis Ababa and its default sub-city.
    fn default() -> Self {
        Self {
            given_name: String::new(),
            father_name: String::new(),
            grandfather_name: String::new(),
            sex: String::new(),
            age_years: String::new(),
            region: Region::DEFAULT.as_str().to_string(),
            sub_city_or_zone: AddisSubCity::DEFAULT.as_str().to_string(),
            woreda: String::new(),
            phone: String::new(),
        }
    }
}

impl DemographicsForm {
    /// Changes the region and keeps the sub-city consistent with it.
    ///
    /// Any region other than the default clears the sub-city. Returning to the default
    /// region pre-fills the default sub-city if none is set.
    pub fn set_region(&mut self, region: &str) {
        self.region = region.to_string();
        if self.region != Region::DEFAULT.as_str() {
            self.sub_city_or_zone.clear();
        } else if self.sub_city_or_zone.trim().is_empty() {
            self.sub_city_or_zone = AddisSubCity::DEFAULT.as_str().to_string();
        }
    }
}

/// Validated demographics, staged until the vitals step consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicsRecord {
    pub given_name: String,
    pub father_name: String,
    pub grandfather_name: String,
    pub sex: Sex,
    pub age_years: u8,
    pub date_of_birth: NaiveDate,
    pub region: Region,
    #[serde(default)]
    pub sub_city_or_zone: Option<String>,
    pub woreda: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl DemographicsRecord {
    /// Name as written on the visit list: given, father's and grandfather's name.
    pub fn display_name(&self) -> String {
        format!(
            "{} {} {}",
            self.given_name, self.father_name, self.grandfather_name
        )
    }
}

/// January 1st of `today.year() - age_years`.
pub fn derive_date_of_birth(age_years: u8, today: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(today.year() - i32::from(age_years), 1, 1)
}

/// Loose phone check: 7 to 20 characters drawn from digits, `+`, `-` and whitespace.
pub fn is_plausible_phone(phone: &str) -> bool {
    let len = phone.chars().count();
    (7..=20).contains(&len)
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c.is_whitespace())
}

/// Validates every field of `form` and derives the date of birth.
///
/// All failing fields are reported together.
pub fn validate_demographics(
    form: &DemographicsForm,
    today: NaiveDate,
) -> Result<DemographicsRecord, FieldErrors> {
    let mut errors = FieldErrors::new();

    let given_name = required_text(
        &mut errors,
        fields::GIVEN_NAME,
        &form.given_name,
        "Client name is required",
    );
    let father_name = required_text(
        &mut errors,
        fields::FATHER_NAME,
        &form.father_name,
        "Father name is required",
    );
    let grandfather_name = required_text(
        &mut errors,
        fields::GRANDFATHER_NAME,
        &form.grandfather_name,
        "Grandfather name is required",
    );

    let sex = match form.sex.trim() {
        "" => {
            errors.insert(fields::SEX, "Sex is required");
            None
        }
        raw => raw
            .parse::<Sex>()
            .map_err(|()| errors.insert(fields::SEX, "Select Male or Female"))
            .ok(),
    };

    let age_years = parse_age(&mut errors, &form.age_years);
    let date_of_birth = age_years.and_then(|age| {
        let dob = derive_date_of_birth(age, today);
        if dob.is_none() {
            errors.insert(fields::AGE_YEARS, "Age must be between 0 and 120");
        }
        dob
    });

    let region = form
        .region
        .trim()
        .parse::<Region>()
        .map_err(|_| errors.insert(fields::REGION, "Select a region"))
        .ok();

    let sub_city_or_zone = match region {
        Some(r) if r.has_sub_city_list() => {
            match form.sub_city_or_zone.trim().parse::<AddisSubCity>() {
                Ok(sub_city) => Some(sub_city.as_str().to_string()),
                Err(_) => {
                    errors.insert(fields::SUB_CITY_OR_ZONE, "Select a sub-city");
                    None
                }
            }
        }
        _ => optional_text(&form.sub_city_or_zone),
    };

    let woreda = required_text(
        &mut errors,
        fields::WOREDA,
        &form.woreda,
        "Woreda is required",
    );

    let phone = optional_text(&form.phone);
    if let Some(p) = &phone {
        if !is_plausible_phone(p) {
            errors.insert(fields::PHONE, "Phone must be 7–20 digits");
        }
    }

    match (
        given_name,
        father_name,
        grandfather_name,
        sex,
        age_years,
        date_of_birth,
        region,
        woreda,
    ) {
        (
            Some(given_name),
            Some(father_name),
            Some(grandfather_name),
            Some(sex),
            Some(age_years),
            Some(date_of_birth),
            Some(region),
            Some(woreda),
        ) if errors.is_empty() => Ok(DemographicsRecord {
            given_name,
            father_name,
            grandfather_name,
            sex,
            age_years,
            date_of_birth,
            region,
            sub_city_or_zone,
            woreda,
            phone,
        }),
        _ => Err(errors),
    }
}

fn parse_age(errors: &mut FieldErrors, raw: &str) -> Option<u8> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.insert(fields::AGE_YEARS, "Age is required");
        return None;
    }
    if !is_digits(raw) {
        errors.insert(fields::AGE_YEARS, "Enter whole years");
        return None;
    }
    match raw.parse::<u8>() {
        Ok(age) if age <= MAX_AGE_YEARS => Some(age),
        _ => {
            errors.insert(fields::AGE_YEARS, "Age must be between 0 and 120");
            None
        }
    }
}
