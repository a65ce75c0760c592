//! Visit rows: the single record written per completed intake, and the admin query over them.

use crate::constants::DEFAULT_PAGE_SIZE;
use crate::intake::demographics::{DemographicsRecord, Sex};
use crate::intake::vitals::{BodyPosition, DerivedVitals, VitalsRecord};
use crate::reference::Region;
use campaign_uuid::RecordId;
use campaign_vitals::{BmiCategory, BpCategory, GlucoseFlag};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Who and where a visit was recorded, taken from the site session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitLinkage {
    pub campaign_id: String,
    pub location_id: String,
    pub site_id: String,
    pub device_id: String,
    pub created_by: Option<String>,
}

/// One patient visit, as inserted into the visit store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRow {
    pub campaign_id: String,
    pub location_id: String,
    pub site_id: String,
    pub device_id: String,
    #[serde(default)]
    pub created_by: Option<String>,

    pub full_name: String,
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

    pub bp_systolic: u16,
    pub bp_diastolic: u16,
    pub bp_arm: String,
    pub bp_position: BodyPosition,
    pub bp_time: NaiveTime,
    #[serde(default)]
    pub glucose_value: Option<f64>,
    #[serde(default)]
    pub last_meal_time: Option<NaiveTime>,
    pub pulse_rate: u16,
    pub temperature_c: f64,
    #[serde(default)]
    pub spo2: Option<u16>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    pub weight_kg: f64,

    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub bmi_category: Option<BmiCategory>,
    pub bp_category: BpCategory,
    #[serde(default)]
    pub glucose_flag: Option<GlucoseFlag>,

    #[serde(default)]
    pub consultations: Vec<String>,
}

impl VisitRow {
    /// Maps every validated field onto the row. The patient's given name is stored as
    /// `full_name`.
    pub fn assemble(
        demographics: &DemographicsRecord,
        vitals: &VitalsRecord,
        derived: &DerivedVitals,
        linkage: VisitLinkage,
    ) -> Self {
        Self {
            campaign_id: linkage.campaign_id,
            location_id: linkage.location_id,
            site_id: linkage.site_id,
            device_id: linkage.device_id,
            created_by: linkage.created_by,

            full_name: demographics.given_name.clone(),
            father_name: demographics.father_name.clone(),
            grandfather_name: demographics.grandfather_name.clone(),
            sex: demographics.sex,
            age_years: demographics.age_years,
            date_of_birth: demographics.date_of_birth,
            region: demographics.region,
            sub_city_or_zone: demographics.sub_city_or_zone.clone(),
            woreda: demographics.woreda.clone(),
            phone: demographics.phone.clone(),

            bp_systolic: vitals.bp_systolic,
            bp_diastolic: vitals.bp_diastolic,
            bp_arm: vitals.arm.label().to_string(),
            bp_position: vitals.position,
            bp_time: vitals.bp_time,
            glucose_value: vitals.glucose_value,
            last_meal_time: vitals.last_meal_time,
            pulse_rate: vitals.pulse_rate,
            temperature_c: vitals.temperature_c,
            spo2: vitals.spo2,
            height_cm: vitals.height_cm,
            weight_kg: vitals.weight_kg,

            bmi: derived.bmi,
            bmi_category: derived.bmi_category,
            bp_category: derived.bp_category,
            glucose_flag: derived.glucose_flag,

            consultations: vitals.consultations.clone(),
        }
    }

    /// Blood pressure rendered as `systolic/diastolic`.
    pub fn blood_pressure(&self) -> String {
        format!("{}/{}", self.bp_systolic, self.bp_diastolic)
    }
}

/// A visit row as persisted, with the id and timestamp assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVisit {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub row: VisitRow,
}

/// Admin list filter and pagination. Pages are numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitQuery {
    pub name_contains: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for VisitQuery {
    fn default() -> Self {
        Self {
            name_contains: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl VisitQuery {
    pub fn new(name_contains: Option<String>, page: u32, page_size: u32) -> Self {
        let name_contains = name_contains
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        Self {
            name_contains,
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Every matching visit on a single page, for export.
    pub fn all(name_contains: Option<String>) -> Self {
        Self::new(name_contains, 1, u32::MAX)
    }

    /// Case-insensitive substring match on `full_name`. No filter matches everything.
    pub fn matches(&self, visit: &StoredVisit) -> bool {
        match &self.name_contains {
            Some(needle) => visit
                .row
                .full_name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        }
    }

    fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1).saturating_mul(self.page_size as usize)
    }

    /// Filters, orders newest first and cuts out the requested page.
    ///
    /// Stores without a query engine of their own run every query through this.
    pub fn apply(&self, visits: impl IntoIterator<Item = StoredVisit>) -> VisitPage {
        let mut matching: Vec<StoredVisit> =
            visits.into_iter().filter(|v| self.matches(v)).collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(self.offset())
            .take(self.page_size as usize)
            .collect();

        VisitPage {
            rows,
            total,
            page: self.page.max(1),
            page_size: self.page_size,
        }
    }
}

/// One page of visits plus the exact number of matching rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitPage {
    pub rows: Vec<StoredVisit>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl VisitPage {
    pub fn page_count(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size)) as u32
    }
}
