//! Vitals intake step: form state, validation and derived values.
//!
//! Submission itself (staged demographics, session checks, the single insert) is driven by
//! [`IntakeWorkflow::submit_vitals`](super::IntakeWorkflow::submit_vitals).

use crate::reference::is_known_consultation;
use crate::validation::{
    clock_time, decimal, optional_decimal, optional_whole_number, whole_number, FieldErrors,
};
use campaign_vitals::{
    bmi_category, bp_category, compute_bmi, glucose_flag, BmiCategory, BpCategory,
    GlucoseContext, GlucoseFlag,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Glucose readings taken during intake are flagged against fasting thresholds whatever the
/// last meal time.
pub const INTAKE_GLUCOSE_CONTEXT: GlucoseContext = GlucoseContext::Fasting;

/// Field names used as keys in [`FieldErrors`].
pub mod fields {
    pub const BP_SYSTOLIC: &str = "bp_systolic";
    pub const BP_DIASTOLIC: &str = "bp_diastolic";
    pub const BP_ARM: &str = "bp_arm";
    pub const BP_ARM_OTHER: &str = "bp_arm_other";
    pub const BP_POSITION: &str = "bp_position";
    pub const BP_TIME: &str = "bp_time";
    pub const GLUCOSE_VALUE: &str = "glucose_value";
    pub const LAST_MEAL_TIME: &str = "last_meal_time";
    pub const PULSE_RATE: &str = "pulse_rate";
    pub const TEMPERATURE_C: &str = "temperature_c";
    pub const SPO2: &str = "spo2";
    pub const HEIGHT_CM: &str = "height_cm";
    pub const WEIGHT_KG: &str = "weight_kg";
    pub const CONSULTATIONS: &str = "consultations";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arm::Left => "Left",
            Arm::Right => "Right",
        }
    }
}

impl FromStr for Arm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Left" => Ok(Arm::Left),
            "Right" => Ok(Arm::Right),
            _ => Err(()),
        }
    }
}

/// Arm the cuff was placed on: a preset choice, or free text when presets are switched off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmUsed {
    Preset(Arm),
    Other(String),
}

impl ArmUsed {
    pub fn label(&self) -> &str {
        match self {
            ArmUsed::Preset(arm) => arm.as_str(),
            ArmUsed::Other(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyPosition {
    Sitting,
    Standing,
}

impl fmt::Display for BodyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BodyPosition::Sitting => "Sitting",
            BodyPosition::Standing => "Standing",
        })
    }
}

impl FromStr for BodyPosition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sitting" => Ok(BodyPosition::Sitting),
            "Standing" => Ok(BodyPosition::Standing),
            _ => Err(()),
        }
    }
}

/// Vitals form state, as typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VitalsForm {
    pub bp_systolic: String,
    pub bp_diastolic: String,
    pub include_arm_preset: bool,
    pub bp_arm: String,
    pub bp_arm_other: String,
    pub bp_position: String,
    pub bp_time: String,
    pub glucose_value: String,
    pub last_meal_time: String,
    pub pulse_rate: String,
    pub temperature_c: String,
    pub spo2: String,
    pub height_cm: String,
    pub weight_kg: String,
    /// Selected consultations in the order they were picked. Validation drops repeats.
    pub consultations: Vec<String>,
}

impl Default for VitalsForm {
    /// A blank form with the left arm preset and a sitting position.
    fn default() -> Self {
        Self {
            bp_systolic: String::new(),
            bp_diastolic: String::new(),
            include_arm_preset: true,
            bp_arm: Arm::Left.as_str().to_string(),
            bp_arm_other: String::new(),
            bp_position: BodyPosition::Sitting.to_string(),
            bp_time: String::new(),
            glucose_value: String::new(),
            last_meal_time: String::new(),
            pulse_rate: String::new(),
            temperature_c: String::new(),
            spo2: String::new(),
            height_cm: String::new(),
            weight_kg: String::new(),
            consultations: Vec::new(),
        }
    }
}

impl VitalsForm {
    /// Adds a consultation unless it is already selected.
    pub fn select_consultation(&mut self, label: &str) {
        if !self.consultations.iter().any(|c| c == label) {
            self.consultations.push(label.to_string());
        }
    }

    pub fn deselect_consultation(&mut self, label: &str) {
        self.consultations.retain(|c| c != label);
    }

    /// Selects `label` if absent, otherwise removes it.
    pub fn toggle_consultation(&mut self, label: &str) {
        if self.consultations.iter().any(|c| c == label) {
            self.deselect_consultation(label);
        } else {
            self.select_consultation(label);
        }
    }
}

/// Validated physiological measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalsRecord {
    pub bp_systolic: u16,
    pub bp_diastolic: u16,
    pub arm: ArmUsed,
    pub position: BodyPosition,
    pub bp_time: NaiveTime,
    pub glucose_value: Option<f64>,
    pub last_meal_time: Option<NaiveTime>,
    pub pulse_rate: u16,
    pub temperature_c: f64,
    pub spo2: Option<u16>,
    pub height_cm: Option<f64>,
    pub weight_kg: f64,
    pub consultations: Vec<String>,
}

/// Values computed from a [`VitalsRecord`] at submission time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedVitals {
    pub bmi: Option<f64>,
    pub bmi_category: Option<BmiCategory>,
    pub bp_category: BpCategory,
    pub glucose_flag: Option<GlucoseFlag>,
}

impl DerivedVitals {
    pub fn compute(record: &VitalsRecord) -> Self {
        let bmi = compute_bmi(record.weight_kg, record.height_cm);
        Self {
            bmi,
            bmi_category: bmi_category(bmi),
            bp_category: bp_category(record.bp_systolic, record.bp_diastolic),
            glucose_flag: record
                .glucose_value
                .map(|value| glucose_flag(value, INTAKE_GLUCOSE_CONTEXT)),
        }
    }
}

/// Field-by-field validation of the vitals form.
///
/// Every violation is collected. The systolic/diastolic ordering is a separate rule, see
/// [`check_pressure_order`].
pub fn validate_vitals(form: &VitalsForm) -> Result<VitalsRecord, FieldErrors> {
    let mut errors = FieldErrors::new();

    let bp_systolic = whole_number(
        &mut errors,
        fields::BP_SYSTOLIC,
        "Systolic",
        &form.bp_systolic,
        70..=260,
    );
    let bp_diastolic = whole_number(
        &mut errors,
        fields::BP_DIASTOLIC,
        "Diastolic",
        &form.bp_diastolic,
        40..=150,
    );

    let arm = if form.include_arm_preset {
        match form.bp_arm.trim().parse::<Arm>() {
            Ok(arm) => Some(ArmUsed::Preset(arm)),
            Err(()) => {
                errors.insert(fields::BP_ARM, "Required");
                None
            }
        }
    } else {
        match form.bp_arm_other.trim() {
            "" => {
                errors.insert(fields::BP_ARM_OTHER, "Enter arm");
                None
            }
            other => Some(ArmUsed::Other(other.to_string())),
        }
    };

    let position = form
        .bp_position
        .trim()
        .parse::<BodyPosition>()
        .map_err(|()| errors.insert(fields::BP_POSITION, "Select a position"))
        .ok();

    let bp_time = if form.bp_time.trim().is_empty() {
        errors.insert(fields::BP_TIME, "BP time is required");
        None
    } else {
        let parsed = clock_time(&form.bp_time);
        if parsed.is_none() {
            errors.insert(fields::BP_TIME, "Enter time as HH:MM");
        }
        parsed
    };

    let glucose_value = optional_decimal(
        &mut errors,
        fields::GLUCOSE_VALUE,
        "Glucose",
        &form.glucose_value,
        30.0..=600.0,
    );

    let last_meal_time = if form.last_meal_time.trim().is_empty() {
        None
    } else {
        let parsed = clock_time(&form.last_meal_time);
        if parsed.is_none() {
            errors.insert(fields::LAST_MEAL_TIME, "Enter time as HH:MM");
        }
        parsed
    };

    let pulse_rate = whole_number(
        &mut errors,
        fields::PULSE_RATE,
        "Pulse",
        &form.pulse_rate,
        30..=220,
    );
    let temperature_c = decimal(
        &mut errors,
        fields::TEMPERATURE_C,
        "Temperature",
        &form.temperature_c,
        30.0..=43.0,
    );
    let spo2 = optional_whole_number(&mut errors, fields::SPO2, "SpO2", &form.spo2, 50..=100);
    let height_cm = optional_decimal(
        &mut errors,
        fields::HEIGHT_CM,
        "Height",
        &form.height_cm,
        50.0..=250.0,
    );
    let weight_kg = decimal(
        &mut errors,
        fields::WEIGHT_KG,
        "Weight",
        &form.weight_kg,
        2.0..=350.0,
    );

    let mut consultations: Vec<String> = Vec::with_capacity(form.consultations.len());
    for label in &form.consultations {
        if !is_known_consultation(label) {
            errors.insert(
                fields::CONSULTATIONS,
                format!("Unknown consultation: {label}"),
            );
        } else if !consultations.contains(label) {
            consultations.push(label.clone());
        }
    }

    match (
        bp_systolic,
        bp_diastolic,
        arm,
        position,
        bp_time,
        pulse_rate,
        temperature_c,
        weight_kg,
    ) {
        (
            Some(bp_systolic),
            Some(bp_diastolic),
            Some(arm),
            Some(position),
            Some(bp_time),
            Some(pulse_rate),
            Some(temperature_c),
            Some(weight_kg),
        ) if errors.is_empty() => Ok(VitalsRecord {
            bp_systolic,
            bp_diastolic,
            arm,
            position,
            bp_time,
            glucose_value,
            last_meal_time,
            pulse_rate,
            temperature_c,
            spo2,
            height_cm,
            weight_kg,
            consultations,
        }),
        _ => Err(errors),
    }
}

/// Systolic pressure must exceed diastolic. Reported against the systolic field.
pub fn check_pressure_order(record: &VitalsRecord) -> Result<(), FieldErrors> {
    if record.bp_systolic > record.bp_diastolic {
        return Ok(());
    }
    let mut errors = FieldErrors::new();
    errors.insert(
        fields::BP_SYSTOLIC,
        "Systolic must be greater than diastolic",
    );
    Err(errors)
}
