//! # Campaign Vitals
//!
//! Pure clinical computations used by the intake workflow.
//!
//! Everything in this crate is deterministic and free of I/O:
//! - Body Mass Index and its adult category
//! - Blood-pressure category (ACC/AHA style staging)
//! - Blood-glucose flag for fasting and random readings
//!
//! The category enums render the exact labels that end up in the visits table, both through
//! `Display` and through serde.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Adult BMI category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        }
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blood-pressure category.
///
/// The ranges of the individual stages overlap, so classification is always done through
/// [`bp_category`], which applies the rules in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BpCategory {
    Normal,
    Elevated,
    #[serde(rename = "Stage 1")]
    Stage1,
    #[serde(rename = "Stage 2")]
    Stage2,
    #[serde(rename = "Hypertensive Crisis")]
    HypertensiveCrisis,
}

impl BpCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BpCategory::Normal => "Normal",
            BpCategory::Elevated => "Elevated",
            BpCategory::Stage1 => "Stage 1",
            BpCategory::Stage2 => "Stage 2",
            BpCategory::HypertensiveCrisis => "Hypertensive Crisis",
        }
    }
}

impl fmt::Display for BpCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a glucose sample was taken relative to the patient's last meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlucoseContext {
    Fasting,
    Random,
}

/// Glucose reading flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlucoseFlag {
    Normal,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl GlucoseFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlucoseFlag::Normal => "Normal",
            GlucoseFlag::High => "High",
            GlucoseFlag::VeryHigh => "Very High",
        }
    }
}

impl fmt::Display for GlucoseFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes BMI from weight in kilograms and an optional height in centimetres.
///
/// Returns `None` when the height is missing or not positive. The result is rounded to one
/// decimal place, halves rounding up.
pub fn compute_bmi(weight_kg: f64, height_cm: Option<f64>) -> Option<f64> {
    let height_cm = height_cm.filter(|h| *h > 0.0)?;
    let height_m = height_cm / 100.0;
    let bmi = weight_kg / (height_m * height_m);
    Some((bmi * 10.0).round() / 10.0)
}

/// Maps a BMI value to its adult category. Each boundary belongs to the higher bucket.
pub fn bmi_category(bmi: Option<f64>) -> Option<BmiCategory> {
    let bmi = bmi?;
    let category = if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 25.0 {
        BmiCategory::Normal
    } else if bmi < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    };
    Some(category)
}

/// Classifies a blood-pressure reading. The first matching rule wins.
pub fn bp_category(systolic: u16, diastolic: u16) -> BpCategory {
    if systolic >= 180 || diastolic >= 120 {
        return BpCategory::HypertensiveCrisis;
    }
    if systolic >= 140 || diastolic >= 90 {
        return BpCategory::Stage2;
    }
    if (130..=139).contains(&systolic) || (80..=89).contains(&diastolic) {
        return BpCategory::Stage1;
    }
    if systolic >= 120 && diastolic < 80 {
        return BpCategory::Elevated;
    }
    BpCategory::Normal
}

/// Flags a glucose value in mg/dL.
///
/// Fasting readings use 126/200 as the high/very-high thresholds, random readings 200/300.
pub fn glucose_flag(value_mg_dl: f64, context: GlucoseContext) -> GlucoseFlag {
    let (high, very_high) = match context {
        GlucoseContext::Fasting => (126.0, 200.0),
        GlucoseContext::Random => (200.0, 300.0),
    };
    if value_mg_dl >= very_high {
        GlucoseFlag::VeryHigh
    } else if value_mg_dl >= high {
        GlucoseFlag::High
    } else {
        GlucoseFlag::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_bmi_rounds_to_one_decimal() {
        assert_eq!(compute_bmi(70.0, Some(170.0)), Some(24.2));
        assert_eq!(compute_bmi(50.0, Some(160.0)), Some(19.5));
    }

    #[test]
    fn test_compute_bmi_without_height_is_none() {
        assert_eq!(compute_bmi(70.0, None), None);
        assert_eq!(compute_bmi(70.0, Some(0.0)), None);
        assert_eq!(compute_bmi(70.0, Some(-150.0)), None);
    }

    #[test]
    fn test_bmi_category_boundaries() {
        assert_eq!(bmi_category(Some(18.4)), Some(BmiCategory::Underweight));
        assert_eq!(bmi_category(Some(18.5)), Some(BmiCategory::Normal));
        assert_eq!(bmi_category(Some(24.9)), Some(BmiCategory::Normal));
        assert_eq!(bmi_category(Some(25.0)), Some(BmiCategory::Overweight));
        assert_eq!(bmi_category(Some(29.9)), Some(BmiCategory::Overweight));
        assert_eq!(bmi_category(Some(30.0)), Some(BmiCategory::Obese));
        assert_eq!(bmi_category(None), None);
    }

    #[test]
    fn test_bp_category_priority_order() {
        assert_eq!(bp_category(185, 70), BpCategory::HypertensiveCrisis);
        assert_eq!(bp_category(110, 125), BpCategory::HypertensiveCrisis);
        assert_eq!(bp_category(145, 70), BpCategory::Stage2);
        assert_eq!(bp_category(125, 92), BpCategory::Stage2);
        assert_eq!(bp_category(135, 75), BpCategory::Stage1);
        assert_eq!(bp_category(115, 85), BpCategory::Stage1);
        assert_eq!(bp_category(120, 70), BpCategory::Elevated);
        assert_eq!(bp_category(129, 79), BpCategory::Elevated);
        assert_eq!(bp_category(110, 70), BpCategory::Normal);
    }

    #[test]
    fn test_glucose_flag_uses_context_thresholds() {
        assert_eq!(glucose_flag(100.0, GlucoseContext::Fasting), GlucoseFlag::Normal);
        assert_eq!(glucose_flag(126.0, GlucoseContext::Fasting), GlucoseFlag::High);
        assert_eq!(glucose_flag(200.0, GlucoseContext::Fasting), GlucoseFlag::VeryHigh);

        assert_eq!(glucose_flag(150.0, GlucoseContext::Random), GlucoseFlag::Normal);
        assert_eq!(glucose_flag(200.0, GlucoseContext::Random), GlucoseFlag::High);
        assert_eq!(glucose_flag(300.0, GlucoseContext::Random), GlucoseFlag::VeryHigh);
    }

    #[test]
    fn test_category_labels_match_stored_values() {
        assert_eq!(BpCategory::Stage1.to_string(), "Stage 1");
        assert_eq!(
            serde_json::to_string(&BpCategory::HypertensiveCrisis).unwrap(),
            "\"Hypertensive Crisis\""
        );
        assert_eq!(
            serde_json::to_string(&GlucoseFlag::VeryHigh).unwrap(),
            "\"Very High\""
        );
        assert_eq!(BmiCategory::Overweight.to_string(), "Overweight");
    }
}
