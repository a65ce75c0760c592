//! CSV export of visit rows for the admin view.

use crate::visit::StoredVisit;
use chrono::{DateTime, SecondsFormat, Utc};

pub const CSV_HEADER: [&str; 16] = [
    "Created At",
    "Full Name",
    "Father Name",
    "Sex",
    "Age",
    "BP",
    "Pulse",
    "Temp C",
    "SpO2",
    "Glucose",
    "BMI",
    "BMI Cat",
    "BP Cat",
    "Site",
    "Campaign",
    "Location",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn visit_fields(visit: &StoredVisit) -> [String; 16] {
    let row = &visit.row;
    [
        visit.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        row.full_name.clone(),
        row.father_name.clone(),
        row.sex.to_string(),
        row.age_years.to_string(),
        row.blood_pressure(),
        row.pulse_rate.to_string(),
        row.temperature_c.to_string(),
        optional(row.spo2),
        optional(row.glucose_value),
        optional(row.bmi),
        optional(row.bmi_category),
        row.bp_category.to_string(),
        row.site_id.clone(),
        row.campaign_id.clone(),
        row.location_id.clone(),
    ]
}

/// Renders the header and one line per visit. Every field is quoted with embedded `"` doubled,
/// and lines are separated by `\n` with no trailing newline.
pub fn visits_to_csv(visits: &[StoredVisit]) -> ExportResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for visit in visits {
        writer.write_record(visit_fields(visit))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    let mut rendered = String::from_utf8(bytes)?;
    if rendered.ends_with('\n') {
        rendered.pop();
    }
    Ok(rendered)
}

/// `visits_export_YYYY-MM-DD-HH-MM-SS.csv`
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("visits_export_{}.csv", now.format("%Y-%m-%d-%H-%M-%S"))
}
