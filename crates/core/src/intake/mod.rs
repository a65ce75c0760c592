//! Two-step patient intake.
//!
//! The operator first fills in demographics ([`DemographicsStep`]). The validated record is
//! staged locally and the workflow moves on to vitals ([`VitalsStep`]), which validates the
//! measurements, derives BMI and the clinical categories, and writes one visit row combining
//! both steps with the site session's campaign and location.
//!
//! Gates on vitals submission run in a fixed order and the first failure wins:
//! field validation, systolic above diastolic, staged demographics, then the session.

pub mod demographics;
pub mod staging;
pub mod vitals;

use crate::clock::{Clock, SystemClock};
use crate::error::{RemoteError, StorageError};
use crate::remote::VisitStore;
use crate::session::SiteSession;
use crate::validation::FieldErrors;
use crate::visit::{StoredVisit, VisitLinkage, VisitRow};
use demographics::{validate_demographics, DemographicsForm, DemographicsRecord};
use staging::{DemographicsStaging, StagingError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vitals::{check_pressure_order, validate_vitals, DerivedVitals, VitalsForm};

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("{0}")]
    Validation(FieldErrors),
    #[error("Missing demographics. Please re-enter.")]
    MissingDemographics,
    #[error("Corrupted demographics data.")]
    CorruptedDemographics,
    #[error("Session expired. Log in again.")]
    SessionExpired,
    #[error("Missing campaign or location. Please re-login.")]
    IncompleteSession,
    #[error("{0}")]
    Remote(#[from] RemoteError),
    #[error("{0}")]
    Storage(#[from] StorageError),
}

impl IntakeError {
    /// Per-field messages, when the error is a validation failure.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            IntakeError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<StagingError> for IntakeError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::Missing => IntakeError::MissingDemographics,
            StagingError::Corrupted => IntakeError::CorruptedDemographics,
            StagingError::Storage(e) => IntakeError::Storage(e),
        }
    }
}

pub type IntakeResult<T> = std::result::Result<T, IntakeError>;

/// Which step the operator is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStage {
    Demographics,
    Vitals,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted(StoredVisit),
    /// Another submission was still in flight; nothing was done.
    Ignored,
}

/// Validates demographics and stages them for the vitals step.
#[derive(Debug)]
pub struct DemographicsStep<S, C = SystemClock> {
    staging: S,
    clock: C,
}

impl<S: DemographicsStaging, C: Clock> DemographicsStep<S, C> {
    pub fn new(staging: S, clock: C) -> Self {
        Self { staging, clock }
    }

    /// Validates every field, derives the date of birth from today's date and stages the
    /// record, replacing anything staged before.
    pub fn submit(&self, form: &DemographicsForm) -> IntakeResult<DemographicsRecord> {
        let today = self.clock.now().date_naive();
        let record = validate_demographics(form, today).map_err(IntakeError::Validation)?;
        self.staging.stage(&record)?;
        tracing::info!("staged demographics for {}", record.display_name());
        Ok(record)
    }
}

/// Validates vitals and writes the visit row.
#[derive(Debug)]
pub struct VitalsStep<S, V> {
    staging: S,
    visits: V,
    device_id: String,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the submission ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: DemographicsStaging, V: VisitStore> VitalsStep<S, V> {
    pub fn new(staging: S, visits: V, device_id: impl Into<String>) -> Self {
        Self {
            staging,
            visits,
            device_id: device_id.into(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submits the vitals form against the staged demographics and the given session.
    ///
    /// While a submission is in flight further calls return [`SubmitOutcome::Ignored`]
    /// immediately. On insert failure the staged demographics are kept so the operator can
    /// retry; on success they are cleared.
    pub async fn submit(
        &self,
        form: &VitalsForm,
        session: Option<&SiteSession>,
    ) -> IntakeResult<SubmitOutcome> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("vitals submission already in flight, ignoring");
            return Ok(SubmitOutcome::Ignored);
        }
        let _in_flight = InFlight(&self.in_flight);

        let record = validate_vitals(form).map_err(IntakeError::Validation)?;
        check_pressure_order(&record).map_err(IntakeError::Validation)?;

        let demographics = self.staging.load()?;

        let session = session.ok_or(IntakeError::SessionExpired)?;
        let (campaign_id, location_id) =
            session.linkage().ok_or(IntakeError::IncompleteSession)?;

        let derived = DerivedVitals::compute(&record);
        let row = VisitRow::assemble(
            &demographics,
            &record,
            &derived,
            VisitLinkage {
                campaign_id: campaign_id.to_string(),
                location_id: location_id.to_string(),
                site_id: session.site_id.clone(),
                device_id: self.device_id.clone(),
                created_by: session.identity_id.clone(),
            },
        );

        let stored = match self.visits.insert(&row).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("visit insert failed: {}", e);
                return Err(e.into());
            }
        };
        tracing::info!("recorded visit {} at site {}", stored.id, stored.row.site_id);

        if let Err(e) = self.staging.clear() {
            tracing::warn!("visit {} saved but staged demographics not cleared: {}", stored.id, e);
        }

        Ok(SubmitOutcome::Submitted(stored))
    }
}

/// Both intake steps sharing one staging slot.
#[derive(Debug)]
pub struct IntakeWorkflow<S, V, C = SystemClock> {
    staging: Arc<S>,
    demographics: DemographicsStep<Arc<S>, C>,
    vitals: VitalsStep<Arc<S>, V>,
}

impl<S: DemographicsStaging, V: VisitStore, C: Clock> IntakeWorkflow<S, V, C> {
    pub fn new(staging: S, visits: V, clock: C, device_id: impl Into<String>) -> Self {
        let staging = Arc::new(staging);
        Self {
            demographics: DemographicsStep::new(Arc::clone(&staging), clock),
            vitals: VitalsStep::new(Arc::clone(&staging), visits, device_id),
            staging,
        }
    }

    /// Vitals once demographics are staged, demographics otherwise.
    pub fn stage(&self) -> IntakeResult<IntakeStage> {
        Ok(if self.staging.is_staged()? {
            IntakeStage::Vitals
        } else {
            IntakeStage::Demographics
        })
    }

    pub fn submit_demographics(&self, form: &DemographicsForm) -> IntakeResult<DemographicsRecord> {
        self.demographics.submit(form)
    }

    pub async fn submit_vitals(
        &self,
        form: &VitalsForm,
        session: Option<&SiteSession>,
    ) -> IntakeResult<SubmitOutcome> {
        self.vitals.submit(form, session).await
    }

    /// Discards staged demographics and returns to the first step.
    pub fn abandon(&self) -> IntakeResult<()> {
        self.staging.clear()?;
        Ok(())
    }

    pub fn vitals_step(&self) -> &VitalsStep<Arc<S>, V> {
        &self.vitals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryVisitStore;
    use crate::clock::ManualClock;
    use crate::constants::STAGED_DEMOGRAPHICS_KEY;
    use crate::error::RemoteResult;
    use crate::storage::{KeyValueStore, MemoryKeyValueStore};
    use crate::visit::{VisitPage, VisitQuery};
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use demographics::fields as demo_fields;
    use staging::{KvStaging, MemoryStaging};
    use tokio::sync::Notify;
    use vitals::fields as vitals_fields;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    fn session() -> SiteSession {
        SiteSession {
            site_id: "site-1".into(),
            site_name: "Lafto Site 1".into(),
            identity_id: Some("user-1".into()),
            campaign_id: Some("campaign-1".into()),
            location_id: Some("location-1".into()),
            issued_at: now(),
            expires_at: now() + Duration::hours(12),
        }
    }

    fn demographics_form() -> DemographicsForm {
        DemographicsForm {
            given_name: "Almaz".into(),
            father_name: "Bekele".into(),
            grandfather_name: "Tadesse".into(),
            sex: "Female".into(),
            age_years: "34".into(),
            woreda: "03".into(),
            ..DemographicsForm::default()
        }
    }

    fn vitals_form() -> VitalsForm {
        let mut form = VitalsForm {
            bp_systolic: "128".into(),
            bp_diastolic: "82".into(),
            bp_time: "09:45".into(),
            pulse_rate: "76".into(),
            temperature_c: "36.8".into(),
            spo2: "98".into(),
            weight_kg: "70".into(),
            height_cm: "170".into(),
            ..VitalsForm::default()
        };
        form.select_consultation("TB screening");
        form
    }

    fn workflow(
        visits: Arc<MemoryVisitStore>,
    ) -> IntakeWorkflow<MemoryStaging, Arc<MemoryVisitStore>, ManualClock> {
        IntakeWorkflow::new(
            MemoryStaging::new(),
            visits,
            ManualClock::new(now()),
            "campaign-cli/test",
        )
    }

    #[test]
    fn test_demographics_submit_stages_record_and_advances() {
        let workflow = workflow(Arc::new(MemoryVisitStore::new()));
        assert_eq!(workflow.stage().unwrap(), IntakeStage::Demographics);

        let record = workflow
            .submit_demographics(&demographics_form())
            .expect("demographics are valid");

        assert_eq!(record.date_of_birth, NaiveDate::from_ymd_opt(1992, 1, 1).unwrap());
        assert_eq!(workflow.stage().unwrap(), IntakeStage::Vitals);
    }

    #[test]
    fn test_invalid_demographics_are_not_staged() {
        let workflow = workflow(Arc::new(MemoryVisitStore::new()));
        let form = DemographicsForm {
            age_years: "121".into(),
            ..demographics_form()
        };

        let err = workflow.submit_demographics(&form).unwrap_err();
        let errors = err.field_errors().expect("validation error");
        assert_eq!(errors.get(demo_fields::AGE_YEARS), Some("Age must be between 0 and 120"));
        assert_eq!(workflow.stage().unwrap(), IntakeStage::Demographics);
    }

    #[tokio::test]
    async fn test_vitals_submit_inserts_one_row_and_clears_staging() {
        let visits = Arc::new(MemoryVisitStore::new());
        let workflow = workflow(Arc::clone(&visits));
        workflow.submit_demographics(&demographics_form()).unwrap();

        let outcome = workflow
            .submit_vitals(&vitals_form(), Some(&session()))
            .await
            .expect("submission succeeds");

        let SubmitOutcome::Submitted(stored) = outcome else {
            panic!("expected a submitted visit");
        };
        assert_eq!(visits.len(), 1);
        let row = &stored.row;
        assert_eq!(row.full_name, "Almaz");
        assert_eq!(row.campaign_id, "campaign-1");
        assert_eq!(row.location_id, "location-1");
        assert_eq!(row.site_id, "site-1");
        assert_eq!(row.device_id, "campaign-cli/test");
        assert_eq!(row.created_by.as_deref(), Some("user-1"));
        assert_eq!(row.bmi, Some(24.2));
        assert_eq!(row.bp_arm, "Left");
        assert_eq!(row.spo2, Some(98));
        assert_eq!(row.consultations, vec!["TB screening"]);

        assert_eq!(workflow.stage().unwrap(), IntakeStage::Demographics);
        assert!(!workflow.vitals_step().is_submitting());
    }

    #[tokio::test]
    async fn test_consultations_set_directly_are_deduplicated_in_row() {
        let visits = Arc::new(MemoryVisitStore::new());
        let workflow = workflow(Arc::clone(&visits));
        workflow.submit_demographics(&demographics_form()).unwrap();
        let form = VitalsForm {
            consultations: vec![
                "Family planning".into(),
                "TB screening".into(),
                "Family planning".into(),
            ],
            ..vitals_form()
        };

        let outcome = workflow
            .submit_vitals(&form, Some(&session()))
            .await
            .expect("submission succeeds");

        let SubmitOutcome::Submitted(stored) = outcome else {
            panic!("expected a submitted visit");
        };
        assert_eq!(stored.row.consultations, vec!["Family planning", "TB screening"]);
        assert_eq!(visits.len(), 1);
    }

    #[tokio::test]
    async fn test_systolic_not_above_diastolic_is_rejected_before_insert() {
        let visits = Arc::new(MemoryVisitStore::new());
        let workflow = workflow(Arc::clone(&visits));
        workflow.submit_demographics(&demographics_form()).unwrap();
        let form = VitalsForm {
            bp_systolic: "80".into(),
            bp_diastolic: "90".into(),
            ..vitals_form()
        };

        let err = workflow
            .submit_vitals(&form, Some(&session()))
            .await
            .unwrap_err();

        let errors = err.field_errors().expect("validation error");
        assert_eq!(
            errors.get(vitals_fields::BP_SYSTOLIC),
            Some("Systolic must be greater than diastolic")
        );
        assert_eq!(visits.len(), 0);
        assert_eq!(workflow.stage().unwrap(), IntakeStage::Vitals);
    }

    #[tokio::test]
    async fn test_missing_demographics_blocks_insert() {
        let visits = Arc::new(MemoryVisitStore::new());
        let workflow = workflow(Arc::clone(&visits));

        let err = workflow
            .submit_vitals(&vitals_form(), Some(&session()))
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::MissingDemographics));
        assert_eq!(err.to_string(), "Missing demographics. Please re-enter.");
        assert_eq!(visits.len(), 0);
    }

    #[tokio::test]
    async fn test_field_validation_runs_before_demographics_check() {
        let workflow = workflow(Arc::new(MemoryVisitStore::new()));
        let err = workflow
            .submit_vitals(&VitalsForm::default(), Some(&session()))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_corrupted_demographics_are_reported_and_discarded() {
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(STAGED_DEMOGRAPHICS_KEY, "not json").unwrap();
        let visits = Arc::new(MemoryVisitStore::new());
        let workflow = IntakeWorkflow::new(
            KvStaging::new(Arc::clone(&store)),
            Arc::clone(&visits),
            ManualClock::new(now()),
            "campaign-cli/test",
        );

        let err = workflow
            .submit_vitals(&vitals_form(), Some(&session()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Corrupted demographics data.");
        assert_eq!(store.get(STAGED_DEMOGRAPHICS_KEY).unwrap(), None);
        assert_eq!(visits.len(), 0);
    }

    #[tokio::test]
    async fn test_session_gates() {
        let visits = Arc::new(MemoryVisitStore::new());
        let workflow = workflow(Arc::clone(&visits));
        workflow.submit_demographics(&demographics_form()).unwrap();

        let err = workflow
            .submit_vitals(&vitals_form(), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Session expired. Log in again.");

        let without_location = SiteSession {
            location_id: None,
            ..session()
        };
        let err = workflow
            .submit_vitals(&vitals_form(), Some(&without_location))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing campaign or location. Please re-login."
        );

        assert_eq!(visits.len(), 0);
        assert_eq!(workflow.stage().unwrap(), IntakeStage::Vitals);
    }

    #[tokio::test]
    async fn test_insert_failure_surfaces_server_message_and_keeps_staging() {
        let visits = Arc::new(MemoryVisitStore::new());
        visits.fail_next_insert("new row violates row-level security policy");
        let workflow = workflow(Arc::clone(&visits));
        workflow.submit_demographics(&demographics_form()).unwrap();

        let err = workflow
            .submit_vitals(&vitals_form(), Some(&session()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "new row violates row-level security policy");
        assert_eq!(visits.len(), 0);
        assert_eq!(workflow.stage().unwrap(), IntakeStage::Vitals);

        let retry = workflow
            .submit_vitals(&vitals_form(), Some(&session()))
            .await
            .unwrap();
        assert!(matches!(retry, SubmitOutcome::Submitted(_)));
        assert_eq!(visits.len(), 1);
    }

    /// Holds every insert until released.
    struct GatedVisitStore {
        inner: MemoryVisitStore,
        entered: Notify,
        release: Notify,
    }

    impl VisitStore for GatedVisitStore {
        async fn insert(&self, row: &VisitRow) -> RemoteResult<StoredVisit> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.insert(row).await
        }

        async fn query(&self, query: &VisitQuery) -> RemoteResult<VisitPage> {
            self.inner.query(query).await
        }
    }

    #[tokio::test]
    async fn test_submit_while_in_flight_is_ignored() {
        let visits = GatedVisitStore {
            inner: MemoryVisitStore::new(),
            entered: Notify::new(),
            release: Notify::new(),
        };
        let workflow = IntakeWorkflow::new(
            MemoryStaging::new(),
            &visits,
            ManualClock::new(now()),
            "campaign-cli/test",
        );
        workflow.submit_demographics(&demographics_form()).unwrap();
        let form = vitals_form();
        let session = session();

        let (first, second) = tokio::join!(
            workflow.submit_vitals(&form, Some(&session)),
            async {
                visits.entered.notified().await;
                assert!(workflow.vitals_step().is_submitting());
                let second = workflow.submit_vitals(&form, Some(&session)).await;
                visits.release.notify_one();
                second
            }
        );

        assert!(matches!(first.unwrap(), SubmitOutcome::Submitted(_)));
        assert!(matches!(second.unwrap(), SubmitOutcome::Ignored));
        assert_eq!(visits.inner.len(), 1);
        assert!(!workflow.vitals_step().is_submitting());
    }
}
