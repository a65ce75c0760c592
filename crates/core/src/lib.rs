//! # Campaign Core
//!
//! Core logic for recording patient visits at health-campaign outreach sites.
//!
//! This crate contains:
//! - Site sessions with a fixed twelve hour lifetime, and the access gate that enforces them
//! - Sign-in against an identity provider and site directory
//! - The two-step intake (demographics, then vitals) that writes one visit row per patient
//! - Admin listing and CSV export of recorded visits
//! - Local and in-memory implementations of the remote collaborators
//!
//! **No transport concerns**: command-line parsing and HTTP serving belong in the `campaign` CLI
//! and `campaign-run` binaries.

pub mod backends;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod gate;
pub mod intake;
pub mod reference;
pub mod remote;
pub mod session;
pub mod sign_in;
pub mod storage;
pub mod theme;
pub mod validation;
pub mod visit;

pub use campaign_uuid::RecordId;
pub use campaign_vitals as vitals;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CampaignConfig;
pub use constants::DEFAULT_DATA_DIR;
pub use error::{
    CampaignError, CampaignResult, RemoteError, RemoteResult, StorageError, StorageResult,
};
pub use gate::{AccessGate, GateDecision};
pub use intake::{IntakeError, IntakeResult, IntakeStage, IntakeWorkflow, SubmitOutcome};
pub use remote::{Credential, IdentityProvider, Location, Site, SiteDirectory, VisitStore};
pub use session::{SessionManager, SiteSession};
pub use sign_in::{SignInError, SignInService};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use theme::ThemePreference;
pub use validation::FieldErrors;
pub use visit::{StoredVisit, VisitPage, VisitQuery, VisitRow};
