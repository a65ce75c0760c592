//! Constants used throughout the campaign core crate.
//!
//! Storage keys keep the `campaignmrs:` prefix so values written by earlier field deployments
//! remain readable.

/// Local storage key for the active site session.
pub const SITE_SESSION_KEY: &str = "campaignmrs:siteSession";

/// Local storage key for demographics staged between the two intake steps.
pub const STAGED_DEMOGRAPHICS_KEY: &str = "campaignmrs:lastDemographics";

/// Local storage key for the operator's theme preference.
pub const THEME_KEY: &str = "campaignmrs:theme";

/// Local storage key for the credential issued by the local identity provider.
pub const AUTH_CREDENTIAL_KEY: &str = "campaignmrs:auth";

/// Lifetime of a site session in hours, fixed at issue.
pub const SESSION_TTL_HOURS: i64 = 12;

/// Route prefix that never requires a session.
pub const SIGN_IN_ROUTE: &str = "/login";

/// Default number of rows per admin page.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Default directory for campaign data when none is configured.
pub const DEFAULT_DATA_DIR: &str = "campaign_data";

/// Directory (under the data dir) backing device-local storage.
pub const LOCAL_STORAGE_DIR_NAME: &str = "local";

/// Directory (under the data dir) holding persisted visit rows.
pub const VISITS_DIR_NAME: &str = "visits";

/// Filename of the site accounts directory.
pub const ACCOUNTS_FILENAME: &str = "accounts.yaml";

/// Site name used when neither the operator nor the directory supplies one.
pub const FALLBACK_SITE_NAME: &str = "Site";
