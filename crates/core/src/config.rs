//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Library code never reads environment variables; the binaries do that and hand the values in
//! through [`CampaignConfig::new`].

use crate::constants::{
    ACCOUNTS_FILENAME, DEFAULT_PAGE_SIZE, LOCAL_STORAGE_DIR_NAME, VISITS_DIR_NAME,
};
use crate::error::{CampaignError, CampaignResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CampaignConfig {
    data_dir: PathBuf,
    device_id: String,
    page_size: u32,
}

impl CampaignConfig {
    /// Create a new `CampaignConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignError::InvalidInput`] if `device_id` is blank or `page_size` is zero.
    pub fn new(data_dir: PathBuf, device_id: String, page_size: u32) -> CampaignResult<Self> {
        let device_id = device_id.trim().to_string();
        if device_id.is_empty() {
            return Err(CampaignError::InvalidInput(
                "device_id cannot be empty".into(),
            ));
        }
        if page_size == 0 {
            return Err(CampaignError::InvalidInput(
                "page_size must be greater than zero".into(),
            ));
        }

        Ok(Self {
            data_dir,
            device_id,
            page_size,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory backing the device-local key-value store.
    pub fn local_storage_dir(&self) -> PathBuf {
        self.data_dir.join(LOCAL_STORAGE_DIR_NAME)
    }

    /// Directory holding persisted visit rows.
    pub fn visits_dir(&self) -> PathBuf {
        self.data_dir.join(VISITS_DIR_NAME)
    }

    /// Path of the site accounts directory file.
    pub fn accounts_file(&self) -> PathBuf {
        self.data_dir.join(ACCOUNTS_FILENAME)
    }

    /// Client-identifying string stamped on every visit row.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// Default device id for a binary, `<binary>/<version>`.
pub fn default_device_id(binary: &str, version: &str) -> String {
    format!("{}/{}", binary, version)
}

/// Parse the admin page size from an optional string value.
///
/// `None` or a blank value yields [`DEFAULT_PAGE_SIZE`].
pub fn page_size_from_env_value(value: Option<String>) -> CampaignResult<u32> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(DEFAULT_PAGE_SIZE),
        Some(v) => v.parse::<u32>().map_err(|_| {
            CampaignError::InvalidInput(format!("page size must be a positive integer, got '{v}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_blank_device_id() {
        let err = CampaignConfig::new(PathBuf::from("data"), "   ".into(), 25)
            .expect_err("blank device id should be rejected");
        assert!(matches!(err, CampaignError::InvalidInput(_)));
    }

    #[test]
    fn test_new_rejects_zero_page_size() {
        let err = CampaignConfig::new(PathBuf::from("data"), "laptop-1".into(), 0)
            .expect_err("zero page size should be rejected");
        assert!(matches!(err, CampaignError::InvalidInput(_)));
    }

    #[test]
    fn test_derived_paths() {
        let cfg = CampaignConfig::new(PathBuf::from("/srv/campaign"), " laptop-1 ".into(), 25)
            .expect("config should be valid");

        assert_eq!(cfg.device_id(), "laptop-1");
        assert_eq!(cfg.local_storage_dir(), PathBuf::from("/srv/campaign/local"));
        assert_eq!(cfg.visits_dir(), PathBuf::from("/srv/campaign/visits"));
        assert_eq!(
            cfg.accounts_file(),
            PathBuf::from("/srv/campaign/accounts.yaml")
        );
    }

    #[test]
    fn test_page_size_from_env_value() {
        assert_eq!(page_size_from_env_value(None).unwrap(), DEFAULT_PAGE_SIZE);
        assert_eq!(
            page_size_from_env_value(Some("  ".into())).unwrap(),
            DEFAULT_PAGE_SIZE
        );
        assert_eq!(page_size_from_env_value(Some("50".into())).unwrap(), 50);
        assert!(page_size_from_env_value(Some("fifty".into())).is_err());
    }

    #[test]
    fn test_default_device_id() {
        assert_eq!(default_device_id("campaign", "0.1.0"), "campaign/0.1.0");
    }
}
