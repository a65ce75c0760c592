//! Hand-off of validated demographics from the first intake step to the second.

use crate::constants::STAGED_DEMOGRAPHICS_KEY;
use crate::error::StorageError;
use crate::intake::demographics::DemographicsRecord;
use crate::storage::KeyValueStore;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("no demographics have been staged")]
    Missing,
    #[error("staged demographics could not be read")]
    Corrupted,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StagingResult<T> = std::result::Result<T, StagingError>;

/// Holds at most one staged [`DemographicsRecord`].
pub trait DemographicsStaging {
    /// Replaces whatever is staged.
    fn stage(&self, record: &DemographicsRecord) -> StagingResult<()>;

    /// Reads the staged record without consuming it.
    fn load(&self) -> StagingResult<DemographicsRecord>;

    fn clear(&self) -> StagingResult<()>;

    /// Whether a record is staged (readable or not).
    fn is_staged(&self) -> StagingResult<bool>;
}

impl<T: DemographicsStaging + ?Sized> DemographicsStaging for &T {
    fn stage(&self, record: &DemographicsRecord) -> StagingResult<()> {
        (**self).stage(record)
    }

    fn load(&self) -> StagingResult<DemographicsRecord> {
        (**self).load()
    }

    fn clear(&self) -> StagingResult<()> {
        (**self).clear()
    }

    fn is_staged(&self) -> StagingResult<bool> {
        (**self).is_staged()
    }
}

impl<T: DemographicsStaging + ?Sized> DemographicsStaging for Arc<T> {
    fn stage(&self, record: &DemographicsRecord) -> StagingResult<()> {
        (**self).stage(record)
    }

    fn load(&self) -> StagingResult<DemographicsRecord> {
        (**self).load()
    }

    fn clear(&self) -> StagingResult<()> {
        (**self).clear()
    }

    fn is_staged(&self) -> StagingResult<bool> {
        (**self).is_staged()
    }
}

/// Stages demographics as JSON in a [`KeyValueStore`], so the hand-off survives a restart.
#[derive(Clone, Debug)]
pub struct KvStaging<K> {
    store: K,
}

impl<K: KeyValueStore> KvStaging<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }
}

impl<K: KeyValueStore> DemographicsStaging for KvStaging<K> {
    fn stage(&self, record: &DemographicsRecord) -> StagingResult<()> {
        let json = serde_json::to_string(record).map_err(StorageError::Serialization)?;
        self.store.set(STAGED_DEMOGRAPHICS_KEY, &json)?;
        Ok(())
    }

    /// Unreadable data is deleted and reported as [`StagingError::Corrupted`].
    fn load(&self) -> StagingResult<DemographicsRecord> {
        let raw = self
            .store
            .get(STAGED_DEMOGRAPHICS_KEY)?
            .ok_or(StagingError::Missing)?;

        serde_json::from_str(&raw).or_else(|e| {
            tracing::warn!("discarding unreadable staged demographics: {}", e);
            self.store.remove(STAGED_DEMOGRAPHICS_KEY)?;
            Err(StagingError::Corrupted)
        })
    }

    fn clear(&self) -> StagingResult<()> {
        Ok(self.store.remove(STAGED_DEMOGRAPHICS_KEY)?)
    }

    fn is_staged(&self) -> StagingResult<bool> {
        Ok(self.store.get(STAGED_DEMOGRAPHICS_KEY)?.is_some())
    }
}

/// In-process staging.
#[derive(Debug, Default)]
pub struct MemoryStaging {
    slot: Mutex<Option<DemographicsRecord>>,
}

impl MemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<DemographicsRecord>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DemographicsStaging for MemoryStaging {
    fn stage(&self, record: &DemographicsRecord) -> StagingResult<()> {
        *self.slot() = Some(record.clone());
        Ok(())
    }

    fn load(&self) -> StagingResult<DemographicsRecord> {
        self.slot().clone().ok_or(StagingError::Missing)
    }

    fn clear(&self) -> StagingResult<()> {
        *self.slot() = None;
        Ok(())
    }

    fn is_staged(&self) -> StagingResult<bool> {
        Ok(self.slot().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::demographics::tests::sample_record;
    use crate::storage::{FileKeyValueStore, MemoryKeyValueStore};
    use tempfile::TempDir;

    #[test]
    fn test_kv_staging_round_trip_and_clear() {
        let staging = KvStaging::new(MemoryKeyValueStore::new());
        let record = sample_record();

        assert!(matches!(staging.load(), Err(StagingError::Missing)));
        staging.stage(&record).unwrap();
        assert!(staging.is_staged().unwrap());
        assert_eq!(staging.load().unwrap(), record);
        assert_eq!(staging.load().unwrap(), record, "load does not consume");

        staging.clear().unwrap();
        assert!(!staging.is_staged().unwrap());
        assert!(matches!(staging.load(), Err(StagingError::Missing)));
    }

    #[test]
    fn test_kv_staging_discards_corrupt_data() {
        let store = MemoryKeyValueStore::new();
        store.set(STAGED_DEMOGRAPHICS_KEY, "{\"givenName\":").unwrap();
        let staging = KvStaging::new(&store);

        assert!(matches!(staging.load(), Err(StagingError::Corrupted)));
        assert_eq!(store.get(STAGED_DEMOGRAPHICS_KEY).unwrap(), None);
        assert!(matches!(staging.load(), Err(StagingError::Missing)));
    }

    #[test]
    fn test_kv_staging_survives_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let record = sample_record();

        KvStaging::new(FileKeyValueStore::open(temp_dir.path()).unwrap())
            .stage(&record)
            .unwrap();

        let reopened = KvStaging::new(FileKeyValueStore::open(temp_dir.path()).unwrap());
        assert_eq!(reopened.load().unwrap(), record);
    }

    #[test]
    fn test_memory_staging() {
        let staging = MemoryStaging::new();
        assert!(!staging.is_staged().unwrap());
        staging.stage(&sample_record()).unwrap();
        assert_eq!(staging.load().unwrap().given_name, "Almaz");
        staging.clear().unwrap();
        assert!(matches!(staging.load(), Err(StagingError::Missing)));
    }
}
