//! Operator theme preference, persisted under its own local key.

use crate::constants::THEME_KEY;
use crate::error::{StorageError, StorageResult};
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

impl ThemePreference {
    /// Next preference in the `system -> light -> dark -> system` cycle.
    pub fn cycle(self) -> Self {
        match self {
            ThemePreference::System => ThemePreference::Light,
            ThemePreference::Light => ThemePreference::Dark,
            ThemePreference::Dark => ThemePreference::System,
        }
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThemePreference::System => "system",
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
        })
    }
}

/// Reads the stored preference. Missing or unreadable values fall back to `System`.
pub fn load_theme<K: KeyValueStore>(store: &K) -> StorageResult<ThemePreference> {
    let Some(raw) = store.get(THEME_KEY)? else {
        return Ok(ThemePreference::default());
    };
    Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!("ignoring unreadable theme preference: {}", e);
        ThemePreference::default()
    }))
}

pub fn save_theme<K: KeyValueStore>(store: &K, theme: ThemePreference) -> StorageResult<()> {
    let json = serde_json::to_string(&theme).map_err(StorageError::Serialization)?;
    store.set(THEME_KEY, &json)
}

/// Advances the stored preference one step and returns the new value.
pub fn cycle_theme<K: KeyValueStore>(store: &K) -> StorageResult<ThemePreference> {
    let next = load_theme(store)?.cycle();
    save_theme(store, next)?;
    Ok(next)
}
