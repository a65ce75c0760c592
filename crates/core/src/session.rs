//! Site session management.
//!
//! A [`SiteSession`] is the operator's working context after sign-in: which site they are
//! recording for and which campaign/location that site belongs to. Sessions expire a fixed
//! twelve hours after issue; there is no renewal, so expiry is absolute rather than sliding.
//!
//! The [`SessionManager`] is the only code that touches the stored session. Storage and time
//! are both injected, so the same manager runs against a file-backed store on a device and
//! against an in-memory store with a manual clock in tests.
//!
//! Expiry is checked lazily: `load` discards an expired session the next time anything asks
//! for it. Nothing runs on a timer.

use crate::clock::{Clock, SystemClock};
use crate::constants::{SESSION_TTL_HOURS, SITE_SESSION_KEY};
use crate::error::{StorageError, StorageResult};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated operator's working context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSession {
    pub site_id: String,
    pub site_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(rename = "issuedAtMs", with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "expiresAtMs", with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl SiteSession {
    /// True once `now` is strictly past the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, never negative.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// Campaign and location ids, if the session carries both.
    ///
    /// Visits cannot be recorded without this linkage.
    pub fn linkage(&self) -> Option<(&str, &str)> {
        match (self.campaign_id.as_deref(), self.location_id.as_deref()) {
            (Some(campaign), Some(location)) if !campaign.is_empty() && !location.is_empty() => {
                Some((campaign, location))
            }
            _ => None,
        }
    }
}

/// Creates, persists, reads and expires the site session.
#[derive(Clone, Debug)]
pub struct SessionManager<K, C = SystemClock> {
    store: K,
    clock: C,
}

impl<K: KeyValueStore> SessionManager<K, SystemClock> {
    pub fn new(store: K) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<K: KeyValueStore, C: Clock> SessionManager<K, C> {
    pub fn with_clock(store: K, clock: C) -> Self {
        Self { store, clock }
    }

    /// Issues a new session stamped with the current time.
    ///
    /// The session is not persisted until [`save`](Self::save) is called.
    pub fn create(
        &self,
        site_id: impl Into<String>,
        site_name: impl Into<String>,
        campaign_id: Option<String>,
        location_id: Option<String>,
        identity_id: Option<String>,
    ) -> SiteSession {
        // Stored timestamps have millisecond precision; truncate so a reload compares equal.
        let now = self.clock.now();
        let issued_at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);

        SiteSession {
            site_id: site_id.into(),
            site_name: site_name.into(),
            identity_id,
            campaign_id,
            location_id,
            issued_at,
            expires_at: issued_at + Duration::hours(SESSION_TTL_HOURS),
        }
    }

    /// Persists `session`, replacing any previous one.
    pub fn save(&self, session: &SiteSession) -> StorageResult<()> {
        let json = serde_json::to_string(session).map_err(StorageError::Serialization)?;
        self.store.set(SITE_SESSION_KEY, &json)
    }

    /// Returns the stored session if it exists, parses and has not expired.
    ///
    /// Corrupt and expired sessions are deleted before `None` is returned.
    pub fn load(&self) -> StorageResult<Option<SiteSession>> {
        let Some(raw) = self.store.get(SITE_SESSION_KEY)? else {
            return Ok(None);
        };

        let session = match serde_json::from_str::<SiteSession>(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("discarding unreadable site session: {}", e);
                self.clear()?;
                return Ok(None);
            }
        };

        if session.is_expired_at(self.clock.now()) {
            tracing::info!("site session for {} expired", session.site_id);
            self.clear()?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Deletes the stored session unconditionally.
    pub fn clear(&self) -> StorageResult<()> {
        self.store.remove(SITE_SESSION_KEY)
    }

    /// Time left on the current session; zero without a valid session.
    pub fn remaining(&self) -> StorageResult<Duration> {
        Ok(self
            .load()?
            .map(|s| s.remaining_at(self.clock.now()))
            .unwrap_or_else(Duration::zero))
    }

    pub fn remaining_ms(&self) -> StorageResult<i64> {
        Ok(self.remaining()?.num_milliseconds())
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
