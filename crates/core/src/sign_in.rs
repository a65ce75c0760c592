//! Operator sign-in and logout.
//!
//! Signing in resolves the account's site membership and the site's campaign before issuing a
//! [`SiteSession`]. The campaign lookup is best-effort; the vitals step refuses to record a visit
//! when it is missing.

use crate::clock::{Clock, SystemClock};
use crate::constants::FALLBACK_SITE_NAME;
use crate::error::{StorageError, StorageResult};
use crate::remote::{IdentityProvider, SiteDirectory};
use crate::session::{SessionManager, SiteSession};
use crate::storage::KeyValueStore;

#[derive(Debug, thiserror::Error)]
pub enum SignInError {
    #[error("Enter email and password")]
    MissingCredentials,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("No site mapped to this account")]
    NoSiteMembership,
    #[error("Site not found or not readable")]
    SiteUnavailable,
    #[error("failed to save site session: {0}")]
    Storage(#[from] StorageError),
}

pub type SignInResult<T> = std::result::Result<T, SignInError>;

pub struct SignInService<I, D, K, C = SystemClock> {
    identity: I,
    directory: D,
    sessions: SessionManager<K, C>,
}

impl<I, D, K, C> SignInService<I, D, K, C>
where
    I: IdentityProvider,
    D: SiteDirectory,
    K: KeyValueStore,
    C: Clock,
{
    pub fn new(identity: I, directory: D, sessions: SessionManager<K, C>) -> Self {
        Self {
            identity,
            directory,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionManager<K, C> {
        &self.sessions
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    /// Signs in and stores a fresh site session.
    ///
    /// The session is named after `site_name_override` when it is non-blank, otherwise after
    /// the site, otherwise [`FALLBACK_SITE_NAME`].
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        site_name_override: Option<&str>,
    ) -> SignInResult<SiteSession> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(SignInError::MissingCredentials);
        }

        let credential = self.identity.sign_in(email, password).await.map_err(|e| {
            tracing::debug!("sign-in rejected for {}: {}", email, e);
            SignInError::InvalidCredentials
        })?;

        let site_id = match self.directory.site_for_user(&credential.user_id).await {
            Ok(Some(site_id)) => site_id,
            Ok(None) | Err(_) => {
                self.abandon_sign_in().await;
                return Err(SignInError::NoSiteMembership);
            }
        };

        let site = match self.directory.site(&site_id).await {
            Ok(Some(site)) => site,
            Ok(None) | Err(_) => {
                self.abandon_sign_in().await;
                return Err(SignInError::SiteUnavailable);
            }
        };

        let campaign_id = match site.location_id.as_deref() {
            Some(location_id) => match self.directory.location(location_id).await {
                Ok(location) => location.and_then(|l| l.campaign_id),
                Err(e) => {
                    tracing::warn!("campaign lookup for location {} failed: {}", location_id, e);
                    None
                }
            },
            None => None,
        };

        let site_name = [site_name_override, site.name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .unwrap_or(FALLBACK_SITE_NAME)
            .to_string();

        let session = self.sessions.create(
            site.id,
            site_name,
            campaign_id,
            site.location_id,
            Some(credential.user_id),
        );
        self.sessions.save(&session)?;

        tracing::info!(
            "{} signed in at {} ({})",
            credential.email,
            session.site_name,
            session.site_id
        );
        Ok(session)
    }

    /// Signs out of the identity provider (errors ignored) and clears the site session.
    pub async fn logout(&self) -> StorageResult<()> {
        if let Err(e) = self.identity.sign_out().await {
            tracing::warn!("sign-out failed: {}", e);
        }
        self.sessions.clear()?;
        tracing::info!("signed out");
        Ok(())
    }

    async fn abandon_sign_in(&self) {
        if let Err(e) = self.identity.sign_out().await {
            tracing::debug!("sign-out after incomplete sign-in failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryIdentityProvider, MemorySiteDirectory};
    use crate::clock::ManualClock;
    use crate::remote::{Location, Site};
    use crate::storage::MemoryKeyValueStore;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    type Service = SignInService<
        MemoryIdentityProvider,
        MemorySiteDirectory,
        Arc<MemoryKeyValueStore>,
        ManualClock,
    >;

    fn directory() -> MemorySiteDirectory {
        MemorySiteDirectory::new()
            .with_membership("user-1", "site-1")
            .with_membership("user-2", "site-missing")
            .with_site(Site {
                id: "site-1".into(),
                name: Some("Lafto Site 1".into()),
                location_id: Some("location-1".into()),
            })
            .with_location(Location {
                id: "location-1".into(),
                campaign_id: Some("campaign-1".into()),
            })
    }

    fn service_with(directory: MemorySiteDirectory) -> (Service, Arc<MemoryKeyValueStore>) {
        let identity = MemoryIdentityProvider::new()
            .with_account("nurse@example.org", "pw", "user-1")
            .with_account("orphan@example.org", "pw", "user-3")
            .with_account("lost@example.org", "pw", "user-2");
        let store = Arc::new(MemoryKeyValueStore::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 14, 8, 30, 0).unwrap());
        let sessions = SessionManager::with_clock(Arc::clone(&store), clock);
        (SignInService::new(identity, directory, sessions), store)
    }

    #[tokio::test]
    async fn test_sign_in_creates_linked_session() {
        let (service, _) = service_with(directory());

        let session = service
            .sign_in("nurse@example.org", "pw", None)
            .await
            .expect("sign in should succeed");

        assert_eq!(session.site_id, "site-1");
        assert_eq!(session.site_name, "Lafto Site 1");
        assert_eq!(session.campaign_id.as_deref(), Some("campaign-1"));
        assert_eq!(session.location_id.as_deref(), Some("location-1"));
        assert_eq!(session.identity_id.as_deref(), Some("user-1"));
        assert_eq!(session.expires_at - session.issued_at, Duration::hours(12));
        assert_eq!(service.sessions().load().unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_site_name_override_and_fallback() {
        let (service, _) = service_with(directory());
        let session = service
            .sign_in("nurse@example.org", "pw", Some("  Merkato tent  "))
            .await
            .unwrap();
        assert_eq!(session.site_name, "Merkato tent");

        let unnamed = MemorySiteDirectory::new()
            .with_membership("user-1", "site-1")
            .with_site(Site {
                id: "site-1".into(),
                name: None,
                location_id: None,
            });
        let (service, _) = service_with(unnamed);
        let session = service
            .sign_in("nurse@example.org", "pw", Some("   "))
            .await
            .unwrap();
        assert_eq!(session.site_name, "Site");
        assert_eq!(session.campaign_id, None);
        assert_eq!(session.linkage(), None);
    }

    #[tokio::test]
    async fn test_sign_in_error_messages() {
        let (service, _) = service_with(directory());

        let cases = [
            ("", "pw", "Enter email and password"),
            ("nurse@example.org", "", "Enter email and password"),
            ("nurse@example.org", "nope", "Invalid credentials"),
            ("orphan@example.org", "pw", "No site mapped to this account"),
            ("lost@example.org", "pw", "Site not found or not readable"),
        ];
        for (email, password, expected) in cases {
            let err = service.sign_in(email, password, None).await.unwrap_err();
            assert_eq!(err.to_string(), expected, "for {email:?}");
        }
        assert_eq!(service.sessions().load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreadable_directory_is_site_unavailable() {
        let dir = directory();
        dir.set_unavailable(true);
        let (service, _) = service_with(dir);

        let err = service
            .sign_in("nurse@example.org", "pw", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignInError::SiteUnavailable));
        assert_eq!(service.identity().active_credential().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_credential() {
        let (service, store) = service_with(directory());
        service.sign_in("nurse@example.org", "pw", None).await.unwrap();

        service.logout().await.unwrap();

        assert!(store.is_empty());
        assert_eq!(service.identity().active_credential().await.unwrap(), None);
        assert_eq!(service.identity().sign_out_count(), 1);
    }
}
