//! Route access gate.
//!
//! Every navigation outside the sign-in route needs both a live credential from the identity
//! provider and an unexpired site session. Anything less signs the device out and sends the
//! operator back to sign-in.

use crate::clock::{Clock, SystemClock};
use crate::constants::SIGN_IN_ROUTE;
use crate::remote::IdentityProvider;
use crate::session::SessionManager;
use crate::storage::KeyValueStore;
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    RedirectToSignIn,
}

pub struct AccessGate<'a, I, K, C = SystemClock> {
    identity: &'a I,
    sessions: &'a SessionManager<K, C>,
}

impl<'a, I: IdentityProvider, K: KeyValueStore, C: Clock> AccessGate<'a, I, K, C> {
    pub fn new(identity: &'a I, sessions: &'a SessionManager<K, C>) -> Self {
        Self { identity, sessions }
    }

    /// Decides whether `route` may be shown. Evaluated on every navigation.
    pub async fn evaluate(&self, route: &str) -> GateDecision {
        if route.starts_with(SIGN_IN_ROUTE) {
            return GateDecision::Allow;
        }

        let credential = match self.identity.active_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::debug!("identity check failed for {}: {}", route, e);
                None
            }
        };

        let session = self.sessions.load().unwrap_or_else(|e| {
            tracing::warn!("could not read site session: {}", e);
            None
        });

        let (Some(_credential), Some(session)) = (credential, session) else {
            tracing::debug!("no credential or site session for {}, redirecting", route);
            self.deny(true).await;
            return GateDecision::RedirectToSignIn;
        };

        if session.remaining_at(self.sessions.clock().now()) <= Duration::zero() {
            tracing::debug!("site session for {} has no time left", session.site_id);
            self.deny(false).await;
            return GateDecision::RedirectToSignIn;
        }

        tracing::debug!("allowing {} for site {}", route, session.site_id);
        GateDecision::Allow
    }

    async fn deny(&self, clear_session: bool) {
        if let Err(e) = self.identity.sign_out().await {
            tracing::debug!("sign-out during redirect failed: {}", e);
        }
        if clear_session {
            if let Err(e) = self.sessions.clear() {
                tracing::warn!("could not clear site session: {}", e);
            }
        }
    }
}
