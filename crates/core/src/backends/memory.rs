//! In-process implementations of the remote collaborators.
//!
//! Used by tests and for demonstration runs without an accounts file.

use crate::clock::{Clock, SystemClock};
use crate::error::{RemoteError, RemoteResult};
use crate::remote::{Credential, IdentityProvider, Location, Site, SiteDirectory, VisitStore};
use crate::visit::{StoredVisit, VisitPage, VisitQuery, VisitRow};
use campaign_uuid::RecordId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct MemoryAccount {
    user_id: String,
    password: String,
}

/// Identity provider holding plain-text test accounts and at most one active credential.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    accounts: HashMap<String, MemoryAccount>,
    active: Mutex<Option<Credential>>,
    stale: AtomicBool,
    sign_outs: AtomicUsize,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, email: &str, password: &str, user_id: &str) -> Self {
        self.accounts.insert(
            email.to_lowercase(),
            MemoryAccount {
                user_id: user_id.to_string(),
                password: password.to_string(),
            },
        );
        self
    }

    /// Makes the held credential fail the next `active_credential` queries.
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Credential> {
        let email = email.trim().to_lowercase();
        let account = self
            .accounts
            .get(&email)
            .filter(|a| a.password == password)
            .ok_or(RemoteError::InvalidCredentials)?;

        let credential = Credential {
            user_id: account.user_id.clone(),
            email,
            access_token: RecordId::new().to_string(),
            issued_at: SystemClock.now(),
        };
        *lock(&self.active) = Some(credential.clone());
        self.stale.store(false, Ordering::SeqCst);
        Ok(credential)
    }

    async fn active_credential(&self) -> RemoteResult<Option<Credential>> {
        let active = lock(&self.active).clone();
        if active.is_some() && self.stale.load(Ordering::SeqCst) {
            return Err(RemoteError::StaleCredential);
        }
        Ok(active)
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *lock(&self.active) = None;
        Ok(())
    }
}

/// Site memberships, sites and locations held in maps.
#[derive(Debug, Default)]
pub struct MemorySiteDirectory {
    memberships: HashMap<String, String>,
    sites: HashMap<String, Site>,
    locations: HashMap<String, Location>,
    unavailable: AtomicBool,
}

impl MemorySiteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_membership(mut self, user_id: &str, site_id: &str) -> Self {
        self.memberships
            .insert(user_id.to_string(), site_id.to_string());
        self
    }

    pub fn with_site(mut self, site: Site) -> Self {
        self.sites.insert(site.id.clone(), site);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.insert(location.id.clone(), location);
        self
    }

    /// Makes site and location lookups fail as if the directory were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> RemoteResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("site directory offline".into()));
        }
        Ok(())
    }
}

impl SiteDirectory for MemorySiteDirectory {
    async fn site_for_user(&self, user_id: &str) -> RemoteResult<Option<String>> {
        Ok(self.memberships.get(user_id).cloned())
    }

    async fn site(&self, site_id: &str) -> RemoteResult<Option<Site>> {
        self.check_available()?;
        Ok(self.sites.get(site_id).cloned())
    }

    async fn location(&self, location_id: &str) -> RemoteResult<Option<Location>> {
        self.check_available()?;
        Ok(self.locations.get(location_id).cloned())
    }
}

/// Visit store keeping rows in a vector.
#[derive(Debug)]
pub struct MemoryVisitStore<C = SystemClock> {
    rows: Mutex<Vec<StoredVisit>>,
    fail_next: Mutex<Option<String>>,
    clock: C,
}

impl Default for MemoryVisitStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVisitStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> MemoryVisitStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            clock,
        }
    }

    /// The next insert fails with a server error carrying `message`.
    pub fn fail_next_insert(&self, message: &str) {
        *lock(&self.fail_next) = Some(message.to_string());
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Vec<StoredVisit> {
        lock(&self.rows).clone()
    }
}

impl<C: Clock> VisitStore for MemoryVisitStore<C> {
    async fn insert(&self, row: &VisitRow) -> RemoteResult<StoredVisit> {
        if let Some(message) = lock(&self.fail_next).take() {
            return Err(RemoteError::server(message));
        }
        let stored = StoredVisit {
            id: RecordId::new(),
            created_at: self.clock.now(),
            row: row.clone(),
        };
        lock(&self.rows).push(stored.clone());
        Ok(stored)
    }

    async fn query(&self, query: &VisitQuery) -> RemoteResult<VisitPage> {
        Ok(query.apply(self.rows()))
    }
}
