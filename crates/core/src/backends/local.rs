//! File-backed implementation of the remote collaborators.
//!
//! Accounts, site memberships, sites and locations are read from `accounts.yaml` under the data
//! directory. Passwords are stored as unsalted SHA-256 hex digests, which is enough for a
//! single-machine stand-in for the remote identity provider and nothing more: this backend is
//! not a production credential store. The credential issued at sign-in is
//! kept in the device's key-value store, and visits are written one JSON file each in a sharded
//! tree:
//!
//! ```text
//! <data_dir>/visits/<s1>/<s2>/<id>.json
//! ```
//!
//! where `s1`/`s2` are the first four hex characters of the visit id.

use crate::config::CampaignConfig;
use crate::constants::AUTH_CREDENTIAL_KEY;
use crate::error::{CampaignError, CampaignResult, RemoteError, RemoteResult, StorageError};
use crate::remote::{Credential, IdentityProvider, Location, Site, SiteDirectory, VisitStore};
use crate::storage::KeyValueStore;
use crate::visit::{StoredVisit, VisitPage, VisitQuery, VisitRow};
use campaign_uuid::RecordId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// SHA-256 of `password`, lowercase hex.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    pub password_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
}

/// Contents of `accounts.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsFile {
    #[serde(default)]
    pub users: Vec<UserAccount>,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl AccountsFile {
    /// Reads the accounts file. A missing file is an empty directory.
    pub fn load(path: &Path) -> CampaignResult<Self> {
        let yaml = match fs::read_to_string(path) {
            Ok(yaml) => yaml,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("accounts file {} not found, no accounts loaded", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(CampaignError::AccountsRead(e)),
        };
        serde_yaml::from_str(&yaml).map_err(CampaignError::AccountsParse)
    }

    pub fn save(&self, path: &Path) -> CampaignResult<()> {
        let yaml = serde_yaml::to_string(self).map_err(CampaignError::AccountsSerialization)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CampaignError::AccountsWrite)?;
        }
        fs::write(path, yaml).map_err(CampaignError::AccountsWrite)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&UserAccount> {
        let email = email.trim();
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn user(&self, user_id: &str) -> Option<&UserAccount> {
        self.users.iter().find(|u| u.id == user_id)
    }

    /// Adds a user, or resets the password and site of an existing one with the same email.
    ///
    /// Returns the user's id.
    pub fn upsert_user(&mut self, email: &str, password: &str, site_id: Option<String>) -> String {
        let email = email.trim();
        let password_sha256 = hash_password(password);
        if let Some(user) = self
            .users
            .iter_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))
        {
            user.password_sha256 = password_sha256;
            user.site_id = site_id;
            return user.id.clone();
        }

        let id = RecordId::new().to_string();
        self.users.push(UserAccount {
            id: id.clone(),
            email: email.to_string(),
            password_sha256,
            site_id,
        });
        id
    }

    pub fn upsert_site(&mut self, site: Site) {
        match self.sites.iter_mut().find(|s| s.id == site.id) {
            Some(existing) => *existing = site,
            None => self.sites.push(site),
        }
    }

    pub fn upsert_location(&mut self, location: Location) {
        match self.locations.iter_mut().find(|l| l.id == location.id) {
            Some(existing) => *existing = location,
            None => self.locations.push(location),
        }
    }
}

/// Identity provider, site directory and visit store backed by the local data directory.
#[derive(Debug)]
pub struct LocalBackend<K> {
    accounts: AccountsFile,
    credentials: K,
    visits_dir: PathBuf,
}

impl<K: KeyValueStore> LocalBackend<K> {
    /// Loads `accounts.yaml` and ensures the visits directory exists.
    pub fn open(config: &CampaignConfig, credentials: K) -> CampaignResult<Self> {
        let accounts = AccountsFile::load(&config.accounts_file())?;
        let visits_dir = config.visits_dir();
        fs::create_dir_all(&visits_dir).map_err(StorageError::DirCreation)?;

        tracing::debug!(
            "loaded {} account(s) and {} site(s) from {}",
            accounts.users.len(),
            accounts.sites.len(),
            config.accounts_file().display()
        );

        Ok(Self {
            accounts,
            credentials,
            visits_dir,
        })
    }

    pub fn accounts(&self) -> &AccountsFile {
        &self.accounts
    }

    fn stored_credential(&self) -> RemoteResult<Option<Credential>> {
        let raw = self
            .credentials
            .get(AUTH_CREDENTIAL_KEY)
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                tracing::warn!("discarding unreadable credential: {}", e);
                let _ = self.credentials.remove(AUTH_CREDENTIAL_KEY);
                Err(RemoteError::StaleCredential)
            }
        }
    }

    fn read_visit(path: &Path) -> Option<StoredVisit> {
        let json = fs::read_to_string(path)
            .map_err(|e| tracing::warn!("skipping unreadable visit {}: {}", path.display(), e))
            .ok()?;
        serde_json::from_str(&json)
            .map_err(|e| tracing::warn!("skipping malformed visit {}: {}", path.display(), e))
            .ok()
    }

    /// Every visit file under the sharded visits directory.
    fn all_visits(&self) -> Vec<StoredVisit> {
        let mut visits = Vec::new();
        let Ok(s1_entries) = fs::read_dir(&self.visits_dir) else {
            return visits;
        };

        for s1 in s1_entries.flatten() {
            if !s1.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let Ok(s2_entries) = fs::read_dir(s1.path()) else {
                continue;
            };
            for s2 in s2_entries.flatten() {
                if !s2.file_type().is_ok_and(|t| t.is_dir()) {
                    continue;
                }
                let Ok(files) = fs::read_dir(s2.path()) else {
                    continue;
                };
                for file in files.flatten() {
                    let path = file.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        visits.extend(Self::read_visit(&path));
                    }
                }
            }
        }

        visits
    }
}

impl<K: KeyValueStore> IdentityProvider for LocalBackend<K> {
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Credential> {
        let user = self
            .accounts
            .user_by_email(email)
            .filter(|u| u.password_sha256.eq_ignore_ascii_case(&hash_password(password)))
            .ok_or(RemoteError::InvalidCredentials)?;

        let credential = Credential {
            user_id: user.id.clone(),
            email: user.email.clone(),
            access_token: RecordId::new().to_string(),
            issued_at: Utc::now(),
        };
        let json = serde_json::to_string(&credential)
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        self.credentials
            .set(AUTH_CREDENTIAL_KEY, &json)
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        tracing::info!("issued credential for {}", credential.email);
        Ok(credential)
    }

    /// Fails with [`RemoteError::StaleCredential`] when the stored credential is unreadable or
    /// its account has since been removed.
    async fn active_credential(&self) -> RemoteResult<Option<Credential>> {
        let Some(credential) = self.stored_credential()? else {
            return Ok(None);
        };
        if self.accounts.user(&credential.user_id).is_none() {
            return Err(RemoteError::StaleCredential);
        }
        Ok(Some(credential))
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        self.credentials
            .remove(AUTH_CREDENTIAL_KEY)
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }
}

impl<K: KeyValueStore> SiteDirectory for LocalBackend<K> {
    async fn site_for_user(&self, user_id: &str) -> RemoteResult<Option<String>> {
        Ok(self
            .accounts
            .user(user_id)
            .and_then(|u| u.site_id.clone()))
    }

    async fn site(&self, site_id: &str) -> RemoteResult<Option<Site>> {
        Ok(self.accounts.sites.iter().find(|s| s.id == site_id).cloned())
    }

    async fn location(&self, location_id: &str) -> RemoteResult<Option<Location>> {
        Ok(self
            .accounts
            .locations
            .iter()
            .find(|l| l.id == location_id)
            .cloned())
    }
}

impl<K: KeyValueStore> VisitStore for LocalBackend<K> {
    /// Writes to a temporary file in the shard directory and renames it into place.
    async fn insert(&self, row: &VisitRow) -> RemoteResult<StoredVisit> {
        let stored = StoredVisit {
            id: RecordId::new(),
            created_at: Utc::now(),
            row: row.clone(),
        };

        let target = stored.id.sharded_file(&self.visits_dir, "json");
        let shard = stored.id.shard_dir(&self.visits_dir);
        fs::create_dir_all(&shard)
            .map_err(|e| RemoteError::server(format!("failed to create visit directory: {e}")))?;

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| RemoteError::server(format!("failed to serialize visit: {e}")))?;
        let partial = target.with_extension("json.partial");
        fs::write(&partial, json)
            .map_err(|e| RemoteError::server(format!("failed to write visit: {e}")))?;
        if let Err(e) = fs::rename(&partial, &target) {
            let _ = fs::remove_file(&partial);
            return Err(RemoteError::server(format!("failed to write visit: {e}")));
        }

        Ok(stored)
    }

    async fn query(&self, query: &VisitQuery) -> RemoteResult<VisitPage> {
        Ok(query.apply(self.all_visits()))
    }
}
