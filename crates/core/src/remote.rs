//! Remote collaborators: identity provider, site directory and visit store.
//!
//! These traits are the seams between the intake core and whatever hosts accounts and the
//! visits table. Operations are `async` because every call is a suspension point in the
//! operator's flow; implementations decide whether anything actually blocks.
//!
//! Implementations live in [`crate::backends`].

#![allow(async_fn_in_trait)]

use crate::error::RemoteResult;
use crate::visit::{StoredVisit, VisitPage, VisitQuery, VisitRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Proof of a signed-in operator account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
}

/// A physical outreach site as recorded in the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
}

/// A campaign location; several sites may share one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
}

pub trait IdentityProvider {
    /// Exchanges an email and password for a credential.
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Credential>;

    /// The credential currently held on this device, if any.
    ///
    /// A credential that exists but is no longer honoured yields
    /// [`RemoteError::StaleCredential`](crate::error::RemoteError::StaleCredential).
    async fn active_credential(&self) -> RemoteResult<Option<Credential>>;

    /// Revokes the credential held on this device.
    async fn sign_out(&self) -> RemoteResult<()>;
}

pub trait SiteDirectory {
    /// Site id the account is a member of.
    async fn site_for_user(&self, user_id: &str) -> RemoteResult<Option<String>>;

    async fn site(&self, site_id: &str) -> RemoteResult<Option<Site>>;

    async fn location(&self, location_id: &str) -> RemoteResult<Option<Location>>;
}

pub trait VisitStore {
    /// Writes one visit row. The row is either fully written or not written at all.
    async fn insert(&self, row: &VisitRow) -> RemoteResult<StoredVisit>;

    /// Newest-first page of visits matching `query`, with the exact total.
    async fn query(&self, query: &VisitQuery) -> RemoteResult<VisitPage>;
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Credential> {
        (**self).sign_in(email, password).await
    }

    async fn active_credential(&self) -> RemoteResult<Option<Credential>> {
        (**self).active_credential().await
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        (**self).sign_out().await
    }
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for &T {
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Credential> {
        (**self).sign_in(email, password).await
    }

    async fn active_credential(&self) -> RemoteResult<Option<Credential>> {
        (**self).active_credential().await
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        (**self).sign_out().await
    }
}

impl<T: SiteDirectory + ?Sized> SiteDirectory for Arc<T> {
    async fn site_for_user(&self, user_id: &str) -> RemoteResult<Option<String>> {
        (**self).site_for_user(user_id).await
    }

    async fn site(&self, site_id: &str) -> RemoteResult<Option<Site>> {
        (**self).site(site_id).await
    }

    async fn location(&self, location_id: &str) -> RemoteResult<Option<Location>> {
        (**self).location(location_id).await
    }
}

impl<T: SiteDirectory + ?Sized> SiteDirectory for &T {
    async fn site_for_user(&self, user_id: &str) -> RemoteResult<Option<String>> {
        (**self).site_for_user(user_id).await
    }

    async fn site(&self, site_id: &str) -> RemoteResult<Option<Site>> {
        (**self).site(site_id).await
    }

    async fn location(&self, location_id: &str) -> RemoteResult<Option<Location>> {
        (**self).location(location_id).await
    }
}

impl<T: VisitStore + ?Sized> VisitStore for Arc<T> {
    async fn insert(&self, row: &VisitRow) -> RemoteResult<StoredVisit> {
        (**self).insert(row).await
    }

    async fn query(&self, query: &VisitQuery) -> RemoteResult<VisitPage> {
        (**self).query(query).await
    }
}

impl<T: VisitStore + ?Sized> VisitStore for &T {
    async fn insert(&self, row: &VisitRow) -> RemoteResult<StoredVisit> {
        (**self).insert(row).await
    }

    async fn query(&self, query: &VisitQuery) -> RemoteResult<VisitPage> {
        (**self).query(query).await
    }
}
