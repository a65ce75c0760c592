//! Implementations of [`IdentityProvider`](crate::remote::IdentityProvider),
//! [`SiteDirectory`](crate::remote::SiteDirectory) and [`VisitStore`](crate::remote::VisitStore).

pub mod local;
pub mod memory;

pub use local::{hash_password, AccountsFile, LocalBackend, UserAccount};
pub use memory::{MemoryIdentityProvider, MemorySiteDirectory, MemoryVisitStore};
