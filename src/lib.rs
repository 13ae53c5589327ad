#![forbid(unsafe_code)]

pub mod allocator;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod namespace;
mod paths;
pub mod provision;
pub mod reconcile;
pub mod record;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the core types at crate root for convenience
pub use crate::allocator::IdentifierAllocator;
pub use crate::identity::{InvalidId, SecretDigest, UserId};
pub use crate::namespace::{FsNamespaceStore, NamespaceError, NamespaceStore};
pub use crate::provision::{NamespaceOutcome, ProvisionError, Provisioned, ProvisioningService};
pub use crate::reconcile::{EntryFailure, ReconcileMode, ReconcileReport, ReconciliationEngine};
pub use crate::record::{RecordStore, RecordStoreError, SqliteRecordStore, UserRecord, UserStatus};
