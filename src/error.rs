use thiserror::Error;

use crate::config::ConfigError;
use crate::identity::InvalidId;
use crate::namespace::NamespaceError;
use crate::provision::ProvisionError;
use crate::record::RecordStoreError;

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over the per-capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Id(#[from] InvalidId),

    #[error(transparent)]
    Record(#[from] RecordStoreError),

    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("json render failed: {0}")]
    Json(#[from] serde_json::Error),
}
