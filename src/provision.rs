//! User onboarding: allocate an identifier, persist the record, create the
//! namespace entry.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::allocator::IdentifierAllocator;
use crate::identity::{SecretDigest, UserId};
use crate::namespace::NamespaceStore;
use crate::record::{RecordStore, RecordStoreError, UserRecord};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProvisionError {
    #[error("{field} is invalid: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: &'static str,
    },
    #[error("user id allocation exhausted after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },
    #[error(transparent)]
    Record(#[from] RecordStoreError),
}

/// Result of a successful provisioning call.
#[derive(Clone, Debug, Serialize)]
pub struct Provisioned {
    pub user_id: UserId,
    pub namespace: NamespaceOutcome,
}

/// Whether the namespace directory came up together with the record.
///
/// `Deferred` is a degraded success: the record committed but the directory
/// could not be created. The next reconciliation run heals the gap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NamespaceOutcome {
    Created,
    Deferred { reason: String },
}

/// Composes the allocator and the two stores to onboard users.
///
/// Write ordering is record-first, namespace-second: a namespace failure
/// after the record commit is not rolled back, so the identifier namespace
/// never holds a reservation without a visible record behind it.
pub struct ProvisioningService {
    records: Arc<dyn RecordStore>,
    namespaces: Arc<dyn NamespaceStore>,
    allocator: IdentifierAllocator,
    max_attempts: u32,
}

impl ProvisioningService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        namespaces: Arc<dyn NamespaceStore>,
        max_attempts: u32,
    ) -> Self {
        let allocator = IdentifierAllocator::new(Arc::clone(&records), max_attempts);
        Self {
            records,
            namespaces,
            allocator,
            max_attempts,
        }
    }

    pub fn provision(
        &self,
        username: &str,
        contact: &str,
        secret: &str,
    ) -> Result<Provisioned, ProvisionError> {
        let username = required("username", username)?;
        let contact = required("contact", contact)?;
        if !contact.contains('@') {
            return Err(ProvisionError::InvalidInput {
                field: "contact",
                reason: "missing `@`",
            });
        }
        let secret = required("secret", secret)?;
        let digest = SecretDigest::from_secret(secret);

        let user_id = self.insert_record(username, contact, digest)?;

        let namespace = match self.namespaces.create(&user_id) {
            Ok(()) => NamespaceOutcome::Created,
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %err,
                    "namespace create failed after record commit, deferring to reconciliation"
                );
                NamespaceOutcome::Deferred {
                    reason: err.to_string(),
                }
            }
        };

        tracing::info!(user_id = %user_id, username = %username, "user provisioned");
        Ok(Provisioned { user_id, namespace })
    }

    /// Insert with a fresh identifier, retrying when a concurrent caller won
    /// the id between the allocator's pre-check and the insert.
    fn insert_record(
        &self,
        username: &str,
        contact: &str,
        digest: SecretDigest,
    ) -> Result<UserId, ProvisionError> {
        for _ in 0..self.max_attempts {
            let id = self.allocator.allocate()?;
            let record = UserRecord::active(id, username, contact, digest);
            match self.records.insert(&record) {
                Ok(()) => return Ok(id),
                Err(RecordStoreError::DuplicateIdentifier { id }) => {
                    tracing::warn!(user_id = %id, "id raced at insert, retrying with a fresh one");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ProvisionError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ProvisionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProvisionError::InvalidInput {
            field,
            reason: "empty",
        });
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_empty() {
        assert_eq!(required("username", "  alice ").unwrap(), "alice");
        assert!(matches!(
            required("username", "   "),
            Err(ProvisionError::InvalidInput {
                field: "username",
                ..
            })
        ));
    }

    #[test]
    fn namespace_outcome_serializes_with_state_tag() {
        let created = serde_json::to_value(NamespaceOutcome::Created).unwrap();
        assert_eq!(created["state"], "created");

        let deferred = serde_json::to_value(NamespaceOutcome::Deferred {
            reason: "disk full".to_string(),
        })
        .unwrap();
        assert_eq!(deferred["state"], "deferred");
        assert_eq!(deferred["reason"], "disk full");
    }
}
