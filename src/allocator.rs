//! Collision-checked user identifier allocation.

use std::sync::Arc;

use crate::identity::UserId;
use crate::provision::ProvisionError;
use crate::record::RecordStore;

/// Generates fresh identifiers, retrying on collision against the record
/// store.
///
/// The existence pre-check only avoids a doomed insert; the store's
/// primary-key constraint remains the source of truth, so the loop is safe
/// under arbitrary concurrent callers without locking.
pub struct IdentifierAllocator {
    records: Arc<dyn RecordStore>,
    max_attempts: u32,
}

impl IdentifierAllocator {
    pub fn new(records: Arc<dyn RecordStore>, max_attempts: u32) -> Self {
        Self {
            records,
            max_attempts,
        }
    }

    pub fn allocate(&self) -> Result<UserId, ProvisionError> {
        for _ in 0..self.max_attempts {
            let id = UserId::generate();
            if !self.records.exists(&id)? {
                return Ok(id);
            }
            tracing::warn!(user_id = %id, "generated id collides with an existing record, retrying");
        }
        Err(ProvisionError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}
