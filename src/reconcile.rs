//! Divergence scan between the identity table and the namespace tree.

use std::sync::Arc;

use serde::Serialize;

use crate::Error;
use crate::identity::UserId;
use crate::namespace::NamespaceStore;
use crate::record::RecordStore;

/// What to do with a namespace entry that has no active record behind it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Delete the orphaned entry and its contents.
    Purge,
    /// Move the orphaned entry under the quarantine root.
    Quarantine,
}

/// Aggregate outcome of one scan.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub removed: Vec<UserId>,
    pub relocated: Vec<UserId>,
    pub healed: Vec<UserId>,
    pub errors: Vec<EntryFailure>,
}

impl ReconcileReport {
    /// True when the scan found nothing to repair and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.relocated.is_empty()
            && self.healed.is_empty()
            && self.errors.is_empty()
    }
}

/// A divergence that could not be repaired this run.
#[derive(Clone, Debug, Serialize)]
pub struct EntryFailure {
    pub id: UserId,
    pub reason: String,
}

/// Compares active records against namespace entries and repairs both
/// directions of divergence.
///
/// Designed to run one instance at a time; a provisioning call in flight
/// between its record insert and namespace create shows up as a gap and is
/// simply re-healed on the next scan.
pub struct ReconciliationEngine {
    records: Arc<dyn RecordStore>,
    namespaces: Arc<dyn NamespaceStore>,
}

impl ReconciliationEngine {
    pub fn new(records: Arc<dyn RecordStore>, namespaces: Arc<dyn NamespaceStore>) -> Self {
        Self {
            records,
            namespaces,
        }
    }

    /// One full scan. Every divergence is either repaired and listed in the
    /// report or recorded under `errors`; one bad entry never blocks the
    /// rest. Re-running against unchanged state yields an empty report.
    pub fn reconcile(&self, mode: ReconcileMode) -> Result<ReconcileReport, Error> {
        let active = self.records.list_active()?;
        let entries = self.namespaces.list_entries()?;

        let mut report = ReconcileReport::default();

        for id in entries.difference(&active) {
            match mode {
                ReconcileMode::Purge => match self.namespaces.remove(id) {
                    Ok(()) => {
                        tracing::info!(user_id = %id, "removed orphaned namespace entry");
                        report.removed.push(*id);
                    }
                    Err(err) => {
                        tracing::warn!(user_id = %id, error = %err, "failed to remove orphaned entry");
                        report.errors.push(EntryFailure {
                            id: *id,
                            reason: err.to_string(),
                        });
                    }
                },
                ReconcileMode::Quarantine => match self.namespaces.relocate(id) {
                    Ok(()) => {
                        tracing::info!(user_id = %id, "quarantined orphaned namespace entry");
                        report.relocated.push(*id);
                    }
                    Err(err) => {
                        tracing::warn!(user_id = %id, error = %err, "failed to quarantine orphaned entry");
                        report.errors.push(EntryFailure {
                            id: *id,
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }

        for id in active.difference(&entries) {
            match self.namespaces.create(id) {
                Ok(()) => {
                    tracing::info!(user_id = %id, "created missing namespace entry");
                    report.healed.push(*id);
                }
                Err(err) => {
                    tracing::warn!(user_id = %id, error = %err, "failed to create missing entry");
                    report.errors.push(EntryFailure {
                        id: *id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            removed = report.removed.len(),
            relocated = report.relocated.len(),
            healed = report.healed.len(),
            errors = report.errors.len(),
            "reconciliation scan finished"
        );
        Ok(report)
    }
}
