use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use homestead::{
    FsNamespaceStore, NamespaceStore, ProvisioningService, ReconciliationEngine, RecordStore,
    SqliteRecordStore,
};

pub const MAX_ATTEMPTS: u32 = 64;

/// Record + namespace stores over a temp data dir.
pub struct TempStores {
    temp: TempDir,
    pub records: Arc<SqliteRecordStore>,
    pub namespaces: Arc<FsNamespaceStore>,
}

impl TempStores {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp data dir");
        let records = SqliteRecordStore::open(&temp.path().join("identity.sqlite"))
            .expect("open record store");
        let namespaces =
            FsNamespaceStore::new(&temp.path().join("users"), &temp.path().join("quarantine"))
                .expect("open namespace store");
        Self {
            temp,
            records: Arc::new(records),
            namespaces: Arc::new(namespaces),
        }
    }

    pub fn namespace_root(&self) -> PathBuf {
        self.temp.path().join("users")
    }

    pub fn quarantine_root(&self) -> PathBuf {
        self.temp.path().join("quarantine")
    }

    pub fn service(&self) -> ProvisioningService {
        ProvisioningService::new(
            Arc::clone(&self.records) as Arc<dyn RecordStore>,
            Arc::clone(&self.namespaces) as Arc<dyn NamespaceStore>,
            MAX_ATTEMPTS,
        )
    }

    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Arc::clone(&self.records) as Arc<dyn RecordStore>,
            Arc::clone(&self.namespaces) as Arc<dyn NamespaceStore>,
        )
    }
}
