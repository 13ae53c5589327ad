//! Filesystem namespace: trait + directory-tree implementation.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::identity::UserId;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NamespaceError {
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("path is a symlink: {path:?}")]
    Symlink { path: PathBuf },
}

pub trait NamespaceStore: Send + Sync {
    /// Create the entry directory. Idempotent: an existing entry is not an
    /// error, so a caller retrying after an ambiguous failure is safe.
    fn create(&self, id: &UserId) -> Result<(), NamespaceError>;

    /// Remove the entry directory and all contents.
    fn remove(&self, id: &UserId) -> Result<(), NamespaceError>;

    /// Move the entry under the quarantine root, creating the root if
    /// absent. A previously quarantined entry with the same key is
    /// replaced (last write wins).
    fn relocate(&self, id: &UserId) -> Result<(), NamespaceError>;

    /// Entries currently present under the namespace root. An absent root
    /// reads as empty.
    fn list_entries(&self) -> Result<BTreeSet<UserId>, NamespaceError>;
}

/// Directory-per-user namespace rooted at a configured path.
#[derive(Debug)]
pub struct FsNamespaceStore {
    root: PathBuf,
    quarantine_root: PathBuf,
}

impl FsNamespaceStore {
    pub fn new(root: &Path, quarantine_root: &Path) -> Result<Self, NamespaceError> {
        reject_symlink(root)?;
        reject_symlink(quarantine_root)?;
        Ok(Self {
            root: root.to_path_buf(),
            quarantine_root: quarantine_root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn quarantine_root(&self) -> &Path {
        &self.quarantine_root
    }

    fn entry_path(&self, id: &UserId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn quarantine_path(&self, id: &UserId) -> PathBuf {
        self.quarantine_root.join(id.to_string())
    }
}

impl NamespaceStore for FsNamespaceStore {
    fn create(&self, id: &UserId) -> Result<(), NamespaceError> {
        let path = self.entry_path(id);
        fs::create_dir_all(&path).map_err(|source| NamespaceError::Io { path, source })
    }

    fn remove(&self, id: &UserId) -> Result<(), NamespaceError> {
        let path = self.entry_path(id);
        fs::remove_dir_all(&path).map_err(|source| NamespaceError::Io { path, source })
    }

    fn relocate(&self, id: &UserId) -> Result<(), NamespaceError> {
        let from = self.entry_path(id);
        let to = self.quarantine_path(id);

        fs::create_dir_all(&self.quarantine_root).map_err(|source| NamespaceError::Io {
            path: self.quarantine_root.clone(),
            source,
        })?;

        // rename refuses to replace a non-empty directory; drop any
        // previously quarantined entry with the same key first.
        match fs::remove_dir_all(&to) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(NamespaceError::Io { path: to, source }),
        }

        fs::rename(&from, &to).map_err(|source| NamespaceError::Io { path: from, source })
    }

    fn list_entries(&self) -> Result<BTreeSet<UserId>, NamespaceError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(source) => {
                return Err(NamespaceError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| NamespaceError::Io {
                path: self.root.clone(),
                source,
            })?;
            let file_type = entry.file_type().map_err(|source| NamespaceError::Io {
                path: entry.path(),
                source,
            })?;
            if !file_type.is_dir() {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                tracing::warn!(path = %entry.path().display(), "skipping non-utf8 namespace entry");
                continue;
            };
            // Only names already in canonical form are addressable by
            // remove/relocate; anything else is noise in the root.
            match UserId::parse_str(name) {
                Ok(id) if id.to_string() == name => {
                    ids.insert(id);
                }
                _ => {
                    tracing::warn!(entry = %name, "skipping namespace entry that is not a user id");
                }
            }
        }
        Ok(ids)
    }
}

fn reject_symlink(path: &Path) -> Result<(), NamespaceError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(NamespaceError::Symlink {
            path: path.to_path_buf(),
        }),
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(NamespaceError::Io {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}
