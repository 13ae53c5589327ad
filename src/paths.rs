//! XDG directory helpers for data locations.

use std::path::PathBuf;

/// Base directory for persistent data (identity table, namespace roots).
///
/// Uses `HS_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/homestead` or
/// `~/.local/share/homestead`.
pub(crate) fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HS_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("homestead")
}

/// Identity table location.
pub(crate) fn identity_db_path() -> PathBuf {
    data_dir().join("identity.sqlite")
}

/// Root holding one directory per active user.
pub(crate) fn namespace_root() -> PathBuf {
    data_dir().join("users")
}

/// Root orphaned entries are relocated under.
pub(crate) fn quarantine_root() -> PathBuf {
    data_dir().join("quarantine")
}

/// Config file location.
pub(crate) fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
