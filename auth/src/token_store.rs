//! Durable session record: the provider's opaque token storage.
//!
//! A single JSON file holding the uid and refresh token, written with the
//! temp-file-plus-rename pattern and owner-only permissions. Anything
//! unreadable or unparsable degrades to "no persisted session" — a stale or
//! corrupt record must never wedge startup.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredSession {
    pub uid: String,
    pub refresh_token: String,
}

/// Default location of the persisted session record.
#[must_use]
pub fn default_session_file() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("parley").join("session.json"))
}

pub(crate) fn load(path: &Path) -> Option<StoredSession> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read session file: {e}");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Discarding corrupt session file: {e}");
            None
        }
    }
}

pub(crate) fn save(path: &Path, session: &StoredSession) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
    }
    let bytes = serde_json::to_vec_pretty(session)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove the session record. Absence is success; any other failure is
/// logged and swallowed — sign-out must not fail over a file.
pub(crate) fn clear(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to remove session file: {e}");
        }
    }
}
