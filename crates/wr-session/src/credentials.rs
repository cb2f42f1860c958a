//! Persistence of the opaque credential blob
//!
//! The transport hands back updated authentication state during and after
//! the handshake; it must be written back immediately so a later reconnect
//! can resume the session without re-pairing. The blob is opaque bytes —
//! nothing here inspects it.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;

/// File-backed store for the credential blob
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Latest persisted blob, or `None` before first pairing
    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the blob. Idempotent; overwrites any previous state.
    pub fn save(&self, blob: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, blob)?;
        debug!(path = %self.path.display(), bytes = blob.len(), "credentials persisted");
        Ok(())
    }
}
