//! Durable storage for the session bearer token.
//!
//! A dumb durable cell: one fixed key, visible across reloads of the same
//! client profile. No expiry logic lives here; the manager decides when a
//! stored token must be purged.

use super::SessionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Fixed file name the token is stored under.
pub const TOKEN_FILE: &str = "token.json";

#[derive(Serialize, Deserialize, Debug)]
struct StoredToken {
    token: String,
}

/// File-backed token cell under a client-profile state directory.
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The store's root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    pub fn save(&self, token: &str) -> Result<(), SessionError> {
        let final_path = self.path();
        let tmp_path = self.dir.join(".token.json.tmp");

        let json = serde_json::to_string_pretty(&StoredToken {
            token: token.to_string(),
        })?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Load the stored token. A missing or malformed file yields `None`;
    /// malformed content is logged and treated as absent rather than
    /// wedging session setup.
    pub fn load(&self) -> Result<Option<String>, SessionError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<StoredToken>(&json) {
            Ok(stored) => Ok(Some(stored.token)),
            Err(e) => {
                warn!("ignoring malformed token file at {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Delete the stored token. Deleting an absent token is not an error.
    pub fn delete(&self) -> Result<(), SessionError> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
