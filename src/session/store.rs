//! The persisted session slot: one JSON file holding `{name, role}`.
//!
//! The file's modification time doubles as the last-activity mark shared
//! between CLI invocations and a running hub.

use super::SessionUser;
use crate::error::Result;
use log::{debug, error, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored user. A missing or unreadable file means signed out.
    pub fn load(&self) -> Option<SessionUser> {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<SessionUser>(&bytes) {
                Ok(user) => {
                    debug!("[Session] Restored {} from {:?}", user.name, self.path);
                    Some(user)
                }
                Err(e) => {
                    warn!("[Session] Ignoring unreadable session file: {}", e);
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                error!("[Session] Failed to read session file: {}", e);
                None
            }
        }
    }

    pub fn save(&self, user: &SessionUser) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(user)?)?;
        Ok(())
    }

    /// Last write to the session file, `None` when there is no file.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
