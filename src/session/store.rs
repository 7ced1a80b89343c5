//! On-disk persistence of the session credential

use crate::session::{Credential, SessionError, SessionResult};
use chrono::{Duration, Utc};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Holds the persisted credential and decides whether it is still usable
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    ttl: Duration,
}

impl CredentialStore {
    /// Creates a store backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads the persisted credential
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Credential))` - A credential was found (it may be stale)
    /// * `Ok(None)` - No credential file exists
    /// * `Err(SessionError::Malformed)` - The file exists but cannot be decoded
    pub fn load(&self) -> SessionResult<Option<Credential>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let credential = serde_json::from_str(&content)
            .map_err(|e| SessionError::Malformed(e.to_string()))?;
        Ok(Some(credential))
    }

    /// Persists the credential, replacing any previous one
    ///
    /// The new content is written to a sibling temp file and renamed over the
    /// target, so a crash mid-write leaves the old credential intact.
    pub fn save(&self, credential: &Credential) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(credential)?;
        let tmp_path = self.temp_path();
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::info!("Session credential saved to {}", self.path.display());
        Ok(())
    }

    /// Returns true if the credential is inside its TTL window
    pub fn is_valid(&self, credential: &Credential) -> bool {
        credential.is_valid_at(self.ttl, Utc::now())
    }

    /// Loads the credential and fails with `SessionError::Expired` unless it is usable
    ///
    /// Missing, malformed and stale credentials are all reported as expired:
    /// in every case the caller has to re-authenticate.
    pub fn load_valid(&self) -> SessionResult<Credential> {
        let credential = match self.load() {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                return Err(SessionError::Expired(format!(
                    "no credential stored at {}",
                    self.path.display()
                )))
            }
            Err(SessionError::Malformed(reason)) => {
                tracing::warn!("Ignoring unreadable credential file: {}", reason);
                return Err(SessionError::Expired(format!(
                    "credential file is malformed: {}",
                    reason
                )));
            }
            Err(e) => return Err(e),
        };

        if !self.is_valid(&credential) {
            let hours = credential.age(Utc::now()).num_hours();
            return Err(SessionError::Expired(format!(
                "credential issued {} hours ago exceeds ttl of {} hours",
                hours,
                self.ttl.num_hours()
            )));
        }

        Ok(credential)
    }

    /// Removes the persisted credential (no-op if absent)
    pub fn clear(&self) -> SessionResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Session credential cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
