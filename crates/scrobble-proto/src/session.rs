//! The remembered login: a handle plus its expiry, stored as JSON.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logins are remembered for 30 days.
pub fn session_lifetime() -> Duration {
    Duration::days(30)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub handle: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

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

    /// The stored handle, unless missing, unreadable or expired.
    pub fn load(&self) -> Option<Session> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let session: Session = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                warn!("[session] ignoring unreadable {}: {}", self.path.display(), e);
                return None;
            }
        };
        if session.is_expired(Utc::now()) {
            info!("[session] login for {} expired", session.handle);
            return None;
        }
        Some(session)
    }

    pub fn save(&self, handle: &str) -> anyhow::Result<Session> {
        let session = Session {
            handle: handle.to_string(),
            expires_at: Utc::now() + session_lifetime(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&session)?)?;
        info!("[session] logged in as {}", handle);
        Ok(session)
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
