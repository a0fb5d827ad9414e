use thiserror::Error;

/// Last.fm error code for an unknown user.
pub const LASTFM_USER_NOT_FOUND: i64 = 6;

/// Failures talking to the Last.fm web service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("last.fm returned HTTP {0}")]
    Status(u16),
    #[error("last.fm error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("malformed last.fm response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum LastfmError {
    #[error("user {0:?} not found")]
    NotFound(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl LastfmError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for LastfmError {
    fn from(e: reqwest::Error) -> Self {
        Self::Service(ServiceError::Transport(e))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<serde_json::Error> for LastfmError {
    fn from(e: serde_json::Error) -> Self {
        Self::Service(e.into())
    }
}

pub type Result<T, E = LastfmError> = std::result::Result<T, E>;
