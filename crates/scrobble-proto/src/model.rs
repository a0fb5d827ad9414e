//! Core data types shared by the client, the aggregation engine and the
//! front ends.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Friends are listed 50 per page.
pub const FRIENDS_PAGE_SIZE: u32 = 50;

/// Profiles younger than this are served from cache; handles whose last
/// scrobble is older than this count as dormant.
pub fn inactivity_threshold() -> Duration {
    Duration::days(30)
}

/// Recent activity is looked for this far back from the fetch instant.
pub fn lookback_window() -> Duration {
    Duration::hours(24)
}

/// Dormant handles are re-checked at most this often.
pub fn dormant_recheck_interval() -> Duration {
    Duration::hours(24)
}

/// Image used when Last.fm has no artwork or avatar.
pub const PLACEHOLDER_IMAGE: &str =
    "https://lastfm.freetls.fastly.net/i/u/300x300/2a96cbd8b46e442fc41c2b86b821562f.png";

pub const LASTFM_WEB: &str = "https://www.last.fm";

/// One recorded play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scrobble {
    pub artist: String,
    pub album: Option<String>,
    pub track: String,
    pub image: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    /// Handle of the listener.
    pub handle: String,
}

impl Scrobble {
    /// Link to the listener's Last.fm profile.
    pub fn listener_url(&self) -> String {
        user_url(&self.handle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub handle: String,
    pub display_name: Option<String>,
    pub profile_url: String,
    pub image: String,
    pub last_scrobble: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Minimal profile for a handle only seen through its scrobbles.
    pub fn bare(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            display_name: None,
            profile_url: user_url(handle),
            image: PLACEHOLDER_IMAGE.to_string(),
            last_scrobble: None,
        }
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.handle)
    }
}

pub fn user_url(handle: &str) -> String {
    let mut url = match reqwest::Url::parse(LASTFM_WEB) {
        Ok(u) => u,
        Err(_) => return format!("{}/user/{}", LASTFM_WEB, handle),
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("user").push(handle);
    }
    url.to_string()
}

pub fn artist_url(artist: &str) -> String {
    let mut url = match reqwest::Url::parse(LASTFM_WEB) {
        Ok(u) => u,
        Err(_) => return format!("{}/music/{}", LASTFM_WEB, artist),
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("music").push(artist);
    }
    url.to_string()
}

/// Where an aggregation call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationStage {
    Idle,
    FetchingPrimary,
    FetchingFriendsPaged,
    FetchingActiveOnly,
    Merging,
    Sorted,
    Done,
    Failed,
}

impl AggregationStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Progress update emitted while a feed is being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchProgress {
    pub stage: AggregationStage,
    pub current_page: u32,
    pub total_pages: u32,
    pub users_processed: usize,
    pub users_total: usize,
    pub status: String,
}
