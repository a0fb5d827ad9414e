use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::client::LastfmClient;
use crate::error::ServiceError;
use crate::model::{dormant_recheck_interval, inactivity_threshold, lookback_window, Scrobble};
use crate::payload::{self, RecentTracksResponse};
use crate::transport::{Transport, METHOD_RECENT_TRACKS};

/// What a recent-activity fetch found for one handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentActivity {
    /// Plays inside the lookback window, as ordered by Last.fm (newest first).
    pub scrobbles: Vec<Scrobble>,
    pub has_recent_activity: bool,
}

impl<T: Transport> LastfmClient<T> {
    /// Fetch `handle`'s plays from the last 24 hours.
    ///
    /// With `probe_only` a single track is requested and only
    /// `has_recent_activity` is reported. Failures never propagate: they are
    /// logged and reported as no activity.
    pub async fn fetch_recent(&self, handle: &str, limit: u32, probe_only: bool) -> RecentActivity {
        let now = Utc::now();
        if self.is_dormant(handle, now) {
            debug!("[lastfm] {} dormant, skipping recent tracks", handle);
            return RecentActivity::default();
        }

        match self.request_recent(handle, limit, probe_only, now).await {
            Ok(activity) => activity,
            Err(e) => {
                warn!("[lastfm] recent tracks for {} failed: {}", handle, e);
                RecentActivity::default()
            }
        }
    }

    /// Last scrobble more than 30 days ago and checked within the last day.
    fn is_dormant(&self, handle: &str, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.cache.get(handle) else {
            return false;
        };
        let Some(last) = entry.profile.last_scrobble else {
            return false;
        };
        now - last > inactivity_threshold() && entry.age(now) < dormant_recheck_interval()
    }

    async fn request_recent(
        &self,
        handle: &str,
        limit: u32,
        probe_only: bool,
        now: DateTime<Utc>,
    ) -> Result<RecentActivity, ServiceError> {
        let window_start = now - lookback_window();
        let limit = if probe_only { 1 } else { limit.max(1) };

        let value = self
            .transport
            .call(
                METHOD_RECENT_TRACKS,
                &[
                    ("user", handle.to_string()),
                    ("from", window_start.timestamp().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let resp: RecentTracksResponse = payload::decode(value)?;

        let scrobbles: Vec<Scrobble> = resp
            .recenttracks
            .track
            .into_vec()
            .into_iter()
            .filter_map(|t| t.into_scrobble(handle))
            .filter(|s| s.timestamp >= window_start && s.timestamp <= now)
            .collect();

        if probe_only {
            return Ok(RecentActivity {
                scrobbles: Vec::new(),
                has_recent_activity: !scrobbles.is_empty(),
            });
        }

        if let Some(newest) = scrobbles.iter().max_by_key(|s| s.timestamp) {
            self.cache
                .record_activity(handle, newest.timestamp, &newest.image, Utc::now());
        }

        debug!("[lastfm] {}: {} recent scrobbles", handle, scrobbles.len());
        Ok(RecentActivity {
            has_recent_activity: !scrobbles.is_empty(),
            scrobbles,
        })
    }
}
