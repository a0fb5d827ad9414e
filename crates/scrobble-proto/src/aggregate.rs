//! Builds the merged friends feed.
//!
//! A call runs `Idle → FetchingPrimary → {FetchingFriendsPaged |
//! FetchingActiveOnly} → Merging → Sorted → Done`. Only a failed friends-list
//! request ends in `Failed`; per-handle activity failures are absorbed by
//! [`LastfmClient::fetch_recent`].
//!
//! Progress is reported on an optional channel. Every event for a page or
//! batch is sent before that page or batch is fetched, and the stream always
//! ends with a `Done` or `Failed` event.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::LastfmClient;
use crate::error::Result;
use crate::model::{lookback_window, AggregationStage, FetchProgress, Scrobble};
use crate::recent::RecentActivity;
use crate::transport::Transport;

pub type ProgressSender = mpsc::UnboundedSender<FetchProgress>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<FetchProgress>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Which kind of feed build to run.
#[derive(Debug, Clone)]
pub enum RefreshRequest {
    /// Walk the whole friends list.
    FullRebuild,
    /// Re-fetch only `active_handles`. Plays of everyone else, and of
    /// re-fetched handles that came back empty, are carried over from
    /// `previous` while they are still inside the window.
    Incremental {
        active_handles: BTreeSet<String>,
        previous: Vec<Scrobble>,
    },
}

/// Handles with at least one play inside the lookback window.
pub fn active_handles(feed: &[Scrobble], now: DateTime<Utc>) -> BTreeSet<String> {
    let window_start = now - lookback_window();
    feed.iter()
        .filter(|s| s.timestamp >= window_start)
        .map(|s| s.handle.clone())
        .collect()
}

/// Newest first; equal timestamps keep their insertion order. Repeated plays
/// (same handle, time and track) are kept once.
pub fn sort_feed(mut scrobbles: Vec<Scrobble>) -> Vec<Scrobble> {
    let mut seen = HashSet::new();
    scrobbles.retain(|s| seen.insert((s.handle.clone(), s.timestamp, s.track.clone())));
    scrobbles.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    scrobbles
}

struct Progress<'a> {
    tx: Option<&'a ProgressSender>,
    stage: AggregationStage,
}

impl<'a> Progress<'a> {
    fn new(tx: Option<&'a ProgressSender>) -> Self {
        Self {
            tx,
            stage: AggregationStage::Idle,
        }
    }

    fn enter(&mut self, stage: AggregationStage) {
        debug!("[aggregate] {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn emit(&self, progress: FetchProgress) {
        if let Some(tx) = self.tx {
            // A dropped receiver just means nobody is watching.
            let _ = tx.send(progress);
        }
    }

    fn finish(&mut self, stage: AggregationStage, status: String, processed: usize) {
        self.enter(stage);
        self.emit(FetchProgress {
            stage,
            current_page: 0,
            total_pages: 0,
            users_processed: processed,
            users_total: processed,
            status,
        });
    }
}

pub struct Aggregator<T> {
    client: LastfmClient<T>,
    recent_limit: u32,
}

impl<T: Transport> Aggregator<T> {
    pub fn new(client: LastfmClient<T>, recent_limit: u32) -> Self {
        Self {
            client,
            recent_limit,
        }
    }

    pub fn client(&self) -> &LastfmClient<T> {
        &self.client
    }

    /// Build `primary`'s feed: their own plays plus their friends'.
    ///
    /// Fails only when the friends list cannot be read.
    pub async fn aggregate(
        &self,
        primary: &str,
        request: RefreshRequest,
        progress: Option<&ProgressSender>,
    ) -> Result<Vec<Scrobble>> {
        let mut progress = Progress::new(progress);

        progress.enter(AggregationStage::FetchingPrimary);
        let own = self.client.fetch_recent(primary, self.recent_limit, false).await;
        let primary_quiet = !own.has_recent_activity;
        let mut collected = own.scrobbles;

        let processed = match request {
            RefreshRequest::FullRebuild => {
                progress.enter(AggregationStage::FetchingFriendsPaged);
                match self.collect_friends(primary, &mut progress, &mut collected).await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("[aggregate] friends of {} unavailable: {}", primary, e);
                        progress.finish(AggregationStage::Failed, e.to_string(), 0);
                        return Err(e);
                    }
                }
            }
            RefreshRequest::Incremental {
                active_handles,
                previous,
            } => {
                progress.enter(AggregationStage::FetchingActiveOnly);
                let mut quiet = self
                    .collect_active(primary, &active_handles, &mut progress, &mut collected)
                    .await;
                if primary_quiet {
                    quiet.insert(primary.to_string());
                }

                // A handle that came back empty may just have failed; its
                // earlier plays stay until they leave the window.
                progress.enter(AggregationStage::Merging);
                let window_start = Utc::now() - lookback_window();
                collected.extend(previous.into_iter().filter(|s| {
                    let refetched = s.handle == primary || active_handles.contains(&s.handle);
                    (!refetched || quiet.contains(&s.handle)) && s.timestamp >= window_start
                }));
                active_handles.iter().filter(|h| *h != primary).count() + 1
            }
        };

        if progress.stage != AggregationStage::Merging {
            progress.enter(AggregationStage::Merging);
        }
        let feed = sort_feed(collected);
        progress.enter(AggregationStage::Sorted);

        info!(
            "[aggregate] {}: {} scrobbles from {} users",
            primary,
            feed.len(),
            processed
        );
        progress.finish(
            AggregationStage::Done,
            format!("Loaded {} scrobbles", feed.len()),
            processed,
        );
        Ok(feed)
    }

    /// Walk every friends page in order, fanning out within a page.
    /// Returns the number of users processed, the primary included.
    async fn collect_friends(
        &self,
        primary: &str,
        progress: &mut Progress<'_>,
        collected: &mut Vec<Scrobble>,
    ) -> Result<usize> {
        let first = self.client.list_friends(primary, 1).await?;
        let total_pages = first.total_pages;
        let users_total = usize::try_from(first.total_friends).unwrap_or(usize::MAX).saturating_add(1);
        let mut users_processed = 1;
        let mut first = Some(first);

        let mut current_page = 1;
        while current_page <= total_pages {
            progress.emit(FetchProgress {
                stage: AggregationStage::FetchingFriendsPaged,
                current_page,
                total_pages,
                users_processed,
                users_total,
                status: format!("Loading page {} of {}...", current_page, total_pages),
            });

            let page = match first.take() {
                Some(page) => page,
                None => self.client.list_friends(primary, current_page).await?,
            };

            let fetches = page
                .friends
                .iter()
                .filter(|f| f.handle != primary)
                .map(|f| self.client.fetch_recent(&f.handle, self.recent_limit, false));
            for activity in join_all(fetches).await {
                keep_if_active(activity, collected);
            }

            users_processed += page.friends.len();
            current_page += 1;
        }
        Ok(users_processed)
    }

    /// Re-fetch `active_handles` concurrently. Returns the handles whose
    /// fetch found nothing.
    async fn collect_active(
        &self,
        primary: &str,
        active_handles: &BTreeSet<String>,
        progress: &mut Progress<'_>,
        collected: &mut Vec<Scrobble>,
    ) -> HashSet<String> {
        let handles: Vec<&String> = active_handles.iter().filter(|h| *h != primary).collect();
        progress.emit(FetchProgress {
            stage: AggregationStage::FetchingActiveOnly,
            current_page: 1,
            total_pages: 1,
            users_processed: 1,
            users_total: handles.len() + 1,
            status: format!("Refreshing {} active users...", handles.len()),
        });

        let fetches = handles
            .iter()
            .map(|h| self.client.fetch_recent(h, self.recent_limit, false));
        let mut quiet = HashSet::new();
        for (handle, activity) in handles.iter().zip(join_all(fetches).await) {
            if !activity.has_recent_activity {
                quiet.insert((*handle).clone());
            }
            keep_if_active(activity, collected);
        }
        quiet
    }

    /// Cheap activity check for a single handle.
    pub async fn probe(&self, handle: &str) -> bool {
        self.client.fetch_recent(handle, 1, true).await.has_recent_activity
    }
}

fn keep_if_active(activity: RecentActivity, collected: &mut Vec<Scrobble>) {
    if activity.has_recent_activity {
        collected.extend(activity.scrobbles);
    }
}
