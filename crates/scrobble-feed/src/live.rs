//! The displayed feed and the timer that keeps it fresh.
//!
//! The previous feed is only replaced by a successful refresh; a failed one
//! records the error and leaves the feed as it was. At most one refresh runs
//! at a time: a tick or request that arrives while one is in flight is
//! skipped rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scrobble_proto::{
    active_handles, progress_channel, Aggregator, FetchProgress, HttpTransport, RefreshRequest,
    Scrobble, Transport,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub type FeedAggregator = Aggregator<HttpTransport>;

/// Snapshot of everything a front end needs to draw the feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedState {
    /// Incremented every time the feed contents change.
    pub rev: u64,
    pub handle: String,
    pub scrobbles: Vec<Scrobble>,
    pub updated_at: Option<DateTime<Utc>>,
    pub refreshing: bool,
    pub progress: Option<FetchProgress>,
    pub last_error: Option<String>,
    pub last_notice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Full,
    Incremental,
    /// Timer refresh number `tick`: full on the first run and every
    /// `full_rebuild_every`th tick.
    Auto { tick: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was still running.
    Skipped,
    Rebuilt { scrobbles: usize },
    Refreshed { active: usize, scrobbles: usize },
    Failed(String),
}

impl RefreshOutcome {
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Skipped => None,
            Self::Rebuilt { scrobbles } => Some(format!("Loaded {} scrobbles", scrobbles)),
            Self::Refreshed { active: 0, .. } => Some("No active users to refresh".to_string()),
            Self::Refreshed { active: 1, .. } => Some("Updated 1 active user".to_string()),
            Self::Refreshed { active, .. } => Some(format!("Updated {} active users", active)),
            Self::Failed(e) => Some(format!("Failed to load scrobbles: {}", e)),
        }
    }
}

/// Decide between a full rebuild and an incremental refresh.
pub fn plan_refresh(
    mode: RefreshMode,
    full_rebuild_every: u32,
    previous: &[Scrobble],
    now: DateTime<Utc>,
) -> RefreshRequest {
    let full = match mode {
        RefreshMode::Full => true,
        RefreshMode::Incremental => previous.is_empty(),
        RefreshMode::Auto { tick } => {
            previous.is_empty() || tick % full_rebuild_every.max(1) == 0
        }
    };
    if full {
        RefreshRequest::FullRebuild
    } else {
        RefreshRequest::Incremental {
            active_handles: active_handles(previous, now),
            previous: previous.to_vec(),
        }
    }
}

/// Holds the in-flight flag; releasing happens on drop so a cancelled or
/// panicking refresh cannot wedge it.
struct RefreshGuard(Arc<AtomicBool>);

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct LiveFeed<T> {
    aggregator: Arc<Aggregator<T>>,
    handle: String,
    state: Arc<RwLock<FeedState>>,
    in_flight: Arc<AtomicBool>,
    full_rebuild_every: u32,
}

impl<T: Transport + 'static> LiveFeed<T> {
    pub fn new(aggregator: Arc<Aggregator<T>>, handle: String, full_rebuild_every: u32) -> Self {
        let state = FeedState {
            handle: handle.clone(),
            ..FeedState::default()
        };
        Self {
            aggregator,
            handle,
            state: Arc::new(RwLock::new(state)),
            in_flight: Arc::new(AtomicBool::new(false)),
            full_rebuild_every,
        }
    }

    pub fn aggregator(&self) -> &Arc<Aggregator<T>> {
        &self.aggregator
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub async fn snapshot(&self) -> FeedState {
        let mut state = self.state.read().await.clone();
        state.refreshing = self.is_refreshing();
        state
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Option<RefreshGuard> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            info!("[live] refresh already running, skipping");
            return None;
        }
        Some(RefreshGuard(Arc::clone(&self.in_flight)))
    }

    pub async fn refresh(&self, mode: RefreshMode) -> RefreshOutcome {
        let Some(_guard) = self.begin() else {
            return RefreshOutcome::Skipped;
        };
        self.run_refresh(mode).await
    }

    /// Start a refresh in the background. `false` when one is already running.
    pub fn spawn_refresh(self: &Arc<Self>, mode: RefreshMode) -> bool {
        let Some(guard) = self.begin() else {
            return false;
        };
        let live = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            live.run_refresh(mode).await;
        });
        true
    }

    async fn run_refresh(&self, mode: RefreshMode) -> RefreshOutcome {
        let previous = {
            let mut state = self.state.write().await;
            state.progress = None;
            state.scrobbles.clone()
        };

        let request = plan_refresh(mode, self.full_rebuild_every, &previous, Utc::now());
        let active = match &request {
            RefreshRequest::FullRebuild => None,
            RefreshRequest::Incremental { active_handles, .. } => {
                Some(active_handles.iter().filter(|h| **h != self.handle).count())
            }
        };

        // Mirror progress into the shared state while the build runs.
        let (tx, mut rx) = progress_channel();
        let progress_state = Arc::clone(&self.state);
        let forward = tokio::spawn(async move {
            while let Some(p) = rx.recv().await {
                progress_state.write().await.progress = Some(p);
            }
        });

        let result = self.aggregator.aggregate(&self.handle, request, Some(&tx)).await;
        drop(tx);
        let _ = forward.await;

        let mut state = self.state.write().await;
        let outcome = match result {
            Ok(feed) => {
                let scrobbles = feed.len();
                state.scrobbles = feed;
                state.updated_at = Some(Utc::now());
                state.last_error = None;
                state.rev += 1;
                match active {
                    None => RefreshOutcome::Rebuilt { scrobbles },
                    Some(active) => RefreshOutcome::Refreshed { active, scrobbles },
                }
            }
            Err(e) => {
                warn!("[live] refresh for {} failed: {}", self.handle, e);
                state.last_error = Some(e.to_string());
                RefreshOutcome::Failed(e.to_string())
            }
        };
        state.last_notice = outcome.notice();
        outcome
    }

    /// Refresh immediately, then every `interval`, reporting each outcome.
    /// Only refreshes started here advance the full-rebuild cadence.
    pub async fn run<F>(self: Arc<Self>, interval: Duration, mut on_outcome: F)
    where
        F: FnMut(&RefreshOutcome, &FeedState) + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut tick: u32 = 0;
        loop {
            ticker.tick().await;
            let outcome = self.refresh(RefreshMode::Auto { tick }).await;
            if outcome != RefreshOutcome::Skipped {
                tick = tick.wrapping_add(1);
            }
            if let Some(notice) = outcome.notice() {
                info!("[live] {}", notice);
            }
            let state = self.snapshot().await;
            on_outcome(&outcome, &state);
        }
    }
}
