//! Read-only views over an aggregated feed: "load more" paging and the
//! grouped-by-artist summary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{artist_url, Scrobble};

/// The first `page * per_page` scrobbles, and whether more remain.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage<'a> {
    pub page: usize,
    pub scrobbles: &'a [Scrobble],
    pub has_more: bool,
    pub total: usize,
}

pub fn visible(feed: &[Scrobble], page: usize, per_page: usize) -> FeedPage<'_> {
    let page = page.max(1);
    let end = page.saturating_mul(per_page.max(1)).min(feed.len());
    FeedPage {
        page,
        scrobbles: &feed[..end],
        has_more: end < feed.len(),
        total: feed.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistSummary {
    pub artist: String,
    pub play_count: usize,
    /// Handles that played the artist, in first-seen order.
    pub listeners: Vec<String>,
    pub last_played: DateTime<Utc>,
    /// Artwork of the most recent play.
    pub image: String,
    pub url: String,
}

/// Group plays by artist, most played first. Ties keep first-seen order.
pub fn artist_summary(feed: &[Scrobble]) -> Vec<ArtistSummary> {
    let mut order: Vec<ArtistSummary> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for s in feed {
        let i = *index.entry(s.artist.as_str()).or_insert_with(|| {
            order.push(ArtistSummary {
                artist: s.artist.clone(),
                play_count: 0,
                listeners: Vec::new(),
                last_played: s.timestamp,
                image: s.image.clone(),
                url: artist_url(&s.artist),
            });
            order.len() - 1
        });

        let summary = &mut order[i];
        summary.play_count += 1;
        if !summary.listeners.contains(&s.handle) {
            summary.listeners.push(s.handle.clone());
        }
        if s.timestamp > summary.last_played {
            summary.last_played = s.timestamp;
            summary.image = s.image.clone();
        }
    }

    order.sort_by(|a, b| b.play_count.cmp(&a.play_count));
    order
}
