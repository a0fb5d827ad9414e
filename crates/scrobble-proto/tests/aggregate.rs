mod common;

use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use common::mock_lastfm::{handles, MockLastfm};
use scrobble_proto::model::AggregationStage;
use scrobble_proto::transport::{METHOD_FRIENDS, METHOD_RECENT_TRACKS};
use scrobble_proto::{
    active_handles, progress_channel, Aggregator, FetchProgress, LastfmClient, RefreshRequest,
    Scrobble,
};

fn aggregator(mock: MockLastfm) -> Aggregator<MockLastfm> {
    Aggregator::new(LastfmClient::new(mock), 10)
}

async fn drain(mut rx: tokio::sync::mpsc::UnboundedReceiver<FetchProgress>) -> Vec<FetchProgress> {
    let mut events = Vec::new();
    while let Some(p) = rx.recv().await {
        events.push(p);
    }
    events
}

fn assert_sorted(feed: &[Scrobble]) {
    assert!(
        feed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp),
        "feed not sorted newest first"
    );
}

fn scrobble(handle: &str, track: &str, mins_ago: i64) -> Scrobble {
    Scrobble {
        artist: "Previous".into(),
        album: None,
        track: track.into(),
        image: String::new(),
        timestamp: Utc::now() - Duration::minutes(mins_ago),
        url: String::new(),
        handle: handle.into(),
    }
}

/// alice has 60 friends: 50 on page one, 10 on page two. Three of them
/// listened to something today.
fn sixty_friends() -> MockLastfm {
    let mut friends = handles("friend", 57);
    friends.insert(3, "bob".into());
    friends.insert(20, "carol".into());
    friends.push("dave".into());
    assert_eq!(friends.len(), 60);

    MockLastfm::new()
        .with_friends("alice", &friends)
        .with_play("alice", "Low", "Sunflower", 15)
        .with_play("alice", "Low", "Monkey", 200)
        .with_play("bob", "Can", "Vitamin C", 5)
        .with_now_playing("bob", "Can", "Mother Sky")
        .with_play("carol", "Stereolab", "Ping Pong", 60)
        .with_play("carol", "Stereolab", "Cybele's Reverie", 61)
        .with_play("dave", "Broadcast", "Come On Let's Go", 30)
        .with_play("dave", "Broadcast", "Pendulum", 60 * 30)
}

#[tokio::test]
async fn full_rebuild_walks_pages_and_merges() {
    let agg = aggregator(sixty_friends());
    let (tx, rx) = progress_channel();

    let feed = agg
        .aggregate("alice", RefreshRequest::FullRebuild, Some(&tx))
        .await
        .unwrap();
    drop(tx);
    let events = drain(rx).await;

    let pages: Vec<_> = events
        .iter()
        .filter(|e| e.stage == AggregationStage::FetchingFriendsPaged)
        .map(|e| (e.current_page, e.total_pages, e.status.as_str()))
        .collect();
    assert_eq!(
        pages,
        [(1, 2, "Loading page 1 of 2..."), (2, 2, "Loading page 2 of 2...")]
    );
    assert_eq!(events.last().unwrap().stage, AggregationStage::Done);
    assert_eq!(events[0].users_total, 61);
    assert_eq!(events[1].users_processed, 51);

    let tracks: Vec<_> = feed.iter().map(|s| s.track.as_str()).collect();
    assert_eq!(
        tracks,
        [
            "Vitamin C",
            "Sunflower",
            "Come On Let's Go",
            "Ping Pong",
            "Cybele's Reverie",
            "Monkey",
        ]
    );
    assert_sorted(&feed);

    let mock = agg.client().transport();
    // page one is fetched once and reused
    assert_eq!(mock.count(METHOD_FRIENDS), 2);
    assert_eq!(mock.count_for(METHOD_RECENT_TRACKS, "alice"), 1);
    assert_eq!(mock.count(METHOD_RECENT_TRACKS), 61);
}

#[tokio::test]
async fn full_rebuild_fails_when_friends_list_fails() {
    let mock = MockLastfm::new()
        .with_user("alice")
        .with_play("alice", "Low", "Sunflower", 15)
        .failing(METHOD_FRIENDS, "alice");
    let agg = aggregator(mock);
    let (tx, rx) = progress_channel();

    let err = agg
        .aggregate("alice", RefreshRequest::FullRebuild, Some(&tx))
        .await
        .unwrap_err();
    drop(tx);
    let events = drain(rx).await;

    assert!(!err.is_not_found());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stage, AggregationStage::Failed);
}

#[tokio::test]
async fn failing_friend_does_not_abort_the_feed() {
    let friends = vec!["bob".to_string(), "carol".to_string()];
    let mock = MockLastfm::new()
        .with_friends("alice", &friends)
        .with_play("bob", "Can", "Vitamin C", 5)
        .with_play("carol", "Low", "Lullaby", 8)
        .failing(METHOD_RECENT_TRACKS, "carol");
    let agg = aggregator(mock);

    let feed = agg
        .aggregate("alice", RefreshRequest::FullRebuild, None)
        .await
        .unwrap();

    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].handle, "bob");
}

#[tokio::test]
async fn user_without_friends_gets_own_feed() {
    let mock = MockLastfm::new()
        .with_friends("alice", &[])
        .with_play("alice", "Low", "Sunflower", 15);
    let agg = aggregator(mock);
    let (tx, rx) = progress_channel();

    let feed = agg
        .aggregate("alice", RefreshRequest::FullRebuild, Some(&tx))
        .await
        .unwrap();
    drop(tx);

    assert_eq!(feed.len(), 1);
    let events = drain(rx).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stage, AggregationStage::Done);
}

#[tokio::test]
async fn incremental_refresh_never_lists_friends() {
    let friends = vec!["a".to_string(), "b".to_string()];
    let mock = MockLastfm::new()
        .with_friends("alice", &friends)
        .with_play("a", "Can", "Vitamin C", 5)
        .with_play("b", "Low", "Lullaby", 8);
    let agg = aggregator(mock);
    let (tx, rx) = progress_channel();

    let active: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
    let feed = agg
        .aggregate(
            "alice",
            RefreshRequest::Incremental {
                active_handles: active,
                previous: Vec::new(),
            },
            Some(&tx),
        )
        .await
        .unwrap();
    drop(tx);
    let events = drain(rx).await;

    let mock = agg.client().transport();
    assert_eq!(mock.count(METHOD_FRIENDS), 0);
    assert_eq!(mock.count(METHOD_RECENT_TRACKS), 3);
    assert_eq!(feed.len(), 2);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].stage, AggregationStage::FetchingActiveOnly);
    assert_eq!(events[0].status, "Refreshing 2 active users...");
    assert_eq!(events[1].stage, AggregationStage::Done);
}

#[tokio::test]
async fn incremental_refresh_keeps_dormant_friends_entries() {
    let mock = MockLastfm::new()
        .with_friends("alice", &["A".to_string(), "B".to_string()])
        .with_play("alice", "Low", "Sunflower", 2)
        .with_play("A", "Can", "Fresh Track", 10);
    let agg = aggregator(mock);

    let previous = vec![
        scrobble("A", "Stale A Track", 90),
        scrobble("B", "Five Hours Ago", 5 * 60),
        scrobble("B", "Yesterday-ish", 25 * 60),
        scrobble("alice", "Old Alice Track", 30),
    ];
    let active = active_handles(&previous, Utc::now());
    assert!(active.contains("A") && active.contains("B"));

    let only_a: BTreeSet<String> = ["A".to_string()].into();
    let feed = agg
        .aggregate(
            "alice",
            RefreshRequest::Incremental {
                active_handles: only_a,
                previous: previous.clone(),
            },
            None,
        )
        .await
        .unwrap();

    let tracks: Vec<_> = feed.iter().map(|s| s.track.as_str()).collect();
    assert_eq!(tracks, ["Sunflower", "Fresh Track", "Five Hours Ago"]);
    assert_eq!(feed[2], previous[1]);
    assert_sorted(&feed);
    assert_eq!(agg.client().transport().count_for(METHOD_RECENT_TRACKS, "B"), 0);
}

#[tokio::test]
async fn primary_in_active_set_is_fetched_once() {
    let mock = MockLastfm::new()
        .with_user("alice")
        .with_user("bob")
        .with_play("alice", "Low", "Sunflower", 2)
        .with_play("bob", "Can", "Vitamin C", 4);
    let agg = aggregator(mock);

    let active: BTreeSet<String> = ["alice".to_string(), "bob".to_string()].into();
    let feed = agg
        .aggregate(
            "alice",
            RefreshRequest::Incremental {
                active_handles: active,
                previous: Vec::new(),
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(feed.len(), 2);
    let mock = agg.client().transport();
    assert_eq!(mock.count_for(METHOD_RECENT_TRACKS, "alice"), 1);
    assert_eq!(mock.count_for(METHOD_RECENT_TRACKS, "bob"), 1);
}

#[tokio::test]
async fn probe_reports_activity() {
    let mock = MockLastfm::new()
        .with_user("bob")
        .with_user("quiet")
        .with_play("bob", "Can", "Vitamin C", 4);
    let agg = aggregator(mock);

    assert!(agg.probe("bob").await);
    assert!(!agg.probe("quiet").await);
}

#[tokio::test]
async fn failed_refetch_keeps_previous_plays() {
    let mock = MockLastfm::new()
        .with_friends("alice", &["A".to_string(), "B".to_string()])
        .with_play("alice", "Low", "Sunflower", 2)
        .with_play("B", "Can", "Vitamin C", 3)
        .failing(METHOD_RECENT_TRACKS, "A");
    let agg = aggregator(mock);

    let previous = vec![
        scrobble("A", "An Hour Ago", 60),
        scrobble("A", "Too Old", 25 * 60),
        scrobble("B", "Replaced", 50),
    ];
    let feed = agg
        .aggregate(
            "alice",
            RefreshRequest::Incremental {
                active_handles: active_handles(&previous, Utc::now()),
                previous: previous.clone(),
            },
            None,
        )
        .await
        .unwrap();

    let tracks: Vec<_> = feed.iter().map(|s| s.track.as_str()).collect();
    assert_eq!(tracks, ["Sunflower", "Vitamin C", "An Hour Ago"]);
    assert_eq!(feed[2], previous[0]);
    assert_eq!(agg.client().transport().count_for(METHOD_RECENT_TRACKS, "A"), 1);

    // the kept play keeps A in the next incremental round
    assert!(active_handles(&feed, Utc::now()).contains("A"));
}

#[tokio::test]
async fn failed_primary_refetch_keeps_own_plays() {
    let mock = MockLastfm::new()
        .with_friends("alice", &["A".to_string()])
        .with_play("A", "Can", "Vitamin C", 3)
        .failing(METHOD_RECENT_TRACKS, "alice");
    let agg = aggregator(mock);

    let previous = vec![scrobble("alice", "Mine", 40), scrobble("A", "Old A", 30)];
    let feed = agg
        .aggregate(
            "alice",
            RefreshRequest::Incremental {
                active_handles: active_handles(&previous, Utc::now()),
                previous,
            },
            None,
        )
        .await
        .unwrap();

    let tracks: Vec<_> = feed.iter().map(|s| s.track.as_str()).collect();
    assert_eq!(tracks, ["Vitamin C", "Mine"]);
}
