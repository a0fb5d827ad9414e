use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::model::UserProfile;

/// How a cache entry came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    /// Stored by a `user.getinfo` fetch; safe to serve as a profile.
    Profile,
    /// Created by an activity fetch for a handle never resolved.
    Activity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub profile: UserProfile,
    pub fetched_at: DateTime<Utc>,
    pub origin: EntryOrigin,
    /// Artwork of the newest scrobble seen for this handle.
    pub last_artwork: Option<String>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }
}

/// Process-wide profile cache keyed by handle.
///
/// Entries are never evicted. Concurrent writers for the same handle are
/// last-write-wins; the lock is only held for the read or write itself.
#[derive(Debug, Default)]
pub struct UserCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, handle: &str) -> Option<CacheEntry> {
        self.lock().get(handle).cloned()
    }

    /// The cached profile, if it was stored by a profile fetch less than
    /// `max_age` ago.
    pub fn get_if_fresh(
        &self,
        handle: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Option<UserProfile> {
        let entries = self.lock();
        let entry = entries.get(handle)?;
        if entry.origin == EntryOrigin::Profile && entry.age(now) < max_age {
            Some(entry.profile.clone())
        } else {
            None
        }
    }

    /// Store a freshly fetched profile under `handle`, keeping any activity
    /// already known for it.
    pub fn put(&self, handle: &str, mut profile: UserProfile, now: DateTime<Utc>) {
        let mut entries = self.lock();
        let previous = entries.remove(handle);
        if profile.last_scrobble.is_none() {
            profile.last_scrobble = previous.as_ref().and_then(|e| e.profile.last_scrobble);
        }
        let last_artwork = previous.and_then(|e| e.last_artwork);
        entries.insert(
            handle.to_string(),
            CacheEntry {
                profile,
                fetched_at: now,
                origin: EntryOrigin::Profile,
                last_artwork,
            },
        );
    }

    pub fn insert(&self, handle: &str, entry: CacheEntry) {
        self.lock().insert(handle.to_string(), entry);
    }

    /// Note a newly observed scrobble for `handle`, creating a bare entry if
    /// the handle was never resolved.
    pub fn record_activity(
        &self,
        handle: &str,
        last_scrobble: DateTime<Utc>,
        artwork: &str,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.lock();
        let entry = entries.entry(handle.to_string()).or_insert_with(|| CacheEntry {
            profile: UserProfile::bare(handle),
            fetched_at: now,
            origin: EntryOrigin::Activity,
            last_artwork: None,
        });
        entry.profile.last_scrobble = Some(last_scrobble);
        entry.last_artwork = Some(artwork.to_string());
        entry.fetched_at = now;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
