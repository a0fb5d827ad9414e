//! Last.fm client: profile resolution on top of a [`Transport`] and a
//! shared [`UserCache`]. Friends paging and recent-activity fetching live in
//! `friends.rs` and `recent.rs`.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::UserCache;
use crate::error::{LastfmError, Result, ServiceError, LASTFM_USER_NOT_FOUND};
use crate::model::{inactivity_threshold, UserProfile};
use crate::payload::{self, UserInfoResponse};
use crate::transport::{Transport, METHOD_USER_INFO};

pub struct LastfmClient<T> {
    pub(crate) transport: T,
    pub(crate) cache: Arc<UserCache>,
}

impl<T: Transport> LastfmClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_cache(transport, Arc::new(UserCache::new()))
    }

    pub fn with_cache(transport: T, cache: Arc<UserCache>) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &Arc<UserCache> {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve a handle to its profile.
    ///
    /// A profile fetched less than 30 days ago is returned from cache without
    /// touching the network.
    pub async fn resolve_user(&self, handle: &str) -> Result<UserProfile> {
        let now = Utc::now();
        if let Some(profile) = self.cache.get_if_fresh(handle, inactivity_threshold(), now) {
            debug!("[lastfm] profile cache hit for {}", handle);
            return Ok(profile);
        }

        let value = self
            .transport
            .call(METHOD_USER_INFO, &[("user", handle.to_string())])
            .await?;

        let info: UserInfoResponse = match payload::decode(value) {
            Ok(info) => info,
            Err(ServiceError::Api { code, .. }) if code == LASTFM_USER_NOT_FOUND => {
                return Err(LastfmError::NotFound(handle.to_string()));
            }
            Err(e) => {
                warn!("[lastfm] user.getinfo {} failed: {}", handle, e);
                return Err(e.into());
            }
        };

        let profile = info.user.into_profile();
        self.cache.put(handle, profile.clone(), Utc::now());
        info!("[lastfm] resolved {} ({})", handle, profile.label());
        Ok(profile)
    }

    /// `true` when the handle resolves; any failure counts as "no".
    pub async fn check_user_exists(&self, handle: &str) -> bool {
        match self.resolve_user(handle).await {
            Ok(_) => true,
            Err(LastfmError::NotFound(_)) => false,
            Err(e) => {
                warn!("[lastfm] could not verify {}: {}", handle, e);
                false
            }
        }
    }
}
