use tracing::{debug, warn};

use crate::client::LastfmClient;
use crate::error::{LastfmError, Result};
use crate::model::{UserProfile, FRIENDS_PAGE_SIZE};
use crate::payload::{self, FriendsResponse};
use crate::transport::{Transport, METHOD_FRIENDS};

/// One page of a friends list.
#[derive(Debug, Clone, PartialEq)]
pub struct FriendsPage {
    pub friends: Vec<UserProfile>,
    pub page: u32,
    pub total_pages: u32,
    pub total_friends: u64,
}

pub fn total_pages(total_friends: u64) -> u32 {
    let pages = total_friends.div_ceil(u64::from(FRIENDS_PAGE_SIZE));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

impl<T: Transport> LastfmClient<T> {
    /// Fetch page `page` (1-based) of `handle`'s friends, 50 per page.
    ///
    /// Callers walk pages until `page > total_pages`; `total_pages` is taken
    /// from the first response.
    pub async fn list_friends(&self, handle: &str, page: u32) -> Result<FriendsPage> {
        let value = self
            .transport
            .call(
                METHOD_FRIENDS,
                &[
                    ("user", handle.to_string()),
                    ("page", page.to_string()),
                    ("limit", FRIENDS_PAGE_SIZE.to_string()),
                ],
            )
            .await
            .inspect_err(|e| warn!("[lastfm] user.getfriends {} p{} failed: {}", handle, page, e))?;

        let resp: FriendsResponse = payload::decode(value).map_err(|e| {
            warn!("[lastfm] user.getfriends {} p{} rejected: {}", handle, page, e);
            LastfmError::Service(e)
        })?;

        let total_friends = resp.friends.attr.total;
        let friends: Vec<UserProfile> = resp
            .friends
            .user
            .into_vec()
            .into_iter()
            .map(|u| u.into_profile())
            .collect();

        debug!(
            "[lastfm] {} friends page {}: {} of {} total",
            handle,
            page,
            friends.len(),
            total_friends
        );

        Ok(FriendsPage {
            friends,
            page,
            total_pages: total_pages(total_friends),
            total_friends,
        })
    }
}
