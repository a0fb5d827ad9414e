//! Wire shapes of the Last.fm JSON responses we consume.
//!
//! Last.fm is loose with types: counts arrive as strings, a list with one
//! element is sometimes sent as a bare object, and absent values are often
//! empty strings rather than missing keys.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ServiceError;
use crate::model::{user_url, Scrobble, UserProfile, PLACEHOLDER_IMAGE};

/// Index of the preferred ("extralarge") size in Last.fm image arrays.
const PREFERRED_IMAGE: usize = 3;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(t) => vec![t],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Image {
    #[serde(rename = "#text", default)]
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Text {
    #[serde(rename = "#text", default)]
    pub text: String,
}

fn pick_image(images: &[Image]) -> String {
    images
        .get(PREFERRED_IMAGE)
        .map(|i| i.url.trim())
        .filter(|u| !u.is_empty())
        .unwrap_or(PLACEHOLDER_IMAGE)
        .to_string()
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Accepts `"60"`, `60` or `null`.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("not an unsigned count: {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("not a count: {:?}", s))),
        other => Err(de::Error::custom(format!("unexpected count: {}", other))),
    }
}

// ── user.getinfo / user.getfriends ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    pub name: String,
    #[serde(default)]
    pub realname: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image: Vec<Image>,
}

impl UserPayload {
    pub fn into_profile(self) -> UserProfile {
        let profile_url = non_empty(&self.url).unwrap_or_else(|| user_url(&self.name));
        UserProfile {
            display_name: self.realname.as_deref().and_then(non_empty),
            image: pick_image(&self.image),
            handle: self.name,
            profile_url,
            last_scrobble: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserInfoResponse {
    pub user: UserPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct FriendsAttr {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct FriendsPayload {
    #[serde(default)]
    pub user: OneOrMany<UserPayload>,
    #[serde(rename = "@attr", default)]
    pub attr: FriendsAttr,
}

#[derive(Debug, Deserialize)]
pub struct FriendsResponse {
    pub friends: FriendsPayload,
}

// ── user.getrecenttracks ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TrackAttr {
    #[serde(default)]
    pub nowplaying: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TrackDate {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub uts: u64,
}

#[derive(Debug, Deserialize)]
pub struct TrackPayload {
    #[serde(default)]
    pub artist: Text,
    #[serde(default)]
    pub album: Text,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Vec<Image>,
    #[serde(default)]
    pub date: Option<TrackDate>,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "@attr", default)]
    pub attr: Option<TrackAttr>,
}

impl TrackPayload {
    pub fn is_now_playing(&self) -> bool {
        match self.attr.as_ref().and_then(|a| a.nowplaying.as_ref()) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            Some(_) => true,
            None => false,
        }
    }

    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        let uts = self.date.as_ref()?.uts;
        if uts == 0 {
            return None;
        }
        Utc.timestamp_opt(i64::try_from(uts).ok()?, 0).single()
    }

    /// `None` for now-playing entries and entries without a usable date.
    pub fn into_scrobble(self, handle: &str) -> Option<Scrobble> {
        if self.is_now_playing() {
            return None;
        }
        let timestamp = self.played_at()?;
        Some(Scrobble {
            image: pick_image(&self.image),
            artist: self.artist.text,
            album: non_empty(&self.album.text),
            track: self.name,
            timestamp,
            url: self.url,
            handle: handle.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentTracksPayload {
    #[serde(default)]
    pub track: OneOrMany<TrackPayload>,
}

#[derive(Debug, Deserialize)]
pub struct RecentTracksResponse {
    pub recenttracks: RecentTracksPayload,
}

// ── error envelope ───────────────────────────────────────────────────────────

/// Reject a response carrying Last.fm's `{"error": n, "message": ...}` pair.
pub fn check_envelope(value: &Value) -> Result<(), ServiceError> {
    let Some(code) = value.get("error") else {
        return Ok(());
    };
    let code = code
        .as_i64()
        .or_else(|| code.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(-1);
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Err(ServiceError::Api { code, message })
}

pub fn decode<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, ServiceError> {
    check_envelope(&value)?;
    Ok(serde_json::from_value(value)?)
}
