#![allow(dead_code)]

//! In-memory stand-in for the Last.fm web service that records every call.

use chrono::{Duration, Utc};
use scrobble_proto::transport::{METHOD_FRIENDS, METHOD_RECENT_TRACKS, METHOD_USER_INFO};
use scrobble_proto::{ServiceError, Transport};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub user: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Default)]
struct Service {
    users: HashSet<String>,
    friends: HashMap<String, Vec<String>>,
    /// (uts, track json), unsorted
    tracks: HashMap<String, Vec<(i64, Value)>>,
    now_playing: HashMap<String, Value>,
    failing: HashSet<(String, String)>,
}

#[derive(Default)]
pub struct MockLastfm {
    service: Mutex<Service>,
    calls: Mutex<Vec<Call>>,
}

fn images(url: &str) -> Value {
    json!([
        {"#text": "", "size": "small"},
        {"#text": "", "size": "medium"},
        {"#text": "", "size": "large"},
        {"#text": url, "size": "extralarge"},
    ])
}

fn track_json(artist: &str, track: &str, uts: Option<i64>) -> Value {
    let mut t = json!({
        "artist": {"#text": artist, "mbid": ""},
        "album": {"#text": format!("{artist} LP")},
        "name": track,
        "image": images(&format!("https://img.example/{artist}.png")),
        "url": format!("https://www.last.fm/music/{artist}/_/{track}"),
    });
    match uts {
        Some(uts) => t["date"] = json!({"uts": uts.to_string(), "#text": ""}),
        None => t["@attr"] = json!({"nowplaying": "true"}),
    }
    t
}

impl MockLastfm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, handle: &str) -> Self {
        self.service.lock().unwrap().users.insert(handle.to_string());
        self
    }

    /// Registers `handle` and each friend as existing users.
    pub fn with_friends(self, handle: &str, friends: &[String]) -> Self {
        {
            let mut s = self.service.lock().unwrap();
            s.users.insert(handle.to_string());
            s.users.extend(friends.iter().cloned());
            s.friends.insert(handle.to_string(), friends.to_vec());
        }
        self
    }

    pub fn with_play(self, handle: &str, artist: &str, track: &str, mins_ago: i64) -> Self {
        let uts = (Utc::now() - Duration::minutes(mins_ago)).timestamp();
        self.service
            .lock()
            .unwrap()
            .tracks
            .entry(handle.to_string())
            .or_default()
            .push((uts, track_json(artist, track, Some(uts))));
        self
    }

    pub fn with_now_playing(self, handle: &str, artist: &str, track: &str) -> Self {
        self.service
            .lock()
            .unwrap()
            .now_playing
            .insert(handle.to_string(), track_json(artist, track, None));
        self
    }

    /// Make `method` fail at the transport level for `handle`.
    pub fn failing(self, method: &str, handle: &str) -> Self {
        self.service
            .lock()
            .unwrap()
            .failing
            .insert((method.to_string(), handle.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    pub fn count_for(&self, method: &str, user: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.user == user)
            .count()
    }

    fn respond(&self, call: &Call) -> Result<Value, ServiceError> {
        let s = self.service.lock().unwrap();
        if s.failing.contains(&(call.method.clone(), call.user.clone())) {
            return Err(ServiceError::Status(503));
        }
        if !s.users.contains(&call.user) {
            return Ok(json!({"error": 6, "message": "User not found"}));
        }

        match call.method.as_str() {
            METHOD_USER_INFO => Ok(json!({
                "user": {
                    "name": call.user,
                    "realname": format!("{} Real", call.user),
                    "url": format!("https://www.last.fm/user/{}", call.user),
                    "image": images(&format!("https://img.example/avatar/{}.png", call.user)),
                }
            })),
            METHOD_FRIENDS => {
                let all = s.friends.get(&call.user).cloned().unwrap_or_default();
                let limit = call.limit.unwrap_or(50) as usize;
                let page = call.page.unwrap_or(1).max(1) as usize;
                let users: Vec<Value> = all
                    .iter()
                    .skip((page - 1) * limit)
                    .take(limit)
                    .map(|name| {
                        json!({
                            "name": name,
                            "realname": "",
                            "url": format!("https://www.last.fm/user/{name}"),
                            "image": images(""),
                        })
                    })
                    .collect();
                Ok(json!({
                    "friends": {
                        "user": users,
                        "@attr": {"user": call.user, "page": page.to_string(), "total": all.len().to_string()}
                    }
                }))
            }
            METHOD_RECENT_TRACKS => {
                let mut plays = s.tracks.get(&call.user).cloned().unwrap_or_default();
                plays.sort_by(|a, b| b.0.cmp(&a.0));
                let limit = call.limit.unwrap_or(50) as usize;
                let mut track: Vec<Value> = Vec::new();
                if let Some(np) = s.now_playing.get(&call.user) {
                    track.push(np.clone());
                }
                track.extend(plays.into_iter().take(limit).map(|(_, t)| t));
                Ok(json!({"recenttracks": {"track": track, "@attr": {"user": call.user}}}))
            }
            other => Ok(json!({"error": 3, "message": format!("Invalid method {other}")})),
        }
    }
}

impl Transport for MockLastfm {
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, ServiceError> {
        let param = |name: &str| {
            params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
        };
        let call = Call {
            method: method.to_string(),
            user: param("user").unwrap_or_default(),
            page: param("page").and_then(|p| p.parse().ok()),
            limit: param("limit").and_then(|l| l.parse().ok()),
        };
        self.calls.lock().unwrap().push(call.clone());
        self.respond(&call)
    }
}

pub fn handles(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{prefix}{i:02}")).collect()
}
