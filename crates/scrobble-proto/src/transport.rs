//! The single seam between the client and the network: one Last.fm API
//! method call in, one JSON document out.

use std::future::Future;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::LastfmConfig;
use crate::error::ServiceError;

pub const METHOD_USER_INFO: &str = "user.getinfo";
pub const METHOD_FRIENDS: &str = "user.getfriends";
pub const METHOD_RECENT_TRACKS: &str = "user.getrecenttracks";

/// Performs Last.fm method calls.
///
/// Implementations return the decoded JSON body, including bodies that carry
/// an `error` envelope; classifying those is left to the caller.
pub trait Transport: Send + Sync {
    fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> impl Future<Output = Result<Value, ServiceError>> + Send;
}

/// `reqwest`-backed transport against the public web service.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(config: &LastfmConfig, api_key: String) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
        })
    }
}

impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, ServiceError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("method", method),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
        ];
        query.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

        debug!("[lastfm] {} {:?}", method, params);
        let response = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<Value>(&body) {
            // Last.fm reports failures as a JSON envelope, sometimes with a 4xx status.
            Ok(json) if json.get("error").is_some() => Ok(json),
            Ok(json) if status.is_success() => Ok(json),
            Ok(_) => Err(ServiceError::Status(status.as_u16())),
            Err(_) if !status.is_success() => Err(ServiceError::Status(status.as_u16())),
            Err(e) => Err(e.into()),
        }
    }
}
