pub mod aggregate;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod friends;
pub mod model;
pub mod payload;
pub mod platform;
pub mod recent;
pub mod session;
pub mod transport;

pub use aggregate::{active_handles, progress_channel, Aggregator, RefreshRequest};
pub use client::LastfmClient;
pub use error::{LastfmError, ServiceError};
pub use model::{FetchProgress, Scrobble, UserProfile};
pub use transport::{HttpTransport, Transport};
