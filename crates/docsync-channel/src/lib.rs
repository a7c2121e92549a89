pub mod client;
pub mod fetcher;
pub mod markdown;

pub use client::{ChannelClient, Video};
pub use fetcher::ChannelFetcher;
pub use markdown::{IndexEntry, VideoIndex, render_video, slugify};

use docsync::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("YouTube API key not configured")]
    MissingApiKey,

    #[error("{0}")]
    Network(String),

    #[error("video listing failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid listing response: {0}")]
    InvalidResponse(String),
}

impl From<ChannelError> for FetchError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Network(_) => FetchError::Network(err.to_string()),
            ChannelError::Api { status, .. } if status >= 500 || status == 429 => {
                FetchError::Network(err.to_string())
            }
            other => FetchError::Other(other.to_string()),
        }
    }
}
