use serde::{Deserialize, Serialize};

use crate::ChannelError;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";
pub const DEFAULT_TRANSCRIPT_BASE: &str = "https://www.youtube.com";

/// The listing API caps a page at 50 results.
pub const MAX_PAGE_SIZE: usize = 50;

/// One item from a channel listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

/// `timedtext` caption track in `json3` format.
#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(default)]
    events: Vec<CaptionEvent>,
}

#[derive(Debug, Deserialize)]
struct CaptionEvent {
    #[serde(default)]
    segs: Vec<CaptionSegment>,
}

#[derive(Debug, Deserialize)]
struct CaptionSegment {
    #[serde(default)]
    utf8: String,
}

/// Client for the video listing and caption endpoints.
pub struct ChannelClient {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base_url: Option<String>,
    transcript_base_url: Option<String>,
    transcript_lang: String,
}

impl ChannelClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_base_url: None,
            transcript_base_url: None,
            transcript_lang: "en".into(),
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn with_transcript_base_url(mut self, url: impl Into<String>) -> Self {
        self.transcript_base_url = Some(url.into());
        self
    }

    pub fn with_transcript_lang(mut self, lang: impl Into<String>) -> Self {
        self.transcript_lang = lang.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn api_base(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }

    fn transcript_base(&self) -> &str {
        self.transcript_base_url
            .as_deref()
            .unwrap_or(DEFAULT_TRANSCRIPT_BASE)
            .trim_end_matches('/')
    }

    /// Newest-first listing of up to `max_items` videos.
    pub async fn list_videos(
        &self,
        channel_id: &str,
        max_items: usize,
    ) -> Result<Vec<Video>, ChannelError> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ChannelError::MissingApiKey)?;

        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;

        while videos.len() < max_items {
            let page_size = (max_items - videos.len()).min(MAX_PAGE_SIZE).to_string();
            let mut params = vec![
                ("part", "snippet"),
                ("channelId", channel_id),
                ("maxResults", page_size.as_str()),
                ("order", "date"),
                ("type", "video"),
                ("key", key),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.as_str()));
            }

            let url = reqwest::Url::parse_with_params(
                &format!("{}/youtube/v3/search", self.api_base()),
                &params,
            )
            .map_err(|e| ChannelError::InvalidResponse(format!("bad listing url: {e}")))?;

            let response = self
                .client
                .get(url)
                .header("User-Agent", "docsync")
                .send()
                .await
                .map_err(|e| ChannelError::Network(format!("video listing failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ChannelError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let page: SearchResponse = response
                .json()
                .await
                .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;

            for item in page.items {
                let Some(id) = item.id.video_id else {
                    continue;
                };
                let snippet = item.snippet.unwrap_or_default();
                videos.push(Video {
                    id,
                    title: decode_entities(snippet.title.as_deref().unwrap_or("Untitled")),
                    description: decode_entities(snippet.description.as_deref().unwrap_or("")),
                    published_at: snippet.published_at.unwrap_or_else(|| {
                        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                    }),
                });
            }

            tracing::debug!(channel = channel_id, fetched = videos.len(), "listing page");

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        videos.truncate(max_items);
        Ok(videos)
    }

    /// Caption text for a video, whitespace-collapsed. `None` when the
    /// video has no usable captions or the lookup fails.
    pub async fn transcript(&self, video_id: &str) -> Option<String> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/api/timedtext", self.transcript_base()),
            &[
                ("v", video_id),
                ("lang", self.transcript_lang.as_str()),
                ("fmt", "json3"),
            ],
        )
        .ok()?;

        let response = match self
            .client
            .get(url)
            .header("User-Agent", "docsync")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(video = video_id, status = %response.status(), "transcript unavailable");
                return None;
            }
            Err(e) => {
                tracing::warn!(video = video_id, "failed to fetch transcript: {e}");
                return None;
            }
        };

        let body = response.text().await.ok()?;
        if body.trim().is_empty() {
            tracing::warn!(video = video_id, "no transcript found");
            return None;
        }

        let track: CaptionTrack = match serde_json::from_str(&body) {
            Ok(track) => track,
            Err(e) => {
                tracing::warn!(video = video_id, "unreadable transcript: {e}");
                return None;
            }
        };

        let text = track
            .events
            .iter()
            .flat_map(|e| e.segs.iter())
            .map(|s| s.utf8.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.is_empty() { None } else { Some(collapsed) }
    }
}

/// The listing API HTML-escapes titles and descriptions.
fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
