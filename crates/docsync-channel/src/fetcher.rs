use chrono::{SecondsFormat, Utc};
use docsync::{
    ChannelSpec, ContentFetcher, FetchError, FetchOutcome, Feedback, Source, SourceKind,
    Workspace, WriteMode,
};

use crate::client::{ChannelClient, Video};
use crate::markdown::{self, INDEX_FILE, IndexEntry, VideoIndex};
use crate::ChannelError;

/// Fetches `channel` sources: one markdown file per video plus an index.
pub struct ChannelFetcher {
    client: ChannelClient,
}

impl ChannelFetcher {
    pub fn new(client: ChannelClient) -> Self {
        Self { client }
    }

    async fn write_video(
        &self,
        workspace: &dyn Workspace,
        target: &str,
        video: &Video,
    ) -> Result<IndexEntry, FetchError> {
        let transcript = self.client.transcript(&video.id).await;
        let doc = markdown::render_video(video, transcript.as_deref());
        let file = markdown::file_name(video);

        workspace
            .write_file(&format!("{target}/{file}"), doc.as_bytes(), WriteMode::Overwrite)
            .await?;

        Ok(IndexEntry {
            id: video.id.clone(),
            title: video.title.clone(),
            published_at: video.published_at.clone(),
            file,
            has_transcript: transcript.is_some(),
        })
    }

    async fn fetch_channel(
        &self,
        source: &Source,
        spec: &ChannelSpec,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError> {
        if !self.client.has_api_key() {
            return Err(ChannelError::MissingApiKey.into());
        }

        tracing::info!(source = %source.id, channel = %spec.channel_id, "listing videos");
        let videos = self
            .client
            .list_videos(&spec.channel_id, spec.max_items)
            .await?;

        if videos.is_empty() {
            return Ok(FetchOutcome {
                file_count: 0,
                version: None,
                feedback: vec![Feedback::info(format!(
                    "channel {} has no videos",
                    spec.channel_id
                ))],
            });
        }

        let target = source.target_dir(None);
        workspace.remove_dir_all(&target).await?;
        workspace.mkdir(&target).await?;

        let mut feedback = Vec::new();
        let mut entries = Vec::with_capacity(videos.len());
        for video in &videos {
            match self.write_video(workspace, &target, video).await {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    feedback.push(Feedback::warning(format!(
                        "video {} skipped: {e}",
                        video.id
                    )));
                }
            }
        }

        let with_transcript = entries.iter().filter(|e| e.has_transcript).count();
        let index = VideoIndex {
            last_sync: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            total_videos: entries.len(),
            channel_id: spec.channel_id.clone(),
            handle: spec.handle.clone(),
            videos: entries,
        };
        let json = serde_json::to_string_pretty(&index)
            .map_err(|e| FetchError::Other(format!("failed to encode video index: {e}")))?;
        workspace
            .write_file(
                &format!("{target}/{INDEX_FILE}"),
                json.as_bytes(),
                WriteMode::Overwrite,
            )
            .await?;

        feedback.push(Feedback::info(format!(
            "{}/{} videos written, {with_transcript} with transcripts",
            index.total_videos,
            videos.len()
        )));

        Ok(FetchOutcome {
            file_count: index.total_videos + 1,
            version: None,
            feedback,
        })
    }
}

#[async_trait::async_trait]
impl ContentFetcher for ChannelFetcher {
    async fn fetch(
        &self,
        source: &Source,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError> {
        match &source.kind {
            SourceKind::Channel(spec) => self.fetch_channel(source, spec, workspace).await,
            _ => Err(FetchError::Unsupported(format!(
                "{} is a {} source",
                source.id,
                source.source_type()
            ))),
        }
    }
}
