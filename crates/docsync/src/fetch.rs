use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::feedback::Feedback;
use crate::filter::DocFilter;
use crate::source::{RefType, Source, SourceError, SourceType, version_folder_name};
use crate::workspace::{Workspace, WorkspaceError, WriteMode};

/// The concrete ref a repository source was synced at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVersion {
    pub ref_type: RefType,
    pub resolved_ref: String,
    pub folder_name: String,
}

impl ResolvedVersion {
    pub fn new(ref_type: RefType, resolved_ref: impl Into<String>) -> Self {
        let resolved_ref = resolved_ref.into();
        Self {
            folder_name: version_folder_name(ref_type, &resolved_ref),
            ref_type,
            resolved_ref,
        }
    }
}

/// What a fetcher left in the workspace for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub file_count: usize,
    pub version: Option<ResolvedVersion>,
    pub feedback: Vec<Feedback>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("unsupported source: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Transport and workspace hiccups are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Workspace(_))
    }
}

/// Materializes one source's documentation into a workspace.
///
/// Implementations own the source's target directory: they clear it, write
/// into it, and run the [`DocFilter`] over it before returning.
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(
        &self,
        source: &Source,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Routes each source to the fetcher for its type.
///
/// Repo and readme-only sources share one fetcher; custom sources are
/// looked up by id.
#[derive(Default, Clone)]
pub struct FetcherSet {
    repo: Option<Arc<dyn ContentFetcher>>,
    channel: Option<Arc<dyn ContentFetcher>>,
    custom: HashMap<String, Arc<dyn ContentFetcher>>,
}

impl FetcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, fetcher: impl ContentFetcher + 'static) -> Self {
        self.repo = Some(Arc::new(fetcher));
        self
    }

    pub fn with_channel(mut self, fetcher: impl ContentFetcher + 'static) -> Self {
        self.channel = Some(Arc::new(fetcher));
        self
    }

    pub fn with_custom(
        mut self,
        source_id: impl Into<String>,
        fetcher: impl ContentFetcher + 'static,
    ) -> Self {
        self.custom.insert(source_id.into(), Arc::new(fetcher));
        self
    }

    fn resolve(&self, source: &Source) -> Option<&Arc<dyn ContentFetcher>> {
        match source.source_type() {
            SourceType::Repo | SourceType::ReadmeOnlyRepo => self.repo.as_ref(),
            SourceType::Channel => self.channel.as_ref(),
            SourceType::Custom => self.custom.get(&source.id),
        }
    }
}

#[async_trait::async_trait]
impl ContentFetcher for FetcherSet {
    async fn fetch(
        &self,
        source: &Source,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError> {
        let fetcher = self.resolve(source).ok_or_else(|| {
            FetchError::Unsupported(format!(
                "no fetcher registered for {} source {}",
                source.source_type(),
                source.id
            ))
        })?;
        fetcher.fetch(source, workspace).await
    }
}

/// Custom fetcher that writes a fixed set of files.
#[derive(Debug, Clone, Default)]
pub struct StaticFilesFetcher {
    files: Vec<(String, Vec<u8>)>,
    filter: DocFilter,
}

impl StaticFilesFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }
}

#[async_trait::async_trait]
impl ContentFetcher for StaticFilesFetcher {
    async fn fetch(
        &self,
        source: &Source,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError> {
        let target = source.target_dir(None);
        workspace.remove_dir_all(&target).await?;
        workspace.mkdir(&target).await?;

        for (path, content) in &self.files {
            workspace
                .write_file(&format!("{target}/{path}"), content, WriteMode::Overwrite)
                .await?;
        }

        let report = workspace.filter_tree(&target, &self.filter).await?;
        Ok(FetchOutcome {
            file_count: report.retained,
            version: None,
            feedback: Vec::new(),
        })
    }
}
