//! Snapshot commits through the git data API.
//!
//! A push is a fixed sequence: resolve the branch head, upload large blobs,
//! create one tree, create one commit and move the branch ref. The ref
//! update is the only step that changes what readers see, so a failure
//! anywhere earlier leaves the branch untouched.

use base64::Engine;
use docsync::{
    ContentFile, PublishRequest, PushError, PushReceipt, SnapshotConfig, SnapshotPublisher,
    Workspace, collect_snapshot_files,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::GitHubApi;
use crate::content::BlobResponse;
use crate::tree::{CreateTree, NewTreeEntry, TreeResponse};

/// Files at or above this size, or not valid UTF-8, are uploaded as blobs.
pub const INLINE_LIMIT: usize = 100 * 1024;

const DEFAULT_BLOB_CONCURRENCY: usize = 8;

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaRef,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    tree: ShaRef,
}

#[derive(Debug, Serialize)]
struct CreateBlob {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct CreateCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Serialize)]
struct CreateRef<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

/// The branch head a new commit builds on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseCommit {
    pub commit_sha: String,
    pub tree_sha: String,
}

/// Low-level client for one branch of one repository.
pub struct GitDataClient {
    api: GitHubApi,
    repo: String,
    branch: String,
    blob_concurrency: usize,
}

impl GitDataClient {
    pub fn new(api: GitHubApi, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            api,
            repo: repo.into(),
            branch: branch.into(),
            blob_concurrency: DEFAULT_BLOB_CONCURRENCY,
        }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(
            GitHubApi::new(config.token.clone(), config.api_base_url.clone()),
            &config.repo,
            &config.branch,
        )
    }

    pub fn with_blob_concurrency(mut self, limit: usize) -> Self {
        self.blob_concurrency = limit.max(1);
        self
    }

    fn url(&self, path: &str) -> String {
        self.api.repo_url(&self.repo, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        step: &str,
    ) -> Result<T, PushError> {
        let response = req
            .send()
            .await
            .map_err(|e| PushError::remote(step, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::remote(step, Some(status.as_u16()), body));
        }

        response.json().await.map_err(|e| {
            PushError::remote(step, Some(status.as_u16()), format!("invalid response: {e}"))
        })
    }

    /// Current head of the branch, or `None` when the branch does not exist.
    pub async fn resolve_base(&self) -> Result<Option<BaseCommit>, PushError> {
        let step = "resolve base";
        let url = self.url(&format!("git/ref/heads/{}", self.branch));
        let response = self
            .api
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| PushError::remote(step, None, e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(repo = %self.repo, branch = %self.branch, "branch does not exist yet");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::remote(step, Some(status.as_u16()), body));
        }

        let head: RefResponse = response.json().await.map_err(|e| {
            PushError::remote(step, Some(status.as_u16()), format!("invalid response: {e}"))
        })?;

        let commit: CommitResponse = self
            .send(
                self.api.request(
                    reqwest::Method::GET,
                    &self.url(&format!("git/commits/{}", head.object.sha)),
                ),
                "read base commit",
            )
            .await?;

        Ok(Some(BaseCommit {
            commit_sha: commit.sha,
            tree_sha: commit.tree.sha,
        }))
    }

    async fn tree_entry(&self, file: &ContentFile) -> Result<NewTreeEntry, PushError> {
        if file.content.len() < INLINE_LIMIT
            && let Ok(text) = std::str::from_utf8(&file.content)
        {
            return Ok(NewTreeEntry::inline(&file.path, text));
        }

        let body = CreateBlob {
            content: base64::engine::general_purpose::STANDARD.encode(&file.content),
            encoding: "base64",
        };
        let blob: ShaRef = self
            .send(
                self.api
                    .request(reqwest::Method::POST, &self.url("git/blobs"))
                    .json(&body),
                &format!("create blob for {}", file.path),
            )
            .await?;

        tracing::debug!(path = %file.path, sha = %blob.sha, "uploaded blob");
        Ok(NewTreeEntry::blob(&file.path, blob.sha))
    }

    /// Inline small text files, upload everything else with bounded
    /// concurrency. Entry order follows `files`.
    pub async fn build_entries(&self, files: &[ContentFile]) -> Result<Vec<NewTreeEntry>, PushError> {
        let pending: Vec<_> = files.iter().map(|file| self.tree_entry(file)).collect();
        stream::iter(pending)
            .buffered(self.blob_concurrency)
            .try_collect()
            .await
    }

    /// Publish `files` as one commit on the branch.
    ///
    /// The new tree is layered over the branch's current tree, so paths
    /// absent from `files` keep their published content. The ref is moved
    /// without force; a non-fast-forward update is reported as a failure.
    pub async fn push(&self, files: &[ContentFile], message: &str) -> Result<PushReceipt, PushError> {
        if files.is_empty() {
            return Err(PushError::NoFiles);
        }

        let base = self.resolve_base().await?;
        let entries = self.build_entries(files).await?;

        let base_tree = base.as_ref().map(|b| b.tree_sha.as_str());
        let tree: ShaRef = self
            .send(
                self.api
                    .request(reqwest::Method::POST, &self.url("git/trees"))
                    .json(&CreateTree {
                        base_tree,
                        tree: &entries,
                    }),
                "create tree",
            )
            .await?;

        let parents = base
            .as_ref()
            .map(|b| vec![b.commit_sha.as_str()])
            .unwrap_or_default();
        let commit: ShaRef = self
            .send(
                self.api
                    .request(reqwest::Method::POST, &self.url("git/commits"))
                    .json(&CreateCommit {
                        message,
                        tree: &tree.sha,
                        parents,
                    }),
                "create commit",
            )
            .await?;

        if base.is_some() {
            let _: serde_json::Value = self
                .send(
                    self.api
                        .request(
                            reqwest::Method::PATCH,
                            &self.url(&format!("git/refs/heads/{}", self.branch)),
                        )
                        .json(&UpdateRef {
                            sha: &commit.sha,
                            force: false,
                        }),
                    "update ref",
                )
                .await?;
        } else {
            let _: serde_json::Value = self
                .send(
                    self.api
                        .request(reqwest::Method::POST, &self.url("git/refs"))
                        .json(&CreateRef {
                            git_ref: format!("refs/heads/{}", self.branch),
                            sha: &commit.sha,
                        }),
                    "create ref",
                )
                .await?;
        }

        tracing::info!(
            repo = %self.repo,
            branch = %self.branch,
            commit = %commit.sha,
            files = files.len(),
            "snapshot committed"
        );

        Ok(PushReceipt {
            commit_sha: commit.sha,
            files_changed: files.len(),
        })
    }

    /// Every file on the branch, sorted by path.
    pub async fn read_back(&self) -> Result<Vec<ContentFile>, PushError> {
        let tree: TreeResponse = self
            .send(
                self.api.request(
                    reqwest::Method::GET,
                    &self.url(&format!("git/trees/{}?recursive=1", self.branch)),
                ),
                "list tree",
            )
            .await?;

        tracing::debug!(repo = %self.repo, tree = %tree.sha, entries = tree.tree.len(), "reading branch back");
        if tree.truncated {
            tracing::warn!(repo = %self.repo, tree = %tree.sha, "tree listing truncated, read-back is partial");
        }

        let mut files = Vec::new();
        for entry in tree.tree.iter().filter(|e| e.entry_type == "blob") {
            let step = format!("read blob {}", entry.path);
            let blob: BlobResponse = self
                .send(
                    self.api.request(
                        reqwest::Method::GET,
                        &self.url(&format!("git/blobs/{}", entry.sha)),
                    ),
                    &step,
                )
                .await?;
            let content = blob
                .decode()
                .map_err(|e| PushError::remote(&step, None, e))?;
            files.push(ContentFile {
                path: entry.path.clone(),
                content,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

/// [`SnapshotPublisher`] backed by [`GitDataClient`].
#[derive(Debug, Clone)]
pub struct GitSnapshotPublisher {
    blob_concurrency: usize,
}

impl Default for GitSnapshotPublisher {
    fn default() -> Self {
        Self {
            blob_concurrency: DEFAULT_BLOB_CONCURRENCY,
        }
    }
}

impl GitSnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob_concurrency(mut self, limit: usize) -> Self {
        self.blob_concurrency = limit.max(1);
        self
    }
}

#[async_trait::async_trait]
impl SnapshotPublisher for GitSnapshotPublisher {
    async fn publish(
        &self,
        workspace: &dyn Workspace,
        request: &PublishRequest,
    ) -> Result<PushReceipt, PushError> {
        let files = collect_snapshot_files(workspace).await?;
        tracing::info!(files = files.len(), "pushing snapshot");

        GitDataClient::from_config(&request.config)
            .with_blob_concurrency(self.blob_concurrency)
            .push(&files, &request.message)
            .await
    }
}
