use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::fetch::FetchOutcome;
use crate::source::{CONTENT_ROOT, RefType, Source, split_location};
use crate::workspace::{ContentFile, Workspace};

/// Outcome of syncing a single source. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub source_id: String,
    pub label: String,
    pub success: bool,
    pub file_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_type: Option<RefType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_ref: Option<String>,
}

impl SyncResult {
    pub fn succeeded(source: &Source, outcome: FetchOutcome, elapsed: Duration) -> Self {
        let warnings = outcome
            .feedback
            .iter()
            .filter(|f| f.is_warning())
            .map(|f| f.message().to_owned())
            .collect();
        let (version_folder_name, ref_type, resolved_ref) = match outcome.version {
            Some(v) => (Some(v.folder_name), Some(v.ref_type), Some(v.resolved_ref)),
            None => (None, None, None),
        };

        Self {
            source_id: source.id.clone(),
            label: source.label.clone(),
            success: true,
            file_count: outcome.file_count,
            error: None,
            duration_ms: millis(elapsed),
            warnings,
            version_folder_name,
            ref_type,
            resolved_ref,
        }
    }

    pub fn failed(source: &Source, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            source_id: source.id.clone(),
            label: source.label.clone(),
            success: false,
            file_count: 0,
            error: Some(error.into()),
            duration_ms: millis(elapsed),
            warnings: Vec::new(),
            version_folder_name: None,
            ref_type: None,
            resolved_ref: None,
        }
    }

    /// The record to persist once this result is part of a pushed snapshot.
    pub fn version_record(&self, synced_at: u64) -> Option<VersionRecord> {
        if !self.success {
            return None;
        }
        Some(VersionRecord {
            source_id: self.source_id.clone(),
            version_folder_name: self.version_folder_name.clone()?,
            ref_type: self.ref_type?,
            resolved_ref: self.resolved_ref.clone()?,
            synced_at,
        })
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Which ref of a source was last synced, and into which folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub source_id: String,
    pub version_folder_name: String,
    pub ref_type: RefType,
    pub resolved_ref: String,
    /// Epoch seconds.
    pub synced_at: u64,
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
#[error("version record error: {0}")]
pub struct RecordError(pub String);

/// Persists [`VersionRecord`]s keyed by `(source_id, version_folder_name)`.
pub trait VersionRecorder: Send + Sync {
    /// Insert or replace the record for its key.
    fn upsert(&self, record: &VersionRecord) -> Result<(), RecordError>;
}

pub const DEFAULT_COMMIT_MESSAGE: &str = "chore: sync {sources} sources ({files} files)";

/// Where and how the snapshot commit is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// `owner/repo`
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    /// Template with `{sources}` and `{files}` placeholders.
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_branch() -> String {
    "main".into()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            branch: default_branch(),
            token: None,
            commit_message: None,
            api_base_url: None,
        }
    }
}

impl SnapshotConfig {
    pub fn new(repo: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Checks required before anything may be pushed.
    pub fn validate(&self) -> Result<(), String> {
        if self.repo.trim().is_empty() {
            return Err("snapshot repository is not configured".into());
        }
        split_location(&self.repo).map_err(|e| e.to_string())?;
        if self.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err("snapshot token is not configured".into());
        }
        if self.branch.trim().is_empty() {
            return Err("snapshot branch must not be empty".into());
        }
        Ok(())
    }

    /// Commit message for a push covering `sources` with `files` files in total.
    pub fn render_message(&self, sources: &[String], files: usize) -> String {
        let template = self
            .commit_message
            .as_deref()
            .unwrap_or(DEFAULT_COMMIT_MESSAGE);
        let subject = template
            .replace("{sources}", &sources.len().to_string())
            .replace("{files}", &files.to_string());

        if sources.is_empty() {
            return subject;
        }

        let list = sources
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{subject}\n\nSources:\n{list}")
    }
}

/// Input to a publish: everything except the files, which come from the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRequest {
    pub config: SnapshotConfig,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReceipt {
    pub commit_sha: String,
    pub files_changed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("No files to push")]
    NoFiles,

    #[error("Failed to collect files: {0}")]
    Workspace(String),

    #[error("Failed to {step}: {body}")]
    Remote {
        step: String,
        status: Option<u16>,
        body: String,
    },
}

impl PushError {
    pub fn remote(step: impl Into<String>, status: Option<u16>, body: impl Into<String>) -> Self {
        Self::Remote {
            step: step.into(),
            status,
            body: body.into(),
        }
    }

    /// Transport failures and 5xx responses may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { status, .. } => status.is_none_or(|s| s >= 500),
            Self::NoFiles | Self::Workspace(_) => false,
        }
    }
}

/// Publishes the workspace content as one commit.
#[async_trait::async_trait]
pub trait SnapshotPublisher: Send + Sync {
    async fn publish(
        &self,
        workspace: &dyn Workspace,
        request: &PublishRequest,
    ) -> Result<PushReceipt, PushError>;
}

/// Every file under the content root, with repository-relative paths.
pub async fn collect_snapshot_files(
    workspace: &dyn Workspace,
) -> Result<Vec<ContentFile>, PushError> {
    let files = workspace
        .collect_files(CONTENT_ROOT)
        .await
        .map_err(|e| PushError::Workspace(e.to_string()))?;

    if files.is_empty() {
        return Err(PushError::NoFiles);
    }

    Ok(files
        .into_iter()
        .map(|f| ContentFile {
            path: format!("{CONTENT_ROOT}/{}", f.path),
            content: f.content,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushOutcome {
    pub fn pushed(receipt: PushReceipt) -> Self {
        Self {
            success: true,
            commit_sha: Some(receipt.commit_sha),
            files_changed: Some(receipt.files_changed),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            commit_sha: None,
            files_changed: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub files: usize,
}

impl RunSummary {
    pub fn from_results(results: &[SyncResult]) -> Self {
        let success = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            success,
            failed: results.len() - success,
            files: results
                .iter()
                .filter(|r| r.success)
                .map(|r| r.file_count)
                .sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunResult {
    pub success: bool,
    pub summary: RunSummary,
    pub push: Option<PushOutcome>,
    pub results: Vec<SyncResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Discard content left in the run's workspace by an earlier attempt.
    /// The published tree is still layered over the branch.
    pub reset: bool,
    pub push: bool,
    /// Restrict the run to one source id.
    pub source_filter: Option<String>,
    /// Reuse a run id to resume its unfinished steps.
    pub run_id: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reset: false,
            push: true,
            source_filter: None,
            run_id: None,
            timeout: None,
        }
    }
}
