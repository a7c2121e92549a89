//! The durable sync run.
//!
//! A run is a fixed sequence of workflow steps: resolve sources, prepare the
//! workspace, fetch each source, push the snapshot, record versions and
//! clean up. Source failures are isolated; only configuration problems end
//! a run early.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::fetch::{ContentFetcher, FetchOutcome};
use crate::registry::SourceRegistry;
use crate::source::Source;
use crate::sync::{
    PublishRequest, PushOutcome, PushReceipt, RunSummary, SnapshotConfig, SnapshotPublisher,
    SyncOptions, SyncResult, SyncRunResult, VersionRecord, VersionRecorder, epoch_secs,
};
use crate::workflow::{
    CheckpointStore, MemoryCheckpointStore, RetryPolicy, Step, StepError, WorkflowEngine,
};
use crate::workspace::{Workspace, WorkspaceFactory, WorkspaceHandle};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("sync aborted: {0}")]
    Fatal(String),

    #[error("sync timed out after {0:?}")]
    TimedOut(Duration),

    #[error("step {step} failed: {message}")]
    Step { step: String, message: String },
}

impl RunError {
    fn from_step(step: &str, err: StepError) -> Self {
        match err {
            StepError::Fatal(message) => Self::Fatal(message),
            other => Self::Step {
                step: step.to_owned(),
                message: other.message().to_owned(),
            },
        }
    }
}

/// Unique per process; unique enough across processes for scratch dirs.
pub fn new_run_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("run-{millis}-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

pub struct SyncOrchestrator {
    registry: Arc<dyn SourceRegistry>,
    fetcher: Arc<dyn ContentFetcher>,
    publisher: Arc<dyn SnapshotPublisher>,
    recorder: Arc<dyn VersionRecorder>,
    workspaces: Arc<dyn WorkspaceFactory>,
    checkpoints: Arc<dyn CheckpointStore>,
    retry: RetryPolicy,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<dyn SourceRegistry>,
        fetcher: Arc<dyn ContentFetcher>,
        publisher: Arc<dyn SnapshotPublisher>,
        recorder: Arc<dyn VersionRecorder>,
        workspaces: Arc<dyn WorkspaceFactory>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            publisher,
            recorder,
            workspaces,
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sync the requested sources and publish them as one snapshot commit.
    ///
    /// Cleanup always runs, whether the run finished, failed fatally or hit
    /// `options.timeout`.
    pub async fn run_sync(
        &self,
        config: &SnapshotConfig,
        options: SyncOptions,
    ) -> Result<SyncRunResult, RunError> {
        let run_id = options.run_id.clone().unwrap_or_else(new_run_id);
        let engine = WorkflowEngine::new(&run_id, self.checkpoints.clone(), self.retry.clone());
        // Located before anything runs so cleanup can reach a workspace whose
        // preparation was cut short.
        let workspace_handle = self.workspaces.locate(&run_id).ok();

        tracing::info!(run = %run_id, reset = options.reset, push = options.push, "starting sync");

        let outcome = match options.timeout {
            Some(limit) => {
                match tokio::time::timeout(
                    limit,
                    self.execute(&engine, config, &options),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::error!(run = %run_id, "sync timed out after {limit:?}");
                        Err(RunError::TimedOut(limit))
                    }
                }
            }
            None => self.execute(&engine, config, &options).await,
        };

        let cleanup = CleanupStep {
            workspaces: self.workspaces.clone(),
        };
        if let Err(e) = engine.run(&cleanup, &workspace_handle).await {
            tracing::warn!(run = %run_id, "cleanup failed: {e}");
        }
        engine.finish();

        outcome
    }

    async fn execute(
        &self,
        engine: &WorkflowEngine,
        config: &SnapshotConfig,
        options: &SyncOptions,
    ) -> Result<SyncRunResult, RunError> {
        if options.push {
            config.validate().map_err(RunError::Fatal)?;
        }

        let resolve = ResolveSourcesStep {
            registry: self.registry.clone(),
        };
        let sources = engine
            .run(&resolve, &options.source_filter)
            .await
            .map_err(|e| RunError::from_step(resolve.name(), e))?;

        let prepare = PrepareWorkspaceStep {
            workspaces: self.workspaces.clone(),
        };
        let input = PrepareInput {
            run_id: engine.run_id().to_owned(),
            reset: options.reset,
        };
        let handle = engine
            .run(&prepare, &input)
            .await
            .map_err(|e| RunError::from_step(prepare.name(), e))?;
        let workspace = self.workspaces.open(&handle);

        let fetch = FetchSourceStep {
            fetcher: self.fetcher.clone(),
            workspace: workspace.clone(),
        };
        let mut results = Vec::with_capacity(sources.len());
        for source in &sources {
            let started = Instant::now();
            let result = match engine.run(&fetch, source).await {
                Ok(outcome) => {
                    for item in &outcome.feedback {
                        item.log(&source.id);
                    }
                    SyncResult::succeeded(source, outcome, started.elapsed())
                }
                Err(e) => {
                    tracing::warn!(source = %source.id, "sync failed: {e}");
                    SyncResult::failed(source, e.message(), started.elapsed())
                }
            };
            tracing::info!(
                source = %source.id,
                files = result.file_count,
                success = result.success,
                "source processed"
            );
            results.push(result);
        }

        let summary = RunSummary::from_results(&results);

        let push = if options.push && summary.success > 0 {
            let synced: Vec<String> = results
                .iter()
                .filter(|r| r.success)
                .map(|r| r.source_id.clone())
                .collect();
            let request = PublishRequest {
                config: config.clone(),
                message: config.render_message(&synced, summary.files),
            };
            let step = PushSnapshotStep {
                publisher: self.publisher.clone(),
                workspace,
            };
            Some(match engine.run(&step, &request).await {
                Ok(receipt) => {
                    tracing::info!(commit = %receipt.commit_sha, files = receipt.files_changed, "snapshot pushed");
                    PushOutcome::pushed(receipt)
                }
                Err(e) => {
                    tracing::error!("push failed: {e}");
                    PushOutcome::failed(e.message())
                }
            })
        } else {
            None
        };

        if push.as_ref().is_some_and(|p| p.success) {
            let synced_at = epoch_secs();
            let records: Vec<VersionRecord> = results
                .iter()
                .filter_map(|r| r.version_record(synced_at))
                .collect();
            if !records.is_empty() {
                let step = RecordVersionsStep {
                    recorder: self.recorder.clone(),
                };
                if let Err(e) = engine.run(&step, &records).await {
                    tracing::warn!("recording versions failed: {e}");
                }
            }
        }

        tracing::info!(
            "Done: {}/{} sources, {} files",
            summary.success,
            summary.total,
            summary.files
        );

        Ok(SyncRunResult {
            success: summary.failed == 0 && push.as_ref().is_none_or(|p| p.success),
            summary,
            push,
            results,
        })
    }
}

struct ResolveSourcesStep {
    registry: Arc<dyn SourceRegistry>,
}

#[async_trait::async_trait]
impl Step for ResolveSourcesStep {
    type Input = Option<String>;
    type Output = Vec<Source>;

    fn name(&self) -> &str {
        "resolve-sources"
    }

    async fn run(&self, filter: &Option<String>) -> Result<Vec<Source>, StepError> {
        let sources = match filter {
            Some(id) => vec![
                self.registry
                    .get_source(id)
                    .ok_or_else(|| StepError::Fatal(format!("unknown source: {id}")))?,
            ],
            None => self.registry.list_sources(),
        };

        if sources.is_empty() {
            return Err(StepError::Fatal("no sources to sync".into()));
        }
        Ok(sources)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PrepareInput {
    run_id: String,
    reset: bool,
}

struct PrepareWorkspaceStep {
    workspaces: Arc<dyn WorkspaceFactory>,
}

#[async_trait::async_trait]
impl Step for PrepareWorkspaceStep {
    type Input = PrepareInput;
    type Output = WorkspaceHandle;

    fn name(&self) -> &str {
        "prepare-workspace"
    }

    async fn run(&self, input: &PrepareInput) -> Result<WorkspaceHandle, StepError> {
        self.workspaces
            .prepare(&input.run_id, input.reset)
            .await
            .map_err(|e| StepError::Fatal(format!("failed to prepare workspace: {e}")))
    }
}

struct FetchSourceStep {
    fetcher: Arc<dyn ContentFetcher>,
    workspace: Arc<dyn Workspace>,
}

#[async_trait::async_trait]
impl Step for FetchSourceStep {
    type Input = Source;
    type Output = FetchOutcome;

    fn name(&self) -> &str {
        "fetch-source"
    }

    fn step_id(&self, source: &Source) -> String {
        format!("fetch-source:{}", source.id)
    }

    async fn run(&self, source: &Source) -> Result<FetchOutcome, StepError> {
        self.fetcher
            .fetch(source, self.workspace.as_ref())
            .await
            .map_err(|e| {
                if e.is_retryable() {
                    StepError::Retryable(e.to_string())
                } else {
                    StepError::Failed(e.to_string())
                }
            })
    }
}

struct PushSnapshotStep {
    publisher: Arc<dyn SnapshotPublisher>,
    workspace: Arc<dyn Workspace>,
}

#[async_trait::async_trait]
impl Step for PushSnapshotStep {
    type Input = PublishRequest;
    type Output = PushReceipt;

    fn name(&self) -> &str {
        "push-snapshot"
    }

    async fn run(&self, request: &PublishRequest) -> Result<PushReceipt, StepError> {
        self.publisher
            .publish(self.workspace.as_ref(), request)
            .await
            .map_err(|e| {
                if e.is_retryable() {
                    StepError::Retryable(e.to_string())
                } else {
                    StepError::Failed(e.to_string())
                }
            })
    }
}

struct RecordVersionsStep {
    recorder: Arc<dyn VersionRecorder>,
}

#[async_trait::async_trait]
impl Step for RecordVersionsStep {
    type Input = Vec<VersionRecord>;
    type Output = usize;

    fn name(&self) -> &str {
        "record-versions"
    }

    async fn run(&self, records: &Vec<VersionRecord>) -> Result<usize, StepError> {
        let mut recorded = 0;
        for record in records {
            match self.recorder.upsert(record) {
                Ok(()) => recorded += 1,
                Err(e) => tracing::warn!(source = %record.source_id, "failed to record version: {e}"),
            }
        }
        Ok(recorded)
    }
}

struct CleanupStep {
    workspaces: Arc<dyn WorkspaceFactory>,
}

#[async_trait::async_trait]
impl Step for CleanupStep {
    type Input = Option<WorkspaceHandle>;
    type Output = ();

    fn name(&self) -> &str {
        "cleanup"
    }

    async fn run(&self, handle: &Option<WorkspaceHandle>) -> Result<(), StepError> {
        let Some(handle) = handle else {
            return Ok(());
        };
        self.workspaces
            .destroy(handle)
            .await
            .map_err(|e| StepError::Failed(e.to_string()))
    }
}
