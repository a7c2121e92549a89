pub mod cache;
pub mod feedback;
pub mod fetch;
pub mod filter;
pub mod orchestrator;
pub mod registry;
pub mod source;
pub mod sync;
pub mod workflow;
pub mod workspace;

pub use cache::{Cache, Clock, ManualClock, SystemClock, TtlCache};
pub use feedback::Feedback;
pub use fetch::{
    ContentFetcher, FetchError, FetchOutcome, FetcherSet, ResolvedVersion, StaticFilesFetcher,
};
pub use filter::{DocFilter, FilterReport};
pub use orchestrator::{RunError, SyncOrchestrator, new_run_id};
pub use registry::{SourceRegistry, StaticRegistry, default_sources};
pub use source::{
    CONTENT_ROOT, ChannelSpec, CustomSpec, MergeSpec, RefType, RepoSpec, Source, SourceError,
    SourceKind, SourceType, version_folder_name,
};
pub use sync::{
    PublishRequest, PushError, PushOutcome, PushReceipt, RecordError, RunSummary,
    SnapshotConfig, SnapshotPublisher, SyncOptions, SyncResult, SyncRunResult, VersionRecord,
    VersionRecorder, collect_snapshot_files,
};
pub use workflow::{
    CheckpointError, CheckpointKey, CheckpointStore, MemoryCheckpointStore, RetryPolicy, Step,
    StepError, WorkflowEngine,
};
pub use workspace::{
    ContentFile, LocalWorkspace, LocalWorkspaceFactory, ShellOutput, Workspace, WorkspaceError,
    WorkspaceFactory, WorkspaceHandle, WriteMode,
};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
