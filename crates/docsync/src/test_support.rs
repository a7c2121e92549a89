use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::fetch::{ContentFetcher, FetchError, FetchOutcome, ResolvedVersion};
use crate::feedback::Feedback;
use crate::source::{Source, SourceKind};
use crate::sync::{
    PublishRequest, PushError, PushReceipt, RecordError, SnapshotPublisher, VersionRecord,
    VersionRecorder, collect_snapshot_files,
};
use crate::workspace::{Workspace, WriteMode};

/// Scripted fetcher. Repo sources land in their `[type]-ref` folder.
#[derive(Default)]
pub struct FakeFetcher {
    files: HashMap<String, Vec<(String, String)>>,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    transient: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(mut self, source_id: &str, files: Vec<(&str, &str)>) -> Self {
        self.files.insert(
            source_id.to_owned(),
            files
                .into_iter()
                .map(|(p, c)| (p.to_owned(), c.to_owned()))
                .collect(),
        );
        self
    }

    /// Fail every attempt with a non-retryable error.
    pub fn with_failure(mut self, source_id: &str, message: &str) -> Self {
        self.failures
            .insert(source_id.to_owned(), message.to_owned());
        self
    }

    /// Fail the first `times` attempts with a network error.
    pub fn failing_transiently(self, source_id: &str, times: u32) -> Self {
        self.transient
            .lock()
            .unwrap()
            .insert(source_id.to_owned(), times);
        self
    }

    pub fn with_delay(mut self, source_id: &str, delay: Duration) -> Self {
        self.delays.insert(source_id.to_owned(), delay);
        self
    }

    pub fn attempts(&self, source_id: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(source_id)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(
        &self,
        source: &Source,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(source.id.clone())
            .or_default() += 1;

        if let Some(delay) = self.delays.get(&source.id) {
            tokio::time::sleep(*delay).await;
        }

        {
            let mut transient = self.transient.lock().unwrap();
            if let Some(remaining) = transient.get_mut(&source.id)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(FetchError::Network("connection reset".into()));
            }
        }

        if let Some(message) = self.failures.get(&source.id) {
            return Err(FetchError::Other(message.clone()));
        }

        let version = match &source.kind {
            SourceKind::Repo(spec) => Some(ResolvedVersion::new(spec.ref_type, &spec.git_ref)),
            _ => None,
        };
        let target = source.target_dir(version.as_ref().map(|v| v.folder_name.as_str()));
        workspace.remove_dir_all(&target).await?;
        workspace.mkdir(&target).await?;

        let files = self.files.get(&source.id).cloned().unwrap_or_default();
        for (path, content) in &files {
            workspace
                .write_file(
                    &format!("{target}/{path}"),
                    content.as_bytes(),
                    WriteMode::Overwrite,
                )
                .await?;
        }

        Ok(FetchOutcome {
            file_count: files.len(),
            version,
            feedback: vec![Feedback::info(format!("wrote {} files", files.len()))],
        })
    }
}

/// Captures what would have been pushed.
#[derive(Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<(PublishRequest, Vec<String>)>>,
    failure: Option<PushError>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(mut self, error: PushError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn publish_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<PublishRequest> {
        self.calls.lock().unwrap().last().map(|(r, _)| r.clone())
    }

    /// Paths collected by the most recent publish.
    pub fn last_files(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|(_, files)| files.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SnapshotPublisher for RecordingPublisher {
    async fn publish(
        &self,
        workspace: &dyn Workspace,
        request: &PublishRequest,
    ) -> Result<PushReceipt, PushError> {
        let collected = collect_snapshot_files(workspace).await;
        let paths = collected
            .as_ref()
            .map(|files| files.iter().map(|f| f.path.clone()).collect())
            .unwrap_or_default();

        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((request.clone(), paths));
            calls.len()
        };

        let files = collected?;
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        Ok(PushReceipt {
            commit_sha: format!("commit-{count}"),
            files_changed: files.len(),
        })
    }
}

/// Version records kept in memory, upserted by key.
#[derive(Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<VersionRecord>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, source_id: &str) {
        self.failing.lock().unwrap().insert(source_id.to_owned());
    }

    pub fn records(&self) -> Vec<VersionRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl VersionRecorder for MemoryRecorder {
    fn upsert(&self, record: &VersionRecord) -> Result<(), RecordError> {
        if self.failing.lock().unwrap().contains(&record.source_id) {
            return Err(RecordError(format!("cannot record {}", record.source_id)));
        }

        let mut records = self.records.lock().unwrap();
        records.retain(|r| {
            r.source_id != record.source_id || r.version_folder_name != record.version_folder_name
        });
        records.push(record.clone());
        Ok(())
    }
}
