//! Step-level durability.
//!
//! Every discrete unit of a sync run implements [`Step`] and is executed
//! through a [`WorkflowEngine`]. Before running a step the engine looks up a
//! checkpoint keyed by `(run_id, step_id, sha256(input))`; a hit returns the
//! recorded output without re-running the step. Retryable failures are
//! retried with exponential backoff, fatal failures abort immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// How a step failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// Configuration-level failure; the whole run must stop.
    #[error("{0}")]
    Fatal(String),

    /// The step failed and repeating it would not help.
    #[error("{0}")]
    Failed(String),

    /// Transient failure; the engine may run the step again.
    #[error("{0}")]
    Retryable(String),
}

impl StepError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Fatal(m) | Self::Failed(m) | Self::Retryable(m) => m,
        }
    }
}

/// A unit of work whose output can be checkpointed.
#[async_trait::async_trait]
pub trait Step: Send + Sync {
    type Input: Serialize + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send;

    /// Stable name, e.g. `fetch-source`.
    fn name(&self) -> &str;

    /// Checkpoint identity for a given input. Defaults to the step name.
    fn step_id(&self, _input: &Self::Input) -> String {
        self.name().to_owned()
    }

    async fn run(&self, input: &Self::Input) -> Result<Self::Output, StepError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub run_id: String,
    pub step_id: String,
    pub input_hash: String,
}

#[derive(Debug, thiserror::Error)]
#[error("checkpoint store error: {0}")]
pub struct CheckpointError(pub String);

/// Persists serialized step outputs.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, key: &CheckpointKey) -> Result<Option<String>, CheckpointError>;
    fn save(&self, key: &CheckpointKey, output: &str) -> Result<(), CheckpointError>;
    /// Drop every checkpoint recorded for `run_id`.
    fn clear_run(&self, run_id: &str) -> Result<(), CheckpointError>;
}

/// Process-local checkpoints. Survives step retries, not process restarts.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<CheckpointKey, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, key: &CheckpointKey) -> Result<Option<String>, CheckpointError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn save(&self, key: &CheckpointKey, output: &str) -> Result<(), CheckpointError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), output.to_owned());
        Ok(())
    }

    fn clear_run(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|k, _| k.run_id != run_id);
        Ok(())
    }
}

/// Exponential backoff between attempts of a retryable step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Run every step exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1` (attempts are 1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Executes steps for a single run with checkpointing and retries.
pub struct WorkflowEngine {
    run_id: String,
    store: Arc<dyn CheckpointStore>,
    retry: RetryPolicy,
}

impl WorkflowEngine {
    pub fn new(run_id: impl Into<String>, store: Arc<dyn CheckpointStore>, retry: RetryPolicy) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            retry,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run `step`, or return its checkpointed output for this input.
    pub async fn run<S: Step>(&self, step: &S, input: &S::Input) -> Result<S::Output, StepError> {
        let key = CheckpointKey {
            run_id: self.run_id.clone(),
            step_id: step.step_id(input),
            input_hash: hash_input(input)?,
        };

        match self.store.load(&key) {
            Ok(Some(saved)) => match serde_json::from_str(&saved) {
                Ok(output) => {
                    tracing::debug!(run = %self.run_id, step = %key.step_id, "replaying checkpoint");
                    return Ok(output);
                }
                Err(e) => {
                    tracing::warn!(step = %key.step_id, "discarding unreadable checkpoint: {e}");
                }
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(step = %key.step_id, "checkpoint lookup failed: {e}"),
        }

        let mut attempt = 1;
        loop {
            match step.run(input).await {
                Ok(output) => {
                    self.checkpoint(&key, &output);
                    return Ok(output);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        step = %key.step_id,
                        attempt,
                        "step failed, retrying in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Forget this run's checkpoints, e.g. once its workspace is gone.
    pub fn finish(&self) {
        if let Err(e) = self.store.clear_run(&self.run_id) {
            tracing::warn!(run = %self.run_id, "failed to clear checkpoints: {e}");
        }
    }

    fn checkpoint<T: Serialize>(&self, key: &CheckpointKey, output: &T) {
        let saved = serde_json::to_string(output)
            .map_err(|e| CheckpointError(e.to_string()))
            .and_then(|json| self.store.save(key, &json));

        if let Err(e) = saved {
            tracing::warn!(step = %key.step_id, "failed to save checkpoint: {e}");
        }
    }
}

fn hash_input<T: Serialize>(input: &T) -> Result<String, StepError> {
    let bytes = serde_json::to_vec(input)
        .map_err(|e| StepError::Fatal(format!("step input is not serializable: {e}")))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
