use serde::{Deserialize, Serialize};

/// A non-fatal message produced while syncing a source.
///
/// Fetchers recover from item-level problems (a skipped merge, a video
/// without a transcript) and report them as feedback instead of failing.
/// The orchestrator logs each item and copies warnings into the source's
/// `SyncResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "message", rename_all = "lowercase")]
pub enum Feedback {
    Info(String),
    Warning(String),
}

impl Feedback {
    pub fn info(msg: impl Into<String>) -> Self {
        Self::Info(msg.into())
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self::Warning(msg.into())
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Info(msg) | Self::Warning(msg) => msg,
        }
    }

    /// Emit this item through `tracing`, tagged with the source id.
    pub fn log(&self, source_id: &str) {
        match self {
            Self::Info(msg) => tracing::info!(source = source_id, "{msg}"),
            Self::Warning(msg) => tracing::warn!(source = source_id, "{msg}"),
        }
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info(msg) => write!(f, "{msg}"),
            Self::Warning(msg) => write!(f, "warning: {msg}"),
        }
    }
}
