use std::fmt;

use serde::{Deserialize, Serialize};

/// Directory under the workspace root that holds all synced content.
pub const CONTENT_ROOT: &str = "docs";

/// Errors describing an invalid or unknown source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("invalid repository location: {0} (expected owner/repo)")]
    InvalidLocation(String),

    #[error("duplicate source id: {0}")]
    DuplicateId(String),

    #[error("output folder {folder} of {second} overlaps the folder of {first}")]
    FolderConflict {
        folder: String,
        first: String,
        second: String,
    },

    #[error("invalid source {id}: {reason}")]
    Invalid { id: String, reason: String },
}

/// How a repository ref should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    #[default]
    Branch,
    Tag,
    Release,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Tag => "tag",
            Self::Release => "release",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "branch" => Some(Self::Branch),
            "tag" => Some(Self::Tag),
            "release" => Some(Self::Release),
            _ => None,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Folder name distinguishing one synced ref of a source from another,
/// e.g. `[branch]-main` or `[release]-v4.2.0`.
///
/// Path separators inside the ref are replaced so every version occupies
/// exactly one directory level.
pub fn version_folder_name(ref_type: RefType, resolved_ref: &str) -> String {
    let flat: String = resolved_ref
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    format!("[{ref_type}]-{flat}")
}

/// Discriminant of [`SourceKind`], used for registry queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Repo,
    ReadmeOnlyRepo,
    Channel,
    Custom,
}

impl SourceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "repo" | "github" => Some(Self::Repo),
            "readme-only-repo" | "readme" => Some(Self::ReadmeOnlyRepo),
            "channel" | "youtube" => Some(Self::Channel),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repo => write!(f, "repo"),
            Self::ReadmeOnlyRepo => write!(f, "readme-only-repo"),
            Self::Channel => write!(f, "channel"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// A configured origin of documentation content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Stable unique identifier. Doubles as the default output folder.
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// Per-type fetch parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceKind {
    /// Full documentation tree from a repository subpath.
    Repo(RepoSpec),
    /// Only the repository's `README.md`.
    ReadmeOnlyRepo(RepoSpec),
    /// Video listing with best-effort transcripts.
    Channel(ChannelSpec),
    /// Files produced by a fetcher registered under the source id.
    Custom(CustomSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSpec {
    /// `owner/repo`
    pub location: String,
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
    #[serde(default)]
    pub ref_type: RefType,
    #[serde(default)]
    pub content_subpath: String,
    #[serde(default)]
    pub output_folder: Option<String>,
    #[serde(default)]
    pub additional_merges: Vec<MergeSpec>,
}

/// An extra repository merged into a source's folder without overwriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSpec {
    pub location: String,
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
    #[serde(default)]
    pub content_subpath: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub channel_id: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default)]
    pub output_folder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomSpec {
    #[serde(default)]
    pub output_folder: Option<String>,
}

fn default_ref() -> String {
    "main".into()
}

fn default_max_items() -> usize {
    50
}

/// Split an `owner/repo` location into its two parts.
pub fn split_location(location: &str) -> Result<(&str, &str), SourceError> {
    match location.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(SourceError::InvalidLocation(location.to_owned())),
    }
}

impl RepoSpec {
    pub fn new(location: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            git_ref: git_ref.into(),
            ref_type: RefType::Branch,
            content_subpath: String::new(),
            output_folder: None,
            additional_merges: Vec::new(),
        }
    }

    pub fn owner_and_repo(&self) -> Result<(&str, &str), SourceError> {
        split_location(&self.location)
    }

    /// True when the ref must be looked up as the most recent release.
    pub fn wants_latest_release(&self) -> bool {
        self.ref_type == RefType::Release && self.git_ref.eq_ignore_ascii_case("latest")
    }
}

impl Source {
    pub fn repo(id: impl Into<String>, label: impl Into<String>, spec: RepoSpec) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: SourceKind::Repo(spec),
        }
    }

    pub fn readme_only(id: impl Into<String>, label: impl Into<String>, spec: RepoSpec) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: SourceKind::ReadmeOnlyRepo(spec),
        }
    }

    pub fn channel(id: impl Into<String>, label: impl Into<String>, spec: ChannelSpec) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: SourceKind::Channel(spec),
        }
    }

    pub fn custom(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: SourceKind::Custom(CustomSpec::default()),
        }
    }

    pub fn source_type(&self) -> SourceType {
        match &self.kind {
            SourceKind::Repo(_) => SourceType::Repo,
            SourceKind::ReadmeOnlyRepo(_) => SourceType::ReadmeOnlyRepo,
            SourceKind::Channel(_) => SourceType::Channel,
            SourceKind::Custom(_) => SourceType::Custom,
        }
    }

    /// Folder under [`CONTENT_ROOT`] owned by this source.
    pub fn output_folder(&self) -> &str {
        let configured = match &self.kind {
            SourceKind::Repo(spec) | SourceKind::ReadmeOnlyRepo(spec) => {
                spec.output_folder.as_deref()
            }
            SourceKind::Channel(spec) => spec.output_folder.as_deref(),
            SourceKind::Custom(spec) => spec.output_folder.as_deref(),
        };
        configured.filter(|f| !f.is_empty()).unwrap_or(&self.id)
    }

    /// Workspace-relative directory for this source, optionally nested in a
    /// version folder.
    pub fn target_dir(&self, version_folder: Option<&str>) -> String {
        match version_folder {
            Some(version) => format!("{CONTENT_ROOT}/{}/{version}", self.output_folder()),
            None => format!("{CONTENT_ROOT}/{}", self.output_folder()),
        }
    }

    /// Structural checks that do not depend on other sources.
    pub fn validate(&self) -> Result<(), SourceError> {
        let invalid = |reason: &str| SourceError::Invalid {
            id: self.id.clone(),
            reason: reason.to_owned(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.output_folder().contains("..") || self.output_folder().starts_with('/') {
            return Err(invalid("output folder must stay inside the content root"));
        }

        match &self.kind {
            SourceKind::Repo(spec) => {
                spec.owner_and_repo()?;
                for merge in &spec.additional_merges {
                    split_location(&merge.location)?;
                }
            }
            SourceKind::ReadmeOnlyRepo(spec) => {
                spec.owner_and_repo()?;
                if !spec.additional_merges.is_empty() {
                    return Err(invalid("readme-only sources cannot merge other repositories"));
                }
            }
            SourceKind::Channel(spec) => {
                if spec.channel_id.trim().is_empty() {
                    return Err(invalid("channel_id must not be empty"));
                }
                if spec.max_items == 0 {
                    return Err(invalid("max_items must be at least 1"));
                }
            }
            SourceKind::Custom(_) => {}
        }

        Ok(())
    }
}
