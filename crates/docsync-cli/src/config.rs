use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docsync::{SnapshotConfig, Source, default_sources};
use serde::Deserialize;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub fetch: FetchSettings,
    /// Replaces the built-in catalogue when non-empty.
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(skip)]
    pub github_token: Option<String>,
    #[serde(skip)]
    pub youtube_api_key: Option<String>,
}

/// How repository content is materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStrategy {
    /// Download and unpack the ref's tarball.
    #[default]
    Tarball,
    /// Shallow sparse clone through the `git` binary.
    Git,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchSettings {
    #[serde(default)]
    pub checkout: CheckoutStrategy,
    /// Scratch root for run workspaces. Defaults to the system temp dir.
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            checkout: CheckoutStrategy::default(),
            workspace_dir: None,
            max_attempts: default_max_attempts(),
            timeout_secs: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

impl AppConfig {
    /// Configured sources, or the built-in catalogue when none are listed.
    pub fn sources(&self) -> Vec<Source> {
        if self.sources.is_empty() {
            default_sources()
        } else {
            self.sources.clone()
        }
    }

    /// Overlay secrets and snapshot overrides from the environment.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("GITHUB_TOKEN") {
            if self.snapshot.token.is_none() {
                self.snapshot.token = Some(token.clone());
            }
            self.github_token = Some(token);
        }
        if let Some(key) = non_empty("YOUTUBE_API_KEY") {
            self.youtube_api_key = Some(key);
        }
        if let Some(repo) = non_empty("DOCSYNC_SNAPSHOT_REPO") {
            self.snapshot.repo = repo;
        }
        if let Some(branch) = non_empty("DOCSYNC_SNAPSHOT_BRANCH") {
            self.snapshot.branch = branch;
        }
    }
}

/// Config file path: `~/.config/docsync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("docsync").join("config.toml"))
}

/// Database path: `~/.local/share/docsync/docsync.db`
pub fn db_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine data directory")?;
    Ok(base.join("docsync").join("docsync.db"))
}

/// Load config from `path`, falling back to defaults if the file is missing.
/// A file that exists but does not parse is an error.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };

    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)
            .with_context(|| format!("failed to parse config at {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read config at {}", path.display())),
    }
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    Ok(toml::from_str(contents)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use docsync::{RefType, SourceKind, SourceType};

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn empty_config_uses_builtin_sources() {
        let config = parse_config("").unwrap();
        assert_eq!(config.snapshot.branch, "main");
        assert_eq!(config.fetch, FetchSettings::default());
        assert_eq!(config.sources().len(), default_sources().len());
    }

    #[test]
    fn parse_snapshot_and_fetch_tables() {
        let config = parse_config(
            r#"
[snapshot]
repo = "acme/docs-snapshot"
branch = "snapshots"
commit_message = "docs: {sources} sources"

[fetch]
checkout = "git"
workspace_dir = "/tmp/docsync"
max_attempts = 5
timeout_secs = 600
"#,
        )
        .unwrap();

        assert_eq!(config.snapshot.repo, "acme/docs-snapshot");
        assert_eq!(config.snapshot.branch, "snapshots");
        assert_eq!(
            config.snapshot.commit_message.as_deref(),
            Some("docs: {sources} sources")
        );
        assert_eq!(config.fetch.checkout, CheckoutStrategy::Git);
        assert_eq!(config.fetch.workspace_dir, Some(PathBuf::from("/tmp/docsync")));
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(config.fetch.timeout_secs, Some(600));
    }

    #[test]
    fn parse_repo_source_with_merges() {
        let config = parse_config(
            r#"
[[sources]]
id = "nuxt"
label = "Nuxt"
type = "repo"
location = "nuxt/nuxt"
ref = "v4.1.0"
ref_type = "tag"
content_subpath = "docs"

[[sources.additional_merges]]
location = "nuxt/nuxt.com"
content_subpath = "content"
"#,
        )
        .unwrap();

        let sources = config.sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, "nuxt");
        match &sources[0].kind {
            SourceKind::Repo(spec) => {
                assert_eq!(spec.location, "nuxt/nuxt");
                assert_eq!(spec.git_ref, "v4.1.0");
                assert_eq!(spec.ref_type, RefType::Tag);
                assert_eq!(spec.content_subpath, "docs");
                assert_eq!(spec.additional_merges.len(), 1);
                assert_eq!(spec.additional_merges[0].git_ref, "main");
            }
            other => panic!("expected repo source, got {other:?}"),
        }
    }

    #[test]
    fn parse_channel_and_readme_sources() {
        let config = parse_config(
            r#"
[[sources]]
id = "talks"
label = "Talks"
type = "channel"
channel_id = "UC123"
handle = "@talks"
max_items = 10

[[sources]]
id = "h3"
label = "h3"
type = "readme-only-repo"
location = "h3js/h3"
"#,
        )
        .unwrap();

        assert_eq!(config.sources[0].source_type(), SourceType::Channel);
        match &config.sources[0].kind {
            SourceKind::Channel(spec) => {
                assert_eq!(spec.channel_id, "UC123");
                assert_eq!(spec.max_items, 10);
            }
            other => panic!("expected channel source, got {other:?}"),
        }
        assert_eq!(config.sources[1].source_type(), SourceType::ReadmeOnlyRepo);
    }

    #[test]
    fn unknown_source_type_is_rejected() {
        let result = parse_config(
            r#"
[[sources]]
id = "x"
label = "X"
type = "ftp"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_snapshot_and_secrets() {
        let mut config = parse_config("[snapshot]\nrepo = \"acme/from-file\"\n").unwrap();
        config.apply_env(env(&[
            ("GITHUB_TOKEN", "ghp_env"),
            ("YOUTUBE_API_KEY", "yt-key"),
            ("DOCSYNC_SNAPSHOT_REPO", "acme/from-env"),
            ("DOCSYNC_SNAPSHOT_BRANCH", "nightly"),
        ]));

        assert_eq!(config.snapshot.repo, "acme/from-env");
        assert_eq!(config.snapshot.branch, "nightly");
        assert_eq!(config.snapshot.token.as_deref(), Some("ghp_env"));
        assert_eq!(config.github_token.as_deref(), Some("ghp_env"));
        assert_eq!(config.youtube_api_key.as_deref(), Some("yt-key"));
    }

    #[test]
    fn file_token_wins_over_env_for_snapshot() {
        let mut config = parse_config("[snapshot]\ntoken = \"ghp_file\"\n").unwrap();
        config.apply_env(env(&[("GITHUB_TOKEN", "ghp_env"), ("YOUTUBE_API_KEY", " ")]));

        assert_eq!(config.snapshot.token.as_deref(), Some("ghp_file"));
        assert_eq!(config.github_token.as_deref(), Some("ghp_env"));
        assert_eq!(config.youtube_api_key, None);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(config.sources.is_empty());
        assert!(!config.sources().is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[snapshot\nrepo = ").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }
}
