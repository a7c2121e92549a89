use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::filter::{DocFilter, FilterReport};
use crate::source::CONTENT_ROOT;

/// A file collected from a workspace. `path` is relative and `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    pub path: String,
    pub content: Vec<u8>,
}

/// Captured result of a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Whether a write may replace an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    KeepExisting,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("path escapes workspace: {0}")]
    InvalidPath(String),

    #[error("shell command failed: {0}")]
    Shell(String),
}

impl WorkspaceError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Filesystem capability that fetch and push logic is written against.
///
/// All paths are relative to the workspace root. Implementations may be a
/// local scratch directory or a remote sandbox reachable only through
/// [`Workspace::run_shell`]; the filter has a shell-based default so only
/// the primitive operations must be provided.
#[async_trait::async_trait]
pub trait Workspace: Send + Sync {
    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;

    async fn mkdir(&self, rel: &str) -> Result<(), WorkspaceError>;

    /// Write a file, creating parent directories. Returns `false` when
    /// `mode` is [`WriteMode::KeepExisting`] and the file already existed.
    async fn write_file(
        &self,
        rel: &str,
        content: &[u8],
        mode: WriteMode,
    ) -> Result<bool, WorkspaceError>;

    async fn read_file(&self, rel: &str) -> Result<Vec<u8>, WorkspaceError>;

    /// Run `command` through `sh -c` with `cwd` as working directory.
    async fn run_shell(&self, command: &str, cwd: &str) -> Result<ShellOutput, WorkspaceError>;

    /// Recursively collect every regular file under `rel`, sorted by path.
    /// Paths in the result are relative to `rel`.
    async fn collect_files(&self, rel: &str) -> Result<Vec<ContentFile>, WorkspaceError>;

    async fn remove_dir_all(&self, rel: &str) -> Result<(), WorkspaceError>;

    /// Apply `filter` to the directory `rel`.
    async fn filter_tree(
        &self,
        rel: &str,
        filter: &DocFilter,
    ) -> Result<FilterReport, WorkspaceError> {
        let output = self.run_shell(&filter.shell_script(rel), "").await?;
        if !output.success() {
            return Err(WorkspaceError::Shell(output.stderr));
        }
        FilterReport::parse_shell(&output.stdout).ok_or_else(|| {
            WorkspaceError::Shell(format!("unexpected filter output: {}", output.stdout))
        })
    }
}

/// Reject absolute paths and parent traversal.
pub fn normalize_rel(rel: &str) -> Result<PathBuf, WorkspaceError> {
    let mut out = PathBuf::new();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(WorkspaceError::InvalidPath(rel.to_owned())),
        }
    }
    Ok(out)
}

/// A scratch directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf, WorkspaceError> {
        Ok(self.root.join(normalize_rel(rel)?))
    }
}

#[async_trait::async_trait]
impl Workspace for LocalWorkspace {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn mkdir(&self, rel: &str) -> Result<(), WorkspaceError> {
        let path = self.resolve(rel)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))
    }

    async fn write_file(
        &self,
        rel: &str,
        content: &[u8],
        mode: WriteMode,
    ) -> Result<bool, WorkspaceError> {
        let path = self.resolve(rel)?;

        if mode == WriteMode::KeepExisting
            && tokio::fs::try_exists(&path)
                .await
                .map_err(|e| WorkspaceError::io(&path, e))?
        {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkspaceError::io(parent, e))?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))?;
        Ok(true)
    }

    async fn read_file(&self, rel: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.resolve(rel)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))
    }

    async fn run_shell(&self, command: &str, cwd: &str) -> Result<ShellOutput, WorkspaceError> {
        let dir = self.resolve(cwd)?;
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&dir)
            .output()
            .await
            .map_err(|e| WorkspaceError::io(&dir, e))?;

        Ok(ShellOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn collect_files(&self, rel: &str) -> Result<Vec<ContentFile>, WorkspaceError> {
        let base = self.resolve(rel)?;
        tokio::task::spawn_blocking(move || collect_local(&base))
            .await
            .map_err(|e| WorkspaceError::Shell(format!("collect task failed: {e}")))?
    }

    async fn remove_dir_all(&self, rel: &str) -> Result<(), WorkspaceError> {
        let path = self.resolve(rel)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::io(&path, e)),
        }
    }

    async fn filter_tree(
        &self,
        rel: &str,
        filter: &DocFilter,
    ) -> Result<FilterReport, WorkspaceError> {
        let dir = self.resolve(rel)?;
        let filter = filter.clone();
        let target = dir.clone();
        tokio::task::spawn_blocking(move || filter.apply(&target))
            .await
            .map_err(|e| WorkspaceError::Shell(format!("filter task failed: {e}")))?
            .map_err(|e| WorkspaceError::io(&dir, e))
    }
}

fn collect_local(base: &Path) -> Result<Vec<ContentFile>, WorkspaceError> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(base).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| WorkspaceError::io(base, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|_| WorkspaceError::InvalidPath(entry.path().display().to_string()))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let content =
            std::fs::read(entry.path()).map_err(|e| WorkspaceError::io(entry.path(), e))?;
        files.push(ContentFile { path, content });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Identifies a prepared workspace across workflow steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceHandle {
    pub run_id: String,
    pub root: PathBuf,
}

/// Creates, reopens and destroys per-run workspaces.
#[async_trait::async_trait]
pub trait WorkspaceFactory: Send + Sync {
    /// Where the workspace for `run_id` lives, whether or not it exists yet.
    /// Must not touch storage.
    fn locate(&self, run_id: &str) -> Result<WorkspaceHandle, WorkspaceError>;

    /// Create the workspace for `run_id` with an empty content root.
    /// With `reset`, content left by an earlier attempt is discarded.
    async fn prepare(&self, run_id: &str, reset: bool) -> Result<WorkspaceHandle, WorkspaceError>;

    fn open(&self, handle: &WorkspaceHandle) -> Arc<dyn Workspace>;

    async fn destroy(&self, handle: &WorkspaceHandle) -> Result<(), WorkspaceError>;
}

/// Workspaces as `<base>/<run_id>` directories.
#[derive(Debug, Clone)]
pub struct LocalWorkspaceFactory {
    base: PathBuf,
}

impl LocalWorkspaceFactory {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `$TMPDIR/docsync`
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("docsync"))
    }
}

#[async_trait::async_trait]
impl WorkspaceFactory for LocalWorkspaceFactory {
    fn locate(&self, run_id: &str) -> Result<WorkspaceHandle, WorkspaceError> {
        Ok(WorkspaceHandle {
            run_id: run_id.to_owned(),
            root: self.base.join(normalize_rel(run_id)?),
        })
    }

    async fn prepare(&self, run_id: &str, reset: bool) -> Result<WorkspaceHandle, WorkspaceError> {
        let handle = self.locate(run_id)?;
        let workspace = LocalWorkspace::new(&handle.root);

        workspace.mkdir("").await?;
        if reset {
            workspace.remove_dir_all(CONTENT_ROOT).await?;
        }
        workspace.mkdir(CONTENT_ROOT).await?;

        Ok(handle)
    }

    fn open(&self, handle: &WorkspaceHandle) -> Arc<dyn Workspace> {
        Arc::new(LocalWorkspace::new(&handle.root))
    }

    async fn destroy(&self, handle: &WorkspaceHandle) -> Result<(), WorkspaceError> {
        LocalWorkspace::new(&handle.root).remove_dir_all("").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Delegates primitives to a local directory but keeps the trait's
    /// shell-based `filter_tree`, like a remote sandbox would.
    struct ShellOnly(LocalWorkspace);

    #[async_trait::async_trait]
    impl Workspace for ShellOnly {
        fn describe(&self) -> String {
            self.0.describe()
        }
        async fn mkdir(&self, rel: &str) -> Result<(), WorkspaceError> {
            self.0.mkdir(rel).await
        }
        async fn write_file(
            &self,
            rel: &str,
            content: &[u8],
            mode: WriteMode,
        ) -> Result<bool, WorkspaceError> {
            self.0.write_file(rel, content, mode).await
        }
        async fn read_file(&self, rel: &str) -> Result<Vec<u8>, WorkspaceError> {
            self.0.read_file(rel).await
        }
        async fn run_shell(&self, command: &str, cwd: &str) -> Result<ShellOutput, WorkspaceError> {
            self.0.run_shell(command, cwd).await
        }
        async fn collect_files(&self, rel: &str) -> Result<Vec<ContentFile>, WorkspaceError> {
            self.0.collect_files(rel).await
        }
        async fn remove_dir_all(&self, rel: &str) -> Result<(), WorkspaceError> {
            self.0.remove_dir_all(rel).await
        }
    }

    #[test]
    fn normalize_rejects_escapes() {
        assert!(normalize_rel("../etc").is_err());
        assert!(normalize_rel("/abs").is_err());
        assert_eq!(normalize_rel("./a/b").unwrap(), PathBuf::from("a/b"));
        assert_eq!(normalize_rel("").unwrap(), PathBuf::new());
    }

    #[tokio::test]
    async fn write_keep_existing_does_not_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(tmp.path());

        assert!(ws.write_file("docs/a.md", b"first", WriteMode::Overwrite).await.unwrap());
        assert!(!ws.write_file("docs/a.md", b"second", WriteMode::KeepExisting).await.unwrap());
        assert_eq!(ws.read_file("docs/a.md").await.unwrap(), b"first");

        assert!(ws.write_file("docs/a.md", b"third", WriteMode::Overwrite).await.unwrap());
        assert_eq!(ws.read_file("docs/a.md").await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn collect_files_is_sorted_and_relative() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(tmp.path());
        ws.write_file("docs/b/z.md", b"z", WriteMode::Overwrite).await.unwrap();
        ws.write_file("docs/a.md", b"a", WriteMode::Overwrite).await.unwrap();

        let all = ws.collect_files("").await.unwrap();
        let paths: Vec<&str> = all.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/a.md", "docs/b/z.md"]);

        let scoped = ws.collect_files("docs/b").await.unwrap();
        assert_eq!(scoped[0].path, "z.md");
        assert_eq!(scoped[0].content, b"z");
    }

    #[tokio::test]
    async fn collect_files_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(tmp.path());
        assert!(ws.collect_files("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_dir_all_tolerates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(tmp.path());
        ws.remove_dir_all("missing").await.unwrap();
    }

    #[tokio::test]
    async fn run_shell_captures_output() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(tmp.path());
        ws.mkdir("sub").await.unwrap();

        let out = ws.run_shell("echo hi && exit 3", "sub").await.unwrap();
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.status, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn shell_filter_default_matches_local_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = ShellOnly(LocalWorkspace::new(tmp.path()));
        ws.write_file("docs/x/keep.md", b"k", WriteMode::Overwrite).await.unwrap();
        ws.write_file("docs/x/drop.ts", b"d", WriteMode::Overwrite).await.unwrap();
        ws.write_file("docs/y/drop.png", b"d", WriteMode::Overwrite).await.unwrap();

        let report = ws.filter_tree("docs", &DocFilter::default()).await.unwrap();
        assert_eq!(report.retained, 1);
        assert_eq!(report.markdown, 1);
        assert_eq!(report.removed_files, 2);
        assert_eq!(report.removed_dirs, 1);

        let files = ws.collect_files("docs").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "x/keep.md");
    }

    #[tokio::test]
    async fn factory_prepares_and_destroys() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = LocalWorkspaceFactory::new(tmp.path());

        let handle = factory.prepare("run-1", false).await.unwrap();
        assert!(handle.root.join("docs").is_dir());

        let ws = factory.open(&handle);
        ws.write_file("docs/a.md", b"a", WriteMode::Overwrite).await.unwrap();

        let again = factory.prepare("run-1", false).await.unwrap();
        assert!(again.root.join("docs/a.md").exists());

        factory.prepare("run-1", true).await.unwrap();
        assert!(!handle.root.join("docs/a.md").exists());

        factory.destroy(&handle).await.unwrap();
        assert!(!handle.root.exists());
    }

    #[test]
    fn locate_does_not_create_anything() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = LocalWorkspaceFactory::new(tmp.path());

        let handle = factory.locate("run-2").unwrap();
        assert_eq!(handle.root, tmp.path().join("run-2"));
        assert!(!handle.root.exists());
        assert!(factory.locate("../escape").is_err());
    }
}
