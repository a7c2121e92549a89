use std::sync::atomic::{AtomicU64, Ordering};

use docsync::filter::shell_quote;
use docsync::{FetchError, Workspace, WriteMode};

use crate::tarball::TarballClient;

/// One path-scoped checkout: `repo` at `git_ref`, limited to `subpath`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest<'a> {
    pub repo: &'a str,
    pub git_ref: &'a str,
    pub subpath: &'a str,
}

/// Copies a repository subtree into a workspace directory.
#[async_trait::async_trait]
pub trait Checkout: Send + Sync {
    /// Materialize `request` into `target`. With [`WriteMode::KeepExisting`]
    /// files already present in `target` are left untouched.
    async fn checkout(
        &self,
        workspace: &dyn Workspace,
        request: &CheckoutRequest<'_>,
        target: &str,
        mode: WriteMode,
    ) -> Result<(), FetchError>;
}

/// Checkout through the tarball endpoint, written file by file.
pub struct TarballCheckout {
    client: TarballClient,
}

impl TarballCheckout {
    pub fn new(client: TarballClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Checkout for TarballCheckout {
    async fn checkout(
        &self,
        workspace: &dyn Workspace,
        request: &CheckoutRequest<'_>,
        target: &str,
        mode: WriteMode,
    ) -> Result<(), FetchError> {
        let files = self
            .client
            .fetch(request.repo, request.git_ref, request.subpath)
            .await?;

        let mut written = 0;
        for file in &files {
            if workspace
                .write_file(&format!("{target}/{}", file.path), &file.content, mode)
                .await?
            {
                written += 1;
            }
        }

        tracing::debug!(
            repo = request.repo,
            git_ref = request.git_ref,
            extracted = files.len(),
            written,
            "tarball checkout complete"
        );
        Ok(())
    }
}

/// Shallow sparse `git clone` run through the workspace shell.
///
/// Useful for sandboxes that can reach the git remote but not the REST API.
pub struct GitSparseCheckout {
    token: Option<String>,
    remote_base: String,
}

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

impl GitSparseCheckout {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            remote_base: "https://github.com".into(),
        }
    }

    /// Clone from `<base>/<owner>/<repo>.git`; a local directory works too.
    pub fn with_remote_base(mut self, base: impl Into<String>) -> Self {
        self.remote_base = base.into();
        self
    }

    fn remote_url(&self, repo: &str) -> String {
        match (&self.token, self.remote_base.strip_prefix("https://")) {
            (Some(token), Some(host)) => {
                format!("https://x-access-token:{token}@{host}/{repo}.git")
            }
            _ => format!("{}/{repo}.git", self.remote_base),
        }
    }

    /// Shell script performing the clone and copy; relative to the workspace root.
    pub fn script(&self, request: &CheckoutRequest<'_>, target: &str, mode: WriteMode) -> String {
        let scratch = format!(
            ".checkout/{}-{}",
            request.repo.replace('/', "-"),
            SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let subpath = request.subpath.trim_matches('/');
        let sparse = if subpath.is_empty() { "." } else { subpath };
        let copied = if subpath.is_empty() {
            scratch.clone()
        } else {
            format!("{scratch}/{subpath}")
        };
        let no_clobber = match mode {
            WriteMode::Overwrite => "",
            WriteMode::KeepExisting => "n",
        };

        format!(
            "set -e\n\
             rm -rf {scratch_q}\n\
             trap \"rm -rf {scratch_q}\" EXIT\n\
             git clone --quiet --depth 1 --single-branch --branch {git_ref} --filter=blob:none --sparse {url} {scratch_q}\n\
             git -C {scratch_q} sparse-checkout set {sparse}\n\
             rm -rf {scratch_q}/.git\n\
             mkdir -p {target_q}\n\
             if [ -d {copied_q} ]; then cp -R{no_clobber} {copied_q}/. {target_q}/; fi\n",
            scratch_q = shell_quote(&scratch),
            git_ref = shell_quote(request.git_ref),
            url = shell_quote(&self.remote_url(request.repo)),
            sparse = shell_quote(sparse),
            target_q = shell_quote(target),
            copied_q = shell_quote(&copied),
        )
    }
}

#[async_trait::async_trait]
impl Checkout for GitSparseCheckout {
    async fn checkout(
        &self,
        workspace: &dyn Workspace,
        request: &CheckoutRequest<'_>,
        target: &str,
        mode: WriteMode,
    ) -> Result<(), FetchError> {
        let output = workspace
            .run_shell(&self.script(request, target, mode), "")
            .await?;

        if !output.success() {
            let stderr = match &self.token {
                Some(token) => output.stderr.replace(token.as_str(), "***"),
                None => output.stderr,
            };
            return Err(FetchError::Other(format!(
                "Failed to clone repository {}: {}",
                request.repo,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
