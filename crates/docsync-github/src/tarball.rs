use std::io::Read;

use docsync::FetchError;
use flate2::read::GzDecoder;

use crate::api::GitHubApi;

/// A file extracted from a GitHub repository tarball.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    /// Path relative to the requested subpath (GitHub root prefix stripped).
    pub path: String,
    pub content: Vec<u8>,
}

/// Map a non-success status to a fetch error: 404 is final, 5xx and 429
/// are worth retrying.
pub(crate) fn status_error(what: &str, status: reqwest::StatusCode, body: &str) -> FetchError {
    let detail = if body.trim().is_empty() {
        format!("{what} returned HTTP {status}")
    } else {
        format!("{what} returned HTTP {status}: {}", body.trim())
    };

    if status == reqwest::StatusCode::NOT_FOUND {
        FetchError::NotFound(detail)
    } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        FetchError::Network(detail)
    } else {
        FetchError::Other(detail)
    }
}

/// Downloads repository tarballs and extracts one subtree.
pub struct TarballClient {
    api: GitHubApi,
}

impl TarballClient {
    pub fn new(api: GitHubApi) -> Self {
        Self { api }
    }

    /// Fetch every file under `subpath` at `git_ref`.
    ///
    /// An empty `subpath` means the whole repository. Returned paths are
    /// relative to `subpath`.
    pub async fn fetch(
        &self,
        repo: &str,
        git_ref: &str,
        subpath: &str,
    ) -> Result<Vec<RepoFile>, FetchError> {
        let url = self.api.repo_url(repo, &format!("tarball/{git_ref}"));
        tracing::debug!(%url, "downloading tarball");

        let response = self
            .api
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("tarball download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(
                &format!("tarball for {repo}@{git_ref}"),
                status,
                &body,
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read tarball body: {e}")))?;

        extract_subtree(&bytes, subpath)
    }
}

/// Extract regular files below `subpath` from a GitHub `.tar.gz`.
pub fn extract_subtree(tarball_bytes: &[u8], subpath: &str) -> Result<Vec<RepoFile>, FetchError> {
    let decoder = GzDecoder::new(tarball_bytes);
    let mut archive = tar::Archive::new(decoder);

    let entries = archive
        .entries()
        .map_err(|e| FetchError::Other(format!("failed to read tar entries: {e}")))?;

    let prefix = subpath.trim_matches('/');
    let mut files = Vec::new();

    for entry_result in entries {
        let mut entry =
            entry_result.map_err(|e| FetchError::Other(format!("failed to read tar entry: {e}")))?;

        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }

        let entry_path = entry
            .path()
            .map_err(|e| FetchError::Other(format!("invalid path in tar: {e}")))?
            .to_string_lossy()
            .replace('\\', "/");

        // GitHub tarballs have a root directory like "owner-repo-sha/"
        let Some((_, without_root)) = entry_path.split_once('/') else {
            continue;
        };

        let relative = if prefix.is_empty() {
            without_root
        } else {
            match without_root.strip_prefix(prefix) {
                Some(rest) if rest.starts_with('/') => &rest[1..],
                _ => continue,
            }
        };

        if relative.is_empty() {
            continue;
        }

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| FetchError::Other(format!("failed to read {relative}: {e}")))?;

        files.push(RepoFile {
            path: relative.to_owned(),
            content,
        });
    }

    Ok(files)
}
