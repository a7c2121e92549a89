use docsync::FetchError;

use crate::api::{GitHubApi, USER_AGENT};
use crate::tarball::status_error;

pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Single-file downloads from the raw content host.
pub struct RawClient {
    api: GitHubApi,
    raw_base_url: Option<String>,
}

impl RawClient {
    pub fn new(api: GitHubApi, raw_base_url: Option<String>) -> Self {
        Self { api, raw_base_url }
    }

    fn raw_base(&self) -> &str {
        self.raw_base_url
            .as_deref()
            .unwrap_or(DEFAULT_RAW_BASE)
            .trim_end_matches('/')
    }

    /// `GET {raw}/{repo}/{ref}/{path}`
    pub async fn fetch_file(&self, repo: &str, git_ref: &str, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/{repo}/{git_ref}/{path}", self.raw_base());

        let mut req = self.api.http().get(&url).header("User-Agent", USER_AGENT);
        if let Some(token) = self.api.token() {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let response = req
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to fetch {path} from {repo}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(
                &format!("{path} from {repo}@{git_ref}"),
                status,
                "",
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read {path}: {e}")))?;
        Ok(bytes.to_vec())
    }

    pub async fn fetch_readme(&self, repo: &str, git_ref: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_file(repo, git_ref, "README.md").await
    }
}
