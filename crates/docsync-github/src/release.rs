use std::sync::Arc;
use std::time::Duration;

use docsync::{Cache, FetchError, RepoSpec, ResolvedVersion, TtlCache};
use serde::Deserialize;

use crate::api::GitHubApi;
use crate::tarball::status_error;

/// `GET /repos/{owner}/{repo}/releases/latest`
#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Turns a repo spec's `ref` into the concrete ref to check out.
pub struct ReleaseResolver {
    api: GitHubApi,
    cache: Arc<dyn Cache<String, String>>,
    ttl: Duration,
}

impl ReleaseResolver {
    pub fn new(api: GitHubApi) -> Self {
        Self::with_cache(api, Arc::new(TtlCache::with_system_clock()), Duration::from_secs(300))
    }

    pub fn with_cache(api: GitHubApi, cache: Arc<dyn Cache<String, String>>, ttl: Duration) -> Self {
        Self { api, cache, ttl }
    }

    /// `latest` releases are looked up; every other ref is used verbatim.
    pub async fn resolve(&self, spec: &RepoSpec) -> Result<ResolvedVersion, FetchError> {
        if spec.wants_latest_release() {
            let tag = self.latest_release(&spec.location).await?;
            return Ok(ResolvedVersion::new(spec.ref_type, tag));
        }
        Ok(ResolvedVersion::new(spec.ref_type, spec.git_ref.clone()))
    }

    /// Tag name of the most recent release of `repo`.
    pub async fn latest_release(&self, repo: &str) -> Result<String, FetchError> {
        if let Some(tag) = self.cache.get(&repo.to_owned()) {
            tracing::debug!(repo, tag = %tag, "latest release from cache");
            return Ok(tag);
        }

        let url = self.api.repo_url(repo, "releases/latest");
        let response = self
            .api
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("release lookup failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(format!("No releases found for {repo}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(
                &format!("latest release lookup for {repo}"),
                status,
                &body,
            ));
        }

        let release: LatestRelease = response
            .json()
            .await
            .map_err(|e| FetchError::Other(format!("invalid release response: {e}")))?;

        tracing::info!(repo, tag = %release.tag_name, "resolved latest release");
        self.cache
            .put(repo.to_owned(), release.tag_name.clone(), self.ttl);
        Ok(release.tag_name)
    }
}
