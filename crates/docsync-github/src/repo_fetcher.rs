use std::sync::Arc;

use docsync::{
    ContentFetcher, DocFilter, FetchError, FetchOutcome, Feedback, FilterReport, RepoSpec, Source,
    SourceKind, Workspace, WriteMode,
};

use crate::api::GitHubApi;
use crate::checkout::{Checkout, CheckoutRequest, TarballCheckout};
use crate::raw::RawClient;
use crate::release::ReleaseResolver;
use crate::tarball::TarballClient;

/// Fetches `repo` and `readme-only-repo` sources.
pub struct RepoFetcher {
    releases: ReleaseResolver,
    raw: RawClient,
    checkout: Arc<dyn Checkout>,
    filter: DocFilter,
}

impl RepoFetcher {
    /// Tarball checkouts against the public GitHub hosts.
    pub fn new(api: GitHubApi) -> Self {
        Self {
            releases: ReleaseResolver::new(api.clone()),
            raw: RawClient::new(api.clone(), None),
            checkout: Arc::new(TarballCheckout::new(TarballClient::new(api))),
            filter: DocFilter::default(),
        }
    }

    pub fn with_checkout(mut self, checkout: impl Checkout + 'static) -> Self {
        self.checkout = Arc::new(checkout);
        self
    }

    pub fn with_raw_client(mut self, raw: RawClient) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_release_resolver(mut self, releases: ReleaseResolver) -> Self {
        self.releases = releases;
        self
    }

    async fn fetch_tree(
        &self,
        source: &Source,
        spec: &RepoSpec,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError> {
        let version = self.releases.resolve(spec).await?;
        let target = source.target_dir(Some(&version.folder_name));
        let mut feedback = Vec::new();

        workspace.remove_dir_all(&target).await?;
        workspace.mkdir(&target).await?;

        let primary = CheckoutRequest {
            repo: &spec.location,
            git_ref: &version.resolved_ref,
            subpath: &spec.content_subpath,
        };
        self.checkout
            .checkout(workspace, &primary, &target, WriteMode::Overwrite)
            .await?;
        let mut report = workspace.filter_tree(&target, &self.filter).await?;

        for merge in &spec.additional_merges {
            let request = CheckoutRequest {
                repo: &merge.location,
                git_ref: &merge.git_ref,
                subpath: &merge.content_subpath,
            };
            match self
                .checkout
                .checkout(workspace, &request, &target, WriteMode::KeepExisting)
                .await
            {
                Ok(()) => {
                    report = workspace.filter_tree(&target, &self.filter).await?;
                    feedback.push(Feedback::info(format!(
                        "merged {}@{}",
                        merge.location, merge.git_ref
                    )));
                }
                Err(e) => {
                    feedback.push(Feedback::warning(format!(
                        "merge of {}@{} skipped: {e}",
                        merge.location, merge.git_ref
                    )));
                }
            }
        }

        feedback.push(summary(&report));
        if report.retained == 0 {
            let subpath = if spec.content_subpath.is_empty() {
                "."
            } else {
                spec.content_subpath.as_str()
            };
            feedback.push(Feedback::warning(format!(
                "{} (content subpath: {subpath}) produced 0 doc files; check that ref \"{}\" and the path contain .md/.mdx/.yml/.yaml/.json",
                spec.location, version.resolved_ref
            )));
        }

        Ok(FetchOutcome {
            file_count: report.retained,
            version: Some(version),
            feedback,
        })
    }

    async fn fetch_readme(
        &self,
        source: &Source,
        spec: &RepoSpec,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError> {
        let version = self.releases.resolve(spec).await?;
        let target = source.target_dir(Some(&version.folder_name));

        let readme = self
            .raw
            .fetch_readme(&spec.location, &version.resolved_ref)
            .await?;

        workspace.remove_dir_all(&target).await?;
        workspace
            .write_file(&format!("{target}/README.md"), &readme, WriteMode::Overwrite)
            .await?;

        Ok(FetchOutcome {
            file_count: 1,
            version: Some(version),
            feedback: Vec::new(),
        })
    }
}

fn summary(report: &FilterReport) -> Feedback {
    Feedback::info(format!(
        "{} files kept ({} markdown), {} removed",
        report.retained, report.markdown, report.removed_files
    ))
}

#[async_trait::async_trait]
impl ContentFetcher for RepoFetcher {
    async fn fetch(
        &self,
        source: &Source,
        workspace: &dyn Workspace,
    ) -> Result<FetchOutcome, FetchError> {
        match &source.kind {
            SourceKind::Repo(spec) => self.fetch_tree(source, spec, workspace).await,
            SourceKind::ReadmeOnlyRepo(spec) => self.fetch_readme(source, spec, workspace).await,
            _ => Err(FetchError::Unsupported(format!(
                "{} is a {} source",
                source.id,
                source.source_type()
            ))),
        }
    }
}
