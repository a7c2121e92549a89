use std::sync::Arc;
use std::time::Duration;

use docsync::{
    Cache, Clock, ContentFetcher, FetchError, LocalWorkspace, ManualClock, MergeSpec, RefType,
    RepoSpec, Source, TtlCache,
};
use docsync_github::{GitHubApi, RawClient, ReleaseResolver, RepoFetcher};
use flate2::Compression;
use flate2::write::GzEncoder;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build_tarball(root: &str, entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for (file_path, content) in entries {
        let data = content.as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_path(format!("{root}/{file_path}")).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        archive.append(&header, data).unwrap();
    }

    archive.into_inner().unwrap().finish().unwrap()
}

async fn mount_tarball(server: &MockServer, repo: &str, git_ref: &str, entries: &[(&str, &str)]) {
    let root = format!("{}-abc123", repo.replace('/', "-"));
    Mock::given(method("GET"))
        .and(path(format!("/repos/{repo}/tarball/{git_ref}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(build_tarball(&root, entries), "application/gzip"),
        )
        .mount(server)
        .await;
}

fn fetcher(server: &MockServer) -> RepoFetcher {
    let api = GitHubApi::new(None, Some(server.uri()));
    RepoFetcher::new(api.clone()).with_raw_client(RawClient::new(api, Some(server.uri())))
}

fn read(tmp: &tempfile::TempDir, rel: &str) -> String {
    std::fs::read_to_string(tmp.path().join(rel)).unwrap()
}

#[tokio::test]
async fn syncs_subpath_into_version_folder_and_filters() {
    let server = MockServer::start().await;
    mount_tarball(
        &server,
        "nuxt/nuxt",
        "main",
        &[
            ("docs/1.getting-started/intro.md", "# Intro"),
            ("docs/nav.yml", "nav: []"),
            ("docs/public/logo.png", "png"),
            ("docs/package-lock.json", "{}"),
            ("packages/nuxt/index.ts", "export {}"),
        ],
    )
    .await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let mut spec = RepoSpec::new("nuxt/nuxt", "main");
    spec.content_subpath = "docs".into();
    let source = Source::repo("nuxt", "Nuxt", spec);

    let outcome = fetcher(&server).fetch(&source, &ws).await.unwrap();

    assert_eq!(outcome.file_count, 2);
    let version = outcome.version.unwrap();
    assert_eq!(version.folder_name, "[branch]-main");
    assert_eq!(version.resolved_ref, "main");

    let root = tmp.path().join("docs/nuxt/[branch]-main");
    assert!(root.join("1.getting-started/intro.md").exists());
    assert!(root.join("nav.yml").exists());
    assert!(!root.join("public").exists());
    assert!(!root.join("package-lock.json").exists());
    assert!(!tmp.path().join("docs/nuxt/[branch]-main/packages").exists());
}

#[tokio::test]
async fn merges_never_overwrite_existing_files() {
    let server = MockServer::start().await;
    mount_tarball(
        &server,
        "nuxt/nuxt",
        "main",
        &[("docs/index.md", "primary index"), ("docs/guide.md", "guide")],
    )
    .await;
    mount_tarball(
        &server,
        "nuxt/nuxt.com",
        "main",
        &[
            ("content/index.md", "merged index"),
            ("content/blog/post.md", "post"),
        ],
    )
    .await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let mut spec = RepoSpec::new("nuxt/nuxt", "main");
    spec.content_subpath = "docs".into();
    spec.additional_merges.push(MergeSpec {
        location: "nuxt/nuxt.com".into(),
        git_ref: "main".into(),
        content_subpath: "content".into(),
    });
    let source = Source::repo("nuxt", "Nuxt", spec);

    let outcome = fetcher(&server).fetch(&source, &ws).await.unwrap();

    assert_eq!(outcome.file_count, 3);
    assert_eq!(read(&tmp, "docs/nuxt/[branch]-main/index.md"), "primary index");
    assert_eq!(read(&tmp, "docs/nuxt/[branch]-main/blog/post.md"), "post");
}

#[tokio::test]
async fn failed_merge_is_a_warning_not_an_error() {
    let server = MockServer::start().await;
    mount_tarball(&server, "nuxt/nuxt", "main", &[("docs/index.md", "index")]).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/gone/tarball/main"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let mut spec = RepoSpec::new("nuxt/nuxt", "main");
    spec.content_subpath = "docs".into();
    spec.additional_merges.push(MergeSpec {
        location: "acme/gone".into(),
        git_ref: "main".into(),
        content_subpath: String::new(),
    });

    let outcome = fetcher(&server)
        .fetch(&Source::repo("nuxt", "Nuxt", spec), &ws)
        .await
        .unwrap();

    assert_eq!(outcome.file_count, 1);
    let warnings: Vec<_> = outcome.feedback.iter().filter(|f| f.is_warning()).collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message().contains("acme/gone"));
}

#[tokio::test]
async fn zero_doc_files_is_reported() {
    let server = MockServer::start().await;
    mount_tarball(&server, "acme/code", "main", &[("src/lib.rs", "fn x() {}")]).await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let source = Source::repo("code", "Code", RepoSpec::new("acme/code", "main"));

    let outcome = fetcher(&server).fetch(&source, &ws).await.unwrap();

    assert_eq!(outcome.file_count, 0);
    assert!(
        outcome
            .feedback
            .iter()
            .any(|f| f.is_warning() && f.message().contains("produced 0 doc files"))
    );
}

#[tokio::test]
async fn refetch_replaces_previous_content() {
    let server = MockServer::start().await;
    mount_tarball(&server, "acme/docs", "main", &[("new.md", "new")]).await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let stale = tmp.path().join("docs/docs/[branch]-main/stale.md");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "stale").unwrap();

    let source = Source::repo("docs", "Docs", RepoSpec::new("acme/docs", "main"));
    fetcher(&server).fetch(&source, &ws).await.unwrap();

    assert!(!stale.exists());
    assert!(tmp.path().join("docs/docs/[branch]-main/new.md").exists());
}

#[tokio::test]
async fn latest_release_resolves_tag_and_folder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/vuejs/docs/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"tag_name":"v3.5.0","name":"v3.5.0"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;
    mount_tarball(&server, "vuejs/docs", "v3.5.0", &[("src/guide.md", "# Guide")]).await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let mut spec = RepoSpec::new("vuejs/docs", "latest");
    spec.ref_type = RefType::Release;
    spec.content_subpath = "src".into();

    let outcome = fetcher(&server)
        .fetch(&Source::repo("vue", "Vue", spec), &ws)
        .await
        .unwrap();

    let version = outcome.version.unwrap();
    assert_eq!(version.resolved_ref, "v3.5.0");
    assert_eq!(version.folder_name, "[release]-v3.5.0");
    assert!(tmp.path().join("docs/vue/[release]-v3.5.0/guide.md").exists());
}

#[tokio::test]
async fn no_releases_fails_with_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/norel/releases/latest"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let mut spec = RepoSpec::new("acme/norel", "LATEST");
    spec.ref_type = RefType::Release;

    let err = fetcher(&server)
        .fetch(&Source::repo("norel", "No releases", spec), &ws)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "No releases found for acme/norel");
}

#[tokio::test]
async fn latest_release_is_cached_until_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/lib/releases/latest"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"tag_name":"v1.0.0"}"#, "application/json"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new(Duration::from_secs(1_000)));
    let cache: Arc<dyn Cache<String, String>> =
        Arc::new(TtlCache::new(clock.clone() as Arc<dyn Clock>));
    let resolver = ReleaseResolver::with_cache(
        GitHubApi::new(None, Some(server.uri())),
        cache,
        Duration::from_secs(60),
    );

    assert_eq!(resolver.latest_release("acme/lib").await.unwrap(), "v1.0.0");
    assert_eq!(resolver.latest_release("acme/lib").await.unwrap(), "v1.0.0");
    clock.advance(Duration::from_secs(61));
    assert_eq!(resolver.latest_release("acme/lib").await.unwrap(), "v1.0.0");
}

#[tokio::test]
async fn readme_only_writes_single_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/h3js/h3/main/README.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# h3"))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let source = Source::readme_only("h3", "h3", RepoSpec::new("h3js/h3", "main"));

    let outcome = fetcher(&server).fetch(&source, &ws).await.unwrap();

    assert_eq!(outcome.file_count, 1);
    assert_eq!(read(&tmp, "docs/h3/[branch]-main/README.md"), "# h3");
}

#[tokio::test]
async fn readme_only_unreachable_remote_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/h3js/h3/main/README.md"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());
    let source = Source::readme_only("h3", "h3", RepoSpec::new("h3js/h3", "main"));

    let err = fetcher(&server).fetch(&source, &ws).await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)));
    assert!(!err.to_string().is_empty());
}

#[tokio::test]
async fn channel_sources_are_unsupported() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let ws = LocalWorkspace::new(tmp.path());

    let err = fetcher(&server)
        .fetch(&Source::custom("notes", "Notes"), &ws)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Unsupported(_)));
}
