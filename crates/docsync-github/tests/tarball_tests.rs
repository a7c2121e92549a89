use docsync::FetchError;
use docsync_github::{GitHubApi, TarballClient};
use flate2::Compression;
use flate2::write::GzEncoder;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build a .tar.gz in memory with the given files.
/// Each entry is (path_in_tar, content).
fn build_tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let gz_buf = Vec::new();
    let encoder = GzEncoder::new(gz_buf, Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for (file_path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_path(file_path).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        archive.append(&header, *data).unwrap();
    }

    let encoder = archive.into_inner().unwrap();
    encoder.finish().unwrap()
}

async fn mount_tarball(server: &MockServer, tarball: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/tarball/main"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(tarball, "application/gzip"))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> TarballClient {
    TarballClient::new(GitHubApi::new(None, Some(server.uri())))
}

#[tokio::test]
async fn strips_github_root_prefix() {
    let tarball = build_tarball(&[
        ("owner-repo-sha/docs/guide.md", b"# Guide"),
        ("owner-repo-sha/README.md", b"readme"),
    ]);

    let server = MockServer::start().await;
    mount_tarball(&server, tarball).await;

    let files = client(&server)
        .fetch("test-owner/test-repo", "main", "")
        .await
        .unwrap();

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&"docs/guide.md"));
    assert!(paths.contains(&"README.md"));
}

#[tokio::test]
async fn limits_to_subpath_and_makes_paths_relative() {
    let tarball = build_tarball(&[
        ("owner-repo-sha/docs/1.getting-started/intro.md", b"# Intro"),
        ("owner-repo-sha/docs/nav.yml", b"nav: []"),
        ("owner-repo-sha/docs-legacy/old.md", b"old"),
        ("owner-repo-sha/src/index.ts", b"export {}"),
    ]);

    let server = MockServer::start().await;
    mount_tarball(&server, tarball).await;

    let mut files = client(&server)
        .fetch("test-owner/test-repo", "main", "/docs/")
        .await
        .unwrap();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["1.getting-started/intro.md", "nav.yml"]);
    assert_eq!(files[0].content, b"# Intro");
}

#[tokio::test]
async fn keeps_binary_content_intact() {
    let png: &[u8] = &[0x89, b'P', b'N', b'G', 0x00, 0xff];
    let tarball = build_tarball(&[("owner-repo-sha/logo.png", png)]);

    let server = MockServer::start().await;
    mount_tarball(&server, tarball).await;

    let files = client(&server)
        .fetch("test-owner/test-repo", "main", "")
        .await
        .unwrap();
    assert_eq!(files[0].content, png);
}

#[tokio::test]
async fn skips_directory_entries() {
    let gz_buf = Vec::new();
    let encoder = GzEncoder::new(gz_buf, Compression::default());
    let mut archive = tar::Builder::new(encoder);

    let mut dir_header = tar::Header::new_gnu();
    dir_header.set_path("owner-repo-sha/docs/").unwrap();
    dir_header.set_size(0);
    dir_header.set_mode(0o755);
    dir_header.set_entry_type(tar::EntryType::Directory);
    dir_header.set_cksum();
    archive.append(&dir_header, &[][..]).unwrap();

    let data = b"file content";
    let mut file_header = tar::Header::new_gnu();
    file_header.set_path("owner-repo-sha/docs/file.md").unwrap();
    file_header.set_size(data.len() as u64);
    file_header.set_mode(0o644);
    file_header.set_entry_type(tar::EntryType::Regular);
    file_header.set_cksum();
    archive.append(&file_header, &data[..]).unwrap();

    let encoder = archive.into_inner().unwrap();
    let tarball = encoder.finish().unwrap();

    let server = MockServer::start().await;
    mount_tarball(&server, tarball).await;

    let files = client(&server)
        .fetch("test-owner/test-repo", "main", "docs")
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "file.md");
}

#[tokio::test]
async fn sends_auth_header_when_token_provided() {
    let tarball = build_tarball(&[("owner-repo-sha/file.md", b"content")]);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/tarball/main"))
        .and(header("Authorization", "Bearer test-token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(tarball, "application/gzip"))
        .mount(&server)
        .await;

    let client = TarballClient::new(GitHubApi::new(
        Some("test-token-123".into()),
        Some(server.uri()),
    ));
    let files = client
        .fetch("test-owner/test-repo", "main", "")
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn missing_ref_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/tarball/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch("test-owner/test-repo", "nope", "")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/test-owner/test-repo/tarball/main"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client(&server)
        .fetch("test-owner/test-repo", "main", "")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}
