// End-to-end install flow: archive download, unpack, rename, locate, activate

use pressdeck::cache::MemoryCache;
use pressdeck::config::SourceConfig;
use pressdeck::error::ErrorKind;
use pressdeck::host::{FsPluginRegistry, PluginRegistry, ZipPackageInstaller};
use pressdeck::service::{AdminService, ServiceParts};
use pressdeck::source::GitHubClient;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HELLO: &str = "<?php\n/**\n * Plugin Name: Hello Dolly\n * Version: 1.7.2\n */\n";

fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

async fn serve_archive(server: &MockServer, repo: &str, branch: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/acme/{}/archive/refs/heads/{}.zip", repo, branch)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
}

struct Host {
    dir: TempDir,
    registry: Arc<FsPluginRegistry>,
    service: AdminService,
}

impl Host {
    fn plugins(&self) -> &Path {
        self.registry.plugins_dir()
    }
}

fn host(server: &MockServer) -> Host {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(GitHubClient::with_config(SourceConfig {
        web_base_url: server.uri(),
        raw_base_url: server.uri(),
        api_base_url: server.uri(),
        ..Default::default()
    }));
    let registry = Arc::new(
        FsPluginRegistry::open(dir.path().join("plugins"), dir.path().join("registry.json")).unwrap(),
    );
    let service = AdminService::new(ServiceParts {
        organization: "acme".into(),
        content: client.clone(),
        organizations: client,
        cache: Arc::new(MemoryCache::new()),
        registry: registry.clone(),
        installer: Arc::new(ZipPackageInstaller::new(Duration::from_secs(30), "pressdeck-test")),
        web_base_url: server.uri(),
        repo_limit: 15,
        cache_duration: Duration::from_secs(3600),
        per_page: 15,
    });
    Host { dir, registry, service }
}

#[tokio::test]
async fn installs_renames_and_activates() {
    let server = MockServer::start().await;
    serve_archive(
        &server,
        "Hello-Dolly",
        "main",
        zip_of(&[
            ("Hello-Dolly-main/hello-dolly.php", HELLO),
            ("Hello-Dolly-main/readme.txt", "=== Hello Dolly ==="),
        ]),
    )
    .await;
    let host = host(&server);

    let outcome = host.service.install_plugin("Hello-Dolly", true).await.unwrap();
    assert_eq!(outcome.plugin_file, "hello-dolly/hello-dolly.php");
    assert!(outcome.activated);
    assert_eq!(outcome.activation_error, None);
    assert!(outcome.logs.iter().any(|l| l.contains("Renaming")));
    assert!(host.plugins().join("hello-dolly/readme.txt").exists());
    assert!(host.registry.is_active("hello-dolly/hello-dolly.php"));

    let status = host.service.get_row_status("Hello-Dolly").await.unwrap();
    assert_eq!(status.is_installed, Some(true));
    assert_eq!(status.is_active, Some(true));
    assert_eq!(status.plugin_file.as_deref(), Some("hello-dolly/hello-dolly.php"));
}

#[tokio::test]
async fn existing_directory_is_never_overwritten() {
    let server = MockServer::start().await;
    let host = host(&server);
    std::fs::create_dir_all(host.plugins().join("hello-dolly")).unwrap();
    std::fs::write(host.plugins().join("hello-dolly/keep.txt"), "mine").unwrap();

    let err = host.service.install_plugin("hello-dolly", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert_eq!(
        std::fs::read_to_string(host.plugins().join("hello-dolly/keep.txt")).unwrap(),
        "mine"
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn package_without_plugin_file_is_rolled_back() {
    let server = MockServer::start().await;
    serve_archive(
        &server,
        "docs",
        "main",
        zip_of(&[("docs-main/index.php", "<?php echo 'docs';"), ("docs-main/README.md", "# docs")]),
    )
    .await;
    let host = host(&server);

    let err = host.service.install_plugin("docs", true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!err.logs().is_empty());
    assert!(!host.plugins().join("docs").exists());
}

#[tokio::test]
async fn missing_archive_fails_with_logs() {
    let server = MockServer::start().await;
    let host = host(&server);

    let err = host.service.install_plugin("ghost", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    assert!(err.logs().iter().any(|l| l.contains("Downloading")));
    assert!(!host.plugins().join("ghost").exists());
}

#[tokio::test]
async fn install_follows_detected_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/seo/master/seo.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<?php\n/* Plugin Name: SEO */"))
        .mount(&server)
        .await;
    serve_archive(&server, "seo", "master", zip_of(&[("seo-master/seo.php", "<?php\n/* Plugin Name: SEO */")]))
        .await;
    let host = host(&server);

    let status = host.service.get_row_status("seo").await.unwrap();
    assert_eq!(status.is_plugin, Some(true));

    let outcome = host.service.install_plugin("seo", false).await.unwrap();
    assert_eq!(outcome.plugin_file, "seo/seo.php");
    assert!(!outcome.activated);
    assert!(host.dir.path().join("plugins/seo/seo.php").exists());
}

#[tokio::test]
async fn batch_install_continues_after_failures() {
    let server = MockServer::start().await;
    serve_archive(&server, "seo", "main", zip_of(&[("seo-main/seo.php", "<?php\n/* Plugin Name: SEO */")]))
        .await;
    let host = host(&server);

    let repos = vec!["ghost".to_string(), "seo".to_string()];
    let report = host.service.batch_install(&repos, true).await.unwrap();
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.success, 1);
    assert_eq!(report.summary.errors, 1);
    assert!(!report.results[0].success);
    assert!(report.results[1].data.as_ref().unwrap().activated);
}
