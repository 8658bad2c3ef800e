// HTTP gateway exposing the admin service as JSON endpoints

use crate::config::GatewayConfig;
use crate::error::{ErrorKind, PressdeckError};
use crate::service::AdminService;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, data })
}

/// Error response carrying the message, kind and installer logs
pub struct ApiError(PressdeckError);

impl From<PressdeckError> for ApiError {
    fn from(err: PressdeckError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::TransientNetwork | ErrorKind::StructuralParse => StatusCode::BAD_GATEWAY,
        ErrorKind::PreconditionFailed => StatusCode::CONFLICT,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let mut data = json!({
            "message": self.0.to_string(),
            "kind": kind,
        });
        if !self.0.logs().is_empty() {
            data["logs"] = json!(self.0.logs());
        }
        tracing::warn!(?kind, error = %self.0, "Request failed");
        (status_for(kind), Json(json!({ "success": false, "data": data }))).into_response()
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Decode a JSON request body; malformed bodies are invalid requests
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, PressdeckError> {
    serde_json::from_slice(body).map_err(|e| PressdeckError::InvalidRequest(format!("invalid body: {}", e)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct InstallBody {
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActivateBody {
    pub plugin_file: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchBody {
    pub repo_names: Vec<String>,
    #[serde(default)]
    pub activate: bool,
}

async fn health(State(service): State<Arc<AdminService>>) -> impl IntoResponse {
    ok(json!({
        "status": "ok",
        "organization": service.organization(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_repositories(
    State(service): State<Arc<AdminService>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<crate::repos::RepositoryPage> {
    let page = service
        .list_repositories(query.page.unwrap_or(1), query.per_page, query.refresh)
        .await?;
    Ok(ok(page))
}

async fn row_status(
    State(service): State<Arc<AdminService>>,
    Path(name): Path<String>,
) -> ApiResult<crate::row::RowStatus> {
    Ok(ok(service.get_row_status(&name).await?))
}

async fn install(
    State(service): State<Arc<AdminService>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<crate::install::InstallOutcome> {
    // An empty body installs without activating
    let body: InstallBody = if body.is_empty() {
        InstallBody::default()
    } else {
        decode_body(&body)?
    };
    Ok(ok(service.install_plugin(&name, body.activate).await?))
}

async fn activate(
    State(service): State<Arc<AdminService>>,
    body: Bytes,
) -> ApiResult<crate::install::ActivationOutcome> {
    let body: ActivateBody = decode_body(&body)?;
    Ok(ok(service.activate_plugin(&body.plugin_file)?))
}

async fn batch_install(
    State(service): State<Arc<AdminService>>,
    body: Bytes,
) -> ApiResult<crate::service::BatchReport> {
    let body: BatchBody = decode_body(&body)?;
    Ok(ok(service.batch_install(&body.repo_names, body.activate).await?))
}

async fn refresh_cache(State(service): State<Arc<AdminService>>) -> ApiResult<crate::repos::RepositoryPage> {
    Ok(ok(service.refresh_repositories().await?))
}

async fn clear_cache(State(service): State<Arc<AdminService>>) -> ApiResult<crate::service::CacheClearReport> {
    Ok(ok(service.clear_cache()?))
}

async fn check_update(
    State(service): State<Arc<AdminService>>,
    Query(query): Query<UpdateQuery>,
) -> ApiResult<crate::update::UpdateStatus> {
    Ok(ok(service.check_update(query.force).await))
}

/// Build the gateway router (exposed for testing)
pub fn build_router(service: Arc<AdminService>, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/repositories", get(list_repositories))
        .route("/api/repositories/{name}/status", get(row_status))
        .route("/api/repositories/{name}/install", post(install))
        .route("/api/plugins/activate", post(activate))
        .route("/api/install/batch", post(batch_install))
        .route("/api/cache/refresh", post(refresh_cache))
        .route("/api/cache/clear", post(clear_cache))
        .route("/api/self-update", get(check_update))
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .with_state(service)
}

/// Serve the gateway until Ctrl-C
pub async fn serve(service: Arc<AdminService>, config: &GatewayConfig) -> anyhow::Result<()> {
    let app = build_router(service, config);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down gateway");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::InstallFailure;
    use crate::host::{FsPluginRegistry, PackageInstaller, PackageOutcome, PackageRequest};
    use crate::service::ServiceParts;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct EmptyInstaller;

    #[async_trait]
    impl PackageInstaller for EmptyInstaller {
        async fn install_package(&self, request: PackageRequest) -> Result<PackageOutcome, InstallFailure> {
            let dest = request.destination_root.join("empty");
            std::fs::create_dir_all(&dest).unwrap();
            std::fs::write(dest.join("readme.txt"), "hello").unwrap();
            Ok(PackageOutcome {
                destination: dest,
                logs: vec!["Unpacking the package...".into()],
            })
        }
    }

    fn router(dir: &TempDir, source: MemorySource) -> Router {
        let source = Arc::new(source);
        let registry = Arc::new(
            FsPluginRegistry::open(dir.path().join("plugins"), dir.path().join("registry.json")).unwrap(),
        );
        let service = AdminService::new(ServiceParts {
            organization: "acme".into(),
            content: source.clone(),
            organizations: source,
            cache: Arc::new(MemoryCache::new()),
            registry,
            installer: Arc::new(EmptyInstaller),
            web_base_url: "https://github.com".into(),
            repo_limit: 15,
            cache_duration: Duration::from_secs(3600),
            per_page: 2,
        });
        build_router(Arc::new(service), &GatewayConfig::default())
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(request).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_organization() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            router(&dir, MemorySource::new()),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["organization"], "acme");
    }

    #[tokio::test]
    async fn lists_paginated_repositories() {
        let dir = TempDir::new().unwrap();
        let html = r#"
            <li class="Box-row"><a href="/acme/one">one</a></li>
            <li class="Box-row"><a href="/acme/two">two</a></li>
            <li class="Box-row"><a href="/acme/three">three</a></li>
        "#;
        let (status, body) = call(
            router(&dir, MemorySource::new().with_org_page("acme", html)),
            Request::get("/api/repositories?page=2").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["repositories"][0]["name"], "three");
        assert_eq!(body["data"]["pagination"]["total_pages"], 2);
    }

    #[tokio::test]
    async fn status_serializes_all_keys() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            router(&dir, MemorySource::new()),
            Request::get("/api/repositories/docs/status").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = body["data"].as_object().unwrap();
        assert_eq!(data.len(), 9);
        assert_eq!(data["isPlugin"], false);
        assert!(data["pluginFile"].is_null());
    }

    #[tokio::test]
    async fn rate_limited_listing_maps_to_429() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            router(&dir, MemorySource::new().with_org_status("acme", 429)),
            Request::get("/api/repositories").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["kind"], "rate_limited");
    }

    #[tokio::test]
    async fn failed_install_returns_logs() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            router(&dir, MemorySource::new()),
            post_json("/api/repositories/empty/install", json!({ "activate": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let logs = body["data"]["logs"].as_array().unwrap();
        assert_eq!(logs[0], "Unpacking the package...");
        assert!(!dir.path().join("plugins/empty").exists());
    }

    #[tokio::test]
    async fn activate_unknown_plugin_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, _) = call(
            router(&dir, MemorySource::new()),
            post_json("/api/plugins/activate", json!({ "plugin_file": "ghost/ghost.php" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_batch_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (status, _) = call(
            router(&dir, MemorySource::new()),
            post_json("/api/install/batch", json!({ "repo_names": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn clear_cache_reports_counts() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            router(&dir, MemorySource::new()),
            Request::post("/api/cache/clear").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["repositories"], false);
        assert_eq!(body["data"]["detections"], 0);
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_error_envelope() {
        let dir = TempDir::new().unwrap();
        let requests = [
            ("/api/plugins/activate", "{\"plugin_file\":"),
            ("/api/plugins/activate", "{}"),
            ("/api/install/batch", "{\"repo_names\":\"seo\"}"),
            ("/api/install/batch", ""),
        ];

        for (uri, raw) in requests {
            let request = Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(raw))
                .unwrap();
            let (status, body) = call(router(&dir, MemorySource::new()), request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {raw}");
            assert_eq!(body["success"], false);
            assert_eq!(body["data"]["kind"], "invalid_input");
        }
    }

    #[tokio::test]
    async fn activate_without_content_type_still_decodes() {
        let dir = TempDir::new().unwrap();
        let request = Request::post("/api/plugins/activate")
            .body(Body::from(json!({ "plugin_file": "ghost/ghost.php" }).to_string()))
            .unwrap();
        let (status, body) = call(router(&dir, MemorySource::new()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn update_check_without_repository_is_unknown() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            router(&dir, MemorySource::new()),
            Request::get("/api/self-update?force=true").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "unknown");
        assert_eq!(body["data"]["available"], false);
        assert_eq!(body["data"]["installed"], env!("CARGO_PKG_VERSION"));
    }
}
