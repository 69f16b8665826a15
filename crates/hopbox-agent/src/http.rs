//! The remote agent's HTTP control plane (§4.6, §6): `GET /health` and
//! `POST /rpc`. Axum's own per-path method matching already gives us the
//! "other method -> 405" rule for free; this module owns body-size
//! enforcement, JSON envelope handling, and RPC method dispatch.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::warn;

use hopbox_proto::manifest::Manifest;
use hopbox_proto::rpc::{
    HealthResponse, PackagesInstallParams, RpcRequest, RpcResponse, RunScriptParams, ServiceNameParams, WorkspaceSyncParams,
};

use crate::error::{AgentError, ErrorKind};
use crate::workspace::WorkspaceStore;
use crate::{logs, packages, scripts, snapshot};

/// §4.6: bodies larger than this are rejected with 413 before the JSON
/// decoder ever sees them.
const MAX_RPC_BODY_BYTES: usize = 1024 * 1024;

pub struct AgentConfig {
    pub manifest_path: PathBuf,
    pub log_dir: PathBuf,
    pub container_runtime: String,
    pub local_ip: String,
}

pub struct AppState {
    pub workspace: WorkspaceStore,
    pub config: AgentConfig,
    pub package_installer: packages::PackageInstaller,
    pub snapshot_tool: snapshot::SnapshotTool,
    /// Flips once the tunnel device reports itself up; read by `/health`.
    pub tunnel_up: AtomicBool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rpc", post(rpc))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        tunnel: state.tunnel_up.load(Ordering::Relaxed),
        local_ip: state.config.local_ip.clone(),
    })
}

async fn rpc(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if body.len() > MAX_RPC_BODY_BYTES {
        return (axum::http::StatusCode::PAYLOAD_TOO_LARGE, Json(RpcResponse::err("request body exceeds 1 MiB"))).into_response();
    }

    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return (axum::http::StatusCode::BAD_REQUEST, Json(RpcResponse::err(format!("malformed JSON: {e}")))).into_response();
        }
    };

    match dispatch(&state, &request.method, request.params).await {
        Ok(result) => Json(RpcResponse { result: Some(result), error: None }).into_response(),
        Err(err) => {
            let status = status_for(&err);
            if matches!(status, axum::http::StatusCode::INTERNAL_SERVER_ERROR) {
                warn!("rpc method {:?} failed internally: {err}", request.method);
            }
            (status, Json(RpcResponse::err(err.to_string()))).into_response()
        }
    }
}

fn status_for(err: &AgentError) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, AgentError> {
    let value = params.ok_or_else(|| AgentError::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(value).map_err(|e| AgentError::InvalidParams(e.to_string()))
}

async fn dispatch(state: &AppState, method: &str, params: Option<Value>) -> Result<Value, AgentError> {
    match method {
        "services.list" => {
            let workspace = state.workspace.current().await;
            let supervisor = workspace.supervisor.as_ref().ok_or(AgentError::NoServiceManager)?;
            let statuses = supervisor.list().await;
            Ok(serde_json::to_value(statuses).map_err(|e| AgentError::Internal(e.to_string()))?)
        }
        "services.restart" => {
            let params: ServiceNameParams = parse_params(params)?;
            let workspace = state.workspace.current().await;
            let supervisor = workspace.supervisor.as_ref().ok_or(AgentError::NoServiceManager)?;
            if !supervisor.has_service(&params.name) {
                return Err(AgentError::ServiceNotFound(params.name));
            }
            supervisor.restart(&params.name).await?;
            Ok(Value::Null)
        }
        "services.stop" => {
            let params: ServiceNameParams = parse_params(params)?;
            let workspace = state.workspace.current().await;
            let supervisor = workspace.supervisor.as_ref().ok_or(AgentError::NoServiceManager)?;
            if !supervisor.has_service(&params.name) {
                return Err(AgentError::ServiceNotFound(params.name));
            }
            supervisor.stop(&params.name).await?;
            Ok(Value::Null)
        }
        "ports.list" => {
            let ports = crate::ports::list_listening_ports()
                .await
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            Ok(serde_json::to_value(ports).map_err(|e| AgentError::Internal(e.to_string()))?)
        }
        "run.script" => {
            let params: RunScriptParams = parse_params(params)?;
            let workspace = state.workspace.current().await;
            let result = scripts::run(&workspace.manifest, &params.name).await?;
            Ok(serde_json::to_value(result).map_err(|e| AgentError::Internal(e.to_string()))?)
        }
        "logs.stream" => {
            let params: ServiceNameParams = parse_params(params)?;
            let workspace = state.workspace.current().await;
            let def = workspace
                .manifest
                .services
                .iter()
                .find(|s| s.name == params.name)
                .ok_or_else(|| AgentError::ServiceNotFound(params.name.clone()))?;
            let output = logs::tail(&params.name, def.backend.clone(), &state.config.container_runtime, &state.config.log_dir).await?;
            Ok(Value::String(output))
        }
        "packages.install" => {
            let params: PackagesInstallParams = parse_params(params)?;
            let result = state.package_installer.install(&params.packages).await;
            Ok(serde_json::to_value(result).map_err(|e| AgentError::Internal(e.to_string()))?)
        }
        "snap.create" => {
            let params: ServiceNameParams = parse_params(params)?;
            let workspace = state.workspace.current().await;
            let target = workspace.manifest.backup_target.as_deref().ok_or(AgentError::NoBackupTarget)?;
            let data_paths = workspace.manifest.data_paths();
            let output = state
                .snapshot_tool
                .create(target, &params.name, &data_paths)
                .await
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            Ok(Value::String(output))
        }
        "snap.restore" => {
            let params: ServiceNameParams = parse_params(params)?;
            let workspace = state.workspace.current().await;
            let target = workspace.manifest.backup_target.as_deref().ok_or(AgentError::NoBackupTarget)?;
            let output = state
                .snapshot_tool
                .restore(target, &params.name)
                .await
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            Ok(Value::String(output))
        }
        "snap.list" => {
            let workspace = state.workspace.current().await;
            let target = workspace.manifest.backup_target.as_deref().ok_or(AgentError::NoBackupTarget)?;
            let output = state.snapshot_tool.list(target).await.map_err(|e| AgentError::Internal(e.to_string()))?;
            Ok(Value::String(output))
        }
        "workspace.sync" => workspace_sync(state, params).await,
        other => Err(AgentError::MethodNotFound(other.to_string())),
    }
}

/// `workspace.sync` (§4.6, §8 property 8): parses the new manifest first —
/// any parse failure returns before anything is touched, leaving the prior
/// manifest/services/scripts byte-identical. Only a successful parse
/// reaches the persisted-file write and the in-memory swap.
async fn workspace_sync(state: &AppState, params: Option<Value>) -> Result<Value, AgentError> {
    let params: WorkspaceSyncParams = parse_params(params)?;
    let manifest = Manifest::from_yaml(&params.yaml)?;

    write_manifest_atomic(&state.config.manifest_path, &params.yaml)
        .await
        .map_err(|e| AgentError::Internal(e.to_string()))?;

    let services = manifest.services.len();
    let scripts = manifest.scripts.len();
    state.workspace.replace(manifest).await;

    Ok(serde_json::json!({ "synced": true, "services": services, "scripts": scripts }))
}

async fn write_manifest_atomic(path: &std::path::Path, yaml: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, yaml).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            workspace: WorkspaceStore::new(Manifest::default(), std::env::temp_dir(), "docker".to_string()),
            config: AgentConfig {
                manifest_path: std::env::temp_dir().join("hopbox-test.yaml"),
                log_dir: std::env::temp_dir(),
                container_runtime: "docker".to_string(),
                local_ip: "10.10.0.2".to_string(),
            },
            package_installer: packages::PackageInstaller::default(),
            snapshot_tool: snapshot::SnapshotTool::new("true"),
            tunnel_up: AtomicBool::new(true),
        })
    }

    #[tokio::test]
    async fn health_reports_tunnel_and_local_ip() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.local_ip, "10.10.0.2");
        assert!(health.tunnel);
    }

    #[tokio::test]
    async fn health_rejects_non_get() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().method("POST").uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn rpc_oversized_body_is_413() {
        let app = router(test_state());
        let oversized = "x".repeat(MAX_RPC_BODY_BYTES + 1);
        let response = app
            .oneshot(Request::builder().method("POST").uri("/rpc").body(Body::from(oversized)).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn rpc_malformed_json_is_400() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().method("POST").uri("/rpc").body(Body::from("not json")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rpc_unknown_method_is_404() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"method":"frobnicate"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rpc_services_list_without_manager_is_503() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"method":"services.list"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn rpc_snap_create_without_backup_target_is_503() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"method":"snap.create","params":{"name":"nightly"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn workspace_sync_with_malformed_yaml_leaves_state_unchanged() {
        let state = test_state();
        let before = state.workspace.current().await;
        let err = workspace_sync(&state, Some(serde_json::json!({ "yaml": "not: [valid: yaml" }))).await.unwrap_err();
        assert!(matches!(err, AgentError::Manifest(_)));
        let after = state.workspace.current().await;
        assert!(Arc::ptr_eq(&before.manifest, &after.manifest));
    }

    #[tokio::test]
    async fn workspace_sync_with_valid_yaml_is_observable_after() {
        let state = test_state();
        let yaml = "services:\n  - name: db\n    backend: native\n    image_or_command: \"true\"\n";
        workspace_sync(&state, Some(serde_json::json!({ "yaml": yaml }))).await.unwrap();
        let after = state.workspace.current().await;
        assert_eq!(after.manifest.services.len(), 1);
        assert!(after.supervisor.is_some());
    }
}
