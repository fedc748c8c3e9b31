//! Health, metrics and webhook HTTP endpoints.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use odh_observability::{HealthStatus, ServiceHealthManager};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ManagerError, metrics::OperatorMetrics};

const TLS_CERT_FILE: &str = "tls.crt";
const TLS_KEY_FILE: &str = "tls.key";
const WEBHOOK_DRAIN: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ProbeState {
    checks: Arc<ServiceHealthManager>,
    faulted: Arc<AtomicBool>,
}

/// `/healthz` and `/readyz`. Both fail while the manager is faulted.
pub(crate) fn health_router(
    healthz: ServiceHealthManager,
    readyz: ServiceHealthManager,
    faulted: Arc<AtomicBool>,
) -> Router {
    let live = ProbeState {
        checks: Arc::new(healthz),
        faulted: faulted.clone(),
    };
    let ready = ProbeState {
        checks: Arc::new(readyz),
        faulted,
    };
    Router::new()
        .route("/healthz", get(probe).with_state(live))
        .route("/readyz", get(probe).with_state(ready))
}

async fn probe(State(state): State<ProbeState>) -> Response {
    if state.faulted.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "Unhealthy", "message": "manager faulted"})),
        )
            .into_response();
    }
    let checks = state.checks.check_all();
    let failed = checks
        .values()
        .any(|c| c.status == HealthStatus::Unhealthy);
    let code = if failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (code, Json(json!({ "checks": checks }))).into_response()
}

pub(crate) fn metrics_router(metrics: OperatorMetrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<OperatorMetrics>) -> Response {
    match metrics.encode_text() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub(crate) async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    token: CancellationToken,
) -> Result<(), ManagerError> {
    let addr = listener.local_addr().ok();
    info!(server = name, ?addr, "serving");
    axum::serve(listener, router)
        .with_graceful_shutdown(token.cancelled_owned())
        .await
        .map_err(|source| ManagerError::Serve { name, source })
}

pub(crate) async fn serve_webhooks(
    addr: SocketAddr,
    cert_dir: &Path,
    router: Router,
    token: CancellationToken,
) -> Result<(), ManagerError> {
    let tls = RustlsConfig::from_pem_file(
        cert_dir.join(TLS_CERT_FILE),
        cert_dir.join(TLS_KEY_FILE),
    )
    .await
    .map_err(|source| ManagerError::Tls {
        dir: cert_dir.display().to_string(),
        source,
    })?;

    let handle = Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        token.cancelled().await;
        shutdown.graceful_shutdown(Some(WEBHOOK_DRAIN));
    });

    info!(%addr, "serving webhooks");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|source| ManagerError::Serve {
            name: "webhook",
            source,
        })
}
