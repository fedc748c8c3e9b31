//! Mock API server helpers shared by unit tests.

use chrono::{DateTime, Utc};
use http::{Request, Response, StatusCode};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::{Client, client::Body};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_test::mock::{Handle, SendResponse};

pub type ApiHandle = Handle<Request<Body>, Response<Body>>;

/// A client wired to a mock API server, plus the server's handle.
pub fn mock_client() -> (Client, ApiHandle) {
    let (svc, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(svc, "default"), handle)
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn ok<T: Serialize>(body: &T) -> Response<Body> {
    json_response(StatusCode::OK, body)
}

pub fn status(code: u16, reason: &str) -> Response<Body> {
    let body = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": reason,
        "reason": reason,
        "code": code
    });
    json_response(StatusCode::from_u16(code).unwrap(), &body)
}

pub fn not_found() -> Response<Body> {
    status(404, "NotFound")
}

pub fn empty_list(kind: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": kind,
        "metadata": { "resourceVersion": "1" },
        "items": []
    })
}

pub fn version_info() -> serde_json::Value {
    json!({
        "major": "1",
        "minor": "32",
        "gitVersion": "v1.32.0",
        "gitCommit": "",
        "gitTreeState": "clean",
        "buildDate": "2025-01-01T00:00:00Z",
        "goVersion": "go1.23",
        "compiler": "gc",
        "platform": "linux/amd64"
    })
}

/// Serve requests with `respond`. A `None` answer leaves the request open,
/// which is how long-lived watches are parked.
pub fn serve<F>(mut handle: ApiHandle, mut respond: F) -> JoinHandle<()>
where
    F: FnMut(&Request<Body>) -> Option<Response<Body>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut parked: Vec<SendResponse<Response<Body>>> = Vec::new();
        while let Some((req, send)) = handle.next_request().await {
            match respond(&req) {
                Some(resp) => send.send_response(resp),
                None => parked.push(send),
            }
        }
    })
}

pub fn is_watch(req: &Request<Body>) -> bool {
    req.uri().query().is_some_and(|q| q.contains("watch=true"))
}

/// A lease as the API server would return it.
pub fn lease(
    holder: &str,
    renewed: DateTime<Utc>,
    transitions: i32,
    resource_version: &str,
) -> Lease {
    Lease {
        metadata: ObjectMeta {
            name: Some(crate::manager::LEADER_ELECTION_ID.into()),
            namespace: Some("opendatahub".into()),
            resource_version: Some(resource_version.into()),
            ..Default::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(holder.into()),
            lease_duration_seconds: Some(15),
            acquire_time: Some(MicroTime(renewed)),
            renew_time: Some(MicroTime(renewed)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }),
    }
}

/// Restores an environment variable to its previous value on drop.
pub struct EnvGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvGuard {
    pub fn set(key: &'static str, val: &str) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val) };
        Self { key, prev }
    }

    pub fn unset(key: &'static str) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::remove_var(key) };
        Self { key, prev }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.prev {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }
}
