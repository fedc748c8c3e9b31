#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::Client;
use odh_operator::{
    Config, Handler, Handlers, OperatorConfig,
    cluster::{ClusterError, ClusterInfo, ClusterProbe, Platform},
    manager::Manager,
    registry::default_handlers,
};
use serde_json::json;

pub const OPERATOR_NS: &str = "opendatahub-operator-system";

/// Restores an environment variable to its previous value on drop.
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(ref v) = self.prev {
                std::env::set_var(&self.key, v);
            } else {
                std::env::remove_var(&self.key);
            }
        }
    }
}

pub fn set_env_guarded(key: &str, val: &str) -> EnvGuard {
    let prev = std::env::var(key).ok();
    unsafe {
        std::env::set_var(key, val);
    }
    EnvGuard {
        key: key.to_string(),
        prev,
    }
}

pub fn unset_env_guarded(key: &str) -> EnvGuard {
    let prev = std::env::var(key).ok();
    unsafe {
        std::env::remove_var(key);
    }
    EnvGuard {
        key: key.to_string(),
        prev,
    }
}

/// A client whose requests are never answered. Setup must not need the
/// API server once the cluster probe is stubbed.
pub fn idle_client() -> Client {
    let (svc, handle) = tower_test::mock::pair::<
        http::Request<kube::client::Body>,
        http::Response<kube::client::Body>,
    >();
    // Keep the handle alive so requests stay pending instead of erroring.
    std::mem::forget(handle);
    Client::new(svc, "default")
}

/// A client backed by a bare cluster: `/version` answers, DSCInitialization
/// lists are empty, every other read is 404 and watches hang.
pub fn empty_cluster_client() -> Client {
    let (svc, mut handle) = tower_test::mock::pair::<
        http::Request<kube::client::Body>,
        http::Response<kube::client::Body>,
    >();
    tokio::spawn(async move {
        let mut parked = Vec::new();
        while let Some((req, send)) = handle.next_request().await {
            let path = req.uri().path().to_string();
            if req.uri().query().is_some_and(|q| q.contains("watch=true")) {
                parked.push(send);
                continue;
            }
            let (status, body) = if path == "/version" {
                (200, json!({
                    "major": "1",
                    "minor": "32",
                    "gitVersion": "v1.32.0",
                    "gitCommit": "",
                    "gitTreeState": "clean",
                    "buildDate": "2025-01-01T00:00:00Z",
                    "goVersion": "go1.23",
                    "compiler": "gc",
                    "platform": "linux/amd64"
                }))
            } else if path.ends_with("/dscinitializations") {
                (200, json!({
                    "apiVersion": "dscinitialization.opendatahub.io/v2",
                    "kind": "DSCInitializationList",
                    "metadata": { "resourceVersion": "1" },
                    "items": []
                }))
            } else {
                (404, json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "metadata": {},
                    "status": "Failure",
                    "reason": "NotFound",
                    "code": 404
                }))
            };
            let resp = http::Response::builder()
                .status(status)
                .body(kube::client::Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap();
            send.send_response(resp);
        }
    });
    Client::new(svc, "default")
}

pub fn test_config() -> Arc<Config> {
    config_with(true)
}

/// Serving webhooks needs certificates on disk; tests that start the
/// manager turn them off.
pub fn config_with(enable_webhooks: bool) -> Arc<Config> {
    let operator = OperatorConfig {
        metrics_addr: "0".into(),
        health_probe_addr: "0".into(),
        enable_webhooks,
        pod_name: Some("odh-operator-test".into()),
        ..Default::default()
    };
    let kube = kube::Config::new("http://127.0.0.1:6443".parse().unwrap());
    Arc::new(Config::new(operator, kube))
}

/// Returns fixed cluster facts.
pub struct StaticProbe {
    pub platform: Platform,
    pub operator_namespace: Option<String>,
    pub application_namespace: Option<String>,
}

impl StaticProbe {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            operator_namespace: Some(OPERATOR_NS.into()),
            application_namespace: Some(
                platform.default_application_namespace().into(),
            ),
        }
    }
}

#[async_trait]
impl ClusterProbe for StaticProbe {
    async fn probe(&self) -> Result<ClusterInfo, ClusterError> {
        Ok(ClusterInfo {
            platform: self.platform,
            operator_namespace: self.operator_namespace.clone(),
            application_namespace: self.application_namespace.clone(),
            version: Info {
                major: "1".into(),
                minor: "32".into(),
                git_version: "v1.32.0".into(),
                ..Default::default()
            },
        })
    }
}

/// Handler that records how often it was touched and can be told to fail.
pub struct CountingHandler {
    pub name: String,
    pub inits: Arc<AtomicUsize>,
    pub reconcilers: Arc<AtomicUsize>,
    pub fail_init: bool,
    pub fail_reconciler: bool,
}

impl CountingHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            inits: Arc::new(AtomicUsize::new(0)),
            reconcilers: Arc::new(AtomicUsize::new(0)),
            fail_init: false,
            fail_reconciler: false,
        }
    }
}

impl Handler for CountingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, _platform: Platform) -> anyhow::Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            anyhow::bail!("{} refused to initialize", self.name);
        }
        Ok(())
    }

    fn new_reconciler(&self, manager: &mut Manager) -> anyhow::Result<()> {
        self.reconcilers.fetch_add(1, Ordering::SeqCst);
        if self.fail_reconciler {
            anyhow::bail!("{} has no reconciler to offer", self.name);
        }
        manager.add_controller(self.name.clone(), futures_util::future::pending::<()>())?;
        Ok(())
    }
}

pub fn empty_handlers() -> Arc<Handlers> {
    Arc::new(default_handlers())
}
