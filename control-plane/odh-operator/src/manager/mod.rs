//! Runtime manager: owns the shared client, scoped caches, controllers,
//! startup tasks, webhooks and probes, and runs them until cancelled.

pub mod cache;
pub mod leader;
pub mod metrics;
mod server;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{Router, routing::MethodRouter};
use futures_util::{FutureExt, future::BoxFuture};
use kube::{
    Api, Client, Resource,
    api::{DynamicObject, GroupVersionKind},
    runtime::{Controller, watcher},
};
use odh_observability::{HealthChecker, ServiceHealthManager};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    cache::CachePolicy,
    config::{ConfigError, OperatorConfig, parse_bind_addr},
    scheme::{Scheme, gvk_of},
};

pub use self::cache::ScopedCache;
use self::{
    leader::LeaderElector,
    metrics::{MetricsError, OperatorMetrics},
};

pub const WEBHOOK_PORT: u16 = 9443;
pub const LEADER_ELECTION_ID: &str = "07ed84f7.opendatahub.io";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("kind {0} is not registered in the scheme")]
    UnknownKind(String),

    #[error("caching is disabled for {0}; read it through the client")]
    CacheDisabled(String),

    #[error("{what} {name:?} already registered")]
    Duplicate { what: &'static str, name: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} server failed: {source}")]
    Serve {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load webhook certificate from {dir}: {source}")]
    Tls {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("leader election lost")]
    LeadershipLost,

    #[error("manager task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

type TaskFn = Box<
    dyn FnOnce(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>>
        + Send,
>;

/// A one-shot action run after [`Manager::start`] begins.
pub struct StartupTask {
    pub name: String,
    /// Only the elected leader runs the task.
    pub needs_leader_election: bool,
    run: TaskFn,
}

impl StartupTask {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        needs_leader_election: bool,
        run: F,
    ) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            needs_leader_election,
            run: Box::new(move |token| run(token).boxed()),
        }
    }

    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        (self.run)(token).await
    }
}

impl std::fmt::Debug for StartupTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupTask")
            .field("name", &self.name)
            .field("needs_leader_election", &self.needs_leader_election)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub metrics_addr: Option<SocketAddr>,
    pub health_probe_addr: Option<SocketAddr>,
    pub pprof_addr: Option<SocketAddr>,
    pub webhook_port: u16,
    pub webhook_cert_dir: PathBuf,
    pub leader_election: bool,
    pub leader_election_id: String,
    pub lease_namespace: String,
    pub identity: String,
    /// Kinds never cached; reconcilers read them through the client.
    pub cache_exclusions: Vec<GroupVersionKind>,
}

impl ManagerOptions {
    pub fn from_config(
        cfg: &OperatorConfig,
        lease_namespace: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            metrics_addr: parse_bind_addr(&cfg.metrics_addr)?,
            health_probe_addr: parse_bind_addr(&cfg.health_probe_addr)?,
            pprof_addr: parse_bind_addr(&cfg.pprof_addr)?,
            webhook_port: WEBHOOK_PORT,
            webhook_cert_dir: PathBuf::from(&cfg.webhook_cert_dir),
            leader_election: cfg.leader_election,
            leader_election_id: LEADER_ELECTION_ID.to_string(),
            lease_namespace: lease_namespace.to_string(),
            identity: cfg.identity(),
            cache_exclusions: Vec::new(),
        })
    }

    pub fn with_cache_exclusions(
        mut self,
        kinds: impl IntoIterator<Item = GroupVersionKind>,
    ) -> Self {
        self.cache_exclusions.extend(kinds);
        self
    }
}

pub struct Manager {
    client: Client,
    scheme: Arc<Scheme>,
    policy: Arc<CachePolicy>,
    options: ManagerOptions,
    controllers: Vec<(String, BoxFuture<'static, ()>)>,
    feeds: Vec<BoxFuture<'static, ()>>,
    tasks: Vec<StartupTask>,
    webhooks: Router,
    webhook_paths: Vec<String>,
    healthz: ServiceHealthManager,
    readyz: ServiceHealthManager,
    metrics: OperatorMetrics,
    faulted: Arc<AtomicBool>,
}

impl Manager {
    /// Every kind named by the cache policy or the exclusion list must be
    /// known to the scheme.
    pub fn new(
        client: Client,
        scheme: Arc<Scheme>,
        policy: Arc<CachePolicy>,
        options: ManagerOptions,
    ) -> Result<Self, ManagerError> {
        if let Some(gvk) = policy
            .kinds()
            .chain(options.cache_exclusions.iter())
            .find(|gvk| !scheme.recognizes(gvk))
        {
            return Err(ManagerError::UnknownKind(display_gvk(gvk)));
        }

        Ok(Self {
            client,
            scheme,
            policy,
            options,
            controllers: Vec::new(),
            feeds: Vec::new(),
            tasks: Vec::new(),
            webhooks: Router::new(),
            webhook_paths: Vec::new(),
            healthz: ServiceHealthManager::new(),
            readyz: ServiceHealthManager::new(),
            metrics: OperatorMetrics::new()?,
            faulted: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    pub fn cache_policy(&self) -> &Arc<CachePolicy> {
        &self.policy
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn metrics(&self) -> &OperatorMetrics {
        &self.metrics
    }

    pub fn is_cache_excluded(&self, gvk: &GroupVersionKind) -> bool {
        self.options.cache_exclusions.contains(gvk)
    }

    fn ensure_cacheable(&self, gvk: &GroupVersionKind) -> Result<(), ManagerError> {
        if !self.scheme.recognizes(gvk) {
            return Err(ManagerError::UnknownKind(display_gvk(gvk)));
        }
        if self.is_cache_excluded(gvk) {
            return Err(ManagerError::CacheDisabled(display_gvk(gvk)));
        }
        Ok(())
    }

    /// A cache of `K` restricted by the cache policy. The backing watches
    /// start with the manager.
    pub fn cache<K>(&mut self) -> Result<ScopedCache<K>, ManagerError>
    where
        K: Resource<DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug
            + Send
            + Sync
            + 'static,
    {
        let gvk = gvk_of::<K>();
        self.ensure_cacheable(&gvk)?;
        let api: Api<K> = Api::all(self.client.clone());
        let (cache, feeds) = cache::scoped(api, (), self.policy.scope(&gvk));
        self.feeds.extend(feeds);
        Ok(cache)
    }

    /// Same as [`Manager::cache`] for kinds without a Rust type.
    pub fn dynamic_cache(
        &mut self,
        gvk: &GroupVersionKind,
    ) -> Result<ScopedCache<DynamicObject>, ManagerError> {
        self.ensure_cacheable(gvk)?;
        let ar = self
            .scheme
            .api_resource(gvk)
            .cloned()
            .ok_or_else(|| ManagerError::UnknownKind(display_gvk(gvk)))?;
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let (cache, feeds) = cache::scoped(api, ar, self.policy.scope(gvk));
        self.feeds.extend(feeds);
        Ok(cache)
    }

    /// A controller for `K` whose objects pass through
    /// [`cache::strip_managed_fields`] before reaching the reconciler.
    pub fn controller<K>(
        &self,
        config: watcher::Config,
    ) -> Result<Controller<K>, ManagerError>
    where
        K: Resource<DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug
            + Send
            + Sync
            + 'static,
    {
        self.ensure_cacheable(&gvk_of::<K>())?;
        let api: Api<K> = Api::all(self.client.clone());
        Ok(cache::stripped_controller(api, config))
    }

    /// Register a controller loop. It runs on every replica.
    pub fn add_controller<F>(
        &mut self,
        name: impl Into<String>,
        run: F,
    ) -> Result<(), ManagerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if self.controllers.iter().any(|(n, _)| *n == name) {
            return Err(ManagerError::Duplicate {
                what: "controller",
                name,
            });
        }
        self.controllers.push((name, run.boxed()));
        Ok(())
    }

    pub fn add_task(&mut self, task: StartupTask) -> Result<(), ManagerError> {
        if self.tasks.iter().any(|t| t.name == task.name) {
            return Err(ManagerError::Duplicate {
                what: "startup task",
                name: task.name,
            });
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn add_webhook(
        &mut self,
        path: &str,
        handler: MethodRouter,
    ) -> Result<(), ManagerError> {
        if self.webhook_paths.iter().any(|p| p == path) {
            return Err(ManagerError::Duplicate {
                what: "webhook",
                name: path.to_string(),
            });
        }
        self.webhooks = std::mem::take(&mut self.webhooks).route(path, handler);
        self.webhook_paths.push(path.to_string());
        Ok(())
    }

    pub fn add_healthz_check(
        &mut self,
        check: Box<dyn HealthChecker>,
    ) -> Result<(), ManagerError> {
        add_check(&mut self.healthz, "healthz check", check)
    }

    pub fn add_readyz_check(
        &mut self,
        check: Box<dyn HealthChecker>,
    ) -> Result<(), ManagerError> {
        add_check(&mut self.readyz, "readyz check", check)
    }

    pub fn controller_names(&self) -> Vec<&str> {
        self.controllers.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn webhook_paths(&self) -> &[String] {
        &self.webhook_paths
    }

    pub fn has_health_checks(&self) -> bool {
        !self.healthz.is_empty() && !self.readyz.is_empty()
    }

    /// Run everything until `token` is cancelled or a fatal error occurs.
    ///
    /// Fatal: a server failing, or losing the leader lease. Controllers
    /// ending early only mark the manager faulted; startup task failures
    /// are logged.
    pub async fn start(self, token: CancellationToken) -> Result<(), ManagerError> {
        let token = token.child_token();
        let Manager {
            client,
            options,
            controllers,
            feeds,
            tasks,
            webhooks,
            webhook_paths,
            healthz,
            readyz,
            metrics,
            faulted,
            ..
        } = self;

        if let Some(addr) = options.pprof_addr {
            warn!(%addr, "profiling endpoint is not supported; ignoring");
        }

        let mut critical: JoinSet<Result<(), ManagerError>> = JoinSet::new();
        let mut workers: JoinSet<()> = JoinSet::new();

        if let Some(addr) = options.health_probe_addr {
            let listener = bind(addr).await?;
            let router = server::health_router(healthz, readyz, faulted.clone());
            critical.spawn(server::serve("health", listener, router, token.clone()));
        }
        if let Some(addr) = options.metrics_addr {
            let listener = bind(addr).await?;
            let router = server::metrics_router(metrics.clone());
            critical.spawn(server::serve("metrics", listener, router, token.clone()));
        }
        if !webhook_paths.is_empty() {
            let addr = SocketAddr::from(([0, 0, 0, 0], options.webhook_port));
            let cert_dir = options.webhook_cert_dir.clone();
            let token = token.clone();
            critical.spawn(async move {
                server::serve_webhooks(addr, &cert_dir, webhooks, token).await
            });
        }

        for feed in feeds {
            let token = token.clone();
            workers.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = feed => {}
                }
            });
        }
        for (name, run) in controllers {
            let token = token.clone();
            let faulted = faulted.clone();
            workers.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = run => {
                        error!(controller = %name, "controller stopped unexpectedly");
                        faulted.store(true, Ordering::SeqCst);
                    }
                }
            });
        }

        let (gated, ungated): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .partition(|t| t.needs_leader_election && options.leader_election);
        for task in ungated {
            workers.spawn(run_task(task, token.clone(), metrics.clone()));
        }

        if options.leader_election {
            let elector = Arc::new(LeaderElector::new(
                client,
                &options.leader_election_id,
                &options.lease_namespace,
                &options.identity,
            ));
            critical.spawn(lead(elector, gated, token.clone(), metrics.clone()));
        } else {
            metrics.set_leader(true);
        }

        info!(
            leader_election = options.leader_election,
            webhooks = webhook_paths.len(),
            "manager started"
        );

        let result = loop {
            tokio::select! {
                _ = token.cancelled() => break Ok(()),
                Some(joined) = critical.join_next() => match joined {
                    Ok(Ok(())) if token.is_cancelled() => break Ok(()),
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => break Err(e),
                    Err(e) => break Err(e.into()),
                },
            }
        };

        token.cancel();
        // Let servers drain and the leader release its lease.
        let drain = async { while critical.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("shutdown grace period elapsed; aborting remaining tasks");
        }
        critical.shutdown().await;
        workers.shutdown().await;
        info!("manager stopped");
        result
    }
}

fn add_check(
    checks: &mut ServiceHealthManager,
    what: &'static str,
    check: Box<dyn HealthChecker>,
) -> Result<(), ManagerError> {
    if checks.contains(check.name()) {
        return Err(ManagerError::Duplicate {
            what,
            name: check.name().to_string(),
        });
    }
    checks.add_checker(check);
    Ok(())
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ManagerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ManagerError::Bind { addr, source })
}

async fn run_task(task: StartupTask, token: CancellationToken, metrics: OperatorMetrics) {
    let name = task.name.clone();
    let result = tokio::select! {
        _ = token.cancelled() => {
            info!(task = %name, "startup task cancelled");
            return;
        }
        result = task.run(token.clone()) => result,
    };
    match result {
        Ok(()) => {
            info!(task = %name, "startup task completed");
            metrics.startup_task_finished(&name, true);
        }
        Err(e) => {
            error!(task = %name, error = ?e, "startup task failed");
            metrics.startup_task_finished(&name, false);
        }
    }
}

/// Acquire the lease, run the gated tasks, then hold leadership until
/// cancelled. Losing the lease is fatal.
async fn lead(
    elector: Arc<LeaderElector>,
    tasks: Vec<StartupTask>,
    token: CancellationToken,
    metrics: OperatorMetrics,
) -> Result<(), ManagerError> {
    let mut guard = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        guard = elector.clone().acquire() => guard,
    };
    metrics.set_leader(true);

    let mut running = JoinSet::new();
    for task in tasks {
        running.spawn(run_task(task, token.child_token(), metrics.clone()));
    }

    let lost = tokio::select! {
        _ = token.cancelled() => false,
        _ = guard.lost() => true,
    };
    metrics.set_leader(false);
    if lost {
        running.shutdown().await;
        return Err(ManagerError::LeadershipLost);
    }
    while running.join_next().await.is_some() {}
    if let Err(e) = guard.release().await {
        warn!(error = %e, "failed to release leader lease");
    }
    Ok(())
}

fn display_gvk(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}
