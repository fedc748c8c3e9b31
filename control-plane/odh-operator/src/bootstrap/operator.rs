use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{Client, api::GroupVersionKind};
use odh_observability::Ping;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{OperatorKind, OperatorState};
use crate::{
    cache::CachePolicy,
    cluster::{ClusterProbe, KubeClusterProbe, Platform},
    config::Config,
    controller::{datasciencecluster, dscinitialization},
    error::Error,
    manager::{Manager, ManagerOptions},
    registry::{HandlerRegistry, Handlers},
    scheme::{
        CATALOG_SOURCE, OPENSHIFT_INGRESS, SELF_SUBJECT_RULES_REVIEW,
        SUBSCRIPTION, Scheme, USER_GROUP, gvk_of,
    },
    startup::{self, DISABLE_DSC_CONFIG_ENV, StartupContext},
    webhook,
};

/// Kinds read through the direct client only: rarely read cluster
/// singletons, credentials-adjacent reviews and high-churn objects.
pub fn cache_exclusions() -> Vec<GroupVersionKind> {
    vec![
        OPENSHIFT_INGRESS.gvk(),
        SUBSCRIPTION.gvk(),
        SELF_SUBJECT_RULES_REVIEW.gvk(),
        gvk_of::<Pod>(),
        USER_GROUP.gvk(),
        CATALOG_SOURCE.gvk(),
    ]
}

/// An operator implementation produced by the [`super::Factory`].
pub enum Operator {
    Main(Box<MainOperator>),
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Main(_) => OperatorKind::Main,
        }
    }

    pub fn state(&self) -> OperatorState {
        match self {
            Operator::Main(op) => op.state(),
        }
    }

    pub async fn setup(&mut self) -> Result<(), Error> {
        match self {
            Operator::Main(op) => op.setup().await,
        }
    }

    /// Blocks until `token` is cancelled or the manager fails.
    pub async fn start(&mut self, token: CancellationToken) -> Result<(), Error> {
        match self {
            Operator::Main(op) => op.start(token).await,
        }
    }

    /// The configured manager, between setup and start.
    pub fn manager(&self) -> Option<&Manager> {
        match self {
            Operator::Main(op) => op.manager.as_ref(),
        }
    }
}

pub struct MainOperator {
    config: Arc<Config>,
    handlers: Arc<Handlers>,
    scheme: Arc<Scheme>,
    client: Option<Client>,
    probe: Option<Arc<dyn ClusterProbe>>,
    manager: Option<Manager>,
    state: OperatorState,
}

impl MainOperator {
    pub(crate) fn new(
        config: Arc<Config>,
        handlers: Arc<Handlers>,
        client: Option<Client>,
        probe: Option<Arc<dyn ClusterProbe>>,
    ) -> Self {
        Self {
            config,
            handlers,
            scheme: Arc::new(Scheme::new()),
            client,
            probe,
            manager: None,
            state: OperatorState::Created,
        }
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    /// Assemble the manager. Runs once; any failure leaves the operator
    /// failed.
    pub async fn setup(&mut self) -> Result<(), Error> {
        if self.state != OperatorState::Created {
            return Err(Error::InvalidState(self.state));
        }
        self.state = OperatorState::Configuring;
        let result = configure(
            self.config.clone(),
            self.handlers.clone(),
            self.scheme.clone(),
            self.client.clone(),
            self.probe.clone(),
        )
        .await;
        match result {
            Ok(manager) => {
                self.manager = Some(manager);
                self.state = OperatorState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = OperatorState::Failed;
                Err(e)
            }
        }
    }

    pub async fn start(&mut self, token: CancellationToken) -> Result<(), Error> {
        let manager = match (self.state, self.manager.take()) {
            (OperatorState::Ready, Some(manager)) => manager,
            (state, manager) => {
                self.manager = manager;
                return Err(Error::InvalidState(state));
            }
        };
        self.state = OperatorState::Running;
        info!("starting manager");
        match manager.start(token).await {
            Ok(()) => {
                self.state = OperatorState::Stopped;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "manager stopped with error");
                self.state = OperatorState::Failed;
                Err(Error::Run(e))
            }
        }
    }
}

/// The setup sequence. Steps run strictly in order and the first failure
/// aborts with an error naming the step.
async fn configure(
    config: Arc<Config>,
    handlers: Arc<Handlers>,
    scheme: Arc<Scheme>,
    client: Option<Client>,
    probe: Option<Arc<dyn ClusterProbe>>,
) -> Result<Manager, Error> {
    let client = match client {
        Some(client) => client,
        None => Client::try_from(config.kube.clone()).map_err(Error::Client)?,
    };

    let info = match probe {
        Some(probe) => probe.probe().await?,
        None => KubeClusterProbe::new(client.clone()).probe().await?,
    };
    let platform = info.platform;

    init_handlers(&handlers.services, platform)?;
    init_handlers(&handlers.components, platform)?;

    let policy = CachePolicy::build(&info)?;
    let operator_ns = info.operator_namespace.clone().unwrap_or_default();
    let application_ns = info.application_namespace.clone().unwrap_or_default();

    let options = ManagerOptions::from_config(&config.operator, &operator_ns)?
        .with_cache_exclusions(cache_exclusions());
    let mut manager =
        Manager::new(client.clone(), scheme.clone(), Arc::new(policy), options)
            .map_err(Error::Manager)?;

    webhook::register_all(&mut manager, config.operator.enable_webhooks)
        .map_err(Error::Webhooks)?;

    dscinitialization::setup(&mut manager).map_err(|source| Error::Controller {
        name: "DSCInitialization",
        source,
    })?;
    datasciencecluster::setup(&mut manager).map_err(|source| Error::Controller {
        name: "DataScienceCluster",
        source,
    })?;

    create_reconcilers(&handlers.services, &mut manager)?;
    create_reconcilers(&handlers.components, &mut manager)?;

    let opt_out = std::env::var(DISABLE_DSC_CONFIG_ENV).ok();
    startup::schedule(
        &mut manager,
        StartupContext {
            client,
            scheme,
            platform,
            application_namespace: application_ns,
            monitoring_namespace: config.operator.monitoring_namespace.clone(),
        },
        opt_out.as_deref(),
    )
    .map_err(Error::StartupTask)?;

    manager
        .add_healthz_check(Box::new(Ping::new("healthz")))
        .map_err(Error::HealthCheck)?;
    manager
        .add_readyz_check(Box::new(Ping::new("readyz")))
        .map_err(Error::HealthCheck)?;

    info!(
        %platform,
        controllers = ?manager.controller_names(),
        tasks = ?manager.task_names(),
        webhooks = ?manager.webhook_paths(),
        "operator setup complete"
    );
    Ok(manager)
}

fn init_handlers(registry: &HandlerRegistry, platform: Platform) -> Result<(), Error> {
    registry
        .for_each(|h| h.init(platform))
        .map_err(Error::HandlerInit)
}

fn create_reconcilers(registry: &HandlerRegistry, manager: &mut Manager) -> Result<(), Error> {
    let kind = registry.kind();
    registry
        .for_each(|h| {
            info!(%kind, name = h.name(), "creating reconciler");
            h.new_reconciler(manager)
        })
        .map_err(Error::Reconcilers)
}
