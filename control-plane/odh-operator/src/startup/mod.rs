//! One-shot tasks scheduled during setup and run by the leader once the
//! manager starts.

pub mod cleanup;
pub mod install;

use std::future::Future;
use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    cluster::Platform,
    manager::{Manager, ManagerError, StartupTask},
    scheme::Scheme,
};

pub const DISABLE_DSC_CONFIG_ENV: &str = "DISABLE_DSC_CONFIG";
/// The only value of [`DISABLE_DSC_CONFIG_ENV`] that keeps auto-creation on.
pub const DSC_CONFIG_ENABLED_VALUE: &str = "false";

pub const CREATE_DEFAULT_DSCI_TASK: &str = "create-default-dsci";
pub const CREATE_DEFAULT_DSC_TASK: &str = "create-default-dsc";
pub const CLEANUP_TASK: &str = "cleanup-legacy-resources";

/// Wrap `run` as a task only the elected leader executes.
pub fn leader_task<F, Fut>(name: &str, run: F) -> StartupTask
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    StartupTask::new(name, true, run)
}

/// Whether the opt-out toggle disables default DSCInitialization creation.
/// Present with any value other than `false` opts out.
pub fn dsci_auto_creation_disabled(value: Option<&str>) -> bool {
    matches!(value, Some(v) if v != DSC_CONFIG_ENABLED_VALUE)
}

/// Inputs shared by the startup tasks.
#[derive(Clone)]
pub struct StartupContext {
    pub client: Client,
    pub scheme: Arc<Scheme>,
    pub platform: Platform,
    pub application_namespace: String,
    pub monitoring_namespace: String,
}

/// Register the startup tasks. `opt_out` is the raw value of
/// `DISABLE_DSC_CONFIG`, if set.
///
/// Failing to register the default resource tasks is an error; failing to
/// register cleanup is only logged.
pub fn schedule(
    manager: &mut Manager,
    ctx: StartupContext,
    opt_out: Option<&str>,
) -> Result<(), ManagerError> {
    if dsci_auto_creation_disabled(opt_out) {
        info!("DSCInitialization auto creation is disabled");
    } else {
        let c = ctx.clone();
        manager.add_task(leader_task(CREATE_DEFAULT_DSCI_TASK, move |_| async move {
            info!("create default DSCInitialization");
            install::create_default_dsci(
                c.client,
                c.platform,
                c.application_namespace,
                c.monitoring_namespace,
            )
            .await
        }))?;
    }

    if ctx.platform.is_managed() {
        let client = ctx.client.clone();
        manager.add_task(leader_task(CREATE_DEFAULT_DSC_TASK, move |_| async move {
            info!("create default DataScienceCluster");
            install::create_default_dsc(client).await
        }))?;
    }

    let cleanup = leader_task(CLEANUP_TASK, move |_| async move {
        info!("run upgrade cleanup");
        cleanup::cleanup_existing_resources(
            ctx.client,
            &ctx.scheme,
            &ctx.application_namespace,
        )
        .await
    });
    if let Err(e) = manager.add_task(cleanup) {
        error!(error = %e, "unable to schedule legacy resource cleanup");
    }
    Ok(())
}
