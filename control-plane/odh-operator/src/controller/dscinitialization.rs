use std::sync::Arc;

use futures_util::StreamExt;
use kube::{
    Resource, ResourceExt,
    runtime::{controller::Action, watcher::Config},
};
use tracing::{info, instrument};

use super::{
    ControllerContext, ObservedStatus, ReconcileErr, WATCH_TIMEOUT_SECS,
    error_policy, log_reconcile_result, mark_ready,
};
use crate::{
    crd::DSCInitialization,
    manager::{Manager, ManagerError},
};

pub const CONTROLLER_NAME: &str = "dscinitialization";

impl ObservedStatus for DSCInitialization {
    fn phase(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.phase.as_deref())
    }

    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.observed_generation)
    }
}

pub fn setup(manager: &mut Manager) -> Result<(), ManagerError> {
    let ctx = Arc::new(ControllerContext {
        client: manager.client(),
        metrics: manager.metrics().clone(),
        name: CONTROLLER_NAME,
    });
    let metrics = manager.metrics().clone();

    let controller = manager
        .controller::<DSCInitialization>(Config::default().timeout(WATCH_TIMEOUT_SECS))?
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result(CONTROLLER_NAME, metrics));
    manager.add_controller(CONTROLLER_NAME, controller)
}

#[instrument(skip_all, fields(name = %obj.name_any()))]
async fn reconcile(
    obj: Arc<DSCInitialization>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    if obj.meta().deletion_timestamp.is_some() {
        info!("DSCInitialization is being deleted");
        return Ok(Action::await_change());
    }
    if obj.spec.applications_namespace.is_empty() {
        return Err(ReconcileErr::Internal(
            "spec.applicationsNamespace must not be empty".into(),
        ));
    }
    mark_ready(obj.as_ref(), &ctx).await
}
