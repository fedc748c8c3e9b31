//! Built-in reconcilers for the two platform singletons.

pub mod datasciencecluster;
pub mod dscinitialization;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use kube::{
    Api, Client, Resource, ResourceExt,
    api::{Patch, PatchParams},
    runtime::controller::Action,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::debug;

use crate::{
    crd::{Condition, PHASE_READY},
    manager::metrics::OperatorMetrics,
};

/// Watches are closed by the server before the client read timeout.
pub(crate) const WATCH_TIMEOUT_SECS: u32 = 25;
const RESYNC: Duration = Duration::from_secs(300);
const ERROR_BACKOFF: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub metrics: OperatorMetrics,
    pub name: &'static str,
}

/// Status fields shared by the singleton kinds.
pub trait ObservedStatus {
    fn phase(&self) -> Option<&str>;
    fn observed_generation(&self) -> Option<i64>;
}

/// Patch `phase = Ready` and `observedGeneration` unless the status is
/// already current for this generation.
pub(crate) async fn mark_ready<K>(
    obj: &K,
    ctx: &ControllerContext,
) -> Result<Action, ReconcileErr>
where
    K: Resource<DynamicType = ()> + ObservedStatus + Clone + DeserializeOwned + Debug,
{
    let name = obj.name_any();
    let generation = obj.meta().generation;
    if obj.phase() == Some(PHASE_READY) && obj.observed_generation() == generation {
        debug!(controller = ctx.name, %name, "status current");
        return Ok(Action::requeue(RESYNC));
    }

    let api: Api<K> = Api::all(ctx.client.clone());
    let status = json!({
        "status": StatusPatch {
            phase: PHASE_READY,
            observed_generation: generation,
            conditions: vec![Condition::ready("Reconciled", "reconcile completed")],
        }
    });
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&status))
        .await?;
    debug!(controller = ctx.name, %name, ?generation, "status updated");
    Ok(Action::requeue(RESYNC))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPatch {
    phase: &'static str,
    observed_generation: Option<i64>,
    conditions: Vec<Condition>,
}

pub(crate) fn error_policy<K>(
    _obj: Arc<K>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    tracing::warn!(controller = ctx.name, error = %err, "reconcile failed, backing off");
    Action::requeue(ERROR_BACKOFF)
}

pub(crate) fn log_reconcile_result<T: Debug, E: Debug>(
    controller: &'static str,
    metrics: OperatorMetrics,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match &result {
            Ok(action) => debug!(?action, "{controller} reconciliation completed"),
            Err(e) => tracing::error!(error = ?e, "{controller} reconciliation error"),
        }
        metrics.reconciled(controller, result.is_ok());
        std::future::ready(())
    }
}
