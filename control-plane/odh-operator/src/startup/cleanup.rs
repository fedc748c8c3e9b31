//! Removal of objects left behind by previous releases.

use kube::{
    Api, Client,
    api::{DeleteParams, DynamicObject},
};
use tracing::{debug, info, warn};

use crate::{
    cluster::MONITORING_NAMESPACE,
    scheme::{KindRef, PROMETHEUS_RULE, ROUTE, SERVICE_MONITOR, Scheme},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyNamespace {
    Application,
    Monitoring,
}

#[derive(Debug, Clone, Copy)]
pub struct LegacyResource {
    pub kind: KindRef,
    pub namespace: LegacyNamespace,
    pub name: &'static str,
}

pub const LEGACY_RESOURCES: &[LegacyResource] = &[
    LegacyResource {
        kind: PROMETHEUS_RULE,
        namespace: LegacyNamespace::Monitoring,
        name: "odh-deployment-rules",
    },
    LegacyResource {
        kind: SERVICE_MONITOR,
        namespace: LegacyNamespace::Monitoring,
        name: "odh-federation-monitor",
    },
    LegacyResource {
        kind: ROUTE,
        namespace: LegacyNamespace::Monitoring,
        name: "alertmanager",
    },
    LegacyResource {
        kind: ROUTE,
        namespace: LegacyNamespace::Application,
        name: "odh-dashboard-legacy",
    },
];

impl LegacyResource {
    fn namespace<'a>(&self, application_namespace: &'a str) -> &'a str {
        match self.namespace {
            LegacyNamespace::Application => application_namespace,
            LegacyNamespace::Monitoring => MONITORING_NAMESPACE,
        }
    }
}

/// Delete every legacy object. Missing objects (or kinds the cluster
/// does not serve) are skipped; other failures are collected and reported
/// after every entry was attempted.
pub async fn cleanup_existing_resources(
    client: Client,
    scheme: &Scheme,
    application_namespace: &str,
) -> anyhow::Result<()> {
    let mut failures = Vec::new();
    for legacy in LEGACY_RESOURCES {
        let Some(ar) = scheme.api_resource(&legacy.kind.gvk()) else {
            failures.push(format!("{} is not registered", legacy.kind.kind));
            continue;
        };
        let ns = legacy.namespace(application_namespace);
        let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), ns, ar);
        match api.delete(legacy.name, &DeleteParams::background()).await {
            Ok(_) => {
                info!(kind = legacy.kind.kind, %ns, name = legacy.name, "deleted legacy resource");
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(kind = legacy.kind.kind, %ns, name = legacy.name, "legacy resource absent");
            }
            Err(e) => {
                warn!(kind = legacy.kind.kind, %ns, name = legacy.name, error = %e, "failed to delete legacy resource");
                failures.push(format!("{}/{}: {e}", legacy.kind.kind, legacy.name));
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("legacy cleanup incomplete: {}", failures.join("; "))
    }
}
