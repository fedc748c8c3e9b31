//! Cache scoping per resource kind.
//!
//! The policy is computed once from the resolved [`ClusterInfo`] and handed
//! to the manager, which uses it to decide what each watch retains. Kinds
//! without an entry are cached cluster-wide.

use std::collections::{BTreeSet, HashMap};

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Secret},
    networking::v1::NetworkPolicy,
    rbac::v1::{Role, RoleBinding},
};
use kube::api::GroupVersionKind;
use thiserror::Error;

use crate::{
    cluster::{
        CLUSTER_AUTHENTICATION_OBJ, ClusterInfo, INGRESS_CONTROLLER_NAME,
        INGRESS_NAMESPACE, MONITORING_NAMESPACE, NAMESPACE_CONSOLE_LINK,
        OPERATORS_NAMESPACE, Platform,
    },
    scheme::{
        AUTHENTICATION, INGRESS_CONTROLLER, PROMETHEUS_RULE, ROUTE,
        SERVICE_MONITOR, gvk_of,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CachePolicyError {
    #[error("operator namespace could not be resolved")]
    OperatorNamespace,

    #[error("application namespace could not be resolved")]
    ApplicationNamespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheScope {
    /// Only objects in these namespaces. Never empty.
    Namespaces(BTreeSet<String>),
    /// Exactly the objects matching `field=value`.
    Field { field: String, value: String },
}

impl CacheScope {
    fn name(value: &str) -> Self {
        CacheScope::Field {
            field: "metadata.name".into(),
            value: value.into(),
        }
    }

    /// Field selector strings for the watches backing this scope: one per
    /// namespace, or the single field match.
    pub fn selectors(&self) -> Vec<String> {
        match self {
            CacheScope::Namespaces(nss) => nss
                .iter()
                .map(|ns| format!("metadata.namespace={ns}"))
                .collect(),
            CacheScope::Field { field, value } => {
                vec![format!("{field}={value}")]
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    scopes: HashMap<GroupVersionKind, CacheScope>,
}

impl CachePolicy {
    pub fn build(info: &ClusterInfo) -> Result<Self, CachePolicyError> {
        let operator_ns = info
            .operator_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .ok_or(CachePolicyError::OperatorNamespace)?;
        let app_ns = info
            .application_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .ok_or(CachePolicyError::ApplicationNamespace)?;

        let secrets = secret_namespaces(operator_ns, app_ns, info.platform);
        let general = general_namespaces(operator_ns, app_ns, info.platform);

        let mut scopes = HashMap::new();
        scopes.insert(gvk_of::<Secret>(), CacheScope::Namespaces(secrets));
        for gvk in [
            gvk_of::<ConfigMap>(),
            gvk_of::<Deployment>(),
            gvk_of::<NetworkPolicy>(),
            gvk_of::<Role>(),
            gvk_of::<RoleBinding>(),
            PROMETHEUS_RULE.gvk(),
            SERVICE_MONITOR.gvk(),
            ROUTE.gvk(),
        ] {
            scopes.insert(gvk, CacheScope::Namespaces(general.clone()));
        }
        scopes.insert(
            INGRESS_CONTROLLER.gvk(),
            CacheScope::name(INGRESS_CONTROLLER_NAME),
        );
        scopes.insert(
            AUTHENTICATION.gvk(),
            CacheScope::name(CLUSTER_AUTHENTICATION_OBJ),
        );
        Ok(Self { scopes })
    }

    pub fn scope(&self, gvk: &GroupVersionKind) -> Option<&CacheScope> {
        self.scopes.get(gvk)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &GroupVersionKind> {
        self.scopes.keys()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Operator, monitoring and application namespaces, plus the console
/// namespace on the managed flavor.
pub fn common_namespaces(
    operator_ns: &str,
    app_ns: &str,
    platform: Platform,
) -> BTreeSet<String> {
    let mut nss: BTreeSet<String> = [operator_ns, MONITORING_NAMESPACE, app_ns]
        .into_iter()
        .map(String::from)
        .collect();
    if platform.is_managed() {
        nss.insert(NAMESPACE_CONSOLE_LINK.to_string());
    }
    nss
}

pub fn secret_namespaces(
    operator_ns: &str,
    app_ns: &str,
    platform: Platform,
) -> BTreeSet<String> {
    let mut nss = common_namespaces(operator_ns, app_ns, platform);
    nss.insert(INGRESS_NAMESPACE.to_string());
    nss
}

pub fn general_namespaces(
    operator_ns: &str,
    app_ns: &str,
    platform: Platform,
) -> BTreeSet<String> {
    let mut nss = secret_namespaces(operator_ns, app_ns, platform);
    nss.insert(OPERATORS_NAMESPACE.to_string());
    nss
}
