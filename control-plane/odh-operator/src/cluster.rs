//! Cluster probe: resolves the platform flavor and the namespaces the
//! operator works in from live cluster state.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::{
    Api, Client, ResourceExt,
    api::{DynamicObject, ListParams},
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    crd::DSCInitialization,
    scheme::{CATALOG_SOURCE, SUBSCRIPTION},
};

pub const MONITORING_NAMESPACE: &str = "redhat-ods-monitoring";
pub const NAMESPACE_CONSOLE_LINK: &str = "openshift-console";
pub const INGRESS_NAMESPACE: &str = "openshift-ingress";
pub const OPERATORS_NAMESPACE: &str = "openshift-operators";
pub const INGRESS_CONTROLLER_NAME: &str = "default";
pub const CLUSTER_AUTHENTICATION_OBJ: &str = "cluster";

pub const OPERATOR_NAMESPACE_ENV: &str = "OPERATOR_NAMESPACE";
pub const PLATFORM_TYPE_ENV: &str = "ODH_PLATFORM_TYPE";

const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const MANAGED_CATALOG_SOURCE: &str = "addon-managed-odh-catalog";
const SELF_MANAGED_SUBSCRIPTION: &str = "rhods-operator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    OpenDataHub,
    SelfManagedRhoai,
    /// The managed (cloud service) flavor.
    ManagedRhoai,
}

impl Platform {
    pub fn is_managed(self) -> bool {
        matches!(self, Platform::ManagedRhoai)
    }

    pub fn default_application_namespace(self) -> &'static str {
        match self {
            Platform::OpenDataHub => "opendatahub",
            Platform::SelfManagedRhoai | Platform::ManagedRhoai => {
                "redhat-ods-applications"
            }
        }
    }

    /// Parse the `ODH_PLATFORM_TYPE` override value.
    pub fn from_type(value: &str) -> Option<Self> {
        match value {
            "OpenDataHub" => Some(Platform::OpenDataHub),
            "SelfManagedRHOAI" => Some(Platform::SelfManagedRhoai),
            "ManagedRHOAI" => Some(Platform::ManagedRhoai),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::OpenDataHub => "Open Data Hub",
            Platform::SelfManagedRhoai => "OpenShift AI Self-Managed",
            Platform::ManagedRhoai => "OpenShift AI Cloud Service",
        })
    }
}

/// Cluster-wide facts resolved once during setup.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub platform: Platform,
    pub operator_namespace: Option<String>,
    pub application_namespace: Option<String>,
    pub version: Info,
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster unreachable: {0}")]
    Unreachable(#[source] kube::Error),

    #[error("failed to detect {what}: {source}")]
    Detection {
        what: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("unknown platform type {0:?}")]
    UnknownPlatform(String),
}

#[async_trait]
pub trait ClusterProbe: Send + Sync {
    async fn probe(&self) -> Result<ClusterInfo, ClusterError>;
}

/// Probe backed by a direct (non-caching) client.
#[derive(Clone)]
pub struct KubeClusterProbe {
    client: Client,
}

impl KubeClusterProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn detect_platform(
        &self,
        operator_ns: Option<&str>,
    ) -> Result<Platform, ClusterError> {
        if let Ok(value) = std::env::var(PLATFORM_TYPE_ENV) {
            if !value.is_empty() {
                return Platform::from_type(&value)
                    .ok_or(ClusterError::UnknownPlatform(value));
            }
        }
        let Some(ns) = operator_ns else {
            return Ok(Platform::OpenDataHub);
        };

        let catalogs: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            ns,
            &CATALOG_SOURCE.api_resource(),
        );
        let managed = catalogs
            .get_opt(MANAGED_CATALOG_SOURCE)
            .await
            .map_err(|source| ClusterError::Detection {
                what: "catalog source",
                source,
            })?;
        if managed.is_some() {
            return Ok(Platform::ManagedRhoai);
        }

        let subs: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            ns,
            &SUBSCRIPTION.api_resource(),
        );
        let self_managed = subs
            .get_opt(SELF_MANAGED_SUBSCRIPTION)
            .await
            .map_err(|source| ClusterError::Detection {
                what: "subscription",
                source,
            })?;
        if self_managed.is_some() {
            return Ok(Platform::SelfManagedRhoai);
        }
        Ok(Platform::OpenDataHub)
    }

    async fn application_namespace(
        &self,
        platform: Platform,
    ) -> Result<String, ClusterError> {
        let api: Api<DSCInitialization> = Api::all(self.client.clone());
        match api.list(&ListParams::default().limit(1)).await {
            Ok(list) => {
                if let Some(dsci) = list.items.first() {
                    debug!(dsci = %dsci.name_any(), "using applications namespace from existing DSCInitialization");
                    return Ok(dsci.spec.applications_namespace.clone());
                }
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!("DSCInitialization kind not served yet");
            }
            Err(source) => {
                return Err(ClusterError::Detection {
                    what: "application namespace",
                    source,
                });
            }
        }
        Ok(platform.default_application_namespace().to_string())
    }
}

#[async_trait]
impl ClusterProbe for KubeClusterProbe {
    async fn probe(&self) -> Result<ClusterInfo, ClusterError> {
        let version = self
            .client
            .apiserver_version()
            .await
            .map_err(ClusterError::Unreachable)?;

        let operator_namespace = operator_namespace().await;
        let platform = self.detect_platform(operator_namespace.as_deref()).await?;
        let application_namespace =
            Some(self.application_namespace(platform).await?);

        info!(
            %platform,
            version = %version.git_version,
            operator_namespace = ?operator_namespace,
            application_namespace = ?application_namespace,
            "cluster configuration resolved"
        );
        Ok(ClusterInfo {
            platform,
            operator_namespace,
            application_namespace,
            version,
        })
    }
}

/// `OPERATOR_NAMESPACE`, else the mounted service-account namespace.
pub async fn operator_namespace() -> Option<String> {
    if let Ok(ns) = std::env::var(OPERATOR_NAMESPACE_ENV) {
        if !ns.is_empty() {
            return Some(ns);
        }
    }
    tokio::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_FILE)
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
