//! Default singleton resources created on first start.

use std::collections::BTreeMap;

use anyhow::Context;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::{ListParams, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::info;

use crate::{
    cluster::Platform,
    crd::{
        ComponentSpec, DSCInitialization, DSCInitializationSpec,
        DataScienceCluster, DataScienceClusterSpec, ManagementState,
        MonitoringSpec,
    },
};

pub const DEFAULT_DSCI_NAME: &str = "default-dsci";
pub const DEFAULT_DSC_NAME: &str = "default-dsc";

const DEFAULT_COMPONENTS: &[&str] = &[
    "dashboard",
    "workbenches",
    "datasciencepipelines",
    "kserve",
    "ray",
    "trustyai",
    "modelregistry",
];

pub fn default_dsci(
    platform: Platform,
    application_namespace: &str,
    monitoring_namespace: &str,
) -> DSCInitialization {
    let management_state = if platform.is_managed() {
        ManagementState::Managed
    } else {
        ManagementState::Removed
    };
    DSCInitialization::new(
        DEFAULT_DSCI_NAME,
        DSCInitializationSpec {
            applications_namespace: application_namespace.to_string(),
            monitoring: Some(MonitoringSpec {
                management_state,
                namespace: monitoring_namespace.to_string(),
            }),
        },
    )
}

pub fn default_dsc() -> DataScienceCluster {
    let components: BTreeMap<String, ComponentSpec> = DEFAULT_COMPONENTS
        .iter()
        .map(|c| {
            (
                c.to_string(),
                ComponentSpec {
                    management_state: ManagementState::Managed,
                },
            )
        })
        .collect();
    DataScienceCluster::new(DEFAULT_DSC_NAME, DataScienceClusterSpec { components })
}

pub async fn create_default_dsci(
    client: Client,
    platform: Platform,
    application_namespace: String,
    monitoring_namespace: String,
) -> anyhow::Result<()> {
    let obj = default_dsci(platform, &application_namespace, &monitoring_namespace);
    create_singleton(client, obj).await
}

pub async fn create_default_dsc(client: Client) -> anyhow::Result<()> {
    create_singleton(client, default_dsc()).await
}

/// Create `obj` unless any instance of its kind exists. A concurrent
/// creation (409) counts as success.
async fn create_singleton<K>(client: Client, obj: K) -> anyhow::Result<()>
where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + std::fmt::Debug,
{
    let kind = K::kind(&());
    let api: Api<K> = Api::all(client);
    let existing = api
        .list(&ListParams::default().limit(1))
        .await
        .with_context(|| format!("listing {kind}"))?;
    if let Some(found) = existing.items.first() {
        info!(%kind, name = %found.name_any(), "instance exists, skipping default creation");
        return Ok(());
    }

    match api.create(&PostParams::default(), &obj).await {
        Ok(created) => {
            info!(%kind, name = %created.name_any(), "created default instance");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 409 => {
            info!(%kind, "default instance already exists");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("creating default {kind}")),
    }
}
