use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Condition, ManagementState};

/// Desired state of the platform components. Singleton.
#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default,
)]
#[kube(
    group = "datasciencecluster.opendatahub.io",
    version = "v2",
    kind = "DataScienceCluster",
    plural = "datascienceclusters",
    shortname = "dsc",
    status = "DataScienceClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DataScienceClusterSpec {
    /// Component name -> requested management state
    #[serde(default)]
    pub components: BTreeMap<String, ComponentSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub management_state: ManagementState,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DataScienceClusterStatus {
    pub phase: Option<String>,
    pub observed_generation: Option<i64>,
    pub conditions: Option<Vec<Condition>>,
}
