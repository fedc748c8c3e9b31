use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Condition, ManagementState};

/// Cluster-wide platform initialization. Singleton.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "dscinitialization.opendatahub.io",
    version = "v2",
    kind = "DSCInitialization",
    plural = "dscinitializations",
    shortname = "dsci",
    status = "DSCInitializationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DSCInitializationSpec {
    /// Namespace the platform applications are deployed into
    pub applications_namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    pub management_state: ManagementState,
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DSCInitializationStatus {
    pub phase: Option<String>,
    pub observed_generation: Option<i64>,
    pub conditions: Option<Vec<Condition>>,
}
