pub mod datasciencecluster;
pub mod dscinitialization;

pub use datasciencecluster::{
    ComponentSpec, DataScienceCluster, DataScienceClusterSpec,
    DataScienceClusterStatus,
};
pub use dscinitialization::{
    DSCInitialization, DSCInitializationSpec, DSCInitializationStatus,
    MonitoringSpec,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const PHASE_READY: &str = "Ready";

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum ManagementState {
    #[default]
    Managed,
    Removed,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn ready(reason: &str, message: &str) -> Self {
        Self {
            type_: PHASE_READY.into(),
            status: ConditionStatus::True,
            reason: Some(reason.into()),
            message: Some(message.into()),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
