//! Validating admission webhooks for the platform singletons.

use std::fmt::Debug;
use std::sync::Arc;

use axum::{Json, extract::State, routing::post};
use kube::{
    Api, Client, Resource, ResourceExt,
    api::ListParams,
    core::{
        DynamicObject,
        admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
    },
};
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use crate::{
    crd::{DSCInitialization, DataScienceCluster},
    manager::{Manager, ManagerError},
};

pub const VALIDATE_DSCI_PATH: &str = "/validate-dscinitialization";
pub const VALIDATE_DSC_PATH: &str = "/validate-datasciencecluster";

#[derive(Clone)]
pub struct WebhookState {
    client: Client,
}

/// Register every webhook with the manager. Registers nothing when
/// webhooks are disabled.
pub fn register_all(manager: &mut Manager, enabled: bool) -> Result<(), ManagerError> {
    if !enabled {
        info!("webhooks disabled");
        return Ok(());
    }
    let state = Arc::new(WebhookState {
        client: manager.client(),
    });
    manager.add_webhook(
        VALIDATE_DSCI_PATH,
        post(validate_singleton::<DSCInitialization>).with_state(state.clone()),
    )?;
    manager.add_webhook(
        VALIDATE_DSC_PATH,
        post(validate_singleton::<DataScienceCluster>).with_state(state),
    )?;
    Ok(())
}

async fn validate_singleton<K>(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(check_singleton::<K>(&state.client, &req).await.into_review())
}

async fn check_singleton<K>(
    client: &Client,
    req: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let response = AdmissionResponse::from(req);
    if req.operation != Operation::Create {
        return response;
    }

    let kind = K::kind(&());
    let api: Api<K> = Api::all(client.clone());
    match api.list(&ListParams::default().limit(1)).await {
        Ok(list) => {
            let existing: Vec<String> = list.items.iter().map(|o| o.name_any()).collect();
            match singleton_violation(&kind, &existing) {
                Some(reason) => {
                    warn!(uid = %req.uid, %kind, "denying second instance");
                    response.deny(reason)
                }
                None => response,
            }
        }
        Err(e) => {
            error!(uid = %req.uid, %kind, error = %e, "unable to list existing instances");
            response.deny(format!("unable to verify existing {kind} instances: {e}"))
        }
    }
}

/// Denial message when `existing` already holds an instance of `kind`.
pub fn singleton_violation(kind: &str, existing: &[String]) -> Option<String> {
    if existing.is_empty() {
        return None;
    }
    Some(format!(
        "only one instance of {kind} object is allowed. Existing: {}",
        existing.join(", ")
    ))
}
