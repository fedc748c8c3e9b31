use thiserror::Error;

use crate::{
    bootstrap::{OperatorKind, OperatorState},
    cache::CachePolicyError,
    cluster::ClusterError,
    config::ConfigError,
    manager::ManagerError,
    registry::HandlerError,
};

/// Operator creation, setup and run failures. Setup variants name the step
/// that failed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown operator kind {0:?}")]
    UnknownKind(String),

    #[error("operator kind {0} is not implemented")]
    NotImplemented(OperatorKind),

    #[error("operation not allowed in state {0:?}")]
    InvalidState(OperatorState),

    #[error("unable to create cluster client: {0}")]
    Client(#[source] kube::Error),

    #[error("unable to initialize cluster config: {0}")]
    ClusterInit(#[from] ClusterError),

    #[error("unable to initialize handlers: {0}")]
    HandlerInit(#[source] HandlerError),

    #[error("unable to compute cache policy: {0}")]
    CachePolicy(#[from] CachePolicyError),

    #[error("invalid manager options: {0}")]
    Options(#[from] ConfigError),

    #[error("unable to create manager: {0}")]
    Manager(#[source] ManagerError),

    #[error("unable to register webhooks: {0}")]
    Webhooks(#[source] ManagerError),

    #[error("unable to create {name} controller: {source}")]
    Controller {
        name: &'static str,
        #[source]
        source: ManagerError,
    },

    #[error("unable to create reconcilers: {0}")]
    Reconcilers(#[source] HandlerError),

    #[error("unable to schedule startup tasks: {0}")]
    StartupTask(#[source] ManagerError),

    #[error("unable to set up health check: {0}")]
    HealthCheck(#[source] ManagerError),

    #[error("problem running manager: {0}")]
    Run(#[source] ManagerError),
}
