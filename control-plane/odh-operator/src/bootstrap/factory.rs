use std::sync::Arc;

use kube::Client;

use super::{MainOperator, Operator, OperatorKind};
use crate::{cluster::ClusterProbe, config::Config, error::Error, registry::Handlers};

/// Builds operators from a shared configuration and handler set.
#[derive(Clone)]
pub struct Factory {
    config: Arc<Config>,
    handlers: Arc<Handlers>,
    client: Option<Client>,
    probe: Option<Arc<dyn ClusterProbe>>,
}

impl Factory {
    pub fn new(config: Arc<Config>, handlers: Arc<Handlers>) -> Self {
        Self {
            config,
            handlers,
            client: None,
            probe: None,
        }
    }

    /// Use `client` instead of building one from the cluster config.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Resolve cluster state with `probe` instead of querying the client.
    pub fn with_probe(mut self, probe: Arc<dyn ClusterProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn create(&self, kind: OperatorKind) -> Result<Operator, Error> {
        match kind {
            OperatorKind::Main => Ok(Operator::Main(Box::new(MainOperator::new(
                self.config.clone(),
                self.handlers.clone(),
                self.client.clone(),
                self.probe.clone(),
            )))),
            OperatorKind::CloudManager => Err(Error::NotImplemented(kind)),
        }
    }

    /// Parse `tag` and create the matching operator.
    pub fn create_named(&self, tag: &str) -> Result<Operator, Error> {
        self.create(tag.parse()?)
    }
}
