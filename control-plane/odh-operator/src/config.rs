use std::net::{Ipv4Addr, SocketAddr};

use envconfig::Envconfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid environment configuration: {0}")]
    Env(#[from] envconfig::Error),

    #[error("unable to infer cluster connection: {0}")]
    Kube(#[from] kube::config::InferConfigError),

    #[error("invalid bind address {addr:?}: {reason}")]
    Address { addr: String, reason: String },
}

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// `0` disables the metrics endpoint.
    #[envconfig(from = "METRICS_BIND_ADDRESS", default = ":8080")]
    pub metrics_addr: String,

    #[envconfig(from = "HEALTH_PROBE_BIND_ADDRESS", default = ":8081")]
    pub health_probe_addr: String,

    /// Empty or `0` disables profiling.
    #[envconfig(from = "PPROF_BIND_ADDRESS", default = "")]
    pub pprof_addr: String,

    #[envconfig(from = "LEADER_ELECT", default = "false")]
    pub leader_election: bool,

    /// Namespace handed to the default DSCInitialization for monitoring.
    #[envconfig(from = "DSC_MONITORING_NAMESPACE", default = "opendatahub")]
    pub monitoring_namespace: String,

    /// devel | prod; anything else keeps the plain info-level output.
    #[envconfig(from = "LOG_MODE", default = "")]
    pub log_mode: String,

    #[envconfig(from = "ENABLE_WEBHOOKS", default = "true")]
    pub enable_webhooks: bool,

    #[envconfig(
        from = "WEBHOOK_CERT_DIR",
        default = "/tmp/k8s-webhook-server/serving-certs"
    )]
    pub webhook_cert_dir: String,

    /// Leader election identity. Falls back to HOSTNAME.
    #[envconfig(from = "POD_NAME")]
    pub pod_name: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_addr: ":8080".into(),
            health_probe_addr: ":8081".into(),
            pprof_addr: String::new(),
            leader_election: false,
            monitoring_namespace: "opendatahub".into(),
            log_mode: String::new(),
            enable_webhooks: true,
            webhook_cert_dir: "/tmp/k8s-webhook-server/serving-certs".into(),
            pod_name: None,
        }
    }
}

impl OperatorConfig {
    pub fn identity(&self) -> String {
        self.pod_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|n| !n.is_empty()))
            .unwrap_or_else(|| format!("odh-operator-{}", std::process::id()))
    }
}

/// Process configuration: operator settings plus the cluster connection.
#[derive(Clone, Debug)]
pub struct Config {
    pub operator: OperatorConfig,
    pub kube: kube::Config,
}

impl Config {
    pub fn new(operator: OperatorConfig, kube: kube::Config) -> Self {
        Self { operator, kube }
    }

    /// Load settings from the environment and infer the cluster connection
    /// (in-cluster service account, then kubeconfig).
    pub async fn load() -> Result<Self, ConfigError> {
        let operator = OperatorConfig::init_from_env()?;
        let kube = kube::Config::infer().await?;
        Ok(Self { operator, kube })
    }
}

/// Parse a bind address in the `host:port` / `:port` form.
/// Empty and `0` mean the endpoint is disabled.
pub fn parse_bind_addr(addr: &str) -> Result<Option<SocketAddr>, ConfigError> {
    let trimmed = addr.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(None);
    }
    if let Some(port) = trimmed.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|_| ConfigError::Address {
            addr: addr.to_string(),
            reason: "port is not a number".into(),
        })?;
        return Ok(Some((Ipv4Addr::UNSPECIFIED, port).into()));
    }
    trimmed
        .parse::<SocketAddr>()
        .map(Some)
        .map_err(|e| ConfigError::Address {
            addr: addr.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn bind_addr_port_only_binds_all_interfaces() {
        let addr = parse_bind_addr(":8080").unwrap().unwrap();
        assert_eq!(addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
    }

    #[test]
    fn bind_addr_full_form() {
        let addr = parse_bind_addr("127.0.0.1:9090").unwrap().unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 9090)));
    }

    #[test]
    fn bind_addr_disabled_values() {
        assert_eq!(parse_bind_addr("").unwrap(), None);
        assert_eq!(parse_bind_addr("0").unwrap(), None);
        assert_eq!(parse_bind_addr("  ").unwrap(), None);
    }

    #[test]
    fn bind_addr_rejects_garbage() {
        assert!(matches!(
            parse_bind_addr(":http"),
            Err(ConfigError::Address { .. })
        ));
        assert!(parse_bind_addr("localhost").is_err());
    }

    #[test]
    fn identity_prefers_pod_name() {
        let cfg = OperatorConfig {
            pod_name: Some("odh-operator-7c9f".into()),
            ..Default::default()
        };
        assert_eq!(cfg.identity(), "odh-operator-7c9f");
    }

    #[test]
    fn defaults_match_environment_defaults() {
        let cfg = OperatorConfig::default();
        let from_env = OperatorConfig::init_from_hashmap(&HashMap::new()).unwrap();

        assert_eq!(cfg.metrics_addr, from_env.metrics_addr);
        assert_eq!(cfg.health_probe_addr, from_env.health_probe_addr);
        assert_eq!(cfg.pprof_addr, from_env.pprof_addr);
        assert_eq!(cfg.leader_election, from_env.leader_election);
        assert_eq!(cfg.monitoring_namespace, from_env.monitoring_namespace);
        assert_eq!(cfg.log_mode, from_env.log_mode);
        assert_eq!(cfg.enable_webhooks, from_env.enable_webhooks);
        assert_eq!(cfg.webhook_cert_dir, from_env.webhook_cert_dir);
        assert_eq!(cfg.pod_name, from_env.pod_name);

        assert_eq!(cfg.metrics_addr, ":8080");
        assert_eq!(cfg.monitoring_namespace, "opendatahub");
    }
}
