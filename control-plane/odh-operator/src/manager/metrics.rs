//! Prometheus metrics served on the metrics bind address.

use prometheus::{CounterVec, Encoder, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

#[derive(Clone)]
pub struct OperatorMetrics {
    registry: Registry,
    reconcile_total: CounterVec,
    startup_tasks_total: CounterVec,
    leader: IntGauge,
}

impl OperatorMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let reconcile_total = CounterVec::new(
            Opts::new(
                "odh_operator_reconcile_total",
                "Reconcile attempts by controller and result",
            ),
            &["controller", "result"],
        )?;
        registry.register(Box::new(reconcile_total.clone()))?;

        let startup_tasks_total = CounterVec::new(
            Opts::new(
                "odh_operator_startup_tasks_total",
                "Completed startup tasks by task and result",
            ),
            &["task", "result"],
        )?;
        registry.register(Box::new(startup_tasks_total.clone()))?;

        let leader = IntGauge::new(
            "odh_operator_leader",
            "1 while this replica holds the leader lease",
        )?;
        registry.register(Box::new(leader.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            startup_tasks_total,
            leader,
        })
    }

    pub fn reconciled(&self, controller: &str, ok: bool) {
        self.reconcile_total
            .with_label_values(&[controller, result_label(ok)])
            .inc();
    }

    pub fn startup_task_finished(&self, task: &str, ok: bool) {
        self.startup_tasks_total
            .with_label_values(&[task, result_label(ok)])
            .inc();
    }

    pub fn set_leader(&self, leading: bool) {
        self.leader.set(i64::from(leading));
    }

    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

fn result_label(ok: bool) -> &'static str {
    if ok { "success" } else { "error" }
}
