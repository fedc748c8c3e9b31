use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub details: HashMap<String, String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthCheck {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            details: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn unhealthy(message: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message),
            details: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = details;
        self
    }
}

pub type CheckError = Box<dyn std::error::Error + Send + Sync>;

pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> Result<HealthCheck, CheckError>;
}

/// Always healthy; used for plain liveness/readiness probes.
#[derive(Debug, Clone)]
pub struct Ping {
    name: String,
}

impl Ping {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl HealthChecker for Ping {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<HealthCheck, CheckError> {
        Ok(HealthCheck::healthy())
    }
}

#[derive(Default)]
pub struct ServiceHealthManager {
    checkers: Vec<Box<dyn HealthChecker>>,
}

impl ServiceHealthManager {
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    pub fn add_checker(&mut self, checker: Box<dyn HealthChecker>) {
        self.checkers.push(checker);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checkers.iter().any(|c| c.name() == name)
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    pub fn check_all(&self) -> HashMap<String, HealthCheck> {
        let mut results = HashMap::new();

        for checker in &self.checkers {
            let result = match checker.check() {
                Ok(health) => health,
                Err(e) => HealthCheck::unhealthy(e.to_string()),
            };
            results.insert(checker.name().to_string(), result);
        }

        results
    }

    pub fn overall_status(&self) -> HealthStatus {
        let checks = self.check_all();

        if checks.is_empty() {
            return HealthStatus::Unknown;
        }

        for (_, check) in checks {
            if check.status == HealthStatus::Unhealthy {
                return HealthStatus::Unhealthy;
            }
        }

        HealthStatus::Healthy
    }
}
