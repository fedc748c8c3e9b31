use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Output flavour selected by the `LOG_MODE` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    /// Human readable output at debug level.
    Development,
    #[default]
    Default,
    /// JSON lines at info level.
    Production,
}

impl LogMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "devel" | "development" => LogMode::Development,
            "prod" | "production" => LogMode::Production,
            _ => LogMode::Default,
        }
    }

    pub fn default_level(&self) -> &'static str {
        match self {
            LogMode::Development => "debug",
            _ => "info",
        }
    }

    pub fn json(&self) -> bool {
        matches!(self, LogMode::Production)
    }
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub service_name: String,
    pub log_level: String,
    pub json_format: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "odh-operator".to_string(),
            log_level: "info".to_string(),
            json_format: false,
        }
    }
}

impl TracingConfig {
    pub fn for_mode(service_name: &str, mode: LogMode) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_level: mode.default_level().to_string(),
            json_format: mode.json(),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn setup_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_file(true)
        .with_line_number(true);

    let fmt_layer = if config.json_format {
        fmt_layer.json().boxed()
    } else {
        fmt_layer.boxed()
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TracingError::Setup(e.to_string()))?;

    ::tracing::debug!(service = %config.service_name, "tracing initialized");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing setup error: {0}")]
    Setup(String),
}
