use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use odh_observability::{LogMode, TracingConfig, setup_tracing};
use odh_operator::{Config, Factory, registry::default_handlers};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "odh-operator", version, about = "Open Data Hub operator")]
struct Cli {
    /// Operator implementation to run.
    #[arg(long, env = "OPERATOR_KIND", default_value = "main")]
    kind: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Tracing follows the loaded config; a config that fails to load is
    // reported with the default output.
    let loaded = Config::load().await;
    let mode = loaded
        .as_ref()
        .map(|cfg| LogMode::parse(&cfg.operator.log_mode))
        .unwrap_or_default();
    if let Err(e) = setup_tracing(TracingConfig::for_mode("odh-operator", mode)) {
        eprintln!("failed to initialize tracing: {e}");
    }

    let config = match loaded {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!(error = %e, "unable to load configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(kind = %cli.kind, config = ?config.operator, "starting operator");

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(?e, "CryptoProvider already installed; proceeding");
    }

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    let handlers = Arc::new(default_handlers());

    let factory = Factory::new(config, handlers);
    let mut operator = match factory.create_named(&cli.kind) {
        Ok(op) => op,
        Err(e) => {
            error!(error = %e, "unable to create operator");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = operator.setup().await {
        error!(error = %e, "unable to set up operator");
        return ExitCode::FAILURE;
    }

    if let Err(e) = operator.start(token).await {
        error!(error = %e, "problem running operator");
        return ExitCode::FAILURE;
    }
    info!("operator stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
    token.cancel();
}
