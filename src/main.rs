//! catalog-ops - operational tooling for the Service Catalog API.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Parses the subcommand and its options
//! - Creates the Kubernetes client
//! - Runs the webhook server, the cleaner or a migration action

use clap::Parser;
use kube::Client;
use tokio::signal;
use tracing::{error, info};

use catalog_ops::config::{Cli, Command, CrdgenOptions};
use catalog_ops::crd::catalog_crds;
use catalog_ops::{run_cleaner, run_migration, run_webhooks};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("catalog_ops=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    let cli = Cli::parse();

    if let Command::Crdgen(options) = &cli.command {
        return print_crds(options);
    }

    // Only fails when a provider was already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let result = match &cli.command {
        Command::Webhook(options) => {
            info!("Starting admission webhook server");
            tokio::select! {
                result = run_webhooks(client, options) => result,
                _ = shutdown_signal() => {
                    info!("Received shutdown signal, stopping webhook server");
                    Ok(())
                }
            }
        }
        Command::Cleaner(options) => run_cleaner(client, options).await,
        Command::Migration(options) => run_migration(client, options, shutdown_signal()).await,
        Command::Crdgen(_) => Ok(()),
    };

    if let Err(e) = result {
        error!(error = %e, "catalog-ops failed");
        return Err(e.into());
    }

    info!("catalog-ops finished");
    Ok(())
}

fn print_crds(options: &CrdgenOptions) -> Result<(), Box<dyn std::error::Error>> {
    for crd in catalog_crds(options.release_name.as_deref()) {
        print!("---\n{}", serde_yaml_ng::to_string(&crd)?);
    }
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal, there is no graceful
/// shutdown without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
