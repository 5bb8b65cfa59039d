use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use pg_bootstrap::health::{HealthState, run_health_server};
use pg_bootstrap::{
    Cli, Command, ProvisionArgs, ServeArgs, build_bootstrap, build_context, run_trigger_server,
};

/// Grace period for an in-flight lifecycle event to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // install_default() fails if a provider is already installed, which is fine
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pg_bootstrap=info".parse()?)
                .add_directive("tokio_postgres=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            serve(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Provision(args) => Ok(provision(args).await),
    }
}

async fn provision(args: ProvisionArgs) -> ExitCode {
    info!(host = %args.cluster.host, port = args.cluster.port, "Starting cluster bootstrap");

    let bootstrap = match build_bootstrap(&args, None) {
        Ok(bootstrap) => bootstrap,
        Err(e) => {
            error!(error = %e, "Invalid bootstrap configuration");
            return ExitCode::FAILURE;
        }
    };

    match bootstrap.run().await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Failed to serialize bootstrap report");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "Cluster bootstrap failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!(host = %args.cluster.host, port = args.cluster.port, "Starting pg-bootstrap trigger service");

    let health_state = Arc::new(HealthState::new());
    let ctx = Arc::new(build_context(&args, health_state.clone())?);

    let health_handle = {
        let health_state = health_state.clone();
        let port = args.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let trigger_handle = {
        let ctx = ctx.clone();
        let port = args.trigger_port;
        let cert_path = args.cert_path.clone();
        let key_path = args.key_path.clone();
        tokio::spawn(async move {
            if let Err(e) = run_trigger_server(ctx, port, &cert_path, &key_path).await {
                error!("Lifecycle trigger server error: {}", e);
            }
        })
    };

    health_state.set_ready(true).await;

    tokio::select! {
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        result = trigger_handle => {
            if let Err(e) = result {
                error!("Lifecycle trigger task panicked: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            health_state.set_ready(false).await;

            // Wait for the in-flight event, bounded by the grace period
            let drained = tokio::time::timeout(
                Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS),
                ctx.in_flight.lock(),
            )
            .await
            .is_ok();
            if !drained {
                error!("Lifecycle event still in flight after grace period");
            }
        }
    }

    info!("pg-bootstrap stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
