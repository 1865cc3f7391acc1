//! kafka-cluster-operator - reconciles Kafka clusters declared as ConfigMaps.
//!
//! This is the main entry point that:
//! - Parses configuration from flags and environment
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Runs leader election (required for HA deployments)
//! - Starts the health server and the cluster controller

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use kafka_cluster_operator::health::{HealthState, run_health_server};
use kafka_cluster_operator::{ClusterController, KubeGateway, OperatorConfig};

/// Lease configuration
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = OperatorConfig::parse();

    init_logging(config.log_json)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %config.namespace,
        labels = %config.labels,
        "Starting kafka-cluster-operator"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // A standby replica answers probes while it waits for the Lease
    let early_health = config
        .serve_health_before_start()
        .then(|| spawn_health_server(health_state.clone(), config.health_addr));

    let lease_renewal_handle = if config.leader_election {
        Some(acquire_leadership(&client, &config).await)
    } else {
        info!("Leader election disabled");
        None
    };

    let mut controller = ClusterController::new(
        Arc::new(KubeGateway::new(client)),
        config.controller_config(),
        Some(health_state.clone()),
    );
    if let Err(e) = controller.start().await {
        error!(error = %e, "Cluster controller failed to start");
        return Err(e.into());
    }

    let health_handle = match early_health {
        Some(handle) => handle,
        None => spawn_health_server(health_state.clone(), config.health_addr),
    };

    // Wait for a task to fail or for a shutdown signal
    tokio::select! {
        result = health_handle => {
            if let Err(e) = result {
                error!(error = %e, "Health server task panicked");
            }
        }
        // Lease renewal task only exits via process::exit() or panic
        // so this branch is only reached on panic
        Err(e) = async {
            match lease_renewal_handle {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            error!(error = %e, "Lease renewal task panicked");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
        }
    }

    controller.stop().await?;
    info!("Operator stopped");
    Ok(())
}

fn spawn_health_server(
    health_state: Arc<HealthState>,
    addr: std::net::SocketAddr,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_state, addr).await {
            error!(error = %e, "Health server error");
        }
    })
}

/// Initialize the tracing subscriber
fn init_logging(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("kafka_cluster_operator=info".parse()?)
        .add_directive("kube=info".parse()?)
        .add_directive("kube_leader_election=info".parse()?);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn lease_lock(client: &Client, namespace: &str, holder_id: &str, lease_name: &str) -> LeaseLock {
    LeaseLock::new(
        client.clone(),
        namespace,
        LeaseLockParams {
            holder_id: holder_id.to_string(),
            lease_name: lease_name.to_string(),
            lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
        },
    )
}

/// Block until this instance holds the Lease, then renew it in the background.
///
/// Losing the Lease exits the process so Kubernetes restarts it into a new
/// election.
#[allow(clippy::exit)]
async fn acquire_leadership(
    client: &Client,
    config: &OperatorConfig,
) -> tokio::task::JoinHandle<()> {
    // Get pod identity for leader election
    let holder_id = std::env::var("POD_NAME").unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let lease_namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| config.namespace.clone());

    info!(
        holder_id = %holder_id,
        namespace = %lease_namespace,
        lease_name = %config.lease_name,
        "Initializing leader election"
    );
    let lock = lease_lock(client, &lease_namespace, &holder_id, &config.lease_name);

    info!("Waiting to acquire leadership...");
    loop {
        match lock.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                break;
            }
            Ok(_) => info!("Another instance is leader, waiting..."),
            Err(e) => warn!(error = %e, "Failed to acquire lease, retrying..."),
        }
        tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
    }

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

            match lock.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {}
                Ok(_) => {
                    error!("Lost leadership! Shutting down...");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(error = %e, "Failed to renew lease. Shutting down...");
                    std::process::exit(1);
                }
            }
        }
    })
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the operator cannot shut down
/// gracefully without them. Using expect() here is intentional.
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
