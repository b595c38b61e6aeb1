use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use api_types::Vizier;
use clap::Parser;
use kube::CustomResourceExt;
use utils::logging;
use utils::version;
use vizier_monitor::config::Cli;
use vizier_monitor::config::Commands;
use vizier_monitor::config::MonitorArgs;
use vizier_monitor::config::MonitorConfig;
use vizier_monitor::k8s::init_kube_client;
use vizier_monitor::k8s::KubePodSource;
use vizier_monitor::k8s::KubeVizierStore;
use vizier_monitor::monitor::VizierMonitor;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_monitor(*args).await,
        Commands::Crd => print_crd(),
    }
}

async fn run_monitor(args: MonitorArgs) -> Result<()> {
    logging::init(args.log_format);

    tracing::info!("Starting vizier monitor {}", &**version::VERSION);

    let config = MonitorConfig::from(&args);
    let client = init_kube_client(args.kubeconfig.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Kubernetes: {e:?}"))?;

    let pods = Arc::new(KubePodSource::new(client.clone(), &config.namespace));
    let viziers = Arc::new(KubeVizierStore::new(client));
    let mut monitor = VizierMonitor::new(config, pods, viziers);

    monitor
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start vizier monitor: {e:?}"))?;

    let signal_handler = spawn_signal_handler()?;

    let finished = tokio::select! {
        result = monitor.join() => Some(result),
        _ = signal_handler => None,
    };

    let joined = match finished {
        Some(result) => result,
        None => {
            tracing::info!("Shutdown signal received, stopping vizier monitor");
            monitor.stop();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, monitor.join()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Vizier monitor did not stop within {SHUTDOWN_TIMEOUT:?}");
                    Ok(())
                }
            }
        }
    };

    joined.map_err(|e| anyhow::anyhow!("Vizier monitor failed: {e:?}"))?;
    tracing::info!("Vizier monitor stopped");
    Ok(())
}

/// Resolves once SIGTERM or SIGINT is received.
fn spawn_signal_handler() -> Result<tokio::task::JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }))
    }
    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {e}");
            }
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }))
    }
}

fn print_crd() -> Result<()> {
    print!("{}", serde_yaml::to_string(&Vizier::crd())?);
    Ok(())
}
