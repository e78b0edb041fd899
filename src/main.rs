//! brokerlink - failover-aware MQTT cluster client

use brokerlink::broker::BrokerRegistry;
use brokerlink::config::{ClusterConfig, ConfigError};
use brokerlink::connection::{ConnectionManager, ConnectionStatus};
use brokerlink::dispatch::Dispatcher;
use brokerlink::error::ClusterResult;
use brokerlink::health::{build_probe, HealthMonitor};
use brokerlink::observability::{health_port_from_env, init_default_logging, init_logging};
use brokerlink::observability::logging::{parse_spans_flag, LogFormat};
use brokerlink::sensor::TemperatureGenerator;
use brokerlink::service::{
    HealthCheckService, PublisherService, SubscriberService, TemperatureLogHandler,
};
use brokerlink::transport::mqtt::MqttWireClient;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Level};

/// Failover-aware MQTT publish/subscribe client
#[derive(Parser)]
#[command(name = "brokerlink")]
#[command(about = "Failover-aware MQTT client for clusters of prioritized brokers")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or all service roles until SIGINT/SIGTERM
    Run {
        #[arg(long, value_enum, default_value_t = Role::All)]
        role: Role,
    },
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    HealthCheck,
    Publisher,
    Subscriber,
    All,
}

impl Role {
    fn includes(self, other: Role) -> bool {
        self == Role::All || self == other
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        n => {
            let level = if n == 1 { Level::DEBUG } else { Level::TRACE };
            init_logging(
                level,
                LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_default()),
                parse_spans_flag(&std::env::var("LOG_SPANS").unwrap_or_default()),
            );
        }
    }

    info!("Starting brokerlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { role } => run_cluster(config, role).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

const CONFIG_CANDIDATES: [&str; 2] = ["brokerlink.toml", "config/brokerlink.toml"];

fn load_configuration(config_path: &Option<PathBuf>) -> ClusterResult<ClusterConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(ClusterConfig::load_from_file(path)?);
    }

    for candidate in CONFIG_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ClusterConfig::load_from_file(&path)?);
        }
    }

    Err(ConfigError::NotFound(CONFIG_CANDIDATES.join(", ")).into())
}

fn handle_config_command(config: &ClusterConfig, show: bool) -> ClusterResult<()> {
    if show {
        println!("{}", config.to_toml_string()?);
    }
    info!(
        brokers = config.cluster.brokers.len(),
        "Configuration validation complete"
    );
    Ok(())
}

async fn run_cluster(config: ClusterConfig, role: Role) -> ClusterResult<()> {
    let registry = BrokerRegistry::from_config(&config.cluster.brokers)?;
    let dispatcher = Arc::new(Dispatcher::new(config.dispatch.match_mode));
    let wire = Arc::new(MqttWireClient::new(config.mqtt.clone()));
    let manager = Arc::new(ConnectionManager::new(registry.clone(), wire, dispatcher));

    let probe_timeout = config.health_check.probe_timeout();
    let probe = build_probe(config.health_check.probe, probe_timeout, &config.mqtt);
    let monitor = Arc::new(HealthMonitor::new(registry, probe, probe_timeout));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Selection depends on fresh health flags, so the monitor always runs;
    // the health-check role adds the HTTP endpoint
    let mut health = HealthCheckService::new(monitor, config.health_check.interval());
    if role.includes(Role::HealthCheck) {
        health = health.with_http(health_port_from_env());
    }
    tasks.push(tokio::spawn(health.run(shutdown_rx.clone())));

    tasks.push(tokio::spawn(log_status_events(
        manager.status_events(),
        shutdown_rx.clone(),
    )));
    if let Some(handle) = manager.spawn_dispatcher(shutdown_rx.clone()) {
        tasks.push(handle);
    }

    if role.includes(Role::Publisher) {
        let publisher = PublisherService::new(
            manager.clone(),
            Arc::new(TemperatureGenerator::new()),
            config.device.clone(),
            &config.publisher,
        );
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { publisher.run(shutdown).await }));
    }

    if role.includes(Role::Subscriber) {
        let subscriber = SubscriberService::new(
            manager.clone(),
            Arc::new(TemperatureLogHandler),
            &config.subscriber,
        );
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { subscriber.run(shutdown).await }));
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!(role = ?role, "brokerlink is running");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    let _ = shutdown_tx.send(true);
    for task in tasks {
        match tokio::time::timeout(Duration::from_secs(5), task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Background task ended with error: {}", e),
            Err(_) => warn!("Background task did not stop within 5s"),
        }
    }

    manager.disconnect().await;
    Ok(())
}

async fn log_status_events(
    mut events: broadcast::Receiver<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(status) => info!(status = ?status, "Connection status changed"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Connection status observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
