//! dash-balancer: telemetry-aware TCP load balancer for DASH segment servers.
//!
//! Reads configuration from a TOML file and/or the environment, subscribes to
//! backend telemetry over MQTT and forwards client connections until SIGINT
//! or SIGTERM.

use std::path::PathBuf;

use clap::Parser;

use dash_balancer::config::loader::parse_backend_list;
use dash_balancer::config::{load_with_overrides, Overrides, StrategyKind};
use dash_balancer::lifecycle::signals::wait_for_signal;
use dash_balancer::lifecycle::Shutdown;
use dash_balancer::net::Listener;
use dash_balancer::observability::{logging, metrics};
use dash_balancer::proxy::BalancerServer;
use dash_balancer::telemetry::MqttBroker;

#[derive(Parser, Debug)]
#[command(name = "dash-balancer", version)]
#[command(about = "Telemetry-aware TCP load balancer for DASH segment servers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "LB_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides `listener.bind_address`
    #[arg(long, env = "LB_LISTEN")]
    listen: Option<String>,

    /// Comma-separated `host:port` backend list, overrides `backends`
    #[arg(long, env = "LB_BACKENDS")]
    backends: Option<String>,

    /// Selection strategy: round-robin, least-loaded, random or weighted-probability
    #[arg(long, env = "LB_STRATEGY")]
    strategy: Option<StrategyKind>,

    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER_HOST")]
    broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MQTT_BROKER_PORT")]
    broker_port: Option<u16>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            bind_address: self.listen.clone(),
            backends: self.backends.as_deref().map(parse_backend_list),
            strategy: self.strategy,
            broker_host: self.broker_host.clone(),
            broker_port: self.broker_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_with_overrides(args.config.as_deref(), args.overrides())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dash-balancer starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        strategy = ?config.strategy.kind,
        broker = %format!("{}:{}", config.telemetry.broker_host, config.telemetry.broker_port),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let broker = MqttBroker::from_config(&config.telemetry);
    let shutdown = Shutdown::new();

    let server = BalancerServer::new(config);
    let mut server_task = tokio::spawn(server.run(listener, broker, shutdown.subscribe()));

    tokio::select! {
        _ = wait_for_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
        // The server only returns early on a startup failure.
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
