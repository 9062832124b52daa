use std::time::SystemTime;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use dash_balancer::load_balancer::backend::{BackendId, TelemetrySample};
use dash_balancer::telemetry::{encode_sample, Broker, MqttBroker};

#[derive(Parser)]
#[command(name = "balancer-cli")]
#[command(about = "Management CLI for dash-balancer", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key
    #[arg(short, long, env = "LB_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show balancer status and backend health counts
    Status,
    /// List backends with health and last telemetry sample
    Backends,
    /// Publish one telemetry sample to the broker
    Publish {
        /// Backend identity (`host:port`) the sample is for
        #[arg(long)]
        server: String,

        #[arg(long, default_value_t = 0.0)]
        memory: f64,

        #[arg(long, default_value_t = 0.0)]
        disk_read: f64,

        #[arg(long, default_value_t = 0)]
        requests: u64,

        #[arg(long, env = "MQTT_BROKER_HOST", default_value = "localhost")]
        broker_host: String,

        #[arg(long, env = "MQTT_BROKER_PORT", default_value_t = 1883)]
        broker_port: u16,

        #[arg(long, default_value = "loadbalancer/metrics")]
        topic: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => admin_get(&cli.url, &cli.key, "/admin/status").await?,
        Commands::Backends => admin_get(&cli.url, &cli.key, "/admin/backends").await?,
        Commands::Publish {
            server,
            memory,
            disk_read,
            requests,
            broker_host,
            broker_port,
            topic,
        } => {
            let sample = TelemetrySample {
                memory,
                disk_read,
                active_requests: requests,
                observed_at: SystemTime::now(),
            };
            let payload = encode_sample(&BackendId::new(&server), &sample);
            MqttBroker::new(broker_host, broker_port).publish(&topic, payload).await?;
            println!("Published sample for {} to {}", server, topic);
        }
    }

    Ok(())
}

async fn admin_get(url: &str, key: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let res = reqwest::Client::new()
        .get(format!("{}{}", url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
