use chrono::{SecondsFormat, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use telemetry_forwarder::config::Config;
use telemetry_forwarder::pipeline::Forwarder;
use telemetry_forwarder::record::Input;
use telemetry_forwarder::{logging, metrics, server};

#[derive(Parser)]
#[command(name = "telemetry_forwarder")]
#[command(about = "Forwards telemetry events to a Fabric Eventstream custom endpoint")]
#[command(version = "0.1.0")]
struct Cli {
    /// Run the HTTP ingest server (HTTP_MODE=1 does the same)
    #[arg(long)]
    http: bool,

    /// Send one synthetic example event and exit
    #[arg(long)]
    example: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    logging::init_logging();

    // Initialize metrics
    metrics::init();

    let config = Config::from_env()?;
    let forwarder = Arc::new(Forwarder::from_config(&config));

    if cli.http || config.http_mode {
        server::start_server(forwarder, config.port).await?;
    } else if cli.example {
        run_example(&forwarder).await?;
    } else {
        run_stdin(&forwarder).await?;
    }

    Ok(())
}

/// Send one timestamped sample event through the pipeline and exit.
async fn run_example(forwarder: &Forwarder) -> anyhow::Result<()> {
    let sample = serde_json::json!({
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "msg": "hello world",
        "source": "demo",
    });

    let status = forwarder.forward(Input::Structured(sample)).await?;

    info!("Sent example event, status {}", status);
    println!("✅ Sent example event, status {}", status);

    Ok(())
}

/// Forward each non-blank line of stdin until EOF. Lines that parse as
/// JSON are forwarded as structured values, everything else as text.
async fn run_stdin(forwarder: &Forwarder) -> anyhow::Result<()> {
    println!("📥 Reading events from stdin (one per line, Ctrl+C to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let status = forwarder.forward(Input::from_text(trimmed)).await?;
        info!("Sent 1 event, status {}", status);
        println!("Sent 1 event, status {}", status);
    }

    Ok(())
}
