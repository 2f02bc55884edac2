use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use phone_telemetry_rs::input::{CommandPrompt, LinePump, StdinLines};
use phone_telemetry_rs::logging::init_logging;
use phone_telemetry_rs::{Config, StopFlag, TelemetryService};

#[derive(Parser, Debug)]
#[command(name = "telemetry_server")]
#[command(about = "Telemetry dispatcher - acknowledges samples and hands out operator commands", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(long)]
    bind_host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Calls handled concurrently
    #[arg(long)]
    max_calls: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(bind_host) = args.bind_host {
        config.server.bind_host = bind_host;
    }
    if let Some(port) = args.port {
        config.channel.port = port;
    }
    if let Some(max_calls) = args.max_calls {
        config.server.max_concurrent_calls = max_calls;
    }

    let stop = StopFlag::new();
    let operator = LinePump::spawn(StdinLines, "operator-input")?.interactive();
    let service = Arc::new(TelemetryService::new(
        CommandPrompt::new(operator),
        stop.clone(),
        config.channel.idle_timeout(),
    ));

    let addr = format!("{}:{}", config.server.bind_host, config.channel.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server starting on port {}", config.channel.port);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping server");
            stop.set();
        }
    });

    service
        .clone()
        .serve(listener, config.server.max_concurrent_calls)
        .await;

    let stats = service.stats();
    info!(
        "Server finished: {} calls, {} samples received",
        stats.calls, stats.samples
    );
    Ok(())
}
