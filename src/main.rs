use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::thread;

use phone_telemetry_rs::input::{read_equations, LinePump, StdinLines};
use phone_telemetry_rs::logging::init_logging;
use phone_telemetry_rs::{generate_user_id, Config, SharedIntegrator, StopFlag, TelemetryClient};

#[derive(Parser, Debug)]
#[command(name = "telemetry_client")]
#[command(about = "Telemetry client - streams equation-driven positions to the dispatcher", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Position equation in `x`; prompted for on stdin when omitted
    #[arg(long)]
    equation: Option<String>,

    /// Milliseconds between consecutive samples of a burst
    #[arg(long)]
    pacing_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.channel.host = host;
    }
    if let Some(port) = args.port {
        config.channel.port = port;
    }
    if let Some(pacing_ms) = args.pacing_ms {
        config.client.pacing_ms = pacing_ms;
    }

    let stop = StopFlag::new();
    let integrator = SharedIntegrator::default();
    let lines = LinePump::spawn(StdinLines, "stdin-lines")?.interactive();

    match args.equation {
        Some(text) => {
            integrator
                .set_equation(&text)
                .with_context(|| format!("invalid --equation \"{}\"", text))?;
            info!("Position equation set to \"{}\"", text.trim());
        }
        None => {
            let (lines, integrator, stop) = (lines.clone(), integrator.clone(), stop.clone());
            tokio::task::spawn_blocking(move || read_equations(&lines, &integrator, &stop, false))
                .await?;
        }
    }
    if stop.is_set() {
        info!("Stopped");
        return Ok(());
    }

    // replacement equations are accepted for the rest of the session
    {
        let (integrator, stop) = (integrator.clone(), stop.clone());
        thread::Builder::new()
            .name("equation-input".to_string())
            .spawn(move || read_equations(&lines, &integrator, &stop, true))?;
    }
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping client");
                stop.set();
            }
        });
    }

    let client = TelemetryClient::new(
        &generate_user_id(),
        integrator,
        stop,
        config.channel,
        &config.client,
    );
    let stats = client.run().await.context("telemetry session failed")?;
    info!(
        "Session for user {} finished: {} calls, {} bursts, {} samples integrated",
        client.user_id(),
        stats.calls,
        stats.bursts,
        client.integrator().samples()
    );
    Ok(())
}
