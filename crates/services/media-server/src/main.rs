//! Pipefleet Media Server - orchestrates the reference media deployment
//!
//! Registers every pipeline of a deployment file with a running GStreamer
//! Daemon, runs the fixed record/snapshot/rewire script and tears everything
//! down again, consumers first.
//!
//! # Usage
//!
//! ```bash
//! # Run the reference deployment against gstd on localhost:5000
//! media-server --config pipelines/media-server.toml
//!
//! # Remote daemon, recordings into /data
//! media-server --host jetson.local --output-dir /data -v
//!
//! # Exercise the script without a daemon
//! media-server --dry-run --json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use pipefleet_core::{Config, ControlPlane, InMemoryEngine, RunReport, Sequencer};
use pipefleet_gstd::GstdClient;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Pipefleet Media Server - run the media deployment script on gstd
#[derive(Parser, Debug)]
#[command(name = "media-server")]
#[command(author, version)]
#[command(about = "Create, record, snapshot, rewire and tear down gstd pipelines")]
struct Args {
    /// Deployment file with engine, timing and topology sections
    #[arg(short, long, default_value = "pipelines/media-server.toml")]
    config: PathBuf,

    /// gstd host (overrides the file and PIPEFLEET_GSTD_HOST)
    #[arg(long)]
    host: Option<String>,

    /// gstd TCP port (overrides the file and PIPEFLEET_GSTD_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Directory recordings and snapshots are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run against an in-memory engine instead of gstd
    #[arg(long)]
    dry_run: bool,

    /// Skip the fixed settle delays between phases
    #[arg(long)]
    no_settle: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// File, then environment, then command line
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(Some(&args.config))
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    if let Some(host) = &args.host {
        config.engine.host = host.clone();
    }
    if let Some(port) = args.port {
        config.engine.port = port;
    }
    if let Some(dir) = &args.output_dir {
        config.locations.directory = Some(dir.clone());
    }
    if args.no_settle || args.dry_run {
        config.disable_settle();
    }

    Ok(config)
}

async fn connect(args: &Args, config: &Config) -> Result<Arc<dyn ControlPlane>> {
    if args.dry_run {
        info!("Dry run: using in-memory engine");
        return Ok(Arc::new(InMemoryEngine::new()));
    }

    let client = GstdClient::from_config(&config.engine);
    client
        .ping()
        .await
        .with_context(|| format!("gstd is not reachable at {}", client.address()))?;
    info!(address = %client.address(), "Connected to gstd");

    Ok(Arc::new(client))
}

async fn run(args: &Args, shutdown: watch::Receiver<bool>) -> Result<RunReport> {
    let config = load_config(args)?;
    let client = connect(args, &config).await?;

    let mut sequencer = Sequencer::new(client, config.topology.clone(), config.sequencer_options())
        .context("Invalid topology")?
        .with_shutdown(shutdown);

    let report = sequencer.run().await?;
    Ok(report)
}

fn render(report: &RunReport) -> String {
    let mut out = String::new();

    let outcome = if report.is_success() {
        "completed"
    } else if report.interrupted {
        "interrupted"
    } else {
        "failed"
    };
    out.push_str(&format!(
        "Run {} ({} phases completed)\n",
        outcome,
        report.completed.len()
    ));

    if let Some(phase) = report.aborted_at {
        out.push_str(&format!("  aborted at: {}\n", phase));
    }
    for failure in &report.failures {
        out.push_str(&format!("  failure: {}\n", failure));
    }
    for artifact in &report.artifacts {
        out.push_str(&format!("  artifact: {}\n", artifact));
    }

    out
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, draining pipelines");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = run(&args, shutdown_rx).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
    } else {
        print!("{}", render(&report));
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
