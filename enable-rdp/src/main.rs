//! Check whether an Azure VM accepts RDP and restore access if it does not

use anyhow::{Context, Result};
use clap::Parser;
use nsg_eval::Planner;
use rdp_core::report::render;
use rdp_core::{CommonArgs, ConfigLoader, Session, SnapshotCloud};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "enable-rdp",
    about = "Check and restore RDP reachability of an Azure VM",
    version
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigLoader::load_with_priority(args.common.config.clone())
        .context("Failed to load configuration")?;
    args.common.apply_to(&mut config);
    config.validate().context("Invalid settings")?;

    // Initialize logging; ENABLE_RDP_LOG takes precedence over --verbose
    let default_level = if config.common.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ENABLE_RDP_LOG")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let snapshot = args.common.snapshot_path(&config)?;
    tracing::debug!("Using environment snapshot {:?}", snapshot);
    let cloud = SnapshotCloud::new(snapshot);

    let planner = Planner::new(config.traffic.descriptor(), config.planner.clone());
    let report = Session::new(&cloud, args.common.target(), planner)
        .with_auto_fix(args.common.auto_fix)
        .run()
        .await
        .with_context(|| format!("Failed to check {}", args.common.target()))?;

    println!("{}", render(&report, config.common.output)?);

    std::process::exit(report.exit_code())
}
