use anyhow::{Context, Result};
use bridge_core::{load_config, Bridge};
use clap::Parser;
use cloud_transport::{MockCloud, MockDevice};
use state_store::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "bridge-daemon")]
#[command(about = "Mirror cloud-connected devices into a local state store")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "bridge.yaml")]
    config: PathBuf,

    /// Override the electricity polling interval (seconds)
    #[arg(long)]
    polling_interval: Option<u64>,

    /// Print the metrics registry on exit
    #[arg(long)]
    dump_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(secs) = args.polling_interval {
        config.electricity_polling_interval_secs = secs;
    }
    let config = config.validate().context("invalid configuration")?;
    info!(
        polling_interval_secs = config.electricity_polling_interval_secs,
        "cloud bridge starting"
    );

    let store = Arc::new(MemoryStore::new());
    let cloud = Arc::new(demo_cloud());
    let mut bridge = Bridge::new(config, cloud, store)?;

    let devices = bridge.start().await?;
    info!(devices, "devices registered");

    // Device task failures are watched from the start, initialization or not.
    let outcome = wait_for_exit(&mut bridge).await;

    bridge.shutdown().await;
    if args.dump_metrics {
        println!("{}", bridge.metrics().encode_text());
    } else {
        debug!(metrics = %bridge.metrics().encode_text(), "final metrics");
    }
    outcome
}

async fn wait_for_exit(bridge: &mut Bridge) -> Result<()> {
    tokio::select! {
        err = bridge.wait_fatal() => {
            error!(error = %err, "stopping after device task failure");
            Err(err.into())
        }
        result = tokio::signal::ctrl_c() => {
            info!("interrupt received");
            result.context("listening for ctrl-c")
        }
    }
}

fn demo_cloud() -> MockCloud {
    let cloud = MockCloud::new();
    cloud.add_device(MockDevice::plug("plug-0001"));
    cloud.add_device(MockDevice::power_strip("strip-0001"));
    cloud.add_device(MockDevice::garage_opener("garage-0001"));
    cloud.add_device(MockDevice::bulb("bulb-0001"));
    cloud
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
