//! rigbus-recorder: records every bus message into session shards
//!
//! ## Commands
//! - `/loggerd/in/start/`: seal any open session and start a new one
//! - `/loggerd/in/stop/`: seal the open session
//!
//! Status goes out on `/loggerd/status/` every second.
//!
//! ## Configuration
//! - `storage.log_root` (or `REPLAY_LOG_DIR`): where sessions are written
//! - `storage.shard_max_count`, `storage.shard_max_size`: rotation limits
//! - `recorder.service`: service name used in topics

use std::sync::Arc;

use tracing::info;

use rigbus::bus::{BusPublisher, BusSubscriber};
use rigbus::config::Config;
use rigbus::process::heartbeat::{daemon_name, spawn_heartbeat};
use rigbus::recorder::RecordServer;
use rigbus::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref())?;
    let network = &config.network;

    let publisher = Arc::new(BusPublisher::connect(network.ingress_addr(), network.hwm));
    let subscriber = BusSubscriber::connect(network.egress_addr(), network.hwm);

    let heartbeat = daemon_name().map(|name| spawn_heartbeat(publisher.clone(), name));

    info!(
        log_root = %config.storage.log_root.display(),
        service = %config.recorder.service,
        "rigbus-recorder started"
    );

    let server = RecordServer::from_config(publisher, &config.storage, &config.recorder);
    server.run(&subscriber, shutdown_signal()).await?;

    if let Some(task) = heartbeat {
        task.abort();
    }
    Ok(())
}
