//! rigbus-replay: plays recorded sessions back onto the bus
//!
//! ## Commands (`/replayd/in/<command>/`)
//! - `enable` / `disable`
//! - `load` (`LoadLogRequest`), `loop` (`BoolValue`)
//! - `start` / `stop`, `scrub` (`Float64Value`, recorded time)
//!
//! Status on `/replayd/status/`, session list on `/replayd/list/`, errors on
//! `/server_exception/`.
//!
//! ## Configuration
//! - `storage.log_root` (or `REPLAY_LOG_DIR`): where sessions are read from
//! - `replay.block_list`: services silenced while replay is enabled
//! - `replay.excluded_prefixes`: recorded topics never re-published

use std::sync::Arc;

use tracing::info;

use rigbus::bus::{BusPublisher, BusSubscriber};
use rigbus::config::Config;
use rigbus::process::heartbeat::{daemon_name, spawn_heartbeat};
use rigbus::replay::ReplayServer;
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
        service = %config.replay.service,
        "rigbus-replay started"
    );

    let server =
        ReplayServer::from_config(publisher, &config.storage, &config.recorder, &config.replay);
    server.run(&subscriber, shutdown_signal()).await?;

    if let Some(task) = heartbeat {
        task.abort();
    }
    Ok(())
}
