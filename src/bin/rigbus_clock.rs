//! rigbus-clock: publishes `Time` on `/mp/time/` every second
//!
//! A message on `/timed/in/block/` silences it for 10 seconds; replay sends
//! one every 5 seconds while enabled.

use std::sync::Arc;

use tracing::info;

use rigbus::bus::{BusPublisher, BusSubscriber};
use rigbus::clock::ClockServer;
use rigbus::config::Config;
use rigbus::process::heartbeat::{daemon_name, spawn_heartbeat};
use rigbus::topics::{ServiceTopics, CLOCK_SERVICE};
use rigbus::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref())?;
    let network = &config.network;

    let publisher = Arc::new(BusPublisher::connect(network.ingress_addr(), network.hwm));
    let subscriber = BusSubscriber::connect(network.egress_addr(), network.hwm);

    let heartbeat = daemon_name().map(|name| spawn_heartbeat(publisher.clone(), name));

    info!("rigbus-clock started");

    let server = ClockServer::new(publisher, ServiceTopics::new(CLOCK_SERVICE));
    server.run(&subscriber, shutdown_signal()).await?;

    if let Some(task) = heartbeat {
        task.abort();
    }
    Ok(())
}
