//! rigbus-relay: bus rendezvous point
//!
//! Forwards every message from the ingress port to every subscriber on the
//! egress port, unmodified and without looking at topics.
//!
//! ## Architecture
//! ```text
//! [publishers] --(ingress)--> [rigbus-relay] --(egress)--> [subscribers]
//! ```
//!
//! ## Configuration
//! - `network.bind_host`, `network.ingress_port`, `network.egress_port`
//! - `network.hwm`: per-subscriber queue depth
//!
//! Any listener failure is fatal; the supervisor restarts the relay.

use tracing::{error, info};

use rigbus::bus::Relay;
use rigbus::config::Config;
use rigbus::utils::bootstrap::{init_tracing, parse_config_path, retry_with_backoff, shutdown_signal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref())?;
    let network = &config.network;
    let ingress = network.ingress_bind_addr();
    let egress = network.egress_bind_addr();

    let relay = retry_with_backoff("relay bind", || Relay::bind(&ingress, &egress, network.hwm)).await?;

    info!(ingress = %ingress, egress = %egress, "rigbus-relay started");

    tokio::select! {
        result = relay.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Relay failed");
            }
            result?;
        }
        _ = shutdown_signal() => {
            info!("rigbus-relay shutting down");
        }
    }

    Ok(())
}
