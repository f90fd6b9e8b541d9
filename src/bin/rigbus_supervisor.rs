//! rigbus-supervisor: keeps the rig's workers running
//!
//! Starts every enabled process from `supervisor.processes`, restarts
//! processes that exit or stop sending heartbeats, and stops everything on
//! SIGTERM/SIGINT.
//!
//! ## Architecture
//! ```text
//! [rigbus-supervisor] --spawn--> [recorder] [replay] [clock] ...
//!        ^                            |
//!        +---- /heartbeat/<name>/ ----+  (through the relay)
//! ```
//!
//! ## Configuration
//! - `supervisor.embed_relay`: run the relay inside this process (default true)
//! - `supervisor.processes`: worker list (`name`, `command`, `enabled`,
//!   `sigkill`, `watchdog_timeout_ms`, `working_dir`, `env`)
//! - `NO_WATCHDOG`: when set, heartbeat staleness never triggers a restart
//!
//! Worker exit codes are logged; the supervisor itself exits 0 on shutdown.

use tracing::{error, info, warn};

use rigbus::bus::{BusSubscriber, Relay};
use rigbus::config::{watchdog_disabled, Config};
use rigbus::process::{HeartbeatBoard, Supervisor};
use rigbus::utils::bootstrap::{init_tracing, parse_config_path, retry_with_backoff, shutdown_signal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref())?;
    let network = &config.network;

    let relay_task = if config.supervisor.embed_relay {
        let ingress = network.ingress_bind_addr();
        let egress = network.egress_bind_addr();
        let relay =
            retry_with_backoff("relay bind", || Relay::bind(&ingress, &egress, network.hwm)).await?;
        Some(tokio::spawn(async move {
            if let Err(e) = relay.run().await {
                error!(error = %e, "Embedded relay failed");
            }
        }))
    } else {
        None
    };

    let board = HeartbeatBoard::new();
    let heartbeats = BusSubscriber::connect(network.egress_addr(), network.hwm);
    let listener = board.clone();
    let heartbeat_task = tokio::spawn(async move { listener.listen(heartbeats).await });

    let staleness = !watchdog_disabled();
    if !staleness {
        warn!("NO_WATCHDOG set, heartbeat staleness restarts disabled");
    }

    let mut supervisor =
        Supervisor::from_config(&config.supervisor, board).with_staleness_restarts(staleness);

    info!(
        processes = supervisor.processes().len(),
        embed_relay = config.supervisor.embed_relay,
        "rigbus-supervisor started"
    );

    supervisor.run(shutdown_signal()).await;

    heartbeat_task.abort();
    if let Some(task) = relay_task {
        task.abort();
    }

    info!("rigbus-supervisor exit");
    Ok(())
}
