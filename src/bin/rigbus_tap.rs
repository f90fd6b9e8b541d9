//! rigbus-tap: logs bus traffic for debugging
//!
//! Subscribes to every topic (or the prefixes given as arguments) and logs
//! each coalesced batch: topic and payload size per message.
//!
//! ```text
//! RIGBUS_LOG=info rigbus-tap /replayd/ /loggerd/
//! ```

use bytes::Bytes;
use tracing::info;

use rigbus::bus::{self, BusSubscriber};
use rigbus::config::Config;
use rigbus::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref())?;
    let network = &config.network;
    let subscriber = BusSubscriber::connect(network.egress_addr(), network.hwm);

    let prefixes: Vec<String> = std::env::args()
        .skip(1)
        .filter(|a| a.starts_with('/'))
        .collect();
    if prefixes.is_empty() {
        subscriber.subscribe(Bytes::new());
    }
    for prefix in &prefixes {
        subscriber.subscribe(Bytes::from(prefix.clone()));
    }

    info!(?prefixes, egress = %network.egress_addr(), "rigbus-tap started");

    tokio::select! {
        result = tap(&subscriber) => result?,
        _ = shutdown_signal() => info!("rigbus-tap shutting down"),
    }
    Ok(())
}

async fn tap(subscriber: &BusSubscriber) -> bus::Result<()> {
    loop {
        let latest = subscriber.receive_latest(&[]).await?;
        for (topic, payload) in &latest {
            info!(
                topic = %String::from_utf8_lossy(topic),
                bytes = payload.len(),
                "Message"
            );
        }
    }
}
