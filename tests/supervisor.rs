//! Supervising real processes, with heartbeats carried over the bus.

#![cfg(unix)]

mod common;

use std::os::unix::process::ExitStatusExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rigbus::bus::{BusPublisher, BusSubscriber};
use rigbus::config::SupervisorConfig;
use rigbus::process::{
    spawn_heartbeat, HeartbeatBoard, LaunchSpec, ManagedProcess, ProcessState, Supervisor,
};
use common::{TestRelay, NET_TIMEOUT};

fn sleeper(name: &str) -> ManagedProcess {
    ManagedProcess::new(
        name,
        LaunchSpec {
            command: vec!["sleep".to_string(), "30".to_string()],
            ..Default::default()
        },
    )
}

/// Board fed from the relay, plus a publisher to heartbeat through.
async fn bus_heartbeats(relay: &TestRelay) -> (HeartbeatBoard, Arc<BusPublisher>) {
    let board = HeartbeatBoard::new();
    let subscriber = BusSubscriber::connect(&relay.egress, 100);
    let listener = board.clone();
    tokio::spawn(async move { listener.listen(subscriber).await });
    relay.wait_for_subscribers(1).await;
    (board, Arc::new(BusPublisher::connect(&relay.ingress, 100)))
}

async fn wait_for_heartbeat(board: &HeartbeatBoard, name: &str) {
    tokio::time::timeout(NET_TIMEOUT, async {
        while board.last(name).is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("No heartbeat arrived");
}

#[tokio::test]
async fn test_stale_heartbeat_restarts_worker() {
    let relay = TestRelay::start(100).await;
    let (board, publisher) = bus_heartbeats(&relay).await;

    let worker = sleeper("worker").with_watchdog(Some(Duration::from_millis(1500)));
    let mut supervisor = Supervisor::new(vec![worker], board.clone());
    supervisor.ensure_running().await;
    let first_pid = supervisor.processes()[0].pid();

    let heartbeat = spawn_heartbeat(publisher, "worker".to_string());
    wait_for_heartbeat(&board, "worker").await;
    supervisor.ensure_running().await;
    assert_eq!(supervisor.processes()[0].restarts(), 0);

    heartbeat.abort();
    tokio::time::sleep(Duration::from_millis(1600)).await;
    supervisor.ensure_running().await;

    let worker = supervisor.process_mut("worker").unwrap();
    assert_eq!(worker.restarts(), 1);
    assert_eq!(worker.state(), ProcessState::Running);
    assert_ne!(worker.pid(), first_pid);

    supervisor.cleanup().await;
}

#[tokio::test]
async fn test_staleness_restarts_can_be_disabled() {
    let relay = TestRelay::start(100).await;
    let (board, publisher) = bus_heartbeats(&relay).await;

    let worker = sleeper("worker").with_watchdog(Some(Duration::from_millis(1500)));
    let mut supervisor =
        Supervisor::new(vec![worker], board.clone()).with_staleness_restarts(false);
    supervisor.ensure_running().await;

    let heartbeat = spawn_heartbeat(publisher, "worker".to_string());
    wait_for_heartbeat(&board, "worker").await;
    supervisor.ensure_running().await;

    heartbeat.abort();
    tokio::time::sleep(Duration::from_millis(1600)).await;
    supervisor.ensure_running().await;

    let worker = supervisor.process_mut("worker").unwrap();
    assert_eq!(worker.restarts(), 0);
    assert_eq!(worker.state(), ProcessState::Running);

    supervisor.cleanup().await;
}

#[tokio::test]
async fn test_worker_without_heartbeats_is_left_alone() {
    let worker = sleeper("quiet").with_watchdog(Some(Duration::from_millis(100)));
    let mut supervisor = Supervisor::new(vec![worker], HeartbeatBoard::new());

    supervisor.ensure_running().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    supervisor.ensure_running().await;

    let worker = supervisor.process_mut("quiet").unwrap();
    assert_eq!(worker.restarts(), 0);
    assert!(worker.is_alive());

    supervisor.cleanup().await;
}

#[tokio::test]
async fn test_blocking_stop_escalates_to_kill() {
    let mut stubborn = ManagedProcess::new(
        "stubborn",
        LaunchSpec {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "trap '' INT; sleep 30".to_string(),
            ],
            ..Default::default()
        },
    )
    .with_stop_grace(Duration::from_millis(300));

    stubborn.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let status = stubborn.stop(true).await.expect("Process was not reaped");
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(status.signal(), Some(9));
    assert_eq!(stubborn.state(), ProcessState::Stopped);
}

#[tokio::test]
async fn test_supervisor_from_config_skips_disabled_processes() {
    let config: SupervisorConfig = serde_yaml::from_str(
        r#"
interval_ms: 20
processes:
  - name: live
    command: ["sleep", "30"]
  - name: parked
    command: ["sleep", "30"]
    enabled: false
"#,
    )
    .unwrap();

    let mut supervisor = Supervisor::from_config(&config, HeartbeatBoard::new());
    supervisor.ensure_running().await;
    assert!(supervisor.process_mut("live").unwrap().is_alive());
    assert_eq!(
        supervisor.process_mut("parked").unwrap().state(),
        ProcessState::Stopped
    );

    supervisor.run(tokio::time::sleep(Duration::from_millis(100))).await;
    for process in supervisor.processes() {
        assert!(process.pid().is_none(), "{} left running", process.name());
    }
}
