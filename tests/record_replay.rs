//! Recording sessions and playing them back.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use prost::Message as _;

use rigbus::bus::{BusSubscriber, LatestMessages, Message, MockPublisher};
use rigbus::error::{BAD_REQUEST, CONFLICT, NOT_FOUND};
use rigbus::proto::{Float64Value, LoadLogRequest, LoggerStatus, LogEntry};
use rigbus::recorder::{LogRecorder, RecordServer};
use rigbus::replay::{ReplayServer, SessionCatalog};
use rigbus::topics::ServiceTopics;
use common::{entry, write_session};

const SESSION: &str = "abcdefgh12345678--2024-01-01-00-00-00";

fn replay_server(root: &std::path::Path, publisher: Arc<MockPublisher>) -> ReplayServer {
    ReplayServer::new(
        publisher,
        SessionCatalog::new(root),
        ServiceTopics::new("replayd"),
    )
    .with_excluded_prefixes([Bytes::from_static(b"/loggerd/"), Bytes::from_static(b"/replayd/")])
}

/// Five entries one second apart, split over three shards.
fn five_entry_session(root: &std::path::Path) {
    let entries: Vec<LogEntry> = (0..5)
        .map(|i| entry(100.0 + i as f64, "/sensor/a/", &i.to_string()))
        .collect();
    write_session(root, SESSION, &entries, 2);
}

fn batch(commands: &[(&str, Vec<u8>)]) -> LatestMessages {
    let topics = ServiceTopics::new("replayd");
    commands
        .iter()
        .map(|(name, payload)| (topics.command(name), Bytes::from(payload.clone())))
        .collect()
}

fn load(log_id: &str, autoplay: bool) -> Vec<u8> {
    LoadLogRequest {
        log_id: log_id.to_string(),
        looping: false,
        autoplay,
    }
    .encode_to_vec()
}

/// Drive playback for `duration` of (paused) time.
async fn play_for(server: &ReplayServer, duration: Duration) {
    tokio::select! {
        r = server.playback_loop() => panic!("playback loop exited: {:?}", r.err()),
        _ = tokio::time::sleep(duration) => {}
    }
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_publishes_entries_with_recorded_spacing() {
    let dir = tempfile::tempdir().unwrap();
    five_entry_session(dir.path());
    let publisher = Arc::new(MockPublisher::new());
    let server = replay_server(dir.path(), publisher.clone());

    let errors = server
        .handle_batch(&batch(&[("enable", vec![]), ("load", load(SESSION, true))]))
        .await;
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(server.status().await.playing);

    play_for(&server, Duration::from_secs(10)).await;

    let published = publisher.published_under(b"/sensor/").await;
    let payloads: Vec<Bytes> = published.iter().map(|p| p.message.payload.clone()).collect();
    assert_eq!(payloads, vec!["0", "1", "2", "3", "4"]);

    for pair in published.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(
            gap >= Duration::from_millis(995) && gap <= Duration::from_millis(1005),
            "gap {:?}",
            gap
        );
    }

    let status = server.status().await;
    assert!(!status.playing);
    assert!(status.enabled);
    assert_eq!(status.log_id, SESSION);
    assert_eq!(status.start_time, 100.0);
    assert_eq!(status.end_time, 104.0);
}

#[tokio::test(start_paused = true)]
async fn test_scrub_then_start_resumes_from_target() {
    let dir = tempfile::tempdir().unwrap();
    five_entry_session(dir.path());
    let publisher = Arc::new(MockPublisher::new());
    let server = replay_server(dir.path(), publisher.clone());

    let scrub = Float64Value { value: 102.0 }.encode_to_vec();
    let errors = server
        .handle_batch(&batch(&[
            ("enable", vec![]),
            ("load", load(SESSION, false)),
            ("scrub", scrub),
        ]))
        .await;
    assert!(errors.is_empty(), "{:?}", errors);
    assert!(!server.status().await.playing);
    assert_eq!(server.status().await.time, 102.0);

    server.handle_batch(&batch(&[("start", vec![])])).await;
    play_for(&server, Duration::from_secs(10)).await;

    let payloads: Vec<Bytes> = publisher
        .published_under(b"/sensor/")
        .await
        .into_iter()
        .map(|p| p.message.payload)
        .collect();
    assert_eq!(payloads, vec!["2", "3", "4"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_playback_holds_position() {
    let dir = tempfile::tempdir().unwrap();
    five_entry_session(dir.path());
    let publisher = Arc::new(MockPublisher::new());
    let server = replay_server(dir.path(), publisher.clone());

    server
        .handle_batch(&batch(&[("enable", vec![]), ("load", load(SESSION, true))]))
        .await;

    // 0 at t=0, 1 at t=1; stop before 2 is due.
    tokio::select! {
        _ = server.playback_loop() => unreachable!(),
        _ = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            server.handle_batch(&batch(&[("stop", vec![])])).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        } => {}
    }
    assert_eq!(publisher.published_under(b"/sensor/").await.len(), 2);

    server.handle_batch(&batch(&[("start", vec![])])).await;
    play_for(&server, Duration::from_secs(10)).await;

    let payloads: Vec<Bytes> = publisher
        .published_under(b"/sensor/")
        .await
        .into_iter()
        .map(|p| p.message.payload)
        .collect();
    assert_eq!(payloads, vec!["0", "1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_command_errors_carry_status_codes() {
    let dir = tempfile::tempdir().unwrap();
    five_entry_session(dir.path());
    let server = replay_server(dir.path(), Arc::new(MockPublisher::new()));

    let errors = server
        .handle_batch(&batch(&[("enable", vec![]), ("start", vec![])]))
        .await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, BAD_REQUEST);
    assert_eq!(errors[0].message, "no log loaded");

    let errors = server
        .handle_batch(&batch(&[("load", load("missing--2024-01-01-00-00-00", false))]))
        .await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, NOT_FOUND);

    let errors = server
        .handle_batch(&batch(&[("scrub", b"\xff\xff".to_vec())]))
        .await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn test_infinite_scrub_is_rejected_and_playback_continues() {
    let dir = tempfile::tempdir().unwrap();
    five_entry_session(dir.path());
    let publisher = Arc::new(MockPublisher::new());
    let server = replay_server(dir.path(), publisher.clone());

    let scrub = Float64Value {
        value: f64::NEG_INFINITY,
    }
    .encode_to_vec();
    let errors = server
        .handle_batch(&batch(&[
            ("enable", vec![]),
            ("load", load(SESSION, true)),
            ("scrub", scrub),
        ]))
        .await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, BAD_REQUEST);
    assert!(server.status().await.playing);

    play_for(&server, Duration::from_secs(10)).await;
    assert_eq!(publisher.published_under(b"/sensor/").await.len(), 5);
}

#[tokio::test]
async fn test_session_being_recorded_cannot_be_loaded() {
    let dir = tempfile::tempdir().unwrap();
    five_entry_session(dir.path());
    let server = replay_server(dir.path(), Arc::new(MockPublisher::new()));

    let mut latest = batch(&[("enable", vec![]), ("load", load(SESSION, false))]);
    let status = LoggerStatus {
        recording: true,
        session_id: "abcdefgh12345678".to_string(),
    };
    latest.insert(
        ServiceTopics::new("loggerd").status(),
        status.encode_to_vec().into(),
    );

    let errors = server.handle_batch(&latest).await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, CONFLICT);
    assert!(server.status().await.log_id.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_recorded_session_replays_without_command_topics() {
    let dir = tempfile::tempdir().unwrap();
    let recorder_publisher = Arc::new(MockPublisher::new());
    let recorder = RecordServer::new(
        recorder_publisher,
        LogRecorder::new(dir.path(), 2, u64::MAX),
        ServiceTopics::new("loggerd"),
    );

    recorder.handle(Message::new("/sensor/before/", "dropped")).await;
    recorder.handle(Message::new("/loggerd/in/start/", "")).await;
    for i in 0..3 {
        recorder
            .handle(Message::new("/sensor/imu/", i.to_string()))
            .await;
    }
    recorder.handle(Message::new("/loggerd/in/stop/", "")).await;
    recorder.handle(Message::new("/sensor/after/", "dropped")).await;

    let sessions: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(sessions.len(), 1);

    let publisher = Arc::new(MockPublisher::new());
    let server = replay_server(dir.path(), publisher.clone());
    let errors = server
        .handle_batch(&batch(&[("enable", vec![]), ("load", load(&sessions[0], true))]))
        .await;
    assert!(errors.is_empty(), "{:?}", errors);

    play_for(&server, Duration::from_secs(5)).await;

    let topics: Vec<Bytes> = publisher
        .published()
        .await
        .into_iter()
        .map(|p| p.message.topic)
        .collect();
    assert_eq!(topics, vec!["/sensor/imu/"; 3]);
}

#[tokio::test(start_paused = true)]
async fn test_enabled_server_blocks_live_services_and_broadcasts() {
    let dir = tempfile::tempdir().unwrap();
    five_entry_session(dir.path());
    let publisher = Arc::new(MockPublisher::new());
    let server = replay_server(dir.path(), publisher.clone()).with_block_list(["deepdrrd", "timed"]);

    server.handle_batch(&batch(&[("enable", vec![])])).await;

    let subscriber = BusSubscriber::detached(100);
    server
        .run(&subscriber, tokio::time::sleep(Duration::from_millis(11_000)))
        .await
        .unwrap();

    // Blocks go out at 0, 5 and 10 s.
    assert_eq!(publisher.published_under(b"/deepdrrd/in/block/").await.len(), 3);
    assert_eq!(publisher.published_under(b"/timed/in/block/").await.len(), 3);
    assert_eq!(publisher.published_under(b"/replayd/list/").await.len(), 2);
    assert!(publisher.published_under(b"/replayd/status/").await.len() >= 50);

    let list = publisher.published_under(b"/replayd/list/").await;
    let decoded = rigbus::proto::LogList::decode(list[0].message.payload.clone()).unwrap();
    assert_eq!(decoded.logs.len(), 1);
    assert_eq!(decoded.logs[0].id, SESSION);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_server_publishes_status_slowly_and_never_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MockPublisher::new());
    let server = replay_server(dir.path(), publisher.clone()).with_block_list(["timed"]);

    let subscriber = BusSubscriber::detached(100);
    server
        .run(&subscriber, tokio::time::sleep(Duration::from_secs(10)))
        .await
        .unwrap();

    assert!(publisher.published_under(b"/timed/in/block/").await.is_empty());
    assert!(publisher.published_under(b"/replayd/list/").await.is_empty());
    // One status per 2.2 s while disabled.
    assert_eq!(publisher.published_under(b"/replayd/status/").await.len(), 4);
}
