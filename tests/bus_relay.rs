//! Bus transport through a live relay.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;

use rigbus::bus::frame::read_frame;
use rigbus::bus::{BusPublisher, BusSubscriber, Message};
use common::{recv, TestRelay, NET_TIMEOUT};

#[tokio::test]
async fn test_messages_arrive_in_publish_order() {
    let relay = TestRelay::start(1000).await;
    let subscriber = BusSubscriber::connect(&relay.egress, 1000);
    subscriber.subscribe("/sensor/");
    relay.wait_for_subscribers(1).await;

    let publisher = BusPublisher::connect(&relay.ingress, 1000);
    for i in 0..100u32 {
        publisher
            .send(Message::new("/sensor/imu/", i.to_string()))
            .unwrap();
    }

    for i in 0..100u32 {
        let message = recv(&subscriber).await;
        assert_eq!(message.topic, Bytes::from_static(b"/sensor/imu/"));
        assert_eq!(message.payload, Bytes::from(i.to_string()));
    }
}

#[tokio::test]
async fn test_subscriber_filters_by_prefix() {
    let relay = TestRelay::start(1000).await;
    let subscriber = BusSubscriber::connect(&relay.egress, 1000);
    subscriber.subscribe("/keep/");
    relay.wait_for_subscribers(1).await;

    let publisher = BusPublisher::connect(&relay.ingress, 1000);
    publisher.send(Message::new("/drop/a/", "x")).unwrap();
    publisher.send(Message::new("/keeper/", "x")).unwrap();
    publisher.send(Message::new("/keep/b/", "y")).unwrap();

    let message = recv(&subscriber).await;
    assert_eq!(message.topic, Bytes::from_static(b"/keep/b/"));
    assert_eq!(message.payload, Bytes::from_static(b"y"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(subscriber.try_recv().is_none());
}

#[tokio::test]
async fn test_relay_fans_out_to_every_subscriber() {
    let relay = TestRelay::start(1000).await;
    let subscribers: Vec<BusSubscriber> = (0..3)
        .map(|_| {
            let s = BusSubscriber::connect(&relay.egress, 1000);
            s.subscribe("");
            s
        })
        .collect();
    relay.wait_for_subscribers(3).await;

    let publisher = BusPublisher::connect(&relay.ingress, 1000);
    publisher.send(Message::new("/mp/time/", "t")).unwrap();

    let received = join_all(subscribers.iter().map(recv)).await;
    for message in received {
        assert_eq!(message.topic, Bytes::from_static(b"/mp/time/"));
    }
}

#[tokio::test]
async fn test_messages_from_many_publishers_all_arrive() {
    let relay = TestRelay::start(1000).await;
    let subscriber = BusSubscriber::connect(&relay.egress, 1000);
    subscriber.subscribe("/p/");
    relay.wait_for_subscribers(1).await;

    let publishers: Vec<BusPublisher> = (0..4)
        .map(|_| BusPublisher::connect(&relay.ingress, 1000))
        .collect();
    for (n, publisher) in publishers.iter().enumerate() {
        for i in 0..10 {
            publisher
                .send(Message::new(format!("/p/{}/", n), i.to_string()))
                .unwrap();
        }
    }

    // Per-publisher order holds; interleaving across publishers is arbitrary.
    let mut next: HashMap<Bytes, u32> = HashMap::new();
    for _ in 0..40 {
        let message = recv(&subscriber).await;
        let expected = next.entry(message.topic.clone()).or_insert(0);
        assert_eq!(message.payload, Bytes::from(expected.to_string()));
        *expected += 1;
    }
    assert_eq!(next.len(), 4);
    assert!(next.values().all(|&n| n == 10));
}

#[tokio::test]
async fn test_receive_latest_keeps_newest_payload() {
    let relay = TestRelay::start(1000).await;
    let subscriber = BusSubscriber::connect(&relay.egress, 1000);
    subscriber.subscribe("/");
    relay.wait_for_subscribers(1).await;

    let publisher = BusPublisher::connect(&relay.ingress, 1000);
    for i in 0..5 {
        publisher.send(Message::new("/a/", i.to_string())).unwrap();
    }
    publisher.send(Message::new("/b/", "only")).unwrap();
    publisher.send(Message::new("/done/", "")).unwrap();

    let mut seen = HashMap::new();
    tokio::time::timeout(NET_TIMEOUT, async {
        while !seen.contains_key(&Bytes::from_static(b"/done/")) {
            seen.extend(subscriber.receive_latest(&[]).await.unwrap());
        }
    })
    .await
    .expect("Timed out waiting for batch");

    assert_eq!(seen[&Bytes::from_static(b"/a/")], Bytes::from_static(b"4"));
    assert_eq!(seen[&Bytes::from_static(b"/b/")], Bytes::from_static(b"only"));
}

#[tokio::test]
async fn test_publisher_queues_until_relay_accepts() {
    // Reserve a port, then release it so nothing is listening yet.
    let reserved = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ingress = reserved.local_addr().unwrap().to_string();
    drop(reserved);

    let publisher = BusPublisher::connect(&ingress, 1000);
    publisher.send(Message::new("/early/", "1")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(publisher.pending(), 1);

    let listener = tokio::net::TcpListener::bind(&ingress).await.unwrap();
    let (mut stream, _) = tokio::time::timeout(NET_TIMEOUT, listener.accept())
        .await
        .expect("Publisher never reconnected")
        .unwrap();

    let message = tokio::time::timeout(NET_TIMEOUT, read_frame(&mut stream))
        .await
        .expect("Timed out waiting for frame")
        .unwrap()
        .expect("Connection closed before frame");
    assert_eq!(message.topic, Bytes::from_static(b"/early/"));
    assert_eq!(message.payload, Bytes::from_static(b"1"));
}
