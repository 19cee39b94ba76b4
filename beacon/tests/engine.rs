mod common;

use std::collections::HashMap;
use std::time::Duration;
use beacon::{DiscoveryConfig, DiscoveryEngine, DiscoveryError, ServiceRecord, StopOutcome};
use common::{peer, tags, BusTransport, MemoryBus};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn announce_is_discovered_once_per_interval() {
    let bus = MemoryBus::default();
    let (announcer, _) = peer(&bus, "alpha", 1);
    let (listener, _) = peer(&bus, "beta", 2);

    let events = listener.subscribe();
    listener.discover("Svc", &tags(&["roleA"])).await.unwrap();
    announcer.announce("Svc", 9001, &tags(&["roleA"])).await.unwrap();

    sleep(Duration::from_millis(4_900)).await;

    let record = events.try_recv().expect("announcement should have been observed");
    assert_eq!(
        record,
        ServiceRecord::new("Svc", "alpha.local", 9001, tags(&["roleA"]))
    );
    assert!(events.try_recv().is_none(), "only one record per interval");
}

#[tokio::test(start_paused = true)]
async fn continuous_announcement_is_idempotent() {
    let bus = MemoryBus::default();
    let (engine, transport) = peer(&bus, "alpha", 1);

    let first = engine.start_continuous_announcement("Svc", 9001, &tags(&["a", "b"])).await.unwrap();
    let second = engine.start_continuous_announcement("Svc", 9001, &tags(&["a", "b"])).await.unwrap();
    assert_eq!(first, second);

    sleep(Duration::from_millis(4_900)).await;
    assert_eq!(engine.services().await.unwrap().len(), 1);
    assert_eq!(transport.sent(), 1, "a single timer should be running");
}

#[tokio::test(start_paused = true)]
async fn tag_order_distinguishes_entries() {
    let bus = MemoryBus::default();
    let (engine, _) = peer(&bus, "alpha", 1);

    let ab = engine.start_continuous_discovery("Svc", &tags(&["a", "b"])).await.unwrap();
    let ba = engine.start_continuous_discovery("Svc", &tags(&["b", "a"])).await.unwrap();
    assert_ne!(ab, ba);
    assert_eq!(engine.services().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stopping_unknown_key_is_a_miss() {
    let bus = MemoryBus::default();
    let (engine, _) = peer(&bus, "alpha", 1);
    engine.start_continuous_discovery("Svc", &tags(&["roleA"])).await.unwrap();

    let outcome = engine.stop_discovery("Other", &tags(&["roleA"])).await.unwrap();
    assert_eq!(outcome, StopOutcome::Miss);
    let outcome = engine.stop_discovery("Svc", &tags(&["roleB"])).await.unwrap();
    assert_eq!(outcome, StopOutcome::Miss);

    let services = engine.services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert!(services[0].discovering);
}

#[tokio::test(start_paused = true)]
async fn stop_keeps_entry_and_other_timer() {
    let bus = MemoryBus::default();
    let (engine, transport) = peer(&bus, "alpha", 1);
    let key = tags(&["roleA"]);

    engine.start_continuous_announcement("Svc", 9001, &key).await.unwrap();
    engine.start_continuous_discovery("Svc", &key).await.unwrap();
    assert_eq!(engine.services().await.unwrap().len(), 1);

    assert_eq!(engine.stop_discovery("Svc", &key).await.unwrap(), StopOutcome::Stopped);
    assert_eq!(engine.stop_discovery("Svc", &key).await.unwrap(), StopOutcome::NotRunning);

    let services = engine.services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert!(services[0].announcing);
    assert!(!services[0].discovering);

    assert_eq!(engine.stop_all_announcements().await.unwrap(), 1);
    let sent = transport.sent();
    sleep(Duration::from_secs(20)).await;
    assert_eq!(transport.sent(), sent);
    assert_eq!(engine.services().await.unwrap().len(), 1, "stop never removes entries");
}

#[tokio::test(start_paused = true)]
async fn remove_stops_timers() {
    let bus = MemoryBus::default();
    let (engine, transport) = peer(&bus, "alpha", 1);

    let id = engine.announce("Svc", 9001, &tags(&["roleA"])).await.unwrap();
    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(transport.sent(), 2);

    assert!(engine.remove(id).await.unwrap());
    assert!(!engine.remove(id).await.unwrap());
    sleep(Duration::from_secs(20)).await;
    assert_eq!(transport.sent(), 2);
    assert!(engine.services().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn port_change_restarts_announcement() {
    let bus = MemoryBus::default();
    let (engine, _) = peer(&bus, "alpha", 1);
    let events = engine.subscribe();

    let first = engine.start_continuous_announcement("Svc", 9001, &tags(&["a"])).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    let second = engine.start_continuous_announcement("Svc", 9002, &tags(&["a"])).await.unwrap();
    assert_eq!(first, second);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(events.try_recv().unwrap().port, 9001);
    assert_eq!(events.try_recv().unwrap().port, 9002);
}

#[tokio::test(start_paused = true)]
async fn silent_entry_is_swept_and_stays_quiet() {
    let bus = MemoryBus::default();
    let (engine, transport) = peer(&bus, "alpha", 1);
    transport.set_failing(true);

    engine.announce("Svc", 9001, &tags(&["roleA"])).await.unwrap();
    sleep(Duration::from_secs(29)).await;
    assert!(engine.sweep().await.unwrap().is_empty());

    // Either the periodic sweep or this one removes it
    sleep(Duration::from_secs(2)).await;
    engine.sweep().await.unwrap();
    assert!(engine.services().await.unwrap().is_empty());

    let attempts = transport.attempts();
    sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.attempts(), attempts, "no sends after removal");
}

#[tokio::test(start_paused = true)]
async fn periodic_sweep_expires_stopped_entries_only() {
    let bus = MemoryBus::default();
    let (engine, _) = peer(&bus, "alpha", 1);

    engine.start_continuous_announcement("Live", 9001, &tags(&["a"])).await.unwrap();
    engine.start_continuous_announcement("Idle", 9002, &tags(&["b"])).await.unwrap();
    engine.stop_announcement("Idle", &tags(&["b"])).await.unwrap();

    sleep(Duration::from_secs(45)).await;

    let services = engine.services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].name, "Live");
    assert!(services[0].idle_secs <= 5);
}

#[tokio::test(start_paused = true)]
async fn three_peers_see_every_role() {
    let bus = MemoryBus::default();
    let roles = [("alpha", "roleA", 9001u16), ("beta", "roleB", 9002), ("gamma", "roleC", 9003)];

    let mut peers = Vec::new();
    for (i, (host, role, port)) in roles.iter().enumerate() {
        let (engine, _) = peer(&bus, host, i as u8 + 1);
        let events = engine.subscribe();
        peers.push((engine, events, *role, *port));
    }

    for (engine, _, role, port) in &peers {
        engine.start_continuous_announcement("Greeter", *port, &tags(&[*role])).await.unwrap();
        for (_, other, _) in roles.iter().filter(|(_, r, _)| r != role) {
            engine.start_continuous_discovery("Greeter", &tags(&[*other])).await.unwrap();
        }
    }

    sleep(Duration::from_secs(16)).await;

    for (_, events, _, _) in &peers {
        let mut by_role: HashMap<String, ServiceRecord> = HashMap::new();
        while let Some(record) = events.try_recv() {
            let role = record.role().unwrap().to_string();
            by_role.insert(role, record);
        }
        assert_eq!(by_role.len(), 3);
        for (host, role, port) in roles {
            let record = &by_role[role];
            assert_eq!(record.port, port);
            assert_eq!(record.host, format!("{}.local", host));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn malformed_traffic_does_not_disturb_others() {
    let bus = MemoryBus::default();
    let (engine, _) = peer(&bus, "alpha", 1);
    let events = engine.subscribe();
    let sink = engine.inbound_sink();
    let from = "10.0.0.9:5353".parse().unwrap();

    sink.handle(b"garbage", from);
    sink.handle(&[0xff, 0xfe], from);
    sink.handle(b"_services._dns-sd._udp.local PTR Svc._tcp.local", from);
    assert!(events.try_recv().is_none());

    engine.announce("Svc", 1, &[]).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(events.try_recv().unwrap().name, "Svc");
}

#[tokio::test(start_paused = true)]
async fn invalid_arguments_are_rejected() {
    let bus = MemoryBus::default();
    let (engine, _) = peer(&bus, "alpha", 1);

    let err = engine.announce("two words", 1, &[]).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidArgument(_)));
    let err = engine.discover("Svc", &tags(&["a,b"])).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidArgument(_)));
    assert!(engine.services().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn interval_longer_than_stale_window_is_refused() {
    let bus = MemoryBus::default();
    let config = DiscoveryConfig {
        hostname: Some("alpha".to_string()),
        announce_interval_secs: 45,
        ..Default::default()
    };
    let result = DiscoveryEngine::with_transport(config, BusTransport::new(&bus, 1));
    assert!(matches!(result, Err(DiscoveryError::InvalidArgument(_))));
}

#[tokio::test(start_paused = true)]
async fn running_announcement_outlives_stale_window() {
    let bus = MemoryBus::default();
    let (engine, transport) = peer(&bus, "alpha", 1);

    engine.start_continuous_announcement("Svc", 9001, &tags(&["a"])).await.unwrap();
    sleep(Duration::from_secs(125)).await;

    assert_eq!(engine.services().await.unwrap().len(), 1);
    assert!(transport.attempts() > 20);
}

#[tokio::test(start_paused = true)]
async fn dispose_stops_everything_once() {
    let bus = MemoryBus::default();
    let (engine, transport) = peer(&bus, "alpha", 1);
    let events = engine.subscribe();

    engine.start_continuous_announcement("Svc", 9001, &tags(&["a"])).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    engine.dispose();
    engine.dispose();
    assert!(engine.is_disposed());
    assert!(transport.is_closed());

    let attempts = transport.attempts();
    sleep(Duration::from_secs(20)).await;
    assert_eq!(transport.attempts(), attempts);

    assert!(events.recv().await.is_some(), "queued record is still delivered");
    assert!(events.recv().await.is_none());
    assert!(matches!(
        engine.announce("Svc", 1, &[]).await,
        Err(DiscoveryError::Disposed)
    ));
}
