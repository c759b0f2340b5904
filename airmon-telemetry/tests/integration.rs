//! Integration tests for the airmon-telemetry core, driven through the
//! in-memory broker link with paused time.

use std::time::Duration;

use airmon_common::{AirmonConfig, DerivedMetrics, Reading, SensorSnapshot};
use airmon_telemetry::testing::{Handshake, MemoryLink, StaticNetwork};
use airmon_telemetry::{
    CHANNELS, PublishOutcome, Qos, SessionPhase, Telemetry, TelemetrySettings,
};
use tokio::time::advance;

const ADDRESS: [u8; 6] = [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f];
const STATE_TOPIC: &str = "tele/ikea_air_monitor/0a1b2c3d4e5f/state";
const SENSOR_TOPIC: &str = "tele/ikea_air_monitor/0a1b2c3d4e5f/SENSOR";
const STATUS_TOPIC: &str = "tele/ikea_air_monitor/0a1b2c3d4e5f/status";
const DISCOVERY_PREFIX: &str = "homeassistant/sensor/ikea_air_monitor_0a1b2c3d4e5f/";

fn config() -> AirmonConfig {
    let mut config = AirmonConfig::default();
    config.mqtt.host = "broker.local".to_string();
    config
}

fn telemetry_with(config: &AirmonConfig, link: MemoryLink) -> Telemetry<MemoryLink, StaticNetwork> {
    Telemetry::new(
        TelemetrySettings::from_config(config),
        link,
        StaticNetwork::new(ADDRESS),
    )
}

fn telemetry() -> Telemetry<MemoryLink, StaticNetwork> {
    telemetry_with(&config(), MemoryLink::new())
}

fn reading() -> Reading {
    Reading::new(
        SensorSnapshot {
            pm25: 12,
            temperature: 21.5,
            humidity: 45.2,
            pressure: 1013.25,
            uptime: 3600,
        },
        DerivedMetrics {
            aqi: 50,
            aqi_category: 1,
            dew_point: 9.8,
            comfort_index: 95.0,
        },
    )
}

/// Retain flags of the delivered messages on a topic, in order.
fn retain_flags(telemetry: &Telemetry<MemoryLink, StaticNetwork>, topic: &str) -> Vec<bool> {
    telemetry
        .link()
        .delivered_to(topic)
        .iter()
        .map(|m| m.retain)
        .collect()
}

fn online_count(telemetry: &Telemetry<MemoryLink, StaticNetwork>) -> usize {
    telemetry
        .link()
        .delivered_to(STATUS_TOPIC)
        .iter()
        .filter(|m| m.payload_str() == "online")
        .count()
}

/// Drop the link and tick until a reconnect interval has passed.
async fn reconnect(telemetry: &mut Telemetry<MemoryLink, StaticNetwork>) {
    telemetry.link_mut().drop_connection();
    assert_eq!(telemetry.tick().await, SessionPhase::Disconnected);
    advance(Duration::from_secs(10)).await;
    assert_eq!(telemetry.tick().await, SessionPhase::Connected);
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_host_never_connects() {
    let mut telemetry = telemetry_with(&AirmonConfig::default(), MemoryLink::new());

    for _ in 0..300 {
        assert_eq!(telemetry.tick().await, SessionPhase::Disconnected);
        advance(Duration::from_millis(100)).await;
    }

    assert!(telemetry.link().requests().is_empty());
    assert!(!telemetry.state().connected);
    assert!(telemetry.identity().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_connect_request() {
    let mut telemetry = telemetry();
    assert_eq!(telemetry.tick().await, SessionPhase::Connected);

    let requests = telemetry.link().requests();
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    assert_eq!(request.client_id, "ikea_air_monitor_0a1b2c3d4e5f");
    assert_eq!(request.host, "broker.local");
    assert_eq!(request.port, 1883);
    assert_eq!(request.keep_alive, Duration::from_secs(60));
    assert_eq!(request.max_packet_size, 1024);
    assert_eq!(request.last_will.topic, STATUS_TOPIC);
    assert_eq!(request.last_will.payload, b"offline");
    assert_eq!(request.last_will.qos, Qos::AtLeastOnce);
    assert!(request.last_will.retain);
}

#[tokio::test(start_paused = true)]
async fn test_no_username_sends_no_credentials() {
    let mut telemetry = telemetry();
    assert_eq!(telemetry.tick().await, SessionPhase::Connected);
    assert!(telemetry.link().requests()[0].credentials.is_none());
    assert!(telemetry.state().connected);
}

#[tokio::test(start_paused = true)]
async fn test_username_sends_credentials() {
    let mut config = config();
    config.mqtt.username = "airmon".to_string();
    config.mqtt.password = "secret".to_string();
    let mut telemetry = telemetry_with(&config, MemoryLink::new());

    telemetry.tick().await;

    let credentials = telemetry.link().requests()[0]
        .credentials
        .clone()
        .expect("credentials expected");
    assert_eq!(credentials.username, "airmon");
    assert_eq!(credentials.password, "secret");
}

#[tokio::test(start_paused = true)]
async fn test_online_precedes_discovery() {
    let mut telemetry = telemetry();
    telemetry.tick().await;

    let published = telemetry.link().published();
    assert_eq!(published[0].topic, STATUS_TOPIC);
    assert_eq!(published[0].payload_str(), "online");
    assert!(published[0].retain);

    let discovery: Vec<_> = published[1..=CHANNELS.len()].iter().collect();
    for (message, channel) in discovery.iter().zip(CHANNELS.iter()) {
        assert_eq!(
            message.topic,
            format!("{}{}/config", DISCOVERY_PREFIX, channel.id)
        );
        assert!(message.retain);
        assert_eq!(message.json()["unique_id"], format!("ikea_air_monitor_0a1b2c3d4e5f_{}", channel.id));
    }
}

#[tokio::test(start_paused = true)]
async fn test_discovery_once_per_epoch() {
    let mut telemetry = telemetry();
    telemetry.tick().await;
    assert_eq!(telemetry.link().delivered_under(DISCOVERY_PREFIX).len(), 9);
    assert!(telemetry.state().discovery_done);

    // Explicit re-announce within the same epoch is a no-op
    let stats = telemetry.publish_discovery().await;
    assert_eq!(stats.total(), 0);

    for _ in 0..50 {
        advance(Duration::from_millis(100)).await;
        telemetry.tick().await;
    }
    assert_eq!(telemetry.link().delivered_under(DISCOVERY_PREFIX).len(), 9);

    // A new epoch announces again
    reconnect(&mut telemetry).await;
    assert_eq!(telemetry.link().delivered_under(DISCOVERY_PREFIX).len(), 18);
}

#[tokio::test(start_paused = true)]
async fn test_link_dropped_mid_session() {
    let mut telemetry = telemetry();
    telemetry.tick().await;
    assert!(telemetry.state().discovery_done);
    telemetry.link_mut().clear_published();

    telemetry.link_mut().drop_connection();
    assert_eq!(telemetry.tick().await, SessionPhase::Disconnected);
    assert!(!telemetry.state().connected);
    assert!(!telemetry.state().discovery_done);

    // One best-effort offline publish, failing on the dead link
    let published = telemetry.link().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, STATUS_TOPIC);
    assert_eq!(published[0].payload_str(), "offline");
    assert!(published[0].retain);
    assert!(!published[0].delivered);

    // Frequent ticks do not reconnect before the interval elapsed
    for _ in 0..99 {
        advance(Duration::from_millis(100)).await;
        assert_eq!(telemetry.tick().await, SessionPhase::Disconnected);
    }
    assert_eq!(telemetry.link().requests().len(), 1);

    advance(Duration::from_millis(100)).await;
    assert_eq!(telemetry.tick().await, SessionPhase::Connected);
    assert_eq!(telemetry.link().requests().len(), 2);
    assert_eq!(
        telemetry.link().requests()[1].client_id,
        telemetry.link().requests()[0].client_id
    );
}

#[tokio::test(start_paused = true)]
async fn test_network_not_ready() {
    let mut telemetry = Telemetry::new(
        TelemetrySettings::from_config(&config()),
        MemoryLink::new(),
        StaticNetwork::down(),
    );

    assert_eq!(telemetry.tick().await, SessionPhase::Disconnected);
    assert!(telemetry.link().requests().is_empty());

    telemetry.network_mut().set_ready(true);
    telemetry.network_mut().set_address(Some(ADDRESS));

    // The skipped attempt still consumed its slot
    advance(Duration::from_secs(5)).await;
    assert_eq!(telemetry.tick().await, SessionPhase::Disconnected);

    advance(Duration::from_secs(5)).await;
    assert_eq!(telemetry.tick().await, SessionPhase::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_unset_hardware_address_defers_identity() {
    let mut network = StaticNetwork::new(ADDRESS);
    network.set_address(Some([0; 6]));
    let mut telemetry = Telemetry::new(
        TelemetrySettings::from_config(&config()),
        MemoryLink::new(),
        network,
    );

    assert_eq!(telemetry.tick().await, SessionPhase::Disconnected);
    assert!(telemetry.identity().is_none());
    assert!(telemetry.link().requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_handshake_rejected() {
    let link = MemoryLink::with_handshake(Handshake::Reject("not authorized".to_string()));
    let mut telemetry = telemetry_with(&config(), link);

    assert_eq!(telemetry.tick().await, SessionPhase::Disconnected);
    assert_eq!(telemetry.link().requests().len(), 1);

    advance(Duration::from_secs(9)).await;
    telemetry.tick().await;
    assert_eq!(telemetry.link().requests().len(), 1);

    telemetry.link_mut().set_handshake(Handshake::Accept);
    advance(Duration::from_secs(1)).await;
    assert_eq!(telemetry.tick().await, SessionPhase::Connected);
    assert_eq!(telemetry.link().requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_spans_ticks() {
    let link = MemoryLink::with_handshake(Handshake::AcceptAfter(3));
    let mut telemetry = telemetry_with(&config(), link);

    for _ in 0..3 {
        assert!(matches!(
            telemetry.tick().await,
            SessionPhase::Connecting { .. }
        ));
        // Readings taken mid-handshake are buffered
        assert_eq!(telemetry.publish(reading()).await, PublishOutcome::Buffered);
    }

    assert_eq!(telemetry.tick().await, SessionPhase::Connected);
    assert_eq!(telemetry.link().requests().len(), 1);
    assert!(!telemetry.pending().pending);
    assert_eq!(retain_flags(&telemetry, STATE_TOPIC), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_window_expires() {
    let link = MemoryLink::with_handshake(Handshake::Hang);
    let mut telemetry = telemetry_with(&config(), link);
    let started = tokio::time::Instant::now();

    let mut ticks = 0;
    let phase = loop {
        ticks += 1;
        let phase = telemetry.tick().await;
        if !matches!(phase, SessionPhase::Connecting { .. }) || ticks > 40 {
            break phase;
        }
    };

    // 5 s window in 250 ms steps
    assert_eq!(phase, SessionPhase::Disconnected);
    assert_eq!(ticks, 20);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(!telemetry.state().connected);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures_retry_within_window() {
    let link = MemoryLink::with_handshake(Handshake::Unreachable("connection refused".to_string()));
    let mut telemetry = telemetry_with(&config(), link);

    let mut ticks = 0;
    while ticks < 40 {
        ticks += 1;
        if telemetry.tick().await == SessionPhase::Disconnected {
            break;
        }
    }

    let attempts = telemetry.link().requests().len();
    assert!(attempts > 1, "expected retries, got {}", attempts);
    assert_eq!(telemetry.phase(), SessionPhase::Disconnected);

    // Window exhausted: no further attempts until the reconnect interval
    advance(Duration::from_secs(1)).await;
    telemetry.tick().await;
    assert_eq!(telemetry.link().requests().len(), attempts);
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_after_interval() {
    let mut telemetry = telemetry();
    telemetry.tick().await;
    assert_eq!(online_count(&telemetry), 1);

    for _ in 0..59 {
        advance(Duration::from_secs(1)).await;
        telemetry.tick().await;
    }
    assert_eq!(online_count(&telemetry), 1);

    advance(Duration::from_secs(1)).await;
    telemetry.tick().await;
    assert_eq!(online_count(&telemetry), 2);

    // Timer restarted from the last beat
    advance(Duration::from_secs(30)).await;
    telemetry.tick().await;
    assert_eq!(online_count(&telemetry), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connected_ticks_service_link() {
    let mut telemetry = telemetry();
    telemetry.tick().await;
    let before = telemetry.link().service_calls();

    telemetry.tick().await;
    telemetry.tick().await;

    assert_eq!(telemetry.link().service_calls(), before + 2);
}

// ============================================================================
// Publication
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_state_document_round_trip() {
    let mut telemetry = telemetry();
    telemetry.tick().await;

    let outcome = telemetry.publish(reading()).await;
    assert!(matches!(outcome, PublishOutcome::Sent(stats) if stats.failed == 0));

    let state = telemetry.link().delivered_to(STATE_TOPIC);
    assert_eq!(state.len(), 1);
    assert_eq!(
        state[0].payload_str(),
        r#"{"pm25":12,"temperature":21.5,"humidity":45.2,"pressure":1013.25,"aqi":50,"aqi_category":1,"dew_point":9.8,"comfort_index":95.0,"uptime":3600}"#
    );

    let sensor = telemetry.link().delivered_to(SENSOR_TOPIC);
    assert_eq!(sensor.len(), 1);
    assert!(!sensor[0].retain);
    assert_eq!(sensor[0].json()["PM2.5"]["PM2.5"], 12);
    assert_eq!(sensor[0].json()["Time"], "3600");
}

#[tokio::test(start_paused = true)]
async fn test_publication_refreshes_availability() {
    let mut telemetry = telemetry();
    telemetry.tick().await;
    telemetry.link_mut().clear_published();

    telemetry.publish(reading()).await;

    let topics: Vec<_> = telemetry
        .link()
        .published()
        .iter()
        .map(|m| m.topic.as_str())
        .collect();
    assert_eq!(topics, vec![STATE_TOPIC, STATUS_TOPIC, SENSOR_TOPIC]);
}

#[tokio::test(start_paused = true)]
async fn test_only_first_native_publish_retained() {
    let mut telemetry = telemetry();
    telemetry.tick().await;

    telemetry.publish(reading()).await;
    telemetry.publish(reading()).await;
    reconnect(&mut telemetry).await;
    telemetry.publish(reading()).await;

    assert_eq!(retain_flags(&telemetry, STATE_TOPIC), vec![true, false, false]);
    assert_eq!(retain_flags(&telemetry, SENSOR_TOPIC), vec![false, false, false]);
    assert!(telemetry.pending().ever_sent);
}

#[tokio::test(start_paused = true)]
async fn test_pending_reading_flushed_once() {
    let mut telemetry = telemetry();

    // Before the first connection
    assert_eq!(telemetry.publish(reading()).await, PublishOutcome::Buffered);
    assert!(telemetry.pending().pending);

    telemetry.tick().await;
    assert!(!telemetry.pending().pending);
    assert_eq!(retain_flags(&telemetry, STATE_TOPIC), vec![true]);

    // Connected publish leaves nothing pending
    telemetry.publish(reading()).await;
    assert!(!telemetry.pending().pending);

    // Lost link: buffered again
    telemetry.link_mut().drop_connection();
    telemetry.tick().await;
    let mut latest = reading();
    latest.snapshot.pm25 = 40;
    assert_eq!(telemetry.publish(latest).await, PublishOutcome::Buffered);
    assert!(telemetry.pending().pending);
    assert_eq!(telemetry.pending().data, Some(latest));

    advance(Duration::from_secs(10)).await;
    telemetry.tick().await;
    assert!(!telemetry.pending().pending);

    let state = telemetry.link().delivered_to(STATE_TOPIC);
    assert_eq!(state.len(), 3);
    assert_eq!(state[2].json()["pm25"], 40);
    assert!(!state[2].retain);

    // Nothing left to flush on the following epoch
    reconnect(&mut telemetry).await;
    assert_eq!(telemetry.link().delivered_to(STATE_TOPIC).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_is_tolerated() {
    let mut telemetry = telemetry();
    telemetry.tick().await;

    telemetry.link_mut().fail_publishes(true);
    let outcome = telemetry.publish(reading()).await;
    assert!(matches!(outcome, PublishOutcome::Sent(stats) if stats.failed == 2));
    assert!(!telemetry.pending().pending);
    assert!(!telemetry.pending().ever_sent);

    telemetry.link_mut().fail_publishes(false);
    telemetry.publish(reading()).await;
    assert_eq!(retain_flags(&telemetry, STATE_TOPIC), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn test_configured_base_topic() {
    let mut config = config();
    config.mqtt.topic = "livingroom".to_string();
    let mut telemetry = telemetry_with(&config, MemoryLink::new());

    telemetry.tick().await;
    telemetry.publish(reading()).await;

    assert_eq!(telemetry.link().delivered_to("tele/livingroom/state").len(), 1);
    assert_eq!(telemetry.link().delivered_to("tele/livingroom/SENSOR").len(), 1);
    assert_eq!(
        telemetry.link().requests()[0].last_will.topic,
        "tele/livingroom/status"
    );
    // Discovery still keyed by hardware address
    assert_eq!(telemetry.link().delivered_under(DISCOVERY_PREFIX).len(), 9);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_publishes_offline() {
    let mut telemetry = telemetry();
    telemetry.tick().await;

    telemetry.shutdown().await;

    let last = telemetry.link().published().last().cloned().expect("offline expected");
    assert_eq!(last.topic, STATUS_TOPIC);
    assert_eq!(last.payload_str(), "offline");
    assert!(last.retain && last.delivered);
    assert_eq!(telemetry.link().clean_disconnects(), 1);
    assert_eq!(telemetry.phase(), SessionPhase::Disconnected);
}
