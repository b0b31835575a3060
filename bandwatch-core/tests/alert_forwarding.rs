//! Alertes levées par le moniteur et publiées via le client MQTT factice

use bandwatch_core::{MonitorSettings, Thresholds};
use bandwatch_devkit::TestHarness;
use serde_json::Value;
use std::time::Duration;

const TOPIC: &str = "bandwatch/alerts";

fn strict_settings() -> MonitorSettings {
    MonitorSettings {
        thresholds: Thresholds { bytes_out: 1_000_000, bytes_in: 1_000_000, packets_out: 1000 },
        ..MonitorSettings::default()
    }
}

#[tokio::test]
async fn outbound_breach_is_published() {
    let harness = TestHarness::with_settings(strict_settings()).unwrap();
    harness.add_targets(&["10.0.0.9"]).unwrap();
    harness.sampler.push([(2_000_000, 10, 10, 10)]);
    let forwarder = harness.spawn_alert_forwarder(TOPIC);

    harness.monitor.tick();

    let msg = harness.wait_for_message(TOPIC, 2_000).await.unwrap();
    assert!(msg.is_some());
    harness.assert_field_equals(TOPIC, "kind", &Value::from("HIGH_BANDWIDTH_OUT")).unwrap();
    harness.assert_field_equals(TOPIC, "severity", &Value::from("MEDIUM")).unwrap();
    harness.assert_field_equals(TOPIC, "target", &Value::from("10.0.0.9")).unwrap();
    let published = harness.mqtt_client.find_messages_by_topic(TOPIC);
    assert_eq!(published.len(), 1);
    assert!(!published[0].retain);
    assert_eq!(harness.monitor.recent_alerts(24).len(), 1);

    forwarder.abort();
}

#[tokio::test]
async fn readings_under_thresholds_publish_nothing() {
    let harness = TestHarness::with_settings(strict_settings()).unwrap();
    harness.add_targets(&["10.0.0.9"]).unwrap();
    let forwarder = harness.spawn_alert_forwarder(TOPIC);

    for _ in 0..5 {
        harness.monitor.tick();
    }

    assert!(harness.wait_for_message(TOPIC, 200).await.unwrap().is_none());
    assert!(harness.monitor.recent_alerts(24).is_empty());
    forwarder.abort();
}

#[tokio::test]
async fn forwarder_survives_broker_outage() {
    let harness = TestHarness::with_settings(strict_settings()).unwrap();
    harness.add_targets(&["10.0.0.9"]).unwrap();
    harness.sampler.push([(10, 10, 5_000, 10)]);
    let forwarder = harness.spawn_alert_forwarder(TOPIC);

    harness.mqtt_client.set_offline(true);
    harness.monitor.tick();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(harness.mqtt_client.get_published_messages().is_empty());

    // the peak is still in the window: the next pass raises again
    harness.mqtt_client.set_offline(false);
    harness.monitor.tick();
    harness.wait_for_message(TOPIC, 2_000).await.unwrap();
    harness.assert_field_equals(TOPIC, "kind", &Value::from("SUSPICIOUS_PACKETS")).unwrap();
    harness.assert_field_equals(TOPIC, "severity", &Value::from("HIGH")).unwrap();

    assert!(!forwarder.is_finished());
    forwarder.abort();
}

#[tokio::test]
async fn clear_empties_alerts_but_keeps_targets() {
    let harness = TestHarness::with_settings(strict_settings()).unwrap();
    harness.add_targets(&["10.0.0.9"]).unwrap();
    harness.sampler.push([(2_000_000, 2_000_000, 10, 10)]);
    harness.monitor.tick();
    assert_eq!(harness.monitor.recent_alerts(24).len(), 2);

    harness.monitor.clear();
    assert!(harness.monitor.recent_alerts(24).is_empty());
    assert!(harness.monitor.drain_new_samples().is_empty());
    assert_eq!(harness.monitor.list_targets().len(), 1);
}
