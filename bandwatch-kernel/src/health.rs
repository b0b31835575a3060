use bandwatch_core::{AlertPublisher, Monitor, MonitorState, MonitorStats};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::System;
use time::OffsetDateTime;
use tokio::task::{self, JoinHandle};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub monitor_state: MonitorState,
    pub sampler: String,
    pub targets_tracked: u32,
    pub active_targets: u32,
    pub alerts_buffered: u32,
    pub stats: MonitorStats,
    pub memory_usage_mb: f32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new("disabled".to_string())),
        }
    }

    pub fn mark_mqtt_connecting(&self) {
        *self.mqtt_status.lock() = "connecting".to_string();
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, monitor: &Monitor) -> KernelHealth {
        let targets = monitor.list_targets();

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            monitor_state: monitor.state(),
            sampler: monitor.sampler_name().to_string(),
            targets_tracked: targets.len() as u32,
            active_targets: targets.iter().filter(|t| t.active).count() as u32,
            alerts_buffered: monitor.alert_count() as u32,
            stats: monitor.stats(),
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Démarre la publication auto du health kernel (toutes les 30s)
    pub fn spawn_health_publisher<P: AlertPublisher>(&self, monitor: Monitor, publisher: P, topic: String) -> JoinHandle<()> {
        let health_tracker = self.clone();

        task::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let health = health_tracker.get_health(&monitor);
                let payload = match serde_json::to_vec(&health) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Failed to serialize kernel health: {}", e);
                        continue;
                    }
                };
                match publisher.publish(&topic, payload).await {
                    Ok(()) => debug!(
                        "Published kernel health (uptime: {}s, targets: {})",
                        health.uptime_seconds, health.targets_tracked
                    ),
                    Err(e) => warn!("Failed to publish kernel health: {}", e),
                }
            }
        })
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let mut sys = System::new();
    sys.refresh_process(pid);
    sys.process(pid)
        .map(|p| p.memory() as f32 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandwatch_devkit::{MockMqttClient, TestHarness};

    #[tokio::test]
    async fn test_health_reflects_monitor() {
        let harness = TestHarness::new().unwrap();
        harness.add_targets(&["10.0.0.1", "10.0.0.2"]).unwrap();
        harness.monitor.set_target_active("10.0.0.2", false).unwrap();
        harness.monitor.tick();

        let tracker = HealthTracker::new();
        let health = tracker.get_health(&harness.monitor);
        assert_eq!(health.monitor_state, MonitorState::Idle);
        assert_eq!(health.targets_tracked, 2);
        assert_eq!(health.active_targets, 1);
        assert_eq!(health.stats.samples_recorded, 1);
        assert_eq!(health.sampler, "scripted");
        assert_eq!(health.mqtt_status, "disabled");

        tracker.increment_reconnects();
        let health = tracker.get_health(&harness.monitor);
        assert_eq!(health.mqtt_reconnects, 1);
        assert_eq!(health.mqtt_status, "reconnecting");
    }

    #[tokio::test]
    async fn test_health_publisher_publishes_immediately() {
        let harness = TestHarness::new().unwrap();
        let client = MockMqttClient::new();
        let handle = HealthTracker::new().spawn_health_publisher(
            harness.monitor.clone(),
            client.clone(),
            "bandwatch/kernel/health@v1".into(),
        );

        for _ in 0..100 {
            if !client.get_published_messages().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let last: serde_json::Value = client
            .get_last_json_message("bandwatch/kernel/health@v1")
            .unwrap()
            .unwrap();
        assert_eq!(last["monitor_state"], "idle");
        handle.abort();
    }
}
