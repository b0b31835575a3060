/*!
Test Harness pour le moniteur

Facilite l'écriture de tests avec:
- Moniteur prêt à l'emploi (sink SQLite en mémoire, sampler scripté, ticks rapides)
- Client MQTT factice branché sur le flux d'alertes
- Attentes temporisées sur les ticks et les messages publiés
*/

use crate::fixtures::ScriptedSampler;
use crate::mqtt_stub::MockMqttClient;
use anyhow::Result;
use bandwatch_core::{forward_alerts, Monitor, MonitorSettings, SampleStore, SqliteStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const FAST_TICK: Duration = Duration::from_millis(20);

/// Harness de test complet pour le moniteur
pub struct TestHarness {
    pub monitor: Monitor,
    pub sampler: ScriptedSampler,
    pub mqtt_client: MockMqttClient,
    pub export_dir: TempDir,
}

impl TestHarness {
    /// Moniteur sur sink en mémoire, lecture constante modeste (sous les seuils)
    pub fn new() -> Result<Self> {
        Self::with_store(Arc::new(SqliteStore::in_memory()?), MonitorSettings::default())
    }

    pub fn with_settings(settings: MonitorSettings) -> Result<Self> {
        Self::with_store(Arc::new(SqliteStore::in_memory()?), settings)
    }

    /// Tick forcé à `FAST_TICK` quels que soient les réglages fournis
    pub fn with_store(store: Arc<dyn SampleStore>, settings: MonitorSettings) -> Result<Self> {
        init_test_logging();

        let sampler = ScriptedSampler::constant((1_000, 2_000, 10, 20));
        let settings = MonitorSettings {
            tick_interval: FAST_TICK,
            ..settings
        };
        let monitor = Monitor::new(settings, Box::new(sampler.clone()), store);

        Ok(Self {
            monitor,
            sampler,
            mqtt_client: MockMqttClient::new(),
            export_dir: tempfile::tempdir()?,
        })
    }

    pub fn add_targets(&self, ids: &[&str]) -> Result<()> {
        for id in ids {
            self.monitor.register_target(id, None)?;
        }
        Ok(())
    }

    /// Branche le client MQTT factice sur le flux d'alertes du moniteur
    pub fn spawn_alert_forwarder(&self, topic: &str) -> JoinHandle<()> {
        tokio::spawn(forward_alerts(
            self.monitor.subscribe_alerts(),
            self.mqtt_client.clone(),
            topic.to_string(),
        ))
    }

    /// Attend que le moniteur ait effectué au moins `ticks` passes
    pub async fn wait_for_ticks(&self, ticks: u64, timeout_ms: u64) -> Result<()> {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if self.monitor.stats().ticks >= ticks {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        anyhow::bail!(
            "Timeout waiting for {} ticks (got {})",
            ticks,
            self.monitor.stats().ticks
        )
    }

    /// Attend qu'un message JSON soit publié sur `topic`
    pub async fn wait_for_message(&self, topic: &str, timeout_ms: u64) -> Result<Option<Value>> {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
                return Ok(Some(msg));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tracing::warn!("Timeout waiting for message on {}", topic);
        Ok(None)
    }

    /// Assert qu'un champ du dernier message de `topic` a une valeur donnée
    pub fn assert_field_equals(&self, topic: &str, field_path: &str, expected: &Value) -> Result<()> {
        let msg = match self.mqtt_client.get_last_json_message::<Value>(topic)? {
            Some(msg) => msg,
            None => anyhow::bail!("No message on {}", topic),
        };

        match get_nested_field(&msg, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "Field '{}' mismatch: expected {:?}, got {:?}",
                field_path,
                expected,
                actual
            ),
            None => anyhow::bail!("Field '{}' not found in latest message on {}", field_path, topic),
        }
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(obj) => obj.get(part),
        _ => None,
    })
}

/// Logs visibles dans la sortie des tests (RUST_LOG pour filtrer)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
