use bandwatch_core::{InterfaceSampler, MonitorSettings, Sampler, SimulatedSampler, Thresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub monitoring: MonitoringConf,
    pub alerts: AlertsConf,
    pub presentation: PresentationConf,
    pub targets: Vec<TargetConf>,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    #[default]
    Simulated,
    Interface,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MonitoringConf {
    pub tick_interval_secs: u64,
    pub retention_hours: u32,
    pub window_capacity: usize,
    pub feed_capacity: usize,
    pub database_path: PathBuf,
    pub sampler: SamplerKind,
    pub autostart: bool,
    pub export_dir: PathBuf,
}

impl Default for MonitoringConf {
    fn default() -> Self {
        Self {
            tick_interval_secs: 2,
            retention_hours: 24,
            window_capacity: 100,
            feed_capacity: 1024,
            database_path: PathBuf::from("bandwidth_data.db"),
            sampler: SamplerKind::Simulated,
            autostart: false,
            export_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlertsConf {
    pub enabled: bool,
    pub bytes_out_threshold: u64,
    pub bytes_in_threshold: u64,
    pub packets_out_threshold: u64,
    pub capacity: usize,
}

impl Default for AlertsConf {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            enabled: true,
            bytes_out_threshold: thresholds.bytes_out,
            bytes_in_threshold: thresholds.bytes_in,
            packets_out_threshold: thresholds.packets_out,
            capacity: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PresentationConf {
    pub listen: String,
    pub refresh_interval_secs: u64,
}

impl Default for PresentationConf {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            refresh_interval_secs: 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TargetConf {
    pub ip: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_alert_topic")]
    pub alert_topic: String,
    #[serde(default = "default_health_topic")]
    pub health_topic: String,
}

fn default_alert_topic() -> String {
    "bandwatch/alerts@v1".into()
}

fn default_health_topic() -> String {
    "bandwatch/kernel/health@v1".into()
}

impl KernelConfig {
    /// Réglages du moniteur ; un intervalle nul est ramené à 1 s
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            tick_interval: Duration::from_secs(self.monitoring.tick_interval_secs.max(1)),
            window_capacity: self.monitoring.window_capacity.max(1),
            alert_capacity: self.alerts.capacity.max(1),
            feed_capacity: self.monitoring.feed_capacity.max(1),
            thresholds: Thresholds {
                bytes_out: self.alerts.bytes_out_threshold,
                bytes_in: self.alerts.bytes_in_threshold,
                packets_out: self.alerts.packets_out_threshold,
            },
            alerts_enabled: self.alerts.enabled,
        }
    }

    pub fn sampler(&self) -> Box<dyn Sampler> {
        match self.monitoring.sampler {
            SamplerKind::Simulated => Box::new(SimulatedSampler::new()),
            SamplerKind::Interface => Box::new(InterfaceSampler::new()),
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("BANDWATCH_CONFIG").unwrap_or_else(|_| "bandwatch.yaml".into());
    load_config_from(Path::new(&path)).await
}

/// Fichier absent : les valeurs par défaut sont écrites puis utilisées.
/// Fichier invalide : erreur loguée, valeurs par défaut, fichier intact.
pub async fn load_config_from(path: &Path) -> KernelConfig {
    if !path.exists() {
        let cfg = KernelConfig::default();
        match serde_yaml::to_string(&cfg) {
            Ok(txt) => match fs::write(path, txt).await {
                Ok(()) => info!("No config at {:?}, default configuration written", path),
                Err(e) => warn!("No config at {:?} and defaults could not be written: {}", path, e),
            },
            Err(e) => error!("Failed to serialize default configuration: {}", e),
        }
        return cfg;
    }

    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            error!("Error loading config {:?}: {}, using defaults", path, e);
            return KernelConfig::default();
        }
    };
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }

    match serde_yaml::from_str(&txt) {
        Ok(cfg) => {
            info!("Configuration loaded from {:?}", path);
            cfg
        }
        Err(e) => {
            error!("Invalid config {:?}: {}, using defaults", path, e);
            KernelConfig::default()
        }
    }
}
