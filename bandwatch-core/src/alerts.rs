/**
 * ALERTES - Détection de dépassements de seuils par cible
 *
 * RÔLE : Compare les pics de la fenêtre courante d'une cible à trois seuils
 * statiques (octets sortants, octets entrants, paquets sortants). Chaque
 * dépassement produit une alerte dont la sévérité vient d'une table fixe.
 *
 * STOCKAGE : anneau borné (capacité 100 par défaut), éviction silencieuse
 * du plus ancien, aucune suppression individuelle.
 */

use crate::aggregator::Window;
use crate::units::format_bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;
use std::net::IpAddr;
use time::{Duration, OffsetDateTime};
use tracing::warn;
use uuid::Uuid;

pub const DEFAULT_ALERT_CAPACITY: usize = 100;

/// Type d'alerte, sérialisé en MAJUSCULES (HIGH_BANDWIDTH_OUT...)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKind {
    HighBandwidthOut,
    HighBandwidthIn,
    SuspiciousPackets,
    /// Type libre levé par un appelant externe
    Custom(String),
}

impl AlertKind {
    pub fn as_str(&self) -> &str {
        match self {
            AlertKind::HighBandwidthOut => "HIGH_BANDWIDTH_OUT",
            AlertKind::HighBandwidthIn => "HIGH_BANDWIDTH_IN",
            AlertKind::SuspiciousPackets => "SUSPICIOUS_PACKETS",
            AlertKind::Custom(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "HIGH_BANDWIDTH_OUT" => AlertKind::HighBandwidthOut,
            "HIGH_BANDWIDTH_IN" => AlertKind::HighBandwidthIn,
            "SUSPICIOUS_PACKETS" => AlertKind::SuspiciousPackets,
            other => AlertKind::Custom(other.to_string()),
        }
    }

    /// Table statique type -> sévérité, LOW pour tout type non listé
    pub fn severity(&self) -> Severity {
        match self.as_str() {
            "HIGH_BANDWIDTH_OUT" | "HIGH_BANDWIDTH_IN" => Severity::Medium,
            "SUSPICIOUS_PACKETS" | "RAPID_CONNECTIONS" => Severity::High,
            _ => Severity::Low,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AlertKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AlertKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(AlertKind::from_name(&name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub target: IpAddr,
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
}

impl Alert {
    pub fn new(target: IpAddr, kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: OffsetDateTime::now_utc(),
            target,
            severity: kind.severity(),
            kind,
            message: message.into(),
        }
    }
}

/// Seuils statiques, lus au démarrage et immuables pendant l'exécution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub bytes_out: u64,
    pub bytes_in: u64,
    pub packets_out: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            bytes_out: 1024 * 1024,
            bytes_in: 1024 * 1024,
            packets_out: 1000,
        }
    }
}

#[derive(Debug)]
pub struct AlertEvaluator {
    thresholds: Thresholds,
    capacity: usize,
    ring: VecDeque<Alert>,
}

impl AlertEvaluator {
    pub fn new(thresholds: Thresholds, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            thresholds,
            capacity,
            ring: VecDeque::with_capacity(capacity),
        }
    }

    /// Vérifie les pics de la fenêtre de `target`, une alerte par seuil dépassé.
    /// Retourne les alertes nouvellement levées (déjà ajoutées à l'anneau).
    pub fn evaluate(&mut self, target: IpAddr, window: &Window) -> Vec<Alert> {
        if window.is_empty() {
            return Vec::new();
        }

        let (peak_out, peak_in) = window.peak();
        let (peak_packets_out, _) = window.peak_packets();
        let mut raised = Vec::new();

        if peak_out > self.thresholds.bytes_out {
            raised.push(Alert::new(
                target,
                AlertKind::HighBandwidthOut,
                format!(
                    "High outbound bandwidth detected: {} bytes ({})",
                    peak_out,
                    format_bytes(peak_out as f64)
                ),
            ));
        }

        if peak_in > self.thresholds.bytes_in {
            raised.push(Alert::new(
                target,
                AlertKind::HighBandwidthIn,
                format!(
                    "High inbound bandwidth detected: {} bytes ({})",
                    peak_in,
                    format_bytes(peak_in as f64)
                ),
            ));
        }

        if peak_packets_out > self.thresholds.packets_out {
            raised.push(Alert::new(
                target,
                AlertKind::SuspiciousPackets,
                format!("High packet count detected: {} packets", peak_packets_out),
            ));
        }

        for alert in &raised {
            self.record(alert.clone());
        }
        raised
    }

    /// Ajoute une alerte à l'anneau (éviction silencieuse du plus ancien)
    pub fn record(&mut self, alert: Alert) {
        warn!(
            target_ip = %alert.target,
            kind = %alert.kind,
            severity = ?alert.severity,
            "SECURITY ALERT - {}",
            alert.message
        );
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(alert);
    }

    /// Alertes dont l'horodatage est postérieur à `now - hours`
    pub fn recent(&self, hours: u32) -> Vec<Alert> {
        let cutoff = OffsetDateTime::now_utc() - Duration::hours(i64::from(hours));
        self.ring
            .iter()
            .filter(|alert| alert.timestamp > cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}
