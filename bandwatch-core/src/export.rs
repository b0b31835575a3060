//! Export of window contents to a timestamped JSON file

use crate::aggregator::Aggregator;
use crate::error::MonitorError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

/// Contenu d'une fenêtre, du plus ancien au plus récent
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct WindowDump {
    pub bandwidth_sent: Vec<u64>,
    pub bandwidth_received: Vec<u64>,
    pub packets_sent: Vec<u64>,
    pub packets_received: Vec<u64>,
}

/// Document exporté : adresse -> séquences. Vide si aucune cible.
pub type ExportDocument = BTreeMap<String, WindowDump>;

/// Construit le document pour les cibles données (tableaux vides si aucune donnée)
pub fn build_document(targets: &[IpAddr], aggregator: &Aggregator) -> ExportDocument {
    targets
        .iter()
        .map(|ip| {
            let dump = aggregator
                .window(ip)
                .map(|w| WindowDump {
                    bandwidth_sent: w.bytes_sent(),
                    bandwidth_received: w.bytes_received(),
                    packets_sent: w.packets_sent(),
                    packets_received: w.packets_received(),
                })
                .unwrap_or_default();
            (ip.to_string(), dump)
        })
        .collect()
}

/// `bandwidth_data_YYYYMMDD_HHMMSS.json`
pub fn export_file_name(at: OffsetDateTime) -> Result<String, MonitorError> {
    let stamp = at
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .map_err(|e| MonitorError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    Ok(format!("bandwidth_data_{stamp}.json"))
}

/// Écrit le document dans `dir`, retourne le chemin du fichier créé
pub fn write_document(dir: &Path, document: &ExportDocument) -> Result<PathBuf, MonitorError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(OffsetDateTime::now_utc())?);
    let json = serde_json::to_string_pretty(document)?;
    std::fs::write(&path, json)?;
    info!("Data exported to {:?} ({} targets)", path, document.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LinkType, Sample};
    use time::macros::datetime;

    #[test]
    fn test_file_name_format() {
        let name = export_file_name(datetime!(2024-03-09 07:05:01 UTC)).unwrap();
        assert_eq!(name, "bandwidth_data_20240309_070501.json");
    }

    #[test]
    fn test_empty_target_set_is_empty_object() {
        let doc = build_document(&[], &Aggregator::default());
        assert!(doc.is_empty());
        assert_eq!(serde_json::to_string(&doc).unwrap(), "{}");
    }

    #[test]
    fn test_document_contains_window_sequences() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        let idle: IpAddr = "10.0.0.8".parse().unwrap();
        let mut agg = Aggregator::default();
        for i in 1..=3u64 {
            agg.update(&Sample {
                target: ip,
                bytes_sent: i * 100,
                bytes_received: i * 200,
                packets_sent: i,
                packets_received: i * 2,
                timestamp: OffsetDateTime::now_utc(),
                link_type: LinkType::Simulated,
            });
        }

        let doc = build_document(&[ip, idle], &agg);
        assert_eq!(doc["10.0.0.7"].bandwidth_sent, vec![100, 200, 300]);
        assert_eq!(doc["10.0.0.7"].packets_received, vec![2, 4, 6]);
        assert_eq!(doc["10.0.0.8"], WindowDump::default());
    }

    #[test]
    fn test_write_document_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_document(dir.path(), &ExportDocument::new()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("bandwidth_data_") && name.ends_with(".json"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "{}");
    }
}
