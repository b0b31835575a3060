use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use time::OffsetDateTime;

/// Valide et normalise un identifiant de cible (adresse IPv4/IPv6)
/// La forme canonique évite les doublons ("::1" == "0:0:0:0:0:0:0:1").
/// Aucun espace toléré : la chaîne doit être l'adresse exacte.
pub fn parse_target_id(raw: &str) -> Result<IpAddr, MonitorError> {
    raw.parse::<IpAddr>()
        .map_err(|_| MonitorError::InvalidTarget(raw.to_string()))
}

/// Cible surveillée
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: IpAddr,
    pub description: Option<String>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

impl Target {
    pub fn new(id: IpAddr) -> Self {
        Self {
            id,
            description: None,
            active: true,
            added_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }
}

/// Type de lien sur lequel l'échantillon a été mesuré
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Ethernet,
    Wireless,
    Loopback,
    Simulated,
    Unknown,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Ethernet => "ethernet",
            LinkType::Wireless => "wireless",
            LinkType::Loopback => "loopback",
            LinkType::Simulated => "simulated",
            LinkType::Unknown => "unknown",
        }
    }

    /// Relit un tag persisté, les tags inconnus retombent sur `Unknown`
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "ethernet" => LinkType::Ethernet,
            "wireless" => LinkType::Wireless,
            "loopback" => LinkType::Loopback,
            "simulated" => LinkType::Simulated,
            _ => LinkType::Unknown,
        }
    }

    /// Classification par préfixe du nom d'interface (eth0, wlan0, lo...)
    pub fn from_interface_name(name: &str) -> Self {
        const ETHERNET: &[&str] = &["eth", "en", "ens", "enp", "eno"];
        const WIRELESS: &[&str] = &["wlan", "wlp", "wlo", "wifi", "wl"];

        if name == "lo" || name.starts_with("lo0") || name.starts_with("Loopback") {
            LinkType::Loopback
        } else if WIRELESS.iter().any(|p| name.starts_with(p)) {
            LinkType::Wireless
        } else if ETHERNET.iter().any(|p| name.starts_with(p)) {
            LinkType::Ethernet
        } else {
            LinkType::Unknown
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Échantillon de trafic pour une cible, immuable une fois produit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub target: IpAddr,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub link_type: LinkType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_id_accepts_v4_and_v6() {
        assert_eq!(parse_target_id("192.168.1.10").unwrap().to_string(), "192.168.1.10");
        assert_eq!(parse_target_id("0:0:0:0:0:0:0:1").unwrap().to_string(), "::1");
    }

    #[test]
    fn test_parse_target_id_rejects_garbage() {
        for raw in ["999.999.999.999", "", "localhost", "10.0.0", "::g", " 10.0.0.1 ", "10.0.0.1\n"] {
            assert!(
                matches!(parse_target_id(raw), Err(MonitorError::InvalidTarget(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_link_type_tags() {
        assert_eq!(LinkType::from_tag("ethernet"), LinkType::Ethernet);
        assert_eq!(LinkType::from_tag("token-ring"), LinkType::Unknown);
        assert_eq!(LinkType::from_interface_name("enp3s0"), LinkType::Ethernet);
        assert_eq!(LinkType::from_interface_name("wlp2s0"), LinkType::Wireless);
        assert_eq!(LinkType::from_interface_name("lo"), LinkType::Loopback);
        assert_eq!(LinkType::from_interface_name("docker0"), LinkType::Unknown);
    }
}
