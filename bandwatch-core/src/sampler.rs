//! Sample production for monitored targets
//!
//! Two backends behind the same `Sampler` capability:
//! - `SimulatedSampler`: pseudo-random traffic loosely keyed on the address.
//!   This is a placeholder generator, not a measurement.
//! - `InterfaceSampler`: real OS counters of the local interface that owns
//!   the target address. Non-local targets are rejected.

use crate::error::SamplerError;
use crate::models::{LinkType, Sample};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use sysinfo::Networks;
use time::OffsetDateTime;
use tracing::debug;

/// Produces one sample for a target per tick
pub trait Sampler: Send + Sync {
    fn sample(&self, target: IpAddr) -> Result<Sample, SamplerError>;

    /// Backend name, for logs and health reports
    fn name(&self) -> &'static str;
}

/// Mock generator: uniform base values scaled by a per-address multiplier
#[derive(Debug, Default)]
pub struct SimulatedSampler;

impl SimulatedSampler {
    pub fn new() -> Self {
        Self
    }

    /// `1 + (hash(ip) % 1000) / 1000`, stable for a given address
    fn multiplier(target: &IpAddr) -> f64 {
        let mut hasher = DefaultHasher::new();
        target.hash(&mut hasher);
        1.0 + (hasher.finish() % 1000) as f64 / 1000.0
    }
}

impl Sampler for SimulatedSampler {
    fn sample(&self, target: IpAddr) -> Result<Sample, SamplerError> {
        let mut rng = rand::thread_rng();
        let base_sent: u64 = rng.gen_range(1024..10240);
        let base_received: u64 = rng.gen_range(2048..20480);
        let packets_sent: u64 = rng.gen_range(10..100);
        let packets_received: u64 = rng.gen_range(15..150);

        let multiplier = Self::multiplier(&target);

        Ok(Sample {
            target,
            bytes_sent: (base_sent as f64 * multiplier) as u64,
            bytes_received: (base_received as f64 * multiplier) as u64,
            packets_sent,
            packets_received,
            timestamp: OffsetDateTime::now_utc(),
            link_type: LinkType::Simulated,
        })
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    bytes_sent: u64,
    bytes_received: u64,
    packets_sent: u64,
    packets_received: u64,
}

/// Reads cumulative interface counters and reports deltas per target
pub struct InterfaceSampler {
    networks: Mutex<Networks>,
    last: Mutex<HashMap<IpAddr, Counters>>,
}

impl InterfaceSampler {
    pub fn new() -> Self {
        Self {
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            last: Mutex::new(HashMap::new()),
        }
    }

    fn interface_for(target: &IpAddr) -> Result<String, SamplerError> {
        let interfaces = if_addrs::get_if_addrs()
            .map_err(|e| SamplerError::Unavailable(format!("interface enumeration failed: {e}")))?;

        interfaces
            .into_iter()
            .find(|iface| iface.ip() == *target)
            .map(|iface| iface.name)
            .ok_or(SamplerError::Unsupported(*target))
    }

    fn read_counters(&self, interface: &str) -> Result<Counters, SamplerError> {
        let mut networks = self.networks.lock();
        networks.refresh_list();

        let (_, data) = networks
            .iter()
            .find(|(name, _)| name.as_str() == interface)
            .ok_or_else(|| SamplerError::Unavailable(format!("no counters for interface {interface}")))?;

        Ok(Counters {
            bytes_sent: data.total_transmitted(),
            bytes_received: data.total_received(),
            packets_sent: data.total_packets_transmitted(),
            packets_received: data.total_packets_received(),
        })
    }
}

impl Default for InterfaceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for InterfaceSampler {
    fn sample(&self, target: IpAddr) -> Result<Sample, SamplerError> {
        let interface = Self::interface_for(&target)?;
        let current = self.read_counters(&interface)?;

        // premier passage : on mémorise la base, delta nul
        let previous = self.last.lock().insert(target, current).unwrap_or(current);
        debug!("Sampled {} on {}", target, interface);

        Ok(Sample {
            target,
            bytes_sent: current.bytes_sent.saturating_sub(previous.bytes_sent),
            bytes_received: current.bytes_received.saturating_sub(previous.bytes_received),
            packets_sent: current.packets_sent.saturating_sub(previous.packets_sent),
            packets_received: current.packets_received.saturating_sub(previous.packets_received),
            timestamp: OffsetDateTime::now_utc(),
            link_type: LinkType::from_interface_name(&interface),
        })
    }

    fn name(&self) -> &'static str {
        "interface"
    }
}

/// Local interface with one of its addresses
#[derive(Debug, Clone, Serialize)]
pub struct LocalInterface {
    pub name: String,
    pub address: IpAddr,
    pub link_type: LinkType,
}

/// Enumerate the host's interfaces (one entry per address)
pub fn local_interfaces() -> Result<Vec<LocalInterface>, SamplerError> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| SamplerError::Unavailable(format!("interface enumeration failed: {e}")))?;

    let mut list: Vec<LocalInterface> = interfaces
        .into_iter()
        .map(|iface| LocalInterface {
            link_type: LinkType::from_interface_name(&iface.name),
            address: iface.ip(),
            name: iface.name,
        })
        .collect();
    list.sort_by(|a, b| a.name.cmp(&b.name).then(a.address.cmp(&b.address)));
    Ok(list)
}
