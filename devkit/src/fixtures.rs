/*!
Fixtures : sampler scripté, sink défaillant

Les doubles sont clonables : le test garde une poignée pendant que le
moniteur possède l'autre.
*/

use bandwatch_core::{LinkType, MonitorError, Sample, SampleStore, Sampler, SamplerError, Target};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;

/// Valeurs (octets envoyés, reçus, paquets envoyés, reçus) d'un tick
pub type Reading = (u64, u64, u64, u64);

#[derive(Default)]
struct Script {
    queued: VecDeque<Reading>,
    fallback: Reading,
    failing: HashSet<IpAddr>,
}

/// Sampler déterministe : rejoue une file de lectures puis une valeur de repli
#[derive(Clone, Default)]
pub struct ScriptedSampler {
    script: Arc<Mutex<Script>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Même lecture à chaque tick
    pub fn constant(reading: Reading) -> Self {
        let sampler = Self::new();
        sampler.script.lock().fallback = reading;
        sampler
    }

    /// Ajoute des lectures consommées dans l'ordre (toutes cibles confondues)
    pub fn push(&self, readings: impl IntoIterator<Item = Reading>) {
        self.script.lock().queued.extend(readings);
    }

    /// Fait échouer l'échantillonnage de `ip`
    pub fn fail_for(&self, ip: IpAddr) {
        self.script.lock().failing.insert(ip);
    }

    /// Nombre d'appels reçus (réussis ou non)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Sampler for ScriptedSampler {
    fn sample(&self, target: IpAddr) -> Result<Sample, SamplerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        if script.failing.contains(&target) {
            return Err(SamplerError::Unsupported(target));
        }

        let fallback = script.fallback;
        let (sent, received, packets_sent, packets_received) = script.queued.pop_front().unwrap_or(fallback);
        Ok(Sample {
            target,
            bytes_sent: sent,
            bytes_received: received,
            packets_sent,
            packets_received,
            timestamp: OffsetDateTime::now_utc(),
            link_type: LinkType::Simulated,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Sink dont toutes les écritures échouent (disque plein simulé)
#[derive(Clone, Default)]
pub struct FailingStore {
    attempts: Arc<AtomicUsize>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn failure() -> MonitorError {
        MonitorError::Io(std::io::Error::other("simulated disk full"))
    }
}

impl SampleStore for FailingStore {
    fn init(&self) -> Result<(), MonitorError> {
        Ok(())
    }

    fn append(&self, _sample: &Sample) -> Result<(), MonitorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Self::failure())
    }

    fn query(&self, _target: Option<IpAddr>, _since: OffsetDateTime) -> Result<Vec<Sample>, MonitorError> {
        Err(Self::failure())
    }

    fn save_target(&self, _target: &Target) -> Result<(), MonitorError> {
        Err(Self::failure())
    }

    fn set_target_active(&self, _id: IpAddr, _active: bool) -> Result<(), MonitorError> {
        Err(Self::failure())
    }

    fn active_targets(&self) -> Result<Vec<Target>, MonitorError> {
        Err(Self::failure())
    }

    fn prune(&self, _before: OffsetDateTime) -> Result<usize, MonitorError> {
        Err(Self::failure())
    }
}
