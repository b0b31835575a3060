/**
 * MONITOR - Composant propriétaire de tout l'état partagé
 *
 * RÔLE :
 * Encapsule registre, fenêtres, anneau d'alertes, sampler et sink derrière
 * des accesseurs synchronisés. Aucun état global ambiant.
 *
 * CYCLE DE VIE : Idle -> Running (start, exige >= 1 cible active)
 *                Running -> Idle (stop, coopératif)
 * L'état publié suit la vie réelle de la boucle : la boucle le remet à Idle
 * en sortant, même si l'appelant de stop a abandonné l'attente.
 *
 * FLUX PAR TICK : Registry -> Sampler -> Aggregator -> Alertes -> Sink -> feed
 * La boucle de ticks est le seul écrivain des fenêtres et des alertes ; la
 * présentation ne lit que des snapshots et vide la file des échantillons.
 *
 * CONCURRENCE :
 * - une tâche tokio pilote les ticks, chaque passe tourne en spawn_blocking (SQLite)
 * - période fixe, pas de rattrapage : les ticks dérivent sous charge mais ne s'empilent pas
 * - stop attend la fin de la passe en cours : plus aucun append après son retour
 */

use crate::aggregator::{Aggregator, Trend, DEFAULT_WINDOW_CAPACITY};
use crate::alerts::{Alert, AlertEvaluator, Thresholds, DEFAULT_ALERT_CAPACITY};
use crate::error::MonitorError;
use crate::export::{build_document, write_document};
use crate::models::{parse_target_id, Sample, Target};
use crate::registry::TargetRegistry;
use crate::sampler::Sampler;
use crate::sink::SampleStore;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub const DEFAULT_FEED_CAPACITY: usize = 1024;
const ALERT_BROADCAST_CAPACITY: usize = 256;

/// Réglages du moniteur, figés à la construction
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub tick_interval: Duration,
    pub window_capacity: usize,
    pub alert_capacity: usize,
    pub feed_capacity: usize,
    pub thresholds: Thresholds,
    pub alerts_enabled: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            thresholds: Thresholds::default(),
            alerts_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Idle,
    Running,
}

/// Compteurs cumulés depuis le démarrage du processus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub ticks: u64,
    pub samples_recorded: u64,
    pub persistence_failures: u64,
    pub sampler_failures: u64,
    pub feed_dropped: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    samples_recorded: AtomicU64,
    persistence_failures: AtomicU64,
    sampler_failures: AtomicU64,
    feed_dropped: AtomicU64,
}

/// Vue agrégée d'une cible pour la couche de présentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetAggregates {
    pub target: IpAddr,
    pub samples: usize,
    pub total_sent: u64,
    pub total_received: u64,
    pub average_sent: f64,
    pub average_received: f64,
    pub peak_sent: u64,
    pub peak_received: u64,
    pub total_packets_sent: u64,
    pub total_packets_received: u64,
    pub peak_packets_sent: u64,
    pub peak_packets_received: u64,
    pub trend: Trend,
}

/// `stop` passé à `true` sans que `handle` soit consommé : arrêt demandé
/// puis abandonné par son appelant
enum Lifecycle {
    Idle,
    Running {
        stop: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
}

/// Tenu par la boucle de ticks ; repasse le moniteur à Idle quand elle se termine
struct RunningGuard(Monitor);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.inner.running.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    settings: MonitorSettings,
    registry: Mutex<TargetRegistry>,
    aggregator: RwLock<Aggregator>,
    alerts: Mutex<AlertEvaluator>,
    sampler: Box<dyn Sampler>,
    store: Arc<dyn SampleStore>,
    feed_tx: mpsc::Sender<Sample>,
    feed_rx: Mutex<mpsc::Receiver<Sample>>,
    alert_tx: broadcast::Sender<Alert>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    running: AtomicBool,
    counters: Counters,
}

/// Poignée partagée (clonable) sur le moniteur
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    pub fn new(settings: MonitorSettings, sampler: Box<dyn Sampler>, store: Arc<dyn SampleStore>) -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(settings.feed_capacity.max(1));
        let (alert_tx, _) = broadcast::channel(ALERT_BROADCAST_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(TargetRegistry::new()),
                aggregator: RwLock::new(Aggregator::new(settings.window_capacity)),
                alerts: Mutex::new(AlertEvaluator::new(settings.thresholds, settings.alert_capacity)),
                sampler,
                store,
                feed_tx,
                feed_rx: Mutex::new(feed_rx),
                alert_tx,
                lifecycle: tokio::sync::Mutex::new(Lifecycle::Idle),
                running: AtomicBool::new(false),
                counters: Counters::default(),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.inner.settings
    }

    pub fn sampler_name(&self) -> &'static str {
        self.inner.sampler.name()
    }

    // ===== Registre =====

    /// Enregistre une cible et la persiste (au mieux).
    /// Retourne `true` si l'état du registre a changé.
    pub fn register_target(&self, raw_id: &str, description: Option<String>) -> Result<bool, MonitorError> {
        let id = parse_target_id(raw_id)?;
        let target = Target::new(id).with_description(description);

        let changed = self.inner.registry.lock().insert(target.clone());
        if changed {
            info!("Added IP {} to monitoring list", id);
            if let Err(e) = self.inner.store.save_target(&target) {
                warn!("Target {} registered but not persisted: {}", id, e);
            }
        }
        Ok(changed)
    }

    /// Retire une cible ; une cible inconnue est un no-op (`Ok(false)`)
    pub fn unregister_target(&self, raw_id: &str) -> Result<bool, MonitorError> {
        let id = parse_target_id(raw_id)?;
        let removed = self.inner.registry.lock().unregister(&id).is_some();
        if removed {
            info!("Removed IP {} from monitoring list", id);
            if let Err(e) = self.inner.store.set_target_active(id, false) {
                warn!("Target {} removed but not persisted: {}", id, e);
            }
        }
        Ok(removed)
    }

    /// Met en pause / réactive une cible connue
    pub fn set_target_active(&self, raw_id: &str, active: bool) -> Result<bool, MonitorError> {
        let id = parse_target_id(raw_id)?;
        let changed = self.inner.registry.lock().set_active(&id, active);
        if changed {
            info!("Target {} is now {}", id, if active { "active" } else { "paused" });
            if let Err(e) = self.inner.store.set_target_active(id, active) {
                warn!("Target {} state not persisted: {}", id, e);
            }
        }
        Ok(changed)
    }

    /// Recharge les cibles actives depuis la table persistante
    pub fn restore_targets(&self) -> Result<usize, MonitorError> {
        let targets = self.inner.store.active_targets()?;
        let mut registry = self.inner.registry.lock();
        let restored = targets.into_iter().filter(|t| registry.insert(t.clone())).count();
        if restored > 0 {
            info!("Restored {} targets from the sample store", restored);
        }
        Ok(restored)
    }

    pub fn list_targets(&self) -> Vec<Target> {
        self.inner.registry.lock().list_targets()
    }

    pub fn active_targets(&self) -> Vec<IpAddr> {
        self.inner.registry.lock().list_active()
    }

    pub fn target(&self, id: IpAddr) -> Option<Target> {
        self.inner.registry.lock().get(&id).cloned()
    }

    // ===== Lectures pour la présentation =====

    pub fn latest_aggregates(&self, id: IpAddr) -> TargetAggregates {
        let aggregator = self.inner.aggregator.read();
        let (total_sent, total_received) = aggregator.total(&id);
        let (average_sent, average_received) = aggregator.average(&id);
        let (peak_sent, peak_received) = aggregator.peak(&id);
        let window = aggregator.window(&id);
        let (total_packets_sent, total_packets_received) = window.map_or((0, 0), |w| w.total_packets());
        let (peak_packets_sent, peak_packets_received) = window.map_or((0, 0), |w| w.peak_packets());

        TargetAggregates {
            target: id,
            samples: window.map_or(0, |w| w.len()),
            total_sent,
            total_received,
            average_sent,
            average_received,
            peak_sent,
            peak_received,
            total_packets_sent,
            total_packets_received,
            peak_packets_sent,
            peak_packets_received,
            trend: aggregator.trend(&id),
        }
    }

    pub fn recent_alerts(&self, hours: u32) -> Vec<Alert> {
        self.inner.alerts.lock().recent(hours)
    }

    /// Vide la file des échantillons produits depuis le dernier appel
    pub fn drain_new_samples(&self) -> Vec<Sample> {
        let mut rx = self.inner.feed_rx.lock();
        let mut drained = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            drained.push(sample);
        }
        drained
    }

    /// Flux des alertes levées, pour publication externe
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.inner.alert_tx.subscribe()
    }

    /// Historique persistant sur les `hours` dernières heures
    pub fn history(&self, target: Option<IpAddr>, hours: u32) -> Result<Vec<Sample>, MonitorError> {
        let since = time::OffsetDateTime::now_utc() - time::Duration::hours(i64::from(hours));
        self.inner.store.query(target, since)
    }

    pub fn state(&self) -> MonitorState {
        if self.inner.running.load(Ordering::SeqCst) {
            MonitorState::Running
        } else {
            MonitorState::Idle
        }
    }

    pub fn stats(&self) -> MonitorStats {
        let c = &self.inner.counters;
        MonitorStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            samples_recorded: c.samples_recorded.load(Ordering::Relaxed),
            persistence_failures: c.persistence_failures.load(Ordering::Relaxed),
            sampler_failures: c.sampler_failures.load(Ordering::Relaxed),
            feed_dropped: c.feed_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn alert_count(&self) -> usize {
        self.inner.alerts.lock().len()
    }

    // ===== Commandes =====

    /// Idle -> Running. Refusé (sans changement d'état) si aucune cible active.
    pub async fn start(&self) -> Result<(), MonitorError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if let Lifecycle::Running { stop, handle } = &mut *lifecycle {
            let stopping = *stop.borrow();
            if !stopping {
                debug!("Monitoring already running");
                return Ok(());
            }
            // arrêt abandonné en route : la boucle finit sa passe avant de repartir
            if let Err(e) = handle.await {
                error!("Monitoring loop ended abnormally: {}", e);
            }
            *lifecycle = Lifecycle::Idle;
        }

        let active = self.inner.registry.lock().list_active().len();
        if active == 0 {
            warn!("Refusing to start monitoring: no active target");
            return Err(MonitorError::EmptyTargetSet);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        self.inner.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_loop(self.clone(), stop_rx));
        *lifecycle = Lifecycle::Running { stop: stop_tx, handle };

        info!(
            "Network monitoring started ({} targets, every {:?}, sampler: {})",
            active,
            self.inner.settings.tick_interval,
            self.sampler_name()
        );
        Ok(())
    }

    /// Running -> Idle. Attend la fin de la passe en cours ; no-op si Idle.
    /// Annulé pendant l'attente, l'arrêt reste acquis : la boucle sort après sa passe.
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Lifecycle::Running { stop, handle } = &mut *lifecycle else {
            return;
        };

        stop.send_replace(true);
        if let Err(e) = handle.await {
            error!("Monitoring loop ended abnormally: {}", e);
        }
        *lifecycle = Lifecycle::Idle;
        info!("Network monitoring stopped");
    }

    /// Efface fenêtres, alertes et file d'échantillons (le registre est conservé)
    pub fn clear(&self) {
        self.inner.aggregator.write().clear();
        self.inner.alerts.lock().clear();
        let discarded = self.drain_new_samples().len();
        info!("All monitoring data cleared ({} pending samples discarded)", discarded);
    }

    /// Exporte les fenêtres de toutes les cibles connues dans `dir`
    pub fn export(&self, dir: &Path) -> Result<PathBuf, MonitorError> {
        let targets: Vec<IpAddr> = self.list_targets().into_iter().map(|t| t.id).collect();
        let document = build_document(&targets, &self.inner.aggregator.read());
        write_document(dir, &document)
    }

    /// Supprime du sink les échantillons plus vieux que la rétention
    pub fn prune_history(&self, retention_hours: u32) -> Result<usize, MonitorError> {
        let cutoff = time::OffsetDateTime::now_utc() - time::Duration::hours(i64::from(retention_hours));
        let removed = self.inner.store.prune(cutoff)?;
        if removed > 0 {
            info!("Pruned {} samples older than {}h", removed, retention_hours);
        }
        Ok(removed)
    }

    /// Purge périodique de l'historique (premier passage immédiat)
    pub fn spawn_retention_sweeper(&self, retention_hours: u32, every: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        info!("Starting retention sweeper (retention: {}h, every {:?})", retention_hours, every);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let pass = monitor.clone();
                match task::spawn_blocking(move || pass.prune_history(retention_hours)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Retention sweep failed: {}", e),
                    Err(e) => error!("Retention sweep task failed: {}", e),
                }
            }
        })
    }

    /// Une passe complète sur les cibles actives. Retourne le nombre
    /// d'échantillons produits. Pilotée par la boucle de ticks ; à n'appeler
    /// directement que lorsque le moniteur est Idle.
    pub fn tick(&self) -> usize {
        let inner = &self.inner;
        inner.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let targets = inner.registry.lock().list_active();
        let mut produced = 0;

        for ip in targets {
            let sample = match inner.sampler.sample(ip) {
                Ok(sample) => sample,
                Err(e) => {
                    inner.counters.sampler_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Skipping {} this tick: {}", ip, e);
                    continue;
                }
            };

            let raised = {
                let mut aggregator = inner.aggregator.write();
                aggregator.update(&sample);
                match aggregator.window(&ip) {
                    Some(window) if inner.settings.alerts_enabled => inner.alerts.lock().evaluate(ip, window),
                    _ => Vec::new(),
                }
            };

            // best effort : un échec d'écriture ne bloque jamais la boucle
            match inner.store.append(&sample) {
                Ok(()) => {
                    inner.counters.samples_recorded.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    inner.counters.persistence_failures.fetch_add(1, Ordering::Relaxed);
                }
            }

            if let Err(mpsc::error::TrySendError::Full(_)) = inner.feed_tx.try_send(sample) {
                inner.counters.feed_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Sample feed full, dropping sample for {}", ip);
            }

            for alert in raised {
                let _ = inner.alert_tx.send(alert);
            }
            produced += 1;
        }

        produced
    }
}

async fn run_loop(monitor: Monitor, mut stop: watch::Receiver<bool>) {
    let period = monitor.inner.settings.tick_interval;
    let _running = RunningGuard(monitor.clone());

    loop {
        if *stop.borrow() {
            break;
        }

        let pass = monitor.clone();
        match task::spawn_blocking(move || pass.tick()).await {
            Ok(produced) => debug!("Tick completed, {} samples", produced),
            Err(e) => error!("Error in monitoring loop: {}", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = stop.changed() => break,
        }
    }
}
