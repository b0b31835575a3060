/*!
# Bandwatch Core - Surveillance de bande passante par cible IP

Cœur du système, sans aucune couche de présentation :
- `registry`   : cibles surveillées (adresses IP validées, actives ou en pause)
- `sampler`    : production d'un échantillon par cible et par tick (simulé ou compteurs OS)
- `aggregator` : fenêtre glissante bornée par cible + total/moyenne/pic/tendance
- `alerts`     : comparaison des pics aux seuils statiques, anneau d'alertes borné
- `sink`       : journal SQLite append-only des échantillons, interrogeable par fenêtre temporelle
- `monitor`    : composant propriétaire qui orchestre la boucle de ticks
- `export`     : dump JSON des fenêtres vers un fichier horodaté
- `notify`     : point d'extension pour publier les alertes (MQTT côté kernel)
*/

pub mod aggregator;
pub mod alerts;
pub mod error;
pub mod export;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod registry;
pub mod sampler;
pub mod sink;
pub mod units;

pub use aggregator::{Aggregator, Trend, TrendState, Window};
pub use alerts::{Alert, AlertEvaluator, AlertKind, Severity, Thresholds};
pub use error::{MonitorError, SamplerError};
pub use models::{LinkType, Sample, Target};
pub use monitor::{Monitor, MonitorSettings, MonitorState, MonitorStats, TargetAggregates};
pub use notify::{forward_alerts, AlertPublisher};
pub use registry::TargetRegistry;
pub use sampler::{local_interfaces, InterfaceSampler, LocalInterface, Sampler, SimulatedSampler};
pub use sink::{SampleStore, SqliteStore};
pub use units::format_bytes;
