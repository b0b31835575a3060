/**
 * SINK - Journal persistant des échantillons (SQLite)
 *
 * RÔLE :
 * Log append-only "au moins une fois, au mieux" de chaque échantillon,
 * interrogeable par cible et par fenêtre temporelle. Tient aussi le
 * registre persistant des cibles.
 *
 * TABLES :
 * - bandwidth_logs   : id auto, timestamp (ms unix, défaut = insertion), ip, 4 compteurs, type de lien
 * - monitored_targets: id auto, ip unique, description, actif, date d'ajout
 *
 * POLITIQUE : chaque append est sa propre unité durable (pas de batch).
 * Les échecs sont loggés ici et remontés en `Result` ; l'appelant décide
 * de les ignorer (la boucle de ticks ne s'arrête jamais pour ça).
 */

use crate::error::MonitorError;
use crate::models::{LinkType, Sample, Target};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::net::IpAddr;
use std::path::Path;
use time::OffsetDateTime;
use tracing::{error, info};

/// Interface commune des stockages d'échantillons
pub trait SampleStore: Send + Sync {
    /// Création idempotente du schéma
    fn init(&self) -> Result<(), MonitorError>;

    fn append(&self, sample: &Sample) -> Result<(), MonitorError>;

    /// Échantillons strictement postérieurs à `since`, du plus récent au plus ancien
    fn query(&self, target: Option<IpAddr>, since: OffsetDateTime) -> Result<Vec<Sample>, MonitorError>;

    /// Upsert d'une cible (réactivée si elle existait)
    fn save_target(&self, target: &Target) -> Result<(), MonitorError>;

    fn set_target_active(&self, id: IpAddr, active: bool) -> Result<(), MonitorError>;

    /// Cibles marquées actives, pour restauration au démarrage
    fn active_targets(&self) -> Result<Vec<Target>, MonitorError>;

    /// Supprime les échantillons antérieurs à `before`, retourne le nombre supprimé
    fn prune(&self, before: OffsetDateTime) -> Result<usize, MonitorError>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS bandwidth_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)),
        ip_address TEXT NOT NULL,
        bytes_sent INTEGER DEFAULT 0,
        bytes_received INTEGER DEFAULT 0,
        packets_sent INTEGER DEFAULT 0,
        packets_received INTEGER DEFAULT 0,
        connection_type TEXT DEFAULT 'unknown'
    );
    CREATE INDEX IF NOT EXISTS idx_bandwidth_logs_ip_ts ON bandwidth_logs (ip_address, timestamp);
    CREATE TABLE IF NOT EXISTS monitored_targets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ip_address TEXT UNIQUE NOT NULL,
        description TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        added_at INTEGER NOT NULL DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER))
    );
";

fn to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(col: usize, ms: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Integer, Box::new(e)))
}

fn parse_ip(col: usize, raw: String) -> rusqlite::Result<IpAddr> {
    raw.parse::<IpAddr>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        timestamp: from_millis(0, row.get(0)?)?,
        target: parse_ip(1, row.get(1)?)?,
        bytes_sent: row.get::<_, i64>(2)? as u64,
        bytes_received: row.get::<_, i64>(3)? as u64,
        packets_sent: row.get::<_, i64>(4)? as u64,
        packets_received: row.get::<_, i64>(5)? as u64,
        link_type: LinkType::from_tag(&row.get::<_, String>(6)?),
    })
}

/// Implémentation SQLite du sink (une connexion protégée par mutex)
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Ouvre (ou crée) la base et initialise le schéma
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MonitorError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn: Mutex::new(conn) };
        store.init()?;
        info!("Sample store initialized at {:?}", path.as_ref());
        Ok(store)
    }

    /// Base en mémoire, pour les tests et les démos
    pub fn in_memory() -> Result<Self, MonitorError> {
        let store = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        store.init()?;
        Ok(store)
    }
}

impl SampleStore for SqliteStore {
    fn init(&self) -> Result<(), MonitorError> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn append(&self, sample: &Sample) -> Result<(), MonitorError> {
        let result = self.conn.lock().execute(
            "INSERT INTO bandwidth_logs
                (timestamp, ip_address, bytes_sent, bytes_received, packets_sent, packets_received, connection_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                to_millis(sample.timestamp),
                sample.target.to_string(),
                sample.bytes_sent as i64,
                sample.bytes_received as i64,
                sample.packets_sent as i64,
                sample.packets_received as i64,
                sample.link_type.as_str(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Error adding bandwidth log for {}: {}", sample.target, e);
                Err(e.into())
            }
        }
    }

    fn query(&self, target: Option<IpAddr>, since: OffsetDateTime) -> Result<Vec<Sample>, MonitorError> {
        let conn = self.conn.lock();
        let since_ms = to_millis(since);

        let samples = match target {
            Some(ip) => {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, ip_address, bytes_sent, bytes_received, packets_sent, packets_received, connection_type
                     FROM bandwidth_logs
                     WHERE ip_address = ?1 AND timestamp > ?2
                     ORDER BY timestamp DESC, id DESC",
                )?;
                let rows = stmt.query_map(params![ip.to_string(), since_ms], sample_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, ip_address, bytes_sent, bytes_received, packets_sent, packets_received, connection_type
                     FROM bandwidth_logs
                     WHERE timestamp > ?1
                     ORDER BY timestamp DESC, id DESC",
                )?;
                let rows = stmt.query_map(params![since_ms], sample_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
        };

        samples.map_err(|e| {
            error!("Error retrieving bandwidth data: {}", e);
            e.into()
        })
    }

    fn save_target(&self, target: &Target) -> Result<(), MonitorError> {
        self.conn.lock().execute(
            "INSERT INTO monitored_targets (ip_address, description, is_active, added_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(ip_address) DO UPDATE SET
                is_active = excluded.is_active,
                description = COALESCE(excluded.description, monitored_targets.description)",
            params![
                target.id.to_string(),
                target.description,
                target.active,
                to_millis(target.added_at),
            ],
        )?;
        Ok(())
    }

    fn set_target_active(&self, id: IpAddr, active: bool) -> Result<(), MonitorError> {
        self.conn.lock().execute(
            "UPDATE monitored_targets SET is_active = ?1 WHERE ip_address = ?2",
            params![active, id.to_string()],
        )?;
        Ok(())
    }

    fn active_targets(&self) -> Result<Vec<Target>, MonitorError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT ip_address, description, added_at FROM monitored_targets
             WHERE is_active = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Target {
                id: parse_ip(0, row.get(0)?)?,
                description: row.get(1)?,
                active: true,
                added_at: from_millis(2, row.get(2)?)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn prune(&self, before: OffsetDateTime) -> Result<usize, MonitorError> {
        let removed = self.conn.lock().execute(
            "DELETE FROM bandwidth_logs WHERE timestamp < ?1",
            params![to_millis(before)],
        )?;
        Ok(removed)
    }
}
