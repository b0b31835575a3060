/**
 * BANDWATCH KERNEL - Point d'entrée du démon de surveillance
 *
 * RÔLE : Orchestration : logs, config, sink SQLite, moniteur, MQTT, HTTP.
 * Bootstrap du système complet ; seule l'ouverture du sink est fatale.
 *
 * ARCHITECTURE : Moniteur (cœur) + API REST (présentation) + MQTT optionnel (alertes, health).
 * ARRÊT : Ctrl-C -> arrêt du serveur HTTP, puis stop du moniteur (passe en cours terminée).
 */

mod config;
mod health;
mod http;
mod logging;
mod mqtt;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;

use anyhow::{Context, Result};
use bandwatch_core::{forward_alerts, Monitor, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

const RETENTION_SWEEP_EVERY: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let log_file = std::env::var("BANDWATCH_LOG_FILE").unwrap_or_else(|_| "bandwatch.log".into());
    let _log_guard = logging::init_logging(&PathBuf::from(log_file))?;

    info!("Bandwatch kernel starting");
    let cfg = load_config().await;

    // sink : seul échec fatal du démarrage
    let store = SqliteStore::open(&cfg.monitoring.database_path)
        .with_context(|| format!("cannot open sample store {:?}", cfg.monitoring.database_path))?;

    let monitor = Monitor::new(cfg.monitor_settings(), cfg.sampler(), Arc::new(store));

    // cibles persistées, puis cibles déclarées dans la config
    if let Err(e) = monitor.restore_targets() {
        warn!("Failed to restore targets: {}", e);
    }
    for target in &cfg.targets {
        if let Err(e) = monitor.register_target(&target.ip, target.description.clone()) {
            warn!("Ignoring configured target: {}", e);
        }
    }

    monitor.spawn_retention_sweeper(cfg.monitoring.retention_hours, RETENTION_SWEEP_EVERY);

    let health_tracker = HealthTracker::new();

    // MQTT optionnel : alertes + health
    if let Some(mqtt_cfg) = &cfg.mqtt {
        let publisher = mqtt::connect(mqtt_cfg, health_tracker.clone());
        tokio::spawn(forward_alerts(
            monitor.subscribe_alerts(),
            publisher.clone(),
            mqtt_cfg.alert_topic.clone(),
        ));
        health_tracker.spawn_health_publisher(monitor.clone(), publisher, mqtt_cfg.health_topic.clone());
    } else {
        info!("MQTT not configured, alerts stay local");
    }

    if cfg.monitoring.autostart {
        if let Err(e) = monitor.start().await {
            warn!("Autostart skipped: {}", e);
        }
    }

    let app_state = AppState {
        monitor: monitor.clone(),
        health_tracker,
        export_dir: cfg.monitoring.export_dir.clone(),
        refresh_interval_secs: cfg.presentation.refresh_interval_secs,
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.presentation.listen)
        .await
        .with_context(|| format!("cannot listen on {}", cfg.presentation.listen))?;
    info!("Listening on http://{}", cfg.presentation.listen);

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!("HTTP server error: {}", e);
    }

    monitor.stop().await;
    info!("Bandwatch kernel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
