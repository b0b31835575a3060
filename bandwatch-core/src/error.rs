use std::net::IpAddr;

/// Erreurs possibles lors des opérations du cœur de surveillance
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Identifiant rejeté à la frontière du registre (IP mal formée)
    #[error("Invalid target: {0:?} is not an IPv4/IPv6 address")]
    InvalidTarget(String),
    /// Démarrage demandé sans aucune cible active
    #[error("No active target registered, monitoring not started")]
    EmptyTargetSet,
    #[error("Persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),
}

/// Erreurs des backends d'échantillonnage
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// La cible n'est pas mesurable par ce backend (ex: IP non locale)
    #[error("Target {0} cannot be sampled by this backend")]
    Unsupported(IpAddr),
    #[error("Counters unavailable: {0}")]
    Unavailable(String),
}
