/**
 * REGISTRY - Catalogue des cibles surveillées
 *
 * RÔLE : Associe chaque adresse IP surveillée à son état actif/en pause.
 * Composant feuille : aucune dépendance, aucun effet de bord hors de sa map.
 *
 * RÈGLES :
 * - seules les IPv4/IPv6 syntaxiquement valides sont acceptées
 * - ajout idempotent (un doublon ne change rien)
 * - retrait d'une cible inconnue = no-op
 */

use crate::error::MonitorError;
use crate::models::{parse_target_id, Target};
use std::collections::BTreeMap;
use std::net::IpAddr;

#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<IpAddr, Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre une cible. Retourne `true` si l'état a changé
    /// (nouvelle cible ou cible en pause réactivée).
    pub fn register(&mut self, raw_id: &str) -> Result<bool, MonitorError> {
        let id = parse_target_id(raw_id)?;
        Ok(self.insert(Target::new(id)))
    }

    /// Insère une cible déjà validée (restauration depuis le sink, config)
    pub fn insert(&mut self, target: Target) -> bool {
        match self.targets.get_mut(&target.id) {
            Some(existing) if existing.active => false,
            Some(existing) => {
                existing.active = true;
                if target.description.is_some() {
                    existing.description = target.description;
                }
                true
            }
            None => {
                self.targets.insert(target.id, target);
                true
            }
        }
    }

    /// Retire une cible. Retourne la cible retirée, `None` si inconnue.
    pub fn unregister(&mut self, id: &IpAddr) -> Option<Target> {
        self.targets.remove(id)
    }

    /// Met une cible en pause ou la réactive sans l'oublier
    pub fn set_active(&mut self, id: &IpAddr, active: bool) -> bool {
        match self.targets.get_mut(id) {
            Some(target) if target.active != active => {
                target.active = active;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &IpAddr) -> Option<&Target> {
        self.targets.get(id)
    }

    /// Ensemble des cibles actives, triées par adresse
    pub fn list_active(&self) -> Vec<IpAddr> {
        self.targets
            .values()
            .filter(|t| t.active)
            .map(|t| t.id)
            .collect()
    }

    /// Toutes les cibles connues (actives ou en pause)
    pub fn list_targets(&self) -> Vec<Target> {
        self.targets.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
