/**
 * AGGREGATOR - Fenêtres glissantes bornées et statistiques par cible
 *
 * RÔLE : Conserve l'historique récent de chaque cible (capacité fixe,
 * éviction du plus ancien) et calcule total, moyenne, pic et tendance.
 *
 * INVARIANTS :
 * - longueur d'une fenêtre <= capacité
 * - ordre d'insertion = ordre d'arrivée
 * - les lectures sont pures : aucune mutation de la fenêtre
 */

use crate::models::Sample;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

pub const DEFAULT_WINDOW_CAPACITY: usize = 100;

/// Valeurs conservées pour un échantillon dans la fenêtre
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reading {
    bytes_sent: u64,
    bytes_received: u64,
    packets_sent: u64,
    packets_received: u64,
}

/// Historique borné d'une cible
#[derive(Debug, Clone)]
pub struct Window {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: &Sample) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(Reading {
            bytes_sent: sample.bytes_sent,
            bytes_received: sample.bytes_received,
            packets_sent: sample.packets_sent,
            packets_received: sample.packets_received,
        });
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn bytes_sent(&self) -> Vec<u64> {
        self.readings.iter().map(|r| r.bytes_sent).collect()
    }

    pub fn bytes_received(&self) -> Vec<u64> {
        self.readings.iter().map(|r| r.bytes_received).collect()
    }

    pub fn packets_sent(&self) -> Vec<u64> {
        self.readings.iter().map(|r| r.packets_sent).collect()
    }

    pub fn packets_received(&self) -> Vec<u64> {
        self.readings.iter().map(|r| r.packets_received).collect()
    }

    /// Somme (envoyés, reçus) en octets
    pub fn total(&self) -> (u64, u64) {
        self.readings.iter().fold((0, 0), |(s, r), reading| {
            (s.saturating_add(reading.bytes_sent), r.saturating_add(reading.bytes_received))
        })
    }

    /// Somme (envoyés, reçus) en paquets
    pub fn total_packets(&self) -> (u64, u64) {
        self.readings.iter().fold((0, 0), |(s, r), reading| {
            (s.saturating_add(reading.packets_sent), r.saturating_add(reading.packets_received))
        })
    }

    /// Moyenne arithmétique (envoyés, reçus), (0,0) si vide
    pub fn average(&self) -> (f64, f64) {
        if self.readings.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.readings.len() as f64;
        let (sent, received) = self.readings.iter().fold((0f64, 0f64), |(s, r), reading| {
            (s + reading.bytes_sent as f64, r + reading.bytes_received as f64)
        });
        (sent / n, received / n)
    }

    /// Pic (envoyés, reçus) en octets, (0,0) si vide
    pub fn peak(&self) -> (u64, u64) {
        self.readings.iter().fold((0, 0), |(s, r), reading| {
            (s.max(reading.bytes_sent), r.max(reading.bytes_received))
        })
    }

    /// Pic (envoyés, reçus) en paquets, (0,0) si vide
    pub fn peak_packets(&self) -> (u64, u64) {
        self.readings.iter().fold((0, 0), |(s, r), reading| {
            (s.max(reading.packets_sent), r.max(reading.packets_received))
        })
    }

    /// Régression linéaire (moindres carrés) des octets envoyés sur l'index
    pub fn trend(&self) -> Trend {
        let n = self.readings.len();
        if n < 2 {
            return Trend { state: TrendState::InsufficientData, slope: 0.0 };
        }

        let n_f = n as f64;
        let mean_x = (n_f - 1.0) / 2.0;
        let mean_y = self.readings.iter().map(|r| r.bytes_sent as f64).sum::<f64>() / n_f;

        let (num, den) = self.readings.iter().enumerate().fold((0f64, 0f64), |(num, den), (i, r)| {
            let dx = i as f64 - mean_x;
            (num + dx * (r.bytes_sent as f64 - mean_y), den + dx * dx)
        });

        let slope = num / den;
        let state = if slope > 0.0 {
            TrendState::Increasing
        } else if slope < 0.0 {
            TrendState::Decreasing
        } else {
            TrendState::Stable
        };
        Trend { state, slope }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendState {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub state: TrendState,
    pub slope: f64,
}

/// Fenêtres de toutes les cibles
#[derive(Debug)]
pub struct Aggregator {
    capacity: usize,
    windows: HashMap<IpAddr, Window>,
}

impl Aggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: HashMap::new(),
        }
    }

    /// Ajoute l'échantillon à la fenêtre de sa cible (éviction du plus ancien)
    pub fn update(&mut self, sample: &Sample) {
        let capacity = self.capacity;
        self.windows
            .entry(sample.target)
            .or_insert_with(|| Window::new(capacity))
            .push(sample);
    }

    pub fn window(&self, id: &IpAddr) -> Option<&Window> {
        self.windows.get(id)
    }

    pub fn total(&self, id: &IpAddr) -> (u64, u64) {
        self.windows.get(id).map(Window::total).unwrap_or((0, 0))
    }

    pub fn average(&self, id: &IpAddr) -> (f64, f64) {
        self.windows.get(id).map(Window::average).unwrap_or((0.0, 0.0))
    }

    pub fn peak(&self, id: &IpAddr) -> (u64, u64) {
        self.windows.get(id).map(Window::peak).unwrap_or((0, 0))
    }

    pub fn trend(&self, id: &IpAddr) -> Trend {
        self.windows
            .get(id)
            .map(Window::trend)
            .unwrap_or(Trend { state: TrendState::InsufficientData, slope: 0.0 })
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinkType;
    use time::OffsetDateTime;

    fn sample(target: IpAddr, sent: u64, received: u64) -> Sample {
        Sample {
            target,
            bytes_sent: sent,
            bytes_received: received,
            packets_sent: 1,
            packets_received: 1,
            timestamp: OffsetDateTime::now_utc(),
            link_type: LinkType::Simulated,
        }
    }

    fn ip() -> IpAddr {
        "10.1.1.1".parse().unwrap()
    }

    fn feed(agg: &mut Aggregator, sent: &[u64]) {
        for &s in sent {
            agg.update(&sample(ip(), s, s * 2));
        }
    }

    #[test]
    fn test_empty_window_reads_zero() {
        let agg = Aggregator::default();
        assert_eq!(agg.total(&ip()), (0, 0));
        assert_eq!(agg.average(&ip()), (0.0, 0.0));
        assert_eq!(agg.peak(&ip()), (0, 0));
        assert_eq!(agg.trend(&ip()).state, TrendState::InsufficientData);
    }

    #[test]
    fn test_single_point_is_insufficient_data() {
        let mut agg = Aggregator::default();
        feed(&mut agg, &[500]);
        let trend = agg.trend(&ip());
        assert_eq!(trend.state, TrendState::InsufficientData);
        assert_eq!(trend.slope, 0.0);
    }

    #[test]
    fn test_total_average_peak() {
        let mut agg = Aggregator::default();
        feed(&mut agg, &[10, 20, 30, 40]);
        assert_eq!(agg.total(&ip()), (100, 200));
        assert_eq!(agg.average(&ip()), (25.0, 50.0));
        assert_eq!(agg.peak(&ip()), (40, 80));
        assert_eq!(agg.window(&ip()).unwrap().total_packets(), (4, 4));
    }

    #[test]
    fn test_window_evicts_oldest_beyond_capacity() {
        let mut agg = Aggregator::default();
        // 150 échantillons : 1..=150, seuls 51..=150 doivent rester
        let values: Vec<u64> = (1..=150).collect();
        feed(&mut agg, &values);

        let window = agg.window(&ip()).unwrap();
        assert_eq!(window.len(), DEFAULT_WINDOW_CAPACITY);
        assert_eq!(window.bytes_sent().first(), Some(&51));
        assert_eq!(window.bytes_sent().last(), Some(&150));

        let expected_sum: u64 = (51..=150).sum();
        assert_eq!(agg.total(&ip()).0, expected_sum);
        assert_eq!(agg.average(&ip()).0, expected_sum as f64 / 100.0);
        assert_eq!(agg.peak(&ip()), (150, 300));
        assert_eq!(window.total_packets(), (100, 100));
    }

    #[test]
    fn test_trend_directions() {
        let mut up = Aggregator::default();
        feed(&mut up, &[10, 20, 30, 40]);
        let trend = up.trend(&ip());
        assert_eq!(trend.state, TrendState::Increasing);
        assert!((trend.slope - 10.0).abs() < 1e-9);

        let mut down = Aggregator::default();
        feed(&mut down, &[40, 30, 20, 10]);
        assert_eq!(down.trend(&ip()).state, TrendState::Decreasing);

        let mut flat = Aggregator::default();
        feed(&mut flat, &[25, 25, 25, 25]);
        let trend = flat.trend(&ip());
        assert_eq!(trend.state, TrendState::Stable);
        assert_eq!(trend.slope, 0.0);
    }

    #[test]
    fn test_windows_are_per_target() {
        let mut agg = Aggregator::new(3);
        let other: IpAddr = "10.1.1.2".parse().unwrap();
        feed(&mut agg, &[1, 2, 3, 4]);
        agg.update(&sample(other, 7, 7));

        assert_eq!(agg.window(&ip()).unwrap().bytes_sent(), vec![2, 3, 4]);
        assert_eq!(agg.total(&other), (7, 7));

        agg.clear();
        assert!(agg.window(&ip()).is_none());
    }
}
