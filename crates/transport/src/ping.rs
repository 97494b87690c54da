//! Ping/Pong-Messung
//!
//! Jede Sekunde geht ein PING mit fortlaufender ID raus. Das PONG des
//! Servers traegt die ID in den ersten zwei Bytes; die Differenz zur
//! Sendezeit ergibt eine RTT-Probe. Gehalten werden nur die letzten 5.

use std::collections::{HashMap, VecDeque};

use tokio::time::Instant;

use crate::resend::PAKET_TIMEOUT;

/// Anzahl der RTT-Proben fuer Mittelwert und Abweichung
pub const PING_PROBEN: usize = 5;

/// Offene Pings, aeltere werden verworfen
const OFFENE_PINGS_MAX: usize = 64;

/// Mittlere RTT und Standardabweichung in Sekunden
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingStats {
    pub ping_sekunden: f64,
    pub abweichung_sekunden: f64,
}

/// Zaehler und Proben der Ping-Messung
#[derive(Debug, Default)]
pub struct PingTracker {
    naechste_id: u16,
    generation: u32,
    gesendet: HashMap<u16, Instant>,
    proben: VecDeque<f64>,
}

impl PingTracker {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Vergibt die naechste Ping-ID und merkt sich die Sendezeit
    pub fn naechster_ping(&mut self, jetzt: Instant) -> (u16, u32) {
        let id = self.naechste_id;
        let generation = self.generation;
        self.naechste_id = self.naechste_id.wrapping_add(1);
        if self.naechste_id == 0 {
            self.generation += 1;
        }
        if self.gesendet.len() >= OFFENE_PINGS_MAX {
            self.gesendet.clear();
        }
        self.gesendet.insert(id, jetzt);
        (id, generation)
    }

    /// Verarbeitet die Nutzdaten eines PONG, gibt die RTT in Sekunden zurueck
    pub fn pong(&mut self, daten: &[u8], jetzt: Instant) -> Option<f64> {
        let id = u16::from_be_bytes([*daten.first()?, *daten.get(1)?]);
        let gesendet = self.gesendet.remove(&id)?;
        let rtt = jetzt.duration_since(gesendet).as_secs_f64();
        self.proben.push_front(rtt);
        self.proben.truncate(PING_PROBEN);
        Some(rtt)
    }

    /// Mittelwert und Stichproben-Standardabweichung
    ///
    /// Ohne Proben gilt der Paket-Timeout als Ping.
    pub fn stats(&self) -> PingStats {
        if self.proben.is_empty() {
            return PingStats {
                ping_sekunden: PAKET_TIMEOUT.as_secs_f64(),
                abweichung_sekunden: 0.0,
            };
        }
        let n = self.proben.len() as f64;
        let mittel = self.proben.iter().sum::<f64>() / n;
        let abweichung = if self.proben.len() > 1 {
            let varianz = self.proben.iter().map(|p| (p - mittel).powi(2)).sum::<f64>();
            (varianz / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        PingStats {
            ping_sekunden: mittel,
            abweichung_sekunden: abweichung,
        }
    }

    pub fn zuruecksetzen(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ohne_proben_gilt_timeout() {
        let t = PingTracker::neu();
        assert_eq!(
            t.stats(),
            PingStats {
                ping_sekunden: 30.0,
                abweichung_sekunden: 0.0
            }
        );
    }

    #[test]
    fn rtt_aus_pong() {
        let mut t = PingTracker::neu();
        let t0 = Instant::now();
        let (id, gen) = t.naechster_ping(t0);
        assert_eq!((id, gen), (0, 0));
        let rtt = t.pong(&id.to_be_bytes(), t0 + Duration::from_millis(40)).unwrap();
        assert!((rtt - 0.040).abs() < 1e-9);
        // Doppeltes PONG wird ignoriert
        assert!(t.pong(&id.to_be_bytes(), t0 + Duration::from_millis(50)).is_none());
        assert!(t.pong(&[0], t0).is_none());
        let s = t.stats();
        assert!((s.ping_sekunden - 0.040).abs() < 1e-9);
        assert_eq!(s.abweichung_sekunden, 0.0);
    }

    #[test]
    fn nur_letzte_fuenf_proben() {
        let mut t = PingTracker::neu();
        let t0 = Instant::now();
        for ms in [1000u64, 10, 20, 30, 40, 50] {
            let (id, _) = t.naechster_ping(t0);
            t.pong(&id.to_be_bytes(), t0 + Duration::from_millis(ms));
        }
        let s = t.stats();
        assert!((s.ping_sekunden - 0.030).abs() < 1e-9);
        // Stichprobenabweichung von 10..50 ms
        assert!((s.abweichung_sekunden - 0.015_811_388).abs() < 1e-6);
    }

    #[test]
    fn id_umlauf_erhoeht_generation() {
        let mut t = PingTracker::neu();
        t.naechste_id = u16::MAX;
        let t0 = Instant::now();
        assert_eq!(t.naechster_ping(t0), (u16::MAX, 0));
        assert_eq!(t.naechster_ping(t0), (0, 1));
    }
}
