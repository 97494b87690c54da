//! Verkehrsstatistik je Verkehrsklasse
//!
//! Neben den Gesamtsummen haelt jede Klasse die Datenpunkte der letzten
//! 60 Sekunden. Daraus ergeben sich die Bandbreiten fuer `setconnectioninfo`.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tsvoice_protocol::{PacketKind, PacketType};

/// Laenge des gleitenden Fensters
pub const STATISTIK_FENSTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Datenpunkt {
    zeit: Instant,
    bytes: u64,
}

/// Zaehler einer Verkehrsklasse
#[derive(Debug, Default, Clone)]
pub struct PacketStatistics {
    pub gesendete_pakete: u64,
    pub gesendete_bytes: u64,
    pub empfangene_pakete: u64,
    pub empfangene_bytes: u64,
    gesendet: VecDeque<Datenpunkt>,
    empfangen: VecDeque<Datenpunkt>,
}

impl PacketStatistics {
    pub fn ausgehend(&mut self, bytes: usize, jetzt: Instant) {
        self.gesendete_pakete += 1;
        self.gesendete_bytes += bytes as u64;
        Self::hinzufuegen(&mut self.gesendet, bytes, jetzt);
    }

    pub fn eingehend(&mut self, bytes: usize, jetzt: Instant) {
        self.empfangene_pakete += 1;
        self.empfangene_bytes += bytes as u64;
        Self::hinzufuegen(&mut self.empfangen, bytes, jetzt);
    }

    pub fn gesendet_letzte_sekunde(&self, jetzt: Instant) -> u64 {
        summe_seit(&self.gesendet, jetzt, Duration::from_secs(1))
    }

    pub fn gesendet_letzte_minute(&self, jetzt: Instant) -> u64 {
        summe_seit(&self.gesendet, jetzt, STATISTIK_FENSTER)
    }

    pub fn empfangen_letzte_sekunde(&self, jetzt: Instant) -> u64 {
        summe_seit(&self.empfangen, jetzt, Duration::from_secs(1))
    }

    pub fn empfangen_letzte_minute(&self, jetzt: Instant) -> u64 {
        summe_seit(&self.empfangen, jetzt, STATISTIK_FENSTER)
    }

    fn hinzufuegen(punkte: &mut VecDeque<Datenpunkt>, bytes: usize, jetzt: Instant) {
        punkte.push_back(Datenpunkt {
            zeit: jetzt,
            bytes: bytes as u64,
        });
        while let Some(erster) = punkte.front() {
            if jetzt.duration_since(erster.zeit) > STATISTIK_FENSTER {
                punkte.pop_front();
            } else {
                break;
            }
        }
    }
}

fn summe_seit(punkte: &VecDeque<Datenpunkt>, jetzt: Instant, fenster: Duration) -> u64 {
    punkte
        .iter()
        .rev()
        .take_while(|p| jetzt.duration_since(p.zeit) <= fenster)
        .map(|p| p.bytes)
        .sum()
}

/// Statistik aller drei Verkehrsklassen
#[derive(Debug, Default, Clone)]
pub struct Verkehrsstatistik {
    keepalive: PacketStatistics,
    speech: PacketStatistics,
    control: PacketStatistics,
}

impl Verkehrsstatistik {
    pub fn klasse(&self, art: PacketKind) -> &PacketStatistics {
        match art {
            PacketKind::Keepalive => &self.keepalive,
            PacketKind::Speech => &self.speech,
            PacketKind::Control => &self.control,
        }
    }

    fn klasse_mut(&mut self, art: PacketKind) -> &mut PacketStatistics {
        match art {
            PacketKind::Keepalive => &mut self.keepalive,
            PacketKind::Speech => &mut self.speech,
            PacketKind::Control => &mut self.control,
        }
    }

    pub fn ausgehend(&mut self, packet_type: PacketType, bytes: usize, jetzt: Instant) {
        self.klasse_mut(packet_type.art()).ausgehend(bytes, jetzt);
    }

    pub fn eingehend(&mut self, packet_type: PacketType, bytes: usize, jetzt: Instant) {
        self.klasse_mut(packet_type.art()).eingehend(bytes, jetzt);
    }
}
