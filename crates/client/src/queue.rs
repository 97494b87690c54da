//! Empfangsseite der Kommandos: Reihenfolge und Fragmente
//!
//! Je Pakettyp (COMMAND, COMMAND_LOW) eine Queue. Pakete werden streng in
//! ID-Reihenfolge verarbeitet; vorauseilende Pakete warten im Backlog.
//!
//! ```text
//! id == erwartet        -> verarbeiten, danach Backlog abarbeiten
//! id in [erwartet, +200) -> in den Backlog (voll: Backlog leeren)
//! sonst                 -> verwerfen (Duplikat / veraltet)
//! ```
//!
//! Fragmente: das erste und das letzte Paket tragen FRAGMENTED. Erst nach
//! dem letzten wird (falls das erste COMPRESSED trug) dekomprimiert.

use tracing::{debug, warn};
use tsvoice_protocol::quicklz;
use tsvoice_protocol::{Packet, PacketFlags};

/// Maximale Anzahl wartender Pakete
pub const MAX_BACKLOG: usize = 200;

/// Obergrenze fuer ein zusammengesetztes Kommando
pub const MAX_FRAGMENT: usize = 40_960;

/// Obergrenze fuer dekomprimierte Kommandos
pub const MAX_DEKOMPRIMIERT: usize = 1024 * 1024;

#[derive(Debug, Default)]
struct Fragmentpuffer {
    daten: Vec<u8>,
    komprimiert: bool,
}

/// Reihenfolge und Fragmentierung eines Kommando-Pakettyps
#[derive(Debug, Default)]
pub struct CommandQueue {
    erwartet: u16,
    backlog: Vec<Packet>,
    fragment: Option<Fragmentpuffer>,
}

impl CommandQueue {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn erwartete_id(&self) -> u16 {
        self.erwartet
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Nimmt ein Paket an und gibt alle dadurch fertig gewordenen Nutzlasten zurueck
    pub fn annehmen(&mut self, paket: Packet) -> Vec<Vec<u8>> {
        let mut fertig = Vec::new();
        if paket.id == self.erwartet {
            self.verarbeiten(paket, &mut fertig);
            while let Some(naechstes) = self.aus_backlog() {
                self.verarbeiten(naechstes, &mut fertig);
            }
        } else if self.im_fenster(paket.id) {
            self.einreihen(paket);
        } else {
            debug!(id = paket.id, erwartet = self.erwartet, "Kommando-Paket ausserhalb des Fensters");
        }
        fertig
    }

    pub fn zuruecksetzen(&mut self) {
        *self = Self::default();
    }

    fn verarbeiten(&mut self, paket: Packet, fertig: &mut Vec<Vec<u8>>) {
        if let Some(daten) = self.fragment_behandeln(paket) {
            if !daten.is_empty() {
                fertig.push(daten);
            }
        }
        self.erwartet = self.erwartet.wrapping_add(1);
    }

    fn im_fenster(&self, id: u16) -> bool {
        id.wrapping_sub(self.erwartet) < MAX_BACKLOG as u16
    }

    fn einreihen(&mut self, paket: Packet) {
        if self.backlog.iter().any(|p| p.id == paket.id) {
            return;
        }
        if self.backlog.len() >= MAX_BACKLOG {
            warn!(eintraege = self.backlog.len(), "Kommando-Backlog voll, wird geleert");
            self.backlog.clear();
        }
        self.backlog.push(paket);
    }

    fn aus_backlog(&mut self) -> Option<Packet> {
        let pos = self.backlog.iter().position(|p| p.id == self.erwartet)?;
        Some(self.backlog.remove(pos))
    }

    fn fragment_behandeln(&mut self, paket: Packet) -> Option<Vec<u8>> {
        let fragmentiert = paket.hat_flag(PacketFlags::FRAGMENTED);
        let komprimiert = paket.hat_flag(PacketFlags::COMPRESSED);

        let Some(puffer) = self.fragment.as_mut() else {
            if !fragmentiert {
                return dekomprimieren(paket.data, komprimiert);
            }
            let puffer = Fragmentpuffer {
                daten: Vec::with_capacity(paket.data.len().clamp(64, MAX_FRAGMENT)),
                komprimiert,
            };
            self.fragment = Some(puffer);
            self.anhaengen(&paket.data);
            return None;
        };

        if puffer.daten.len() + paket.data.len() > MAX_FRAGMENT {
            warn!(
                groesse = puffer.daten.len() + paket.data.len(),
                maximum = MAX_FRAGMENT,
                "Fragmentpuffer uebergelaufen, wird verworfen"
            );
            self.fragment = None;
            return None;
        }
        puffer.daten.extend_from_slice(&paket.data);
        if !fragmentiert {
            return None;
        }
        let puffer = self.fragment.take()?;
        dekomprimieren(puffer.daten, puffer.komprimiert)
    }

    fn anhaengen(&mut self, daten: &[u8]) {
        let Some(puffer) = self.fragment.as_mut() else {
            return;
        };
        if puffer.daten.len() + daten.len() > MAX_FRAGMENT {
            warn!(groesse = daten.len(), "Erstes Fragment zu gross, wird verworfen");
            self.fragment = None;
            return;
        }
        puffer.daten.extend_from_slice(daten);
    }
}

fn dekomprimieren(daten: Vec<u8>, komprimiert: bool) -> Option<Vec<u8>> {
    if !komprimiert {
        return Some(daten);
    }
    match quicklz::decompress(&daten, MAX_DEKOMPRIMIERT) {
        Ok(entpackt) => Some(entpackt),
        Err(e) => {
            warn!(fehler = %e, groesse = daten.len(), "Kommando nicht dekomprimierbar, verworfen");
            None
        }
    }
}
