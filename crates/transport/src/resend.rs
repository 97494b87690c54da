//! Zuverlaessige Zustellung: unbestaetigte Pakete erneut senden
//!
//! COMMAND und COMMAND_LOW werden bis zum ACK gehalten, von INIT1 immer nur
//! das zuletzt gesendete Paket. Der Sweep laeuft jede Sekunde:
//!
//! ```text
//! alter seit erstem Senden  > 30s  -> Verbindung abbrechen
//! alter seit letztem Senden >= 1s  -> erneut senden
//! ```

use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tsvoice_protocol::PacketType;

/// Gesamtlebensdauer eines unbestaetigten Pakets
pub const PAKET_TIMEOUT: Duration = Duration::from_secs(30);

/// Abstand zwischen zwei Sendeversuchen
pub const RESEND_INTERVALL: Duration = Duration::from_secs(1);

/// Ein ausstehendes, noch nicht bestaetigtes Paket
#[derive(Debug, Clone)]
pub struct ResendEntry {
    pub raw: Vec<u8>,
    pub erstmals_gesendet: Instant,
    pub zuletzt_gesendet: Instant,
    pub id: u16,
    pub packet_type: PacketType,
}

impl ResendEntry {
    pub fn neu(packet_type: PacketType, id: u16, raw: Vec<u8>, jetzt: Instant) -> Self {
        Self {
            raw,
            erstmals_gesendet: jetzt,
            zuletzt_gesendet: jetzt,
            id,
            packet_type,
        }
    }
}

/// Ergebnis eines Sweeps
#[derive(Debug, Default)]
pub struct SweepErgebnis {
    /// Pakete, deren letzter Versuch mindestens eine Sekunde zurueckliegt
    pub erneut: Vec<ResendEntry>,
    /// Erstes Paket, das die Gesamtlebensdauer ueberschritten hat
    pub abgelaufen: Option<ResendEntry>,
}

/// Alle ausstehenden Pakete einer Verbindung
#[derive(Debug, Default)]
pub struct ResendSpeicher {
    command: DashMap<u16, ResendEntry>,
    command_low: DashMap<u16, ResendEntry>,
    init1: Mutex<Option<ResendEntry>>,
}

impl ResendSpeicher {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Merkt sich ein gerade gesendetes Paket, falls sein Typ zuverlaessig ist
    pub fn merken(&self, packet_type: PacketType, id: u16, raw: &[u8], jetzt: Instant) {
        let eintrag = || ResendEntry::neu(packet_type, id, raw.to_vec(), jetzt);
        match packet_type {
            PacketType::Command => {
                self.command.insert(id, eintrag());
            }
            PacketType::CommandLow => {
                self.command_low.insert(id, eintrag());
            }
            PacketType::Init1 => {
                *self.init1.lock() = Some(eintrag());
            }
            _ => {}
        }
    }

    /// Entfernt ein per ACK (bzw. ACK_LOW) bestaetigtes Paket
    pub fn bestaetigen(&self, ack_typ: PacketType, id: u16) -> bool {
        let map = match ack_typ {
            PacketType::Ack => &self.command,
            PacketType::AckLow => &self.command_low,
            _ => return false,
        };
        map.remove(&id).is_some()
    }

    /// Das INIT1-Paket braucht nach Abschluss des Handshakes keine Wiederholung mehr
    pub fn init1_verwerfen(&self) {
        *self.init1.lock() = None;
    }

    pub fn ausstehend(&self) -> usize {
        self.command.len() + self.command_low.len() + usize::from(self.init1.lock().is_some())
    }

    pub fn leeren(&self) {
        self.command.clear();
        self.command_low.clear();
        self.init1_verwerfen();
    }

    /// Sucht faellige und abgelaufene Pakete
    ///
    /// Bei einem abgelaufenen Paket bricht der Sweep sofort ab, da die
    /// Verbindung ohnehin beendet wird.
    pub fn sweep(&self, jetzt: Instant) -> SweepErgebnis {
        let mut ergebnis = SweepErgebnis::default();
        let init1 = self.init1.lock().clone();
        let alle = self
            .command
            .iter()
            .map(|e| e.value().clone())
            .chain(self.command_low.iter().map(|e| e.value().clone()))
            .chain(init1);

        for eintrag in alle {
            if jetzt.duration_since(eintrag.erstmals_gesendet) > PAKET_TIMEOUT {
                ergebnis.abgelaufen = Some(eintrag);
                return ergebnis;
            }
            if jetzt.duration_since(eintrag.zuletzt_gesendet) >= RESEND_INTERVALL {
                ergebnis.erneut.push(eintrag);
            }
        }
        ergebnis
    }

    /// Vermerkt einen erfolgreichen erneuten Versand
    pub fn gesendet(&self, packet_type: PacketType, id: u16, jetzt: Instant) {
        match packet_type {
            PacketType::Command => {
                if let Some(mut e) = self.command.get_mut(&id) {
                    e.zuletzt_gesendet = jetzt;
                }
            }
            PacketType::CommandLow => {
                if let Some(mut e) = self.command_low.get_mut(&id) {
                    e.zuletzt_gesendet = jetzt;
                }
            }
            PacketType::Init1 => {
                if let Some(e) = self.init1.lock().as_mut().filter(|e| e.id == id) {
                    e.zuletzt_gesendet = jetzt;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sekunden(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn nur_zuverlaessige_typen_werden_gemerkt() {
        let s = ResendSpeicher::neu();
        let t0 = Instant::now();
        s.merken(PacketType::Voice, 1, b"v", t0);
        s.merken(PacketType::Ping, 2, b"p", t0);
        s.merken(PacketType::Ack, 3, b"a", t0);
        assert_eq!(s.ausstehend(), 0);
        s.merken(PacketType::Command, 1, b"c", t0);
        s.merken(PacketType::CommandLow, 1, b"l", t0);
        s.merken(PacketType::Init1, 0, b"i", t0);
        s.merken(PacketType::Init1, 1, b"j", t0);
        assert_eq!(s.ausstehend(), 3);
    }

    #[test]
    fn ack_entfernt_passenden_eintrag() {
        let s = ResendSpeicher::neu();
        let t0 = Instant::now();
        s.merken(PacketType::Command, 4, b"c", t0);
        s.merken(PacketType::CommandLow, 4, b"l", t0);
        assert!(!s.bestaetigen(PacketType::Ack, 5));
        assert!(s.bestaetigen(PacketType::Ack, 4));
        assert_eq!(s.ausstehend(), 1);
        assert!(s.bestaetigen(PacketType::AckLow, 4));
        assert!(!s.bestaetigen(PacketType::Pong, 4));
        assert_eq!(s.ausstehend(), 0);
    }

    #[test]
    fn erneut_senden_jede_sekunde_und_abbruch_nach_30s() {
        let s = ResendSpeicher::neu();
        let t0 = Instant::now();
        s.merken(PacketType::Command, 9, b"cmd", t0);

        assert!(s.sweep(t0 + Duration::from_millis(999)).erneut.is_empty());

        let mut versuche = 0;
        for n in 1..=30 {
            let jetzt = t0 + sekunden(n);
            let ergebnis = s.sweep(jetzt);
            assert!(ergebnis.abgelaufen.is_none(), "t={n}s");
            assert_eq!(ergebnis.erneut.len(), 1, "t={n}s");
            assert_eq!(ergebnis.erneut[0].raw, b"cmd");
            s.gesendet(PacketType::Command, 9, jetzt);
            versuche += 1;

            // Innerhalb derselben Sekunde nicht nochmal
            assert!(s.sweep(jetzt + Duration::from_millis(500)).erneut.is_empty());
        }
        assert_eq!(versuche, 30);

        let ende = s.sweep(t0 + sekunden(30) + Duration::from_millis(1));
        let abgelaufen = ende.abgelaufen.expect("muss nach 30s ablaufen");
        assert_eq!(abgelaufen.id, 9);
        assert_eq!(abgelaufen.packet_type, PacketType::Command);
    }

    #[test]
    fn init1_wird_ersetzt_und_verworfen() {
        let s = ResendSpeicher::neu();
        let t0 = Instant::now();
        s.merken(PacketType::Init1, 0, b"schritt0", t0);
        s.merken(PacketType::Init1, 1, b"schritt2", t0 + sekunden(1));

        let ergebnis = s.sweep(t0 + sekunden(2));
        assert_eq!(ergebnis.erneut.len(), 1);
        assert_eq!(ergebnis.erneut[0].raw, b"schritt2");

        // Veraltete ID aktualisiert den Zeitstempel nicht
        s.gesendet(PacketType::Init1, 0, t0 + sekunden(2));
        assert_eq!(s.sweep(t0 + sekunden(2)).erneut.len(), 1);

        s.init1_verwerfen();
        assert_eq!(s.ausstehend(), 0);
        assert!(s.sweep(t0 + sekunden(60)).abgelaufen.is_none());
    }

    #[test]
    fn leeren_entfernt_alles() {
        let s = ResendSpeicher::neu();
        let t0 = Instant::now();
        s.merken(PacketType::Command, 1, b"c", t0);
        s.merken(PacketType::Init1, 0, b"i", t0);
        s.leeren();
        assert_eq!(s.ausstehend(), 0);
    }
}
