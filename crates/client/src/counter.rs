//! Ausgehende Paket-IDs je Pakettyp

use tsvoice_protocol::PacketType;

/// INIT1-Pakete tragen immer diese ID
pub const INIT1_PAKET_ID: u16 = 101;

/// ID- und Generationszaehler fuer alle Pakettypen
///
/// Laeuft eine ID ueber, beginnt sie bei 0 und die Generation steigt.
#[derive(Debug, Clone)]
pub struct PacketCounter {
    ids: [u16; 9],
    generationen: [u32; 9],
}

impl Default for PacketCounter {
    fn default() -> Self {
        Self::neu()
    }
}

impl PacketCounter {
    pub fn neu() -> Self {
        let mut zaehler = Self {
            ids: [0; 9],
            generationen: [0; 9],
        };
        zaehler.zuruecksetzen();
        zaehler
    }

    /// Ausgangszustand einer neuen Verbindung: COMMAND beginnt bei 1
    ///
    /// Die ID 0 belegt serverseitig das `clientinitiv` im INIT1-Handshake.
    pub fn zuruecksetzen(&mut self) {
        self.ids = [0; 9];
        self.generationen = [0; 9];
        self.ids[PacketType::Command as usize] = 1;
    }

    /// Vergibt ID und Generation fuer das naechste Paket eines Typs
    pub fn naechster(&mut self, typ: PacketType) -> (u16, u32) {
        if typ == PacketType::Init1 {
            return (INIT1_PAKET_ID, 0);
        }
        let i = typ as usize;
        let id = self.ids[i];
        let generation = self.generationen[i];
        self.ids[i] = id.wrapping_add(1);
        if self.ids[i] == 0 {
            self.generationen[i] = generation.wrapping_add(1);
        }
        (id, generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startwerte() {
        let mut z = PacketCounter::neu();
        assert_eq!(z.naechster(PacketType::Command), (1, 0));
        assert_eq!(z.naechster(PacketType::Command), (2, 0));
        assert_eq!(z.naechster(PacketType::CommandLow), (0, 0));
        assert_eq!(z.naechster(PacketType::Voice), (0, 0));
        assert_eq!(z.naechster(PacketType::Ack), (0, 0));
    }

    #[test]
    fn init1_hat_feste_id() {
        let mut z = PacketCounter::neu();
        assert_eq!(z.naechster(PacketType::Init1), (101, 0));
        assert_eq!(z.naechster(PacketType::Init1), (101, 0));
    }

    #[test]
    fn ueberlauf_erhoeht_generation() {
        let mut z = PacketCounter::neu();
        z.ids[PacketType::Voice as usize] = u16::MAX;
        assert_eq!(z.naechster(PacketType::Voice), (u16::MAX, 0));
        assert_eq!(z.naechster(PacketType::Voice), (0, 1));
        assert_eq!(z.naechster(PacketType::Voice), (1, 1));
    }

    #[test]
    fn zuruecksetzen() {
        let mut z = PacketCounter::neu();
        for _ in 0..10 {
            z.naechster(PacketType::Pong);
        }
        z.zuruecksetzen();
        assert_eq!(z.naechster(PacketType::Pong), (0, 0));
        assert_eq!(z.naechster(PacketType::Command), (1, 0));
    }
}
