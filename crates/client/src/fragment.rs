//! Aufteilen ausgehender Kommandos auf Pakete
//!
//! ```text
//! laenge <= budget            -> 1 Paket, NEW_PROTOCOL
//! laenge >  budget            -> QuickLZ Level 1 versuchen, nur wenn kleiner
//! komprimiert <= budget       -> 1 Paket, NEW_PROTOCOL | COMPRESSED
//! sonst Stuecke zu je budget  -> erstes und letztes mit FRAGMENTED,
//!                                COMPRESSED nur am ersten
//! ```

use tsvoice_protocol::quicklz::{self, Level};
use tsvoice_protocol::{Direction, PacketFlags};

/// Maximale Groesse eines Kommando-Pakets ohne MAC
pub const MAX_PACKET_SIZE: usize = 500;

/// Nutzdaten pro COMMAND-Paket
pub const BEFEHL_BUDGET: usize = MAX_PACKET_SIZE - Direction::ClientToServer.header_len();

/// Nutzdaten und Flags eines einzelnen COMMAND-Pakets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BefehlsFragment {
    pub daten: Vec<u8>,
    pub flags: PacketFlags,
}

/// Teilt eine Kommando-Nutzlast in Pakete auf
///
/// Eine leere Nutzlast ergibt ein leeres Paket.
pub fn fragmentieren(nutzlast: &[u8], budget: usize) -> Vec<BefehlsFragment> {
    let budget = budget.max(1);

    let mut daten = nutzlast;
    let komprimiert_puffer;
    let mut komprimiert = false;
    if nutzlast.len() > budget {
        komprimiert_puffer = quicklz::compress(nutzlast, Level::Eins);
        if komprimiert_puffer.len() < nutzlast.len() {
            daten = &komprimiert_puffer;
            komprimiert = true;
        }
    }

    if daten.len() <= budget {
        let flags = if komprimiert {
            PacketFlags::NEW_PROTOCOL | PacketFlags::COMPRESSED
        } else {
            PacketFlags::NEW_PROTOCOL
        };
        return vec![BefehlsFragment {
            daten: daten.to_vec(),
            flags,
        }];
    }

    let anzahl = daten.len().div_ceil(budget);
    daten
        .chunks(budget)
        .enumerate()
        .map(|(i, stueck)| {
            let mut flags = PacketFlags::NEW_PROTOCOL;
            if i == 0 || i == anzahl - 1 {
                flags = flags | PacketFlags::FRAGMENTED;
            }
            if komprimiert && i == 0 {
                flags = flags | PacketFlags::COMPRESSED;
            }
            BefehlsFragment {
                daten: stueck.to_vec(),
                flags,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministische, nicht komprimierbare Bytes
    fn rauschen(n: usize) -> Vec<u8> {
        let mut x: u32 = 0x1234_5678;
        (0..n)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                (x >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn budget_ist_500_minus_header() {
        assert_eq!(BEFEHL_BUDGET, 495);
    }

    #[test]
    fn genau_budget_ein_paket() {
        let daten = rauschen(BEFEHL_BUDGET);
        let fragmente = fragmentieren(&daten, BEFEHL_BUDGET);
        assert_eq!(fragmente.len(), 1);
        assert_eq!(fragmente[0].flags, PacketFlags::NEW_PROTOCOL);
        assert!(!fragmente[0].flags.hat(PacketFlags::FRAGMENTED));
        assert_eq!(fragmente[0].daten, daten);
    }

    #[test]
    fn budget_plus_eins_wird_fragmentiert() {
        let daten = rauschen(BEFEHL_BUDGET + 1);
        let fragmente = fragmentieren(&daten, BEFEHL_BUDGET);
        assert_eq!(fragmente.len(), 2);
        assert!(fragmente[0].flags.hat(PacketFlags::FRAGMENTED));
        assert!(fragmente[1].flags.hat(PacketFlags::FRAGMENTED));
        assert!(fragmente.iter().all(|f| f.flags.hat(PacketFlags::NEW_PROTOCOL)));
        assert!(fragmente.iter().all(|f| !f.flags.hat(PacketFlags::COMPRESSED)));
        assert_eq!(fragmente[0].daten.len(), BEFEHL_BUDGET);
        assert_eq!(fragmente[1].daten.len(), 1);
    }

    #[test]
    fn mittlere_stuecke_ohne_flags() {
        let daten = rauschen(BEFEHL_BUDGET * 3 + 10);
        let fragmente = fragmentieren(&daten, BEFEHL_BUDGET);
        assert_eq!(fragmente.len(), 4);
        assert!(fragmente[0].flags.hat(PacketFlags::FRAGMENTED));
        assert_eq!(fragmente[1].flags, PacketFlags::NEW_PROTOCOL);
        assert_eq!(fragmente[2].flags, PacketFlags::NEW_PROTOCOL);
        assert!(fragmente[3].flags.hat(PacketFlags::FRAGMENTED));
        let zusammen: Vec<u8> = fragmente.iter().flat_map(|f| f.daten.clone()).collect();
        assert_eq!(zusammen, daten);
    }

    #[test]
    fn komprimierbares_passt_in_ein_paket() {
        let text = "channellist ".repeat(100);
        let fragmente = fragmentieren(text.as_bytes(), BEFEHL_BUDGET);
        assert_eq!(fragmente.len(), 1);
        assert!(fragmente[0].flags.hat(PacketFlags::COMPRESSED));
        let entpackt = quicklz::decompress(&fragmente[0].daten, 1 << 20).unwrap();
        assert_eq!(entpackt, text.as_bytes());
    }

    #[test]
    fn komprimiert_und_fragmentiert() {
        // Halb Rauschen, halb Wiederholung: kleiner, aber nicht klein genug
        let mut daten = rauschen(1500);
        daten.extend(std::iter::repeat(b'a').take(1500));
        let fragmente = fragmentieren(&daten, BEFEHL_BUDGET);
        assert!(fragmente.len() >= 2);
        assert!(fragmente[0].flags.hat(PacketFlags::COMPRESSED));
        assert!(fragmente[1..].iter().all(|f| !f.flags.hat(PacketFlags::COMPRESSED)));

        let zusammen: Vec<u8> = fragmente.iter().flat_map(|f| f.daten.clone()).collect();
        assert_eq!(quicklz::decompress(&zusammen, 1 << 20).unwrap(), daten);
    }

    #[test]
    fn leere_nutzlast() {
        let fragmente = fragmentieren(&[], BEFEHL_BUDGET);
        assert_eq!(fragmente.len(), 1);
        assert!(fragmente[0].daten.is_empty());
    }
}
