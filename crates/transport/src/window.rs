//! Empfangsfenster und Generationsaufloesung
//!
//! Pro Pakettyp merkt sich der Empfaenger die naechste erwartete ID und die
//! aktuelle Generation. Eine ID liegt im Fenster, wenn sie unter den naechsten
//! 0x8000 IDs ab der erwarteten liegt (modulo 65536).
//!
//! ```text
//!  erwartet E                      E + 0x8000
//!      |-------- im Fenster ---------|------- alt -------|
//!      0x0000 ................................... 0xFFFF
//! ```
//!
//! Ueberschreitet das Fenster 0xFFFF, gehoeren IDs hinter dem Umlauf zur
//! naechsten Generation.

use tsvoice_protocol::PacketType;

/// Groesse des Empfangsfensters in IDs
pub const FENSTER_GROESSE: u32 = 0x8000;

const TYPEN: usize = PacketType::ALLE.len();

/// Ergebnis der Aufloesung einer eingehenden Paket-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EingangsInfo {
    pub generation: u32,
    pub im_fenster: bool,
}

/// Erwartete ID und Generation je Pakettyp
#[derive(Debug, Clone, Default)]
pub struct EmpfangsFenster {
    naechste_id: [u16; TYPEN],
    generation: [u32; TYPEN],
}

impl EmpfangsFenster {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Naechste erwartete ID eines Typs
    pub fn naechste_id(&self, packet_type: PacketType) -> u16 {
        self.naechste_id[packet_type as usize]
    }

    /// Aktuelle Generation eines Typs
    pub fn generation(&self, packet_type: PacketType) -> u32 {
        self.generation[packet_type as usize]
    }

    /// Bestimmt Generation und Fensterzugehoerigkeit einer ID
    ///
    /// INIT1 hat keine Generationen und liegt immer im Fenster.
    pub fn aufloesen(&self, packet_type: PacketType, id: u16) -> EingangsInfo {
        if packet_type == PacketType::Init1 {
            return EingangsInfo {
                generation: 0,
                im_fenster: true,
            };
        }

        let erwartet = u32::from(self.naechste_id(packet_type));
        let generation = self.generation(packet_type);
        let id = u32::from(id);
        let grenze = (erwartet + FENSTER_GROESSE) & 0xFFFF;
        let umlauf = erwartet + FENSTER_GROESSE > 0xFFFF;

        let im_fenster = if umlauf {
            id >= erwartet || id < grenze
        } else {
            id >= erwartet && id < grenze
        };

        let generation = if im_fenster {
            if umlauf && id < grenze {
                generation + 1
            } else {
                generation
            }
        } else if id < erwartet {
            generation
        } else {
            generation.saturating_sub(1)
        };

        EingangsInfo {
            generation,
            im_fenster,
        }
    }

    /// Schiebt das Fenster hinter ein angenommenes Paket
    pub fn vorruecken(&mut self, packet_type: PacketType, id: u16, generation: u32) {
        if packet_type == PacketType::Init1 {
            return;
        }
        let idx = packet_type as usize;
        self.naechste_id[idx] = id.wrapping_add(1);
        self.generation[idx] = if id == u16::MAX {
            generation + 1
        } else {
            generation
        };
    }

    pub fn zuruecksetzen(&mut self) {
        *self = Self::default();
    }
}
