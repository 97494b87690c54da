//! Paket-Framing (UDP)
//!
//! Jedes Datagramm beginnt mit einem 8-Byte-MAC, gefolgt von einem Header
//! dessen Laenge von der Richtung abhaengt, und den (verschluesselten) Nutzdaten.
//!
//! ## Paketformat (big-endian)
//!
//! ```text
//! Client -> Server (Header = 5 Bytes)
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       8   MAC / Tag
//!  8       2   Paket-ID
//! 10       2   Client-ID
//! 12       1   Typ (untere 4 Bit) | Flags (obere 4 Bit)
//! 13+      N   Nutzdaten
//!
//! Server -> Client (Header = 3 Bytes)
//!  0       8   MAC / Tag
//!  8       2   Paket-ID
//! 10       1   Typ | Flags
//! 11+      N   Nutzdaten
//! ```
//!
//! Die Generation (Anzahl der Umlaeufe des 16-Bit-ID-Raums) wird nicht
//! uebertragen, sondern von beiden Seiten mitgezaehlt.

use crate::error::{ProtokollFehler, ProtokollResult};

/// Laenge des MAC-Felds vor dem Header
pub const MAC_LEN: usize = 8;

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// Pakettyp (untere 4 Bit des Typ-Bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketType {
    Voice = 0,
    VoiceWhisper = 1,
    Command = 2,
    CommandLow = 3,
    Ping = 4,
    Pong = 5,
    Ack = 6,
    AckLow = 7,
    Init1 = 8,
}

impl PacketType {
    /// Alle Typen in Reihenfolge ihres Zahlenwerts
    pub const ALLE: [PacketType; 9] = [
        Self::Voice,
        Self::VoiceWhisper,
        Self::Command,
        Self::CommandLow,
        Self::Ping,
        Self::Pong,
        Self::Ack,
        Self::AckLow,
        Self::Init1,
    ];

    /// Konvertiert ein Byte in einen `PacketType`.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALLE.get(byte as usize).copied()
    }

    /// Verkehrsklasse fuer die Statistik
    pub fn art(self) -> PacketKind {
        match self {
            Self::Ping | Self::Pong => PacketKind::Keepalive,
            Self::Voice | Self::VoiceWhisper => PacketKind::Speech,
            _ => PacketKind::Control,
        }
    }

    /// Typen die bis zur Bestaetigung wiederholt gesendet werden
    pub fn ist_zuverlaessig(self) -> bool {
        matches!(self, Self::Command | Self::CommandLow | Self::Init1)
    }
}

// ---------------------------------------------------------------------------
// PacketFlags
// ---------------------------------------------------------------------------

/// Flag-Nibble (obere 4 Bit des Typ-Bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PacketFlags(pub u8);

impl PacketFlags {
    pub const KEINE: PacketFlags = PacketFlags(0x00);
    /// Erstes bzw. letztes Fragment eines Kommandos
    pub const FRAGMENTED: PacketFlags = PacketFlags(0x10);
    pub const NEW_PROTOCOL: PacketFlags = PacketFlags(0x20);
    /// Nutzdaten sind QuickLZ-komprimiert
    pub const COMPRESSED: PacketFlags = PacketFlags(0x40);
    /// Nur Fake-MAC, keine AEAD-Verschluesselung
    pub const UNENCRYPTED: PacketFlags = PacketFlags(0x80);

    /// Prueft ob alle Bits von `flag` gesetzt sind
    pub fn hat(self, flag: PacketFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Gibt eine Kopie mit zusaetzlich gesetztem `flag` zurueck
    pub fn mit(self, flag: PacketFlags) -> Self {
        Self(self.0 | flag.0)
    }
}

impl std::ops::BitOr for PacketFlags {
    type Output = PacketFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.mit(rhs)
    }
}

// ---------------------------------------------------------------------------
// Direction / PacketKind
// ---------------------------------------------------------------------------

/// Senderichtung eines Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    /// Header-Laenge ohne MAC
    pub const fn header_len(self) -> usize {
        match self {
            Self::ClientToServer => 5,
            Self::ServerToClient => 3,
        }
    }
}

/// Verkehrsklasse fuer Statistik und `setconnectioninfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Keepalive,
    Speech,
    Control,
}

impl PacketKind {
    pub const ALLE: [PacketKind; 3] = [Self::Keepalive, Self::Speech, Self::Control];

    /// Bezeichner in den Parametern von `setconnectioninfo`
    pub fn label(self) -> &'static str {
        match self {
            Self::Keepalive => "keepalive",
            Self::Speech => "speech",
            Self::Control => "control",
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// Ein einzelnes Protokoll-Paket
///
/// `raw` ist erst nach dem Kodieren bzw. Verschluesseln gueltig,
/// `data` erst nach dem Dekodieren bzw. Entschluesseln.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub direction: Direction,
    pub packet_type: PacketType,
    pub flags: PacketFlags,
    pub id: u16,
    /// Umlaufzaehler des ID-Raums (nicht uebertragen)
    pub generation: u32,
    /// Nur bei Client -> Server im Header enthalten
    pub client_id: u16,
    pub data: Vec<u8>,
    pub raw: Vec<u8>,
}

impl Packet {
    /// Erstellt ein ausgehendes Paket ohne ID (wird vom Zaehler vergeben)
    pub fn neu(packet_type: PacketType, flags: PacketFlags, data: Vec<u8>) -> Self {
        Self {
            direction: Direction::ClientToServer,
            packet_type,
            flags,
            id: 0,
            generation: 0,
            client_id: 0,
            data,
            raw: Vec::new(),
        }
    }

    /// Prueft ob ein bestimmtes Flag gesetzt ist
    pub fn hat_flag(&self, flag: PacketFlags) -> bool {
        self.flags.hat(flag)
    }

    /// Header-Laenge ohne MAC
    pub fn header_len(&self) -> usize {
        self.direction.header_len()
    }

    /// Typ-Byte: Typ in den unteren, Flags in den oberen 4 Bit
    fn typ_byte(&self) -> u8 {
        (self.packet_type as u8 & 0x0F) | (self.flags.0 & 0xF0)
    }

    /// Serialisiert den Header (ohne MAC, big-endian)
    pub fn header(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header_len());
        buf.extend_from_slice(&self.id.to_be_bytes());
        if self.direction == Direction::ClientToServer {
            buf.extend_from_slice(&self.client_id.to_be_bytes());
        }
        buf.push(self.typ_byte());
        buf
    }

    /// Serialisiert das Paket mit leerem MAC: `[0; 8] ‖ header ‖ data`
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAC_LEN + self.header_len() + self.data.len());
        buf.extend_from_slice(&[0u8; MAC_LEN]);
        buf.extend_from_slice(&self.header());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Deserialisiert ein Paket aus einem Datagramm
    ///
    /// `data` enthaelt danach die (ggf. noch verschluesselten) Bytes hinter
    /// dem Header, `raw` das komplette Datagramm.
    ///
    /// # Fehler
    /// - `ZuKurz` wenn das Datagramm kuerzer als MAC + Header ist
    /// - `UnbekannterTyp` bei einem Typ-Nibble > 8
    pub fn decode(direction: Direction, raw: &[u8]) -> ProtokollResult<Self> {
        let header_len = direction.header_len();
        let mindestens = MAC_LEN + header_len;
        if raw.len() < mindestens {
            return Err(ProtokollFehler::ZuKurz {
                erwartet: mindestens,
                erhalten: raw.len(),
            });
        }

        let header = &raw[MAC_LEN..mindestens];
        let id = u16::from_be_bytes([header[0], header[1]]);
        let (client_id, typ_byte) = match direction {
            Direction::ClientToServer => (u16::from_be_bytes([header[2], header[3]]), header[4]),
            Direction::ServerToClient => (0, header[2]),
        };

        let packet_type = PacketType::from_u8(typ_byte & 0x0F)
            .ok_or(ProtokollFehler::UnbekannterTyp(typ_byte & 0x0F))?;

        Ok(Self {
            direction,
            packet_type,
            flags: PacketFlags(typ_byte & 0xF0),
            id,
            generation: 0,
            client_id,
            data: raw[mindestens..].to_vec(),
            raw: raw.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
