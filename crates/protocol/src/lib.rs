//! tsvoice-protocol – Wire-Format des Sprachprotokolls
//!
//! Dieses Crate kennt keine Sockets und keine Schluessel. Es beschreibt nur
//! Bytes: Paket-Header, Text-Kommandos und den QuickLZ-Kompressor, mit dem
//! grosse Kommandos auf dem Draht verkleinert werden.
//!
//! ## Module
//! - [`packet`] – Header-Layout, Typ-/Flag-Bitfelder, Raw-(De)Serialisierung
//! - [`command`] – `name key=value ...` Zeilen mit Escape-Tabelle
//! - [`quicklz`] – LZ77-Variante (Level 1 und 3), bit-kompatibel
//! - [`error`] – Fehlertypen

pub mod command;
pub mod error;
pub mod packet;
pub mod quicklz;

pub use command::{CommandBuilder, ParsedCommand};
pub use error::{ProtokollFehler, ProtokollResult};
pub use packet::{Direction, Packet, PacketFlags, PacketKind, PacketType, MAC_LEN};
