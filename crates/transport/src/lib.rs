//! tsvoice-transport – Zuverlaessiger UDP-Transport
//!
//! Besitzt den Socket einer Verbindung und sorgt fuer Reihenfolge,
//! Wiederholung und Messung:
//!
//! - `handler` – Socket, Empfangs-Loop, Timer, Sende-Sperre
//! - `window` – Empfangsfenster und Generationen je Pakettyp
//! - `resend` – unbestaetigte COMMAND/COMMAND_LOW/INIT1-Pakete
//! - `ping` – RTT-Proben aus PING/PONG
//! - `statistics` – Pakete und Bytes je Verkehrsklasse

pub mod error;
pub mod handler;
pub mod ping;
pub mod resend;
pub mod statistics;
pub mod window;

pub use error::{TransportFehler, TransportResult};
pub use handler::{GeteilteKrypto, PacketHandler, TransportEreignis};
pub use ping::PingStats;
pub use resend::{PAKET_TIMEOUT, RESEND_INTERVALL};
pub use statistics::{PacketStatistics, Verkehrsstatistik};
pub use window::{EingangsInfo, EmpfangsFenster, FENSTER_GROESSE};
