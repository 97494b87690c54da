//! tsvoice-client – Protokoll-Client
//!
//! Baut auf dem Transport auf und spricht das Kommando-Protokoll:
//!
//! - `client` – [`TsFullClient`], Handshake bis `initserver`, Empfang
//! - `connection` – Verbindungsparameter, Passwoerter, Versionssignatur
//! - `counter` – Paket-IDs und Generationen je Typ
//! - `fragment` / `queue` – Kommandos zerlegen und wieder zusammensetzen
//! - `pending` – korrelierte Anfragen ueber `return_code`
//! - `channel` – Kanalliste und Zielkanal
//! - `voice` – Sprachpakete und Sprech-Sessions
//! - `connection_info` – Antwort auf `notifyconnectioninforequest`

pub mod address;
pub mod channel;
pub mod client;
pub mod connection;
pub mod connection_info;
pub mod counter;
pub mod error;
pub mod fragment;
pub mod pending;
pub mod queue;
pub mod traits;
pub mod voice;

pub use channel::{ChannelCodecInfo, ChannelSnapshot};
pub use client::{Phase, TsFullClient};
pub use connection::{ClientPlatform, ConnectionParameters, Password, VersionSigned};
pub use error::{ClientFehler, ClientResult};
pub use pending::AnfrageErgebnis;
pub use traits::{AudioSink, VoiceClient};
