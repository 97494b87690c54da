//! tsvoice-core – Gemeinsame Typen, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von Protokoll, Krypto,
//! Transport und Client gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, TsError};
pub use event::ClientEvent;
pub use types::{ChannelId, ClientId};
