//! Schnittstellen zu Audio-Pipeline und Bot-Steuerung
//!
//! Beide Traits sind async, damit Implementierungen ohne Blockieren
//! Pakete senden koennen.

use async_trait::async_trait;

use crate::connection::ConnectionParameters;
use crate::error::ClientResult;

/// Ziel fuer kodierte Opus-Frames
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Sendet die ersten `laenge` Bytes von `daten` als Sprachpaket
    ///
    /// `laenge == 0` markiert Stille und beendet die Sprech-Session.
    async fn send_opus_frame(&self, daten: &[u8], laenge: usize);

    fn is_connected(&self) -> bool;
}

/// Steuerung eines Sprach-Clients
#[async_trait]
pub trait VoiceClient: Send + Sync {
    /// Setzt die Parameter fuer den naechsten Verbindungsversuch
    fn configure(&self, parameter: ConnectionParameters);

    /// Startet die Verbindung; `kanal_pfad` ueberschreibt den Standardkanal, falls nicht leer
    async fn connect(&self, adresse: &str, kanal_pfad: &str) -> ClientResult<()>;

    /// Trennt die Verbindung (idempotent)
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
