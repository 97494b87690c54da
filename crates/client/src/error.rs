//! Fehlertypen fuer den Protokoll-Client

use thiserror::Error;
use tsvoice_core::TsError;
use tsvoice_crypto::CryptoError;
use tsvoice_protocol::ProtokollFehler;
use tsvoice_transport::TransportFehler;

/// Fehler im Protokoll-Client
#[derive(Debug, Error)]
pub enum ClientFehler {
    #[error("Client nicht konfiguriert")]
    NichtKonfiguriert,

    #[error("Nicht verbunden")]
    NichtVerbunden,

    #[error("Ungueltige Serveradresse: {0}")]
    UngueltigeAdresse(String),

    /// Eine korrelierte Anfrage ist bereits offen
    #[error("Anfrage '{name}' abgelehnt, andere Anfrage ausstehend")]
    Beschaeftigt { name: String },

    #[error("Keine Antwort auf '{name}' (return_code={return_code})")]
    Zeitlimit { name: String, return_code: u16 },

    /// Verbindung endete waehrend auf eine Antwort gewartet wurde
    #[error("Anfrage '{name}' abgebrochen")]
    Abgebrochen { name: String },

    #[error("Server-Fehler {id}: {nachricht}")]
    Server { id: u32, nachricht: String },

    #[error("Kanal nicht gefunden: {0}")]
    KanalNichtGefunden(String),

    #[error("Client-ID noch nicht zugewiesen")]
    KeineClientId,

    #[error("Antwort unvollstaendig: {0}")]
    UnvollstaendigeAntwort(String),

    #[error(transparent)]
    Transport(#[from] TransportFehler),

    #[error(transparent)]
    Krypto(#[from] CryptoError),

    #[error(transparent)]
    Protokoll(#[from] ProtokollFehler),
}

pub type ClientResult<T> = Result<T, ClientFehler>;

impl From<ClientFehler> for TsError {
    fn from(fehler: ClientFehler) -> Self {
        match fehler {
            ClientFehler::Transport(e) => e.into(),
            ClientFehler::Krypto(e) => e.into(),
            ClientFehler::Protokoll(e) => e.into(),
            ClientFehler::NichtKonfiguriert | ClientFehler::UngueltigeAdresse(_) => {
                TsError::Konfiguration(fehler.to_string())
            }
            ClientFehler::NichtVerbunden | ClientFehler::Abgebrochen { .. } => {
                TsError::Getrennt(fehler.to_string())
            }
            ClientFehler::Beschaeftigt { .. } => TsError::Beschaeftigt(fehler.to_string()),
            ClientFehler::Zeitlimit { .. } => TsError::Zeitlimit(fehler.to_string()),
            ClientFehler::Server { .. }
            | ClientFehler::KanalNichtGefunden(_)
            | ClientFehler::KeineClientId
            | ClientFehler::UnvollstaendigeAntwort(_) => TsError::Protokoll(fehler.to_string()),
        }
    }
}
