//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;
use tsvoice_core::TsError;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key-Exchange fehlgeschlagen: {0}")]
    KeyExchange(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Entschluesselung(String),

    #[error("Signatur-Verifikation fehlgeschlagen: {0}")]
    SignaturVerifikation(String),

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Identitaet ungueltig: {0}")]
    Identitaet(String),

    #[error("Lizenz ungueltig: {0}")]
    Lizenz(String),

    #[error("Init1-Handshake: {0}")]
    Handshake(String),

    #[error("Krypto-Zustand nicht initialisiert")]
    NichtInitialisiert,

    #[error("ASN.1-Fehler: {0}")]
    Asn1(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for TsError {
    fn from(fehler: CryptoError) -> Self {
        match fehler {
            CryptoError::Identitaet(msg) => TsError::Identitaet(msg),
            CryptoError::UngueltigeSchluesselLaenge { erwartet, erhalten } => {
                TsError::UngueltigeLaenge { erwartet, erhalten }
            }
            andere => TsError::Krypto(andere.to_string()),
        }
    }
}
