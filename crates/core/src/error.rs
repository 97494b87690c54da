//! Fehlertypen fuer tsvoice
//!
//! Zentraler Fehler-Enum entlang der Fehlerklassen des Sprachprotokolls.
//! Untergeordnete Crates definieren eigene Fehler und konvertieren via `From`.

use thiserror::Error;

/// Globaler Result-Alias fuer tsvoice
pub type Result<T> = std::result::Result<T, TsError>;

/// Alle moeglichen Fehler im tsvoice-System
#[derive(Debug, Error)]
pub enum TsError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Protokoll ---
    #[error("Protokollverletzung: {0}")]
    Protokoll(String),

    #[error("Ungueltige Laenge: erwartet={erwartet}, erhalten={erhalten}")]
    UngueltigeLaenge { erwartet: usize, erhalten: usize },

    // --- Kryptografie ---
    #[error("Kryptofehler: {0}")]
    Krypto(String),

    // --- Identitaet ---
    #[error("Identitaet ungueltig: {0}")]
    Identitaet(String),

    // --- Ressourcen ---
    #[error("Ressourcenlimit erreicht: {0}")]
    Ressource(String),

    /// Es ist bereits eine korrelierte Anfrage offen
    #[error("Anfrage bereits ausstehend: {0}")]
    Beschaeftigt(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TsError {
    /// Erstellt eine Protokollverletzung aus einer beliebigen Nachricht
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Gibt true zurueck wenn ein neuer Verbindungsversuch sinnvoll sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Zeitlimit(_) | Self::Verbindung(_) | Self::Getrennt(_) | Self::Beschaeftigt(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = TsError::Krypto("MAC ungueltig".into());
        assert_eq!(e.to_string(), "Kryptofehler: MAC ungueltig");
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(TsError::Zeitlimit("test".into()).ist_wiederholbar());
        assert!(TsError::Beschaeftigt("channellist".into()).ist_wiederholbar());
        assert!(!TsError::Identitaet("test".into()).ist_wiederholbar());
        assert!(!TsError::protokoll("test").ist_wiederholbar());
    }

    #[test]
    fn laengen_fehler() {
        let e = TsError::UngueltigeLaenge {
            erwartet: 21,
            erhalten: 5,
        };
        assert!(e.to_string().contains("erwartet=21"));
        assert!(e.to_string().contains("erhalten=5"));
    }

    #[test]
    fn io_fehler_konvertierung() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "belegt");
        let e: TsError = io.into();
        assert!(matches!(e, TsError::Io(_)));
    }
}
