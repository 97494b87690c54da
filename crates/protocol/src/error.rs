//! Fehlertypen fuer das Wire-Format

use thiserror::Error;
use tsvoice_core::TsError;

/// Fehler beim Kodieren oder Dekodieren von Protokoll-Bytes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtokollFehler {
    #[error("Daten zu kurz: erwartet mindestens {erwartet}, erhalten {erhalten}")]
    ZuKurz { erwartet: usize, erhalten: usize },

    #[error("Unbekannter Pakettyp: {0}")]
    UnbekannterTyp(u8),

    #[error("Ungueltige Escape-Sequenz: {0}")]
    UngueltigeEscapeSequenz(String),

    #[error("Befehlsname fehlt")]
    LeererBefehl,

    #[error("QuickLZ-Level {0} nicht unterstuetzt")]
    KompressionsLevel(u8),

    #[error("Dekomprimierte Groesse {groesse} ueberschreitet Maximum {maximum}")]
    ZuGross { groesse: usize, maximum: usize },

    #[error("Komprimierte Daten beschaedigt: {0}")]
    Beschaedigt(String),
}

pub type ProtokollResult<T> = Result<T, ProtokollFehler>;

impl From<ProtokollFehler> for TsError {
    fn from(fehler: ProtokollFehler) -> Self {
        match fehler {
            ProtokollFehler::ZuGross { .. } => TsError::Ressource(fehler.to_string()),
            ProtokollFehler::ZuKurz { erwartet, erhalten } => {
                TsError::UngueltigeLaenge { erwartet, erhalten }
            }
            andere => TsError::Protokoll(andere.to_string()),
        }
    }
}
