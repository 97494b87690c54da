//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `TSV_LOG_LEVEL`: Filter-Direktive (z.B. `debug` oder
//!   `info,tsvoice_transport=trace`), ueberschreibt die Konfiguration
//! - `TSV_LOG_FORMAT`: `text` oder `json`, ueberschreibt die Konfiguration

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "TSV_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "TSV_LOG_FORMAT";

/// Fehler beim Einrichten des Loggings
#[derive(Debug, Error)]
pub enum LoggingFehler {
    #[error("Ungueltiger Log-Filter '{filter}': {grund}")]
    UngueltigerFilter { filter: String, grund: String },

    #[error("Ungueltiges Log-Format '{0}' (erlaubt: text, json)")]
    UngueltigesFormat(String),

    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(LoggingFehler::UngueltigesFormat(s.to_string())),
        }
    }
}

/// Initialisiert den globalen Subscriber.
///
/// `TSV_LOG_LEVEL` und `TSV_LOG_FORMAT` haben Vorrang vor den uebergebenen
/// Werten. Darf pro Prozess nur einmal aufgerufen werden.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<(), LoggingFehler> {
    let level = aus_env_oder(ENV_LOG_LEVEL, level);
    let format: LogFormat = aus_env_oder(ENV_LOG_FORMAT, format).parse()?;
    let filter = filter_bauen(&level)?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| LoggingFehler::BereitsInitialisiert(e.to_string()))?;

    tracing::debug!(level = %level, format = ?format, "Logging initialisiert");
    Ok(())
}

/// Baut den Filter aus einer Direktive, leer heisst `info`
pub fn filter_bauen(direktive: &str) -> Result<EnvFilter, LoggingFehler> {
    let direktive = match direktive.trim() {
        "" => "info",
        d => d,
    };
    EnvFilter::try_new(direktive).map_err(|e| LoggingFehler::UngueltigerFilter {
        filter: direktive.to_string(),
        grund: e.to_string(),
    })
}

fn aus_env_oder(variable: &str, standard: &str) -> String {
    wert_oder(std::env::var(variable).ok(), standard)
}

fn wert_oder(wert: Option<String>, standard: &str) -> String {
    wert.filter(|w| !w.trim().is_empty())
        .unwrap_or_else(|| standard.to_string())
}

/// Validiert ob ein einfacher Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error" | "off")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error", "off"] {
            assert!(log_level_gueltig(level), "{level}");
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO"));
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_parsen() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingFehler::UngueltigesFormat(_))
        ));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig(""));
    }

    #[test]
    fn filter_direktiven() {
        assert!(filter_bauen("debug").is_ok());
        assert!(filter_bauen("info,tsvoice_transport=trace").is_ok());
        assert!(filter_bauen("").is_ok());
        assert!(matches!(
            filter_bauen("info,tsvoice_transport=lautstark"),
            Err(LoggingFehler::UngueltigerFilter { .. })
        ));
    }

    #[test]
    fn umgebung_hat_vorrang() {
        assert_eq!(wert_oder(Some("debug".into()), "info"), "debug");
        assert_eq!(wert_oder(None, "info"), "info");
        assert_eq!(wert_oder(Some("  ".into()), "json"), "json");
    }
}
