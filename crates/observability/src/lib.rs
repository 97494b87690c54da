//! # tsvoice-observability
//!
//! Structured Logging via tracing-subscriber. Text fuer die Konsole,
//! JSON fuer Log-Sammler. Level und Format kommen aus der Konfiguration
//! und lassen sich per Umgebung ueberschreiben.

pub mod logging;

pub use logging::{
    log_format_gueltig, log_level_gueltig, logging_initialisieren, LogFormat, LoggingFehler,
    ENV_LOG_FORMAT, ENV_LOG_LEVEL,
};
