//! tsvoice Bot – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Bot.

use anyhow::Result;
use tsvoice_bot::{config::BotConfig, Bot};
use tsvoice_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("TSVOICE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = BotConfig::laden(&config_pfad)?;
    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        adresse = %config.verbindung.adresse,
        "tsvoice Bot wird initialisiert"
    );

    Bot::neu(config).starten().await
}
