//! tsvoice-bot – Bibliotheks-Root
//!
//! Ablauf eines Bot-Laufs:
//!
//! ```text
//! Identitaet laden/erzeugen -> Level anheben (Ctrl-C bricht ab)
//!   -> configure + connect -> Ereignisse loggen -> Ctrl-C -> disconnect
//! ```

pub mod config;
pub mod identitaet;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use config::BotConfig;
use tokio::sync::mpsc::UnboundedReceiver;
use tsvoice_client::{TsFullClient, VoiceClient};
use tsvoice_core::{ClientEvent, TsError};
use tsvoice_crypto::Identity;

/// Haelt die Konfiguration eines Bot-Laufs
pub struct Bot {
    pub config: BotConfig,
}

impl Bot {
    pub fn neu(config: BotConfig) -> Self {
        Self { config }
    }

    /// Verbindet und laeuft bis Ctrl-C oder bis der Server die Verbindung beendet
    pub async fn starten(self) -> Result<()> {
        let identity = self.identitaet_vorbereiten().await?;
        let parameter = self.config.verbindungsparameter(identity);

        let (client, mut ereignisse) = TsFullClient::neu();
        client.configure(parameter);
        laufen(&client, &self.config, &mut ereignisse).await
    }

    /// Laedt die Identitaet und hebt ihr Level an; Ctrl-C bricht die Suche ab
    async fn identitaet_vorbereiten(&self) -> Result<Identity> {
        let pfad = PathBuf::from(&self.config.identitaet.datei);
        let key_offset = self.config.identitaet.key_offset;
        let ziel = self.config.ziel_sicherheitslevel();

        let abbruch = Arc::new(AtomicBool::new(false));
        let waechter = {
            let abbruch = Arc::clone(&abbruch);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Offset-Suche wird abgebrochen");
                    abbruch.store(true, Ordering::Relaxed);
                }
            })
        };

        let ergebnis = tokio::task::spawn_blocking(move || -> Result<Identity> {
            let mut identity = identitaet::laden_oder_erzeugen(&pfad, key_offset)?;
            if identitaet::level_anheben(&mut identity, ziel, &abbruch)?.is_some() {
                identitaet::speichern(&pfad, &identity)?;
            }
            Ok(identity)
        })
        .await;
        waechter.abort();

        let identity = ergebnis??;
        tracing::info!(
            uid = %identity.client_uid(),
            offset = identity.valid_key_offset,
            level = identity.compute_security_level(identity.valid_key_offset),
            "Identitaet bereit"
        );
        Ok(identity)
    }
}

/// Verbindet einen konfigurierten Client und wartet auf Ctrl-C oder das Verbindungsende
pub async fn laufen<C: VoiceClient>(
    client: &C,
    config: &BotConfig,
    ereignisse: &mut UnboundedReceiver<ClientEvent>,
) -> Result<()> {
    if let Err(e) = client
        .connect(&config.verbindung.adresse, &config.verbindung.kanal)
        .await
    {
        let fehler = TsError::from(e);
        if fehler.ist_wiederholbar() {
            tracing::warn!(fehler = %fehler, "Verbindung fehlgeschlagen, ein neuer Versuch kann helfen");
        }
        return Err(fehler.into());
    }

    tracing::info!("Bot laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown-Signal empfangen, Bot wird beendet");
            client.disconnect().await;
        }
        grund = ereignisse_loggen(ereignisse) => {
            tracing::warn!(grund = %grund, "Verbindung beendet");
        }
    }
    Ok(())
}

/// Loggt Client-Ereignisse bis zum Ende der Verbindung und liefert den Grund
pub async fn ereignisse_loggen(ereignisse: &mut UnboundedReceiver<ClientEvent>) -> String {
    while let Some(ereignis) = ereignisse.recv().await {
        match ereignis {
            ClientEvent::Angemeldet { client_id, kanal_id } => {
                tracing::info!(%client_id, %kanal_id, "Angemeldet");
            }
            ClientEvent::KanalGewechselt { kanal_id } => {
                tracing::info!(%kanal_id, "Im Kanal");
            }
            ClientEvent::ServerFehler {
                id,
                nachricht,
                return_code,
            } => {
                tracing::warn!(id, nachricht = %nachricht, return_code = ?return_code, "Server meldet Fehler");
            }
            ClientEvent::Gestoppt { grund } => return grund,
        }
    }
    "Ereigniskanal geschlossen".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsvoice_core::{ChannelId, ClientId};

    #[tokio::test]
    async fn ereignisse_bis_gestoppt() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(ClientEvent::Angemeldet {
            client_id: ClientId(3),
            kanal_id: ChannelId(1),
        })
        .unwrap();
        tx.send(ClientEvent::ServerFehler {
            id: 768,
            nachricht: "invalid channelID".into(),
            return_code: None,
        })
        .unwrap();
        tx.send(ClientEvent::Gestoppt {
            grund: "Zeitlimit".into(),
        })
        .unwrap();
        tx.send(ClientEvent::KanalGewechselt {
            kanal_id: ChannelId(2),
        })
        .unwrap();

        assert_eq!(ereignisse_loggen(&mut rx).await, "Zeitlimit");
        // Nach Gestoppt bleibt der Rest im Kanal
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn laufen_ohne_konfiguration_ist_fehler() {
        let (client, mut rx) = TsFullClient::neu();
        let config = BotConfig::default();
        let fehler = laufen(&client, &config, &mut rx).await.unwrap_err();
        assert!(matches!(
            fehler.downcast_ref::<TsError>(),
            Some(TsError::Konfiguration(_))
        ));
    }

    #[tokio::test]
    async fn geschlossener_kanal() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ClientEvent>();
        drop(tx);
        assert_eq!(ereignisse_loggen(&mut rx).await, "Ereigniskanal geschlossen");
    }
}
