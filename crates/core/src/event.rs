//! Client-Ereignisse
//!
//! Der Protokoll-Client meldet Zustandswechsel ueber einen tokio-Kanal an
//! den Aufrufer. Ein Ereignis pro Uebergang, keine Wiederholungen.

use crate::types::{ChannelId, ClientId};
use serde::{Deserialize, Serialize};

/// Ereignisse die ein verbundener Client an seinen Besitzer meldet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// `initserver` empfangen, der Client ist angemeldet
    Angemeldet {
        client_id: ClientId,
        kanal_id: ChannelId,
    },
    /// Der eigene Client wurde in einen anderen Kanal verschoben
    KanalGewechselt { kanal_id: ChannelId },
    /// Unaufgeforderte `error`-Antwort des Servers
    ServerFehler {
        id: u32,
        nachricht: String,
        return_code: Option<String>,
    },
    /// Verbindung beendet (sauber oder abgebrochen)
    Gestoppt { grund: String },
}

impl ClientEvent {
    /// Gibt true zurueck wenn das Ereignis den Lebenszyklus beendet
    pub fn ist_terminal(&self) -> bool {
        matches!(self, Self::Gestoppt { .. })
    }
}
