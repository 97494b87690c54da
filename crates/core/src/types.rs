//! Gemeinsame Identifikationstypen fuer tsvoice
//!
//! Der Server vergibt numerische IDs. Newtypes verhindern Verwechslungen
//! zwischen Client- und Kanal-IDs zur Compilezeit.

use serde::{Deserialize, Serialize};

/// Vom Server vergebene Client-ID (`clid`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u16);

impl ClientId {
    /// Noch keine ID zugewiesen
    pub const KEINE: ClientId = ClientId(0);

    /// Gibt true zurueck wenn der Server bereits eine ID vergeben hat
    pub fn ist_gesetzt(&self) -> bool {
        self.0 > 0
    }

    /// Parst eine ID aus einem Kommando-Parameter
    pub fn parsen(wert: &str) -> Option<Self> {
        wert.trim().parse::<u16>().ok().map(Self)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clid:{}", self.0)
    }
}

/// Vom Server vergebene Kanal-ID (`cid`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// Wurzel der Kanalhierarchie (Eltern-ID der obersten Kanaele)
    pub const WURZEL: ChannelId = ChannelId(0);

    /// Parst eine ID aus einem Kommando-Parameter
    pub fn parsen(wert: &str) -> Option<Self> {
        wert.trim().parse::<u64>().ok().map(Self)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cid:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_parsen() {
        assert_eq!(ClientId::parsen("42"), Some(ClientId(42)));
        assert_eq!(ClientId::parsen(" 7 "), Some(ClientId(7)));
        assert_eq!(ClientId::parsen("abc"), None);
        assert_eq!(ClientId::parsen("70000"), None);
    }

    #[test]
    fn client_id_gesetzt() {
        assert!(!ClientId::KEINE.ist_gesetzt());
        assert!(ClientId(1).ist_gesetzt());
    }

    #[test]
    fn anzeige() {
        assert_eq!(ClientId(3).to_string(), "clid:3");
        assert_eq!(ChannelId(12).to_string(), "cid:12");
    }
}
