//! Fehlertypen fuer den Pakettransport

use thiserror::Error;
use tsvoice_core::TsError;
use tsvoice_crypto::CryptoError;
use tsvoice_protocol::{PacketType, ProtokollFehler};

/// Fehler im Transport-Subsystem
#[derive(Debug, Error)]
pub enum TransportFehler {
    #[error("Socket-Fehler: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Nicht verbunden")]
    NichtVerbunden,

    #[error("Paket {packet_type:?} id={id} nach {sekunden}s unbestaetigt")]
    Zeitlimit {
        packet_type: PacketType,
        id: u16,
        sekunden: u64,
    },

    #[error(transparent)]
    Krypto(#[from] CryptoError),

    #[error(transparent)]
    Protokoll(#[from] ProtokollFehler),
}

pub type TransportResult<T> = Result<T, TransportFehler>;

impl From<TransportFehler> for TsError {
    fn from(fehler: TransportFehler) -> Self {
        match fehler {
            TransportFehler::Socket(e) => TsError::Verbindung(e.to_string()),
            TransportFehler::NichtVerbunden => TsError::Getrennt(fehler.to_string()),
            TransportFehler::Zeitlimit { .. } => TsError::Zeitlimit(fehler.to_string()),
            TransportFehler::Krypto(e) => e.into(),
            TransportFehler::Protokoll(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeitlimit_ist_wiederholbar() {
        let e: TsError = TransportFehler::Zeitlimit {
            packet_type: PacketType::Command,
            id: 7,
            sekunden: 30,
        }
        .into();
        assert!(matches!(e, TsError::Zeitlimit(_)));
        assert!(e.ist_wiederholbar());
        assert!(e.to_string().contains("id=7"));
    }

    #[test]
    fn nicht_verbunden_wird_getrennt() {
        let e: TsError = TransportFehler::NichtVerbunden.into();
        assert!(matches!(e, TsError::Getrennt(_)));
    }

    #[test]
    fn socketfehler_wird_verbindungsfehler() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "bind");
        let e: TsError = TransportFehler::Socket(io).into();
        assert!(matches!(e, TsError::Verbindung(_)));
        assert!(e.ist_wiederholbar());
    }
}
