//! Lizenzkette aus `initivexpand2`
//!
//! Der Server schickt eine Kette von Lizenzbloecken. Jeder Block leitet aus
//! dem Schluessel seines Vorgaengers einen neuen Edwards-Punkt ab; der letzte
//! Punkt dient als oeffentlicher Schluessel fuer den Schluesselaustausch.
//!
//! ## Blockformat
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Schluesselart (immer 0)
//!  1      32   Oeffentlicher Schluessel (Edwards, komprimiert)
//! 33       1   Blocktyp (0 Intermediate, 2 Server, 32 Ephemeral)
//! 34       4   Gueltig ab   (BE, Sekunden seit 2013-01-01)
//! 38       4   Gueltig bis  (BE, Sekunden seit 2013-01-01)
//! 42       N   Typabhaengiger Inhalt
//! ```

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha512};
use tracing::trace;

use crate::edwards::{clamp, punkt_laden};
use crate::error::{CryptoError, CryptoResult};

/// Wurzelschluessel der Lizenzkette
pub const LICENSE_ROOT_KEY: [u8; 32] = [
    0xcd, 0x0d, 0xe2, 0xae, 0xd4, 0x63, 0x45, 0x50, 0x9a, 0x7e, 0x3c, 0xfd, 0x8f, 0x68, 0xb3, 0xdc,
    0x75, 0x55, 0xb2, 0x9d, 0xcc, 0xec, 0x73, 0xcd, 0x18, 0x75, 0x0f, 0x99, 0x38, 0x12, 0x40, 0x8a,
];

/// Mindestlaenge eines Blocks ohne typabhaengigen Inhalt
const MIN_BLOCK_LEN: usize = 42;

/// Versatz der Zeitstempel (2013-01-01 00:00:00 UTC)
const ZEIT_VERSATZ: i64 = 0x50e2_2700;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChainBlockType {
    Intermediate = 0,
    Website = 1,
    Server = 2,
    Code = 3,
    Ephemeral = 32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerLicenseType {
    None = 0,
    Offline = 1,
    Sdk = 2,
    SdkOffline = 3,
    Npl = 4,
    Athp = 5,
    Aal = 6,
    Default = 7,
    Gamer = 8,
    Sponsorship = 9,
    Commercial = 10,
    Unknown = 255,
}

impl ServerLicenseType {
    pub fn from_u8(wert: u8) -> Self {
        match wert {
            0 => Self::None,
            1 => Self::Offline,
            2 => Self::Sdk,
            3 => Self::SdkOffline,
            4 => Self::Npl,
            5 => Self::Athp,
            6 => Self::Aal,
            7 => Self::Default,
            8 => Self::Gamer,
            9 => Self::Sponsorship,
            10 => Self::Commercial,
            _ => Self::Unknown,
        }
    }
}

/// Typabhaengiger Inhalt eines Blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseInhalt {
    Intermediate { issuer: String },
    Server { issuer: String, license_type: ServerLicenseType },
    Ephemeral,
}

#[derive(Debug, Clone)]
pub struct LicenseBlock {
    pub inhalt: LicenseInhalt,
    pub not_valid_before: DateTime<Utc>,
    pub not_valid_after: DateTime<Utc>,
    pub key: [u8; 32],
    /// Erste 32 Bytes von SHA-512 ueber den Block ohne Schluesselart
    pub hash: [u8; 32],
}

impl LicenseBlock {
    pub fn block_type(&self) -> ChainBlockType {
        match self.inhalt {
            LicenseInhalt::Intermediate { .. } => ChainBlockType::Intermediate,
            LicenseInhalt::Server { .. } => ChainBlockType::Server,
            LicenseInhalt::Ephemeral => ChainBlockType::Ephemeral,
        }
    }

    /// Parst einen Block ab `offset`, liefert Block und gelesene Bytes
    pub fn parse(data: &[u8], offset: usize) -> CryptoResult<(Self, usize)> {
        let rest = data.len().saturating_sub(offset);
        if rest < MIN_BLOCK_LEN {
            return Err(CryptoError::Lizenz(format!(
                "Block zu kurz: {rest} < {MIN_BLOCK_LEN}"
            )));
        }
        if data[offset] != 0 {
            return Err(CryptoError::Lizenz(format!(
                "falsche Schluesselart {}",
                data[offset]
            )));
        }

        let typ = data[offset + 33];
        let (inhalt, gelesen) = match typ {
            0 => {
                let (issuer, len) = null_string(data, offset + 46)?;
                (LicenseInhalt::Intermediate { issuer }, 5 + len)
            }
            2 => {
                let license_type = data
                    .get(offset + 42)
                    .map(|b| ServerLicenseType::from_u8(*b))
                    .ok_or_else(|| CryptoError::Lizenz("Lizenztyp fehlt".into()))?;
                let (issuer, len) = null_string(data, offset + 47)?;
                (
                    LicenseInhalt::Server {
                        issuer,
                        license_type,
                    },
                    6 + len,
                )
            }
            32 => (LicenseInhalt::Ephemeral, 0),
            andere => {
                return Err(CryptoError::Lizenz(format!("unbekannter Blocktyp {andere}")))
            }
        };

        let not_before = i64::from(be_u32(data, offset + 34)) + ZEIT_VERSATZ;
        let not_after = i64::from(be_u32(data, offset + 38)) + ZEIT_VERSATZ;
        if not_after < not_before {
            return Err(CryptoError::Lizenz("Gueltigkeitszeitraum ungueltig".into()));
        }

        let gesamt = MIN_BLOCK_LEN + gelesen;
        let ende = offset + gesamt;
        if ende > data.len() {
            return Err(CryptoError::Lizenz("Block ragt ueber Datenende".into()));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&data[offset + 1..offset + 33]);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&Sha512::digest(&data[offset + 1..ende])[..32]);

        let block = Self {
            inhalt,
            not_valid_before: zeitpunkt(not_before)?,
            not_valid_after: zeitpunkt(not_after)?,
            key,
            hash,
        };
        Ok((block, gesamt))
    }

    /// Leitet den Schluessel dieses Glieds ab: klemme(hash) * key + parent
    pub fn derive_key(&self, parent: &[u8; 32]) -> CryptoResult<[u8; 32]> {
        let eigener = punkt_laden(&self.key)?;
        let vorgaenger = punkt_laden(parent)?;
        let summe = eigener.mul_clamped(clamp(self.hash)) + vorgaenger;
        Ok(summe.compress().to_bytes())
    }
}

/// Eine vollstaendig geparste Lizenzkette
#[derive(Debug, Clone, Default)]
pub struct Licenses {
    pub blocks: Vec<LicenseBlock>,
}

impl Licenses {
    /// Parst Version-Byte (muss 1 sein) und alle folgenden Bloecke
    pub fn parse(data: &[u8]) -> CryptoResult<Self> {
        let version = *data
            .first()
            .ok_or_else(|| CryptoError::Lizenz("Lizenz leer".into()))?;
        if version != 1 {
            return Err(CryptoError::Lizenz(format!(
                "nicht unterstuetzte Version {version}"
            )));
        }

        let mut blocks = Vec::new();
        let mut offset = 1;
        while offset < data.len() {
            let (block, gelesen) = LicenseBlock::parse(data, offset)?;
            trace!(typ = ?block.block_type(), offset, gelesen, "Lizenzblock gelesen");
            blocks.push(block);
            offset += gelesen;
        }
        Ok(Self { blocks })
    }

    /// Faltet die Kette ab dem Wurzelschluessel
    pub fn derive_key(&self) -> CryptoResult<[u8; 32]> {
        self.blocks
            .iter()
            .try_fold(LICENSE_ROOT_KEY, |runde, block| block.derive_key(&runde))
    }
}

fn be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn zeitpunkt(sekunden: i64) -> CryptoResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(sekunden, 0)
        .ok_or_else(|| CryptoError::Lizenz(format!("Zeitstempel {sekunden} ausserhalb")))
}

/// Liest einen null-terminierten UTF-8-String, liefert (String, Laenge ohne Null)
fn null_string(data: &[u8], start: usize) -> CryptoResult<(String, usize)> {
    let rest = data
        .get(start..)
        .ok_or_else(|| CryptoError::Lizenz("Aussteller fehlt".into()))?;
    let len = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| CryptoError::Lizenz("Aussteller nicht null-terminiert".into()))?;
    Ok((String::from_utf8_lossy(&rest[..len]).into_owned(), len))
}
