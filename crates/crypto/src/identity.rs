//! Langzeit-Identitaet (ECDSA P-256)
//!
//! Jeder Client besitzt ein P-256-Schluesselpaar. Der oeffentliche Schluessel
//! (als Base64 der DER-Sequenz) ist gleichzeitig der `omega`-Wert im Handshake,
//! sein SHA-1-Hash ergibt die Client-UID.
//!
//! Das Sicherheitslevel ist ein Proof-of-Work: die Anzahl fuehrender Null-Bits
//! von `SHA1(oeffentlicher_schluessel ‖ offset_dezimal)`. Der Server verlangt
//! ein Mindestlevel; der Client sucht dafuer einen passenden Offset.
//!
//! ## Export-Format (`<offset>V<base64>`)
//!
//! ```text
//! klartext  = ASCII(base64(DER(oeffentlich + privat)))
//! schritt 1 = klartext[0..100] ^= VERSCHLEIERUNG
//! schritt 2 = schritt1[0..20]  ^= SHA1(schritt1[20..erstes Nullbyte])
//! ergebnis  = offset "V" base64(schritt 2)
//! ```
//!
//! Der Import laeuft dieselben Schritte rueckwaerts. Weil Schritt 2 nur die
//! ersten 20 Bytes aendert, sieht der Import denselben Hash-Bereich.

use std::sync::atomic::{AtomicBool, Ordering};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{DerSignature, Signature, SigningKey, VerifyingKey};
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::der;
use crate::error::{CryptoError, CryptoResult};

/// XOR-Schluessel fuer das Export-Format (ASCII)
const VERSCHLEIERUNG: &[u8; 128] = b"b9dfaa7bee6ac57ac7b65f1094a1c155e747327bc2fe5d51c512023fe54a2802\
01004e90ad1daaae1075d53b7d571c30e063b5a62a4a017bb394833aa0983e6e";

/// Alle wie viele Versuche die Offset-Suche den Abbruch prueft
const SUCHE_ABBRUCHINTERVALL: u64 = 1 << 12;

/// Alle wie viele Versuche die Offset-Suche ihren Fortschritt loggt
const SUCHE_LOGINTERVALL: u64 = 1 << 20;

/// Ergebnis von [`Identity::find_key_offset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyOffsetErgebnis {
    pub offset: u64,
    pub level: u32,
    pub iterationen: u64,
}

/// Langzeit-Identitaet eines Clients
#[derive(Clone)]
pub struct Identity {
    secret: SecretKey,
    public: PublicKey,
    public_key_string: String,
    /// Offset mit dem das aktuelle Sicherheitslevel erreicht wird
    pub valid_key_offset: u64,
    /// Bis hierhin wurde bereits gesucht
    pub last_checked_key_offset: u64,
}

impl Identity {
    /// Erstellt eine Identitaet; fehlt der oeffentliche Schluessel, wird er berechnet
    pub fn neu(secret: SecretKey, public: Option<PublicKey>) -> CryptoResult<Self> {
        let public = public.unwrap_or_else(|| secret.public_key());
        let public_key_string = STANDARD.encode(der::export_public_key(&public)?);
        Ok(Self {
            secret,
            public,
            public_key_string,
            valid_key_offset: 0,
            last_checked_key_offset: 0,
        })
    }

    /// Generiert ein neues Schluesselpaar; beide Offsets = max(0, level)
    pub fn generate(level: i64) -> CryptoResult<Self> {
        let mut identity = Self::neu(SecretKey::random(&mut OsRng), None)?;
        let offset = level.max(0) as u64;
        identity.valid_key_offset = offset;
        identity.last_checked_key_offset = offset;
        Ok(identity)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Base64 der oeffentlichen DER-Sequenz (`omega`)
    pub fn public_key_string(&self) -> &str {
        &self.public_key_string
    }

    pub fn private_key_string(&self) -> CryptoResult<String> {
        Ok(STANDARD.encode(der::export_private_key(&self.secret)?))
    }

    pub fn public_and_private_key_string(&self) -> CryptoResult<String> {
        Ok(STANDARD.encode(der::export_public_and_private_key(
            &self.public,
            &self.secret,
        )?))
    }

    pub fn client_uid(&self) -> String {
        uid_from_public_key(&self.public_key_string)
    }

    // -----------------------------------------------------------------------
    // Sicherheitslevel
    // -----------------------------------------------------------------------

    /// Fuehrende Null-Bits von SHA1(public_key_string ‖ offset)
    pub fn compute_security_level(&self, offset: u64) -> u32 {
        security_level(self.public_key_string.as_bytes(), offset)
    }

    /// Sucht ab `start` den ersten Offset mit Level >= `ziel`
    ///
    /// Ziel und Start werden auf >= 0 geklemmt. Erfuellt bereits der Start
    /// das Ziel, wird er mit 0 Iterationen zurueckgegeben. Liefert `None`
    /// sobald `abbruch` gesetzt wird.
    pub fn find_key_offset(
        &self,
        ziel: i32,
        start: i64,
        abbruch: &AtomicBool,
    ) -> Option<KeyOffsetErgebnis> {
        let ziel = ziel.max(0) as u32;
        let mut offset = start.max(0) as u64;
        let oeffentlich = self.public_key_string.as_bytes();

        let level = security_level(oeffentlich, offset);
        if level >= ziel {
            return Some(KeyOffsetErgebnis {
                offset,
                level,
                iterationen: 0,
            });
        }

        let mut iterationen = 0u64;
        loop {
            offset += 1;
            iterationen += 1;
            let level = security_level(oeffentlich, offset);
            if level >= ziel {
                info!(offset, level, iterationen, "Sicherheitslevel erreicht");
                return Some(KeyOffsetErgebnis {
                    offset,
                    level,
                    iterationen,
                });
            }
            if iterationen % SUCHE_ABBRUCHINTERVALL == 0 && abbruch.load(Ordering::Relaxed) {
                info!(offset, iterationen, "Offset-Suche abgebrochen");
                return None;
            }
            if iterationen % SUCHE_LOGINTERVALL == 0 {
                debug!(offset, iterationen, ziel, "Offset-Suche laeuft");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Signaturen
    // -----------------------------------------------------------------------

    /// ECDSA-SHA256, DER-kodiert
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let key = SigningKey::from(&self.secret);
        let signatur: Signature = key.sign(data);
        let der: DerSignature = signatur.to_der();
        der.as_bytes().to_vec()
    }

    // -----------------------------------------------------------------------
    // Import / Export
    // -----------------------------------------------------------------------

    /// Exportiert im verschleierten `<offset>V<base64>`-Format
    pub fn export_ts(&self) -> CryptoResult<String> {
        let klartext = self.public_and_private_key_string()?;
        let mut bytes = klartext.clone().into_bytes();
        if bytes.len() < 20 {
            return Ok(klartext);
        }

        let n = bytes.len().min(100);
        xor_in_place(&mut bytes[..n], &VERSCHLEIERUNG[..n]);
        let ende = hash_ende(&bytes);
        let hash = Sha1::digest(&bytes[20..ende]);
        xor_in_place(&mut bytes[..20], &hash[..20]);

        Ok(format!("{}V{}", self.valid_key_offset, STANDARD.encode(&bytes)))
    }

    /// Importiert das verschleierte Format; beide Offsets werden auf das Level gesetzt
    pub fn import_ts(identitaet: &str) -> CryptoResult<Self> {
        let (level, nutzlast) = ts_format_zerlegen(identitaet)
            .ok_or_else(|| CryptoError::Identitaet("kein <offset>V<base64>-Format".into()))?;

        let mut bytes = STANDARD.decode(nutzlast)?;
        if bytes.len() < 20 {
            return Err(CryptoError::Identitaet(format!(
                "verschleierte Identitaet zu kurz ({} Bytes)",
                bytes.len()
            )));
        }

        let ende = hash_ende(&bytes);
        let hash = Sha1::digest(&bytes[20..ende]);
        xor_in_place(&mut bytes[..20], &hash[..20]);
        let n = bytes.len().min(100);
        xor_in_place(&mut bytes[..n], &VERSCHLEIERUNG[..n]);

        let klartext = String::from_utf8(bytes)
            .map_err(|_| CryptoError::Identitaet("entschleierte Daten sind kein ASCII".into()))?;
        let der = STANDARD.decode(klartext.trim_end_matches('\0'))?;
        let mut identity = Self::aus_der(&der)?;
        identity.valid_key_offset = level;
        identity.last_checked_key_offset = level;
        Ok(identity)
    }

    /// Importiert Base64-DER mit bekanntem Offset
    pub fn load(schluessel: &str, key_offset: u64) -> CryptoResult<Self> {
        let der = STANDARD.decode(schluessel.trim())?;
        let mut identity = Self::aus_der(&der)?;
        identity.valid_key_offset = key_offset;
        identity.last_checked_key_offset = key_offset;
        Ok(identity)
    }

    /// Versucht zuerst das verschleierte Format, dann Base64-DER
    pub fn load_dynamic(schluessel: &str, key_offset: u64) -> CryptoResult<Self> {
        if schluessel.trim().is_empty() {
            return Err(CryptoError::Identitaet("Schluessel ist leer".into()));
        }
        match Self::import_ts(schluessel.trim()) {
            Ok(identity) => Ok(identity),
            Err(e) => {
                debug!(fehler = %e, "Kein verschleiertes Format, versuche Base64-DER");
                Self::load(schluessel, key_offset)
            }
        }
    }

    fn aus_der(der: &[u8]) -> CryptoResult<Self> {
        let import = der::import_key_dynamic(der)?;
        let secret = import
            .privat
            .ok_or_else(|| CryptoError::Identitaet("kein privater Schluessel enthalten".into()))?;
        Self::neu(secret, import.oeffentlich)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.client_uid())
            .field("valid_key_offset", &self.valid_key_offset)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Freie Funktionen
// ---------------------------------------------------------------------------

/// Der Verschleierungs-Hash reicht bis zum ersten Nullbyte ab Position 20
fn hash_ende(bytes: &[u8]) -> usize {
    bytes[20..]
        .iter()
        .position(|b| *b == 0)
        .map_or(bytes.len(), |p| p + 20)
}

/// Prueft die Form `<ziffern>V<base64>`
pub fn is_ts_identity_format(identitaet: &str) -> bool {
    ts_format_zerlegen(identitaet.trim()).is_some()
}

fn ts_format_zerlegen(identitaet: &str) -> Option<(u64, &str)> {
    let (ziffern, nutzlast) = identitaet.split_once('V')?;
    if ziffern.is_empty() || !ziffern.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let ohne_padding = nutzlast.trim_end_matches('=');
    let padding = nutzlast.len() - ohne_padding.len();
    let gueltig = !ohne_padding.is_empty()
        && padding <= 2
        && ohne_padding
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'/' || b == b'+');
    if !gueltig {
        return None;
    }
    Some((ziffern.parse().ok()?, nutzlast))
}

/// Client-UID: base64(SHA1(oeffentlicher Schluessel als ASCII))
pub fn uid_from_public_key(public_key_string: &str) -> String {
    STANDARD.encode(Sha1::digest(public_key_string.as_bytes()))
}

/// Passwort-Hash fuer Server- und Kanalpasswoerter, leer bleibt leer
pub fn hash_password(passwort: &str) -> String {
    if passwort.is_empty() {
        return String::new();
    }
    STANDARD.encode(Sha1::digest(passwort.as_bytes()))
}

/// Prueft eine DER-kodierte ECDSA-SHA256-Signatur
pub fn verify_sign(public: &PublicKey, data: &[u8], signatur: &[u8]) -> bool {
    let Ok(signatur) = Signature::from_der(signatur) else {
        return false;
    };
    VerifyingKey::from(public).verify(data, &signatur).is_ok()
}

fn security_level(oeffentlich: &[u8], offset: u64) -> u32 {
    let mut hasher = Sha1::new();
    hasher.update(oeffentlich);
    hasher.update(offset.to_string().as_bytes());
    fuehrende_null_bits(&hasher.finalize())
}

/// Zaehlt MSB-first: ganze Nullbytes zaehlen 8, dann die Nullen des ersten anderen Bytes
fn fuehrende_null_bits(hash: &[u8]) -> u32 {
    let mut anzahl = 0;
    for b in hash {
        if *b == 0 {
            anzahl += 8;
            continue;
        }
        anzahl += b.leading_zeros();
        break;
    }
    anzahl
}

fn xor_in_place(ziel: &mut [u8], schluessel: &[u8]) {
    for (z, s) in ziel.iter_mut().zip(schluessel) {
        *z ^= s;
    }
}
