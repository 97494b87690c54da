//! Edwards25519-Arithmetik fuer Lizenzkette und `clientek`
//!
//! Punkte werden im komprimierten 32-Byte-Format uebertragen. Skalare werden
//! vor der Multiplikation geklemmt (Bits 0-2 und 255 geloescht, Bit 254 gesetzt).

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha512};

use crate::error::{CryptoError, CryptoResult};

/// Kurzlebiges Schluesselpaar fuer den Lizenz-Schluesselaustausch
#[derive(Clone)]
pub struct TempKey {
    pub public_key: [u8; 32],
    pub private_key: [u8; 32],
}

impl std::fmt::Debug for TempKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TempKey {{ public_key: {:02x?} }}", &self.public_key[..4])
    }
}

/// Klemmt einen Skalar auf die Curve25519-Form
pub fn clamp(mut skalar: [u8; 32]) -> [u8; 32] {
    skalar[0] &= 248;
    skalar[31] &= 127;
    skalar[31] |= 64;
    skalar
}

/// Erzeugt ein neues Paar: privat = geklemmter Zufall, oeffentlich = privat * B
pub fn generate_temporary_key() -> TempKey {
    let mut privat = [0u8; 32];
    OsRng.fill_bytes(&mut privat);
    let private_key = clamp(privat);
    let public_key = EdwardsPoint::mul_base_clamped(private_key)
        .compress()
        .to_bytes();
    TempKey {
        public_key,
        private_key,
    }
}

/// Dekomprimiert einen Punkt, Fehler bei ungueltiger Kodierung
pub fn punkt_laden(bytes: &[u8]) -> CryptoResult<EdwardsPoint> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 32,
            erhalten: bytes.len(),
        })?;
    CompressedEdwardsY(array)
        .decompress()
        .ok_or_else(|| CryptoError::KeyExchange("ungueltiger Edwards-Punkt".into()))
}

/// Gemeinsames Geheimnis fuer `initivexpand2`: SHA-512(komprimiert(privat * Lizenzschluessel))
pub fn shared_secret(lizenz_schluessel: &[u8], private_key: &[u8; 32]) -> CryptoResult<[u8; 64]> {
    let punkt = punkt_laden(lizenz_schluessel)?;
    let geteilt = punkt.mul_clamped(*private_key).compress();
    let mut out = [0u8; 64];
    out.copy_from_slice(&Sha512::digest(geteilt.as_bytes()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_key_ist_geklemmt() {
        let k = generate_temporary_key();
        assert_eq!(k.private_key[0] & 7, 0);
        assert_eq!(k.private_key[31] & 0x80, 0);
        assert_eq!(k.private_key[31] & 0x40, 0x40);
        assert!(punkt_laden(&k.public_key).is_ok());
    }

    #[test]
    fn diffie_hellman_symmetrisch() {
        let a = generate_temporary_key();
        let b = generate_temporary_key();
        let ab = shared_secret(&b.public_key, &a.private_key).unwrap();
        let ba = shared_secret(&a.public_key, &b.private_key).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn falsche_laenge() {
        assert!(matches!(
            punkt_laden(&[0u8; 31]),
            Err(CryptoError::UngueltigeSchluesselLaenge { erwartet: 32, erhalten: 31 })
        ));
    }
}
