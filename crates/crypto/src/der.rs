//! ASN.1/DER-Kodierung der P-256-Schluessel
//!
//! Das Protokoll verwendet kein PKCS#8/SEC1, sondern eine eigene Sequenz
//! deren erstes Element ein Bitstring mit der Schluesselart ist:
//!
//! ```text
//! Art             Bitstring        Folgeelemente
//! -------------   --------------   ---------------------
//! nur oeffentlich  1 Bit,  0x00    INT 32, INT x, INT y
//! nur privat       2 Bit,  0xC0    INT 32, INT d
//! beide            1 Bit,  0x80    INT 32, INT x, INT y, INT d
//! ```

use num_bigint::{BigInt, BigUint, Sign};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use simple_asn1::{from_der, to_der, ASN1Block};

use crate::error::{CryptoError, CryptoResult};

const ART_OEFFENTLICH: u8 = 0x00;
const ART_BEIDE: u8 = 0x80;
const ART_PRIVAT: u8 = 0xC0;

/// Ergebnis eines dynamischen Imports (mindestens eine Haelfte ist gesetzt)
#[derive(Debug, Clone)]
pub struct ImportierterSchluessel {
    pub oeffentlich: Option<PublicKey>,
    pub privat: Option<SecretKey>,
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

pub fn export_public_key(public: &PublicKey) -> CryptoResult<Vec<u8>> {
    let (x, y) = koordinaten(public)?;
    kodieren(vec![
        ASN1Block::BitString(0, 1, vec![ART_OEFFENTLICH]),
        zahl_klein(32),
        zahl(&x),
        zahl(&y),
    ])
}

pub fn export_private_key(secret: &SecretKey) -> CryptoResult<Vec<u8>> {
    kodieren(vec![
        ASN1Block::BitString(0, 2, vec![ART_PRIVAT]),
        zahl_klein(32),
        zahl(&secret.to_bytes()),
    ])
}

pub fn export_public_and_private_key(
    public: &PublicKey,
    secret: &SecretKey,
) -> CryptoResult<Vec<u8>> {
    let (x, y) = koordinaten(public)?;
    kodieren(vec![
        ASN1Block::BitString(0, 1, vec![ART_BEIDE]),
        zahl_klein(32),
        zahl(&x),
        zahl(&y),
        zahl(&secret.to_bytes()),
    ])
}

fn kodieren(elemente: Vec<ASN1Block>) -> CryptoResult<Vec<u8>> {
    to_der(&ASN1Block::Sequence(0, elemente)).map_err(|e| CryptoError::Asn1(e.to_string()))
}

fn koordinaten(public: &PublicKey) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let punkt = public.to_encoded_point(false);
    match (punkt.x(), punkt.y()) {
        (Some(x), Some(y)) => Ok((x.to_vec(), y.to_vec())),
        _ => Err(CryptoError::Asn1("Punkt im Unendlichen".into())),
    }
}

fn zahl(bytes_be: &[u8]) -> ASN1Block {
    ASN1Block::Integer(0, BigInt::from_bytes_be(Sign::Plus, bytes_be))
}

fn zahl_klein(wert: u32) -> ASN1Block {
    ASN1Block::Integer(0, BigInt::from(wert))
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Importiert oeffentlichen und/oder privaten Schluessel
///
/// Fehlt der oeffentliche Teil, wird er aus dem privaten berechnet.
pub fn import_key_dynamic(der: &[u8]) -> CryptoResult<ImportierterSchluessel> {
    let bloecke = from_der(der).map_err(|e| CryptoError::Asn1(e.to_string()))?;
    let elemente = match bloecke.first() {
        Some(ASN1Block::Sequence(_, elemente)) => elemente,
        _ => return Err(CryptoError::Asn1("Sequenz erwartet".into())),
    };
    let art = match elemente.first() {
        Some(ASN1Block::BitString(_, _, bytes)) => bytes.first().copied().unwrap_or(0),
        _ => return Err(CryptoError::Asn1("Bitstring erwartet".into())),
    };

    let (oeffentlich, privat) = match art {
        ART_OEFFENTLICH | ART_BEIDE => {
            let x = ganzzahl(elemente, 2)?;
            let y = ganzzahl(elemente, 3)?;
            let oeffentlich = punkt_aus_koordinaten(&x, &y)?;
            let privat = if art == ART_BEIDE {
                Some(geheimnis_aus_zahl(&ganzzahl(elemente, 4)?)?)
            } else {
                None
            };
            (Some(oeffentlich), privat)
        }
        ART_PRIVAT => (None, Some(geheimnis_aus_zahl(&ganzzahl(elemente, 2)?)?)),
        andere => {
            return Err(CryptoError::Asn1(format!("unbekannte Schluesselart 0x{andere:02X}")))
        }
    };

    let oeffentlich = oeffentlich.or_else(|| privat.as_ref().map(SecretKey::public_key));
    Ok(ImportierterSchluessel {
        oeffentlich,
        privat,
    })
}

fn ganzzahl(elemente: &[ASN1Block], index: usize) -> CryptoResult<BigUint> {
    match elemente.get(index) {
        Some(ASN1Block::Integer(_, wert)) => wert
            .to_biguint()
            .ok_or_else(|| CryptoError::Asn1(format!("negative Zahl an Position {index}"))),
        _ => Err(CryptoError::Asn1(format!("Ganzzahl an Position {index} erwartet"))),
    }
}

/// Rechtsbuendig in 32 Bytes (big-endian)
pub(crate) fn auf_32_bytes(wert: &BigUint) -> CryptoResult<[u8; 32]> {
    let bytes = wert.to_bytes_be();
    if bytes.len() > 32 {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 32,
            erhalten: bytes.len(),
        });
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

fn punkt_aus_koordinaten(x: &BigUint, y: &BigUint) -> CryptoResult<PublicKey> {
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&auf_32_bytes(x)?);
    sec1.extend_from_slice(&auf_32_bytes(y)?);
    PublicKey::from_sec1_bytes(&sec1)
        .map_err(|_| CryptoError::Asn1("Punkt liegt nicht auf P-256".into()))
}

fn geheimnis_aus_zahl(d: &BigUint) -> CryptoResult<SecretKey> {
    SecretKey::from_slice(&auf_32_bytes(d)?)
        .map_err(|_| CryptoError::Asn1("privater Skalar ausserhalb des Bereichs".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn oeffentlicher_schluessel_roundtrip() {
        let secret = SecretKey::random(&mut OsRng);
        let der = export_public_key(&secret.public_key()).unwrap();
        let import = import_key_dynamic(&der).unwrap();
        assert_eq!(import.oeffentlich, Some(secret.public_key()));
        assert!(import.privat.is_none());
    }

    #[test]
    fn nur_privat_stellt_oeffentlich_wieder_her() {
        let secret = SecretKey::random(&mut OsRng);
        let der = export_private_key(&secret).unwrap();
        let import = import_key_dynamic(&der).unwrap();
        assert_eq!(import.privat.as_ref().map(SecretKey::to_bytes), Some(secret.to_bytes()));
        assert_eq!(import.oeffentlich, Some(secret.public_key()));
    }

    #[test]
    fn beide_haelften() {
        let secret = SecretKey::random(&mut OsRng);
        let der = export_public_and_private_key(&secret.public_key(), &secret).unwrap();
        let import = import_key_dynamic(&der).unwrap();
        assert_eq!(import.oeffentlich, Some(secret.public_key()));
        assert!(import.privat.is_some());
    }

    #[test]
    fn bitstring_layout() {
        let secret = SecretKey::random(&mut OsRng);
        let der = export_public_key(&secret.public_key()).unwrap();
        // SEQUENCE, Laenge, dann BIT STRING (03 02 07 00)
        assert_eq!(der[0], 0x30);
        let bitstring = der.windows(4).position(|w| w == [0x03, 0x02, 0x07, 0x00]);
        assert!(bitstring.is_some());

        let der = export_private_key(&secret).unwrap();
        assert!(der.windows(4).any(|w| w == [0x03, 0x02, 0x06, 0xC0]));
    }

    #[test]
    fn muell_wird_abgelehnt() {
        assert!(import_key_dynamic(b"kein der").is_err());
        assert!(import_key_dynamic(&[]).is_err());
    }

    #[test]
    fn zahl_zu_gross() {
        let wert = BigUint::from_bytes_be(&[1u8; 33]);
        assert!(auf_32_bytes(&wert).is_err());
        let klein = BigUint::from(5u8);
        assert_eq!(auf_32_bytes(&klein).unwrap()[31], 5);
    }
}
