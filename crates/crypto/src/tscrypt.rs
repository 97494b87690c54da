//! Paketverschluesselung (AES-128-EAX mit 8-Byte-Tag)
//!
//! Drei Modi je nach Paket:
//!
//! ```text
//! INIT1                -> MAC = "TS3INIT1", Nutzdaten im Klartext
//! Flag UNENCRYPTED     -> MAC = Fake-Signatur (SHA1(iv)[..8]), Klartext
//! sonst                -> EAX(key, nonce, aad = header)
//!                         vor Abschluss des Krypto-Setups: fester Dummy-Schluessel
//! ```
//!
//! Schluessel und Nonce werden pro (Richtung, Pakettyp) aus dem IV-Struct
//! abgeleitet und bis zum naechsten Generationswechsel zwischengespeichert:
//!
//! ```text
//! SHA256( 0x30|0x31 ‖ typ ‖ generation_be32 ‖ iv ) -> key = [0..16], nonce = [16..32]
//! key[0] ^= id >> 8,  key[1] ^= id & 0xFF
//! ```

use std::collections::HashMap;

use aes::Aes128;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use eax::aead::consts::U8;
use eax::aead::generic_array::GenericArray;
use eax::aead::{AeadInPlace, KeyInit};
use eax::Eax;
use p256::ecdh::diffie_hellman;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use tsvoice_protocol::{Direction, Packet, PacketFlags, PacketType, MAC_LEN};

use crate::der;
use crate::edwards;
use crate::error::{CryptoError, CryptoResult};
use crate::identity::{verify_sign, Identity};
use crate::license::Licenses;

type Aes128Eax8 = Eax<Aes128, U8>;

/// Init-Version bis zum ersten Zeitstempel-Update
pub const INIT_VERSION: u32 = 1_566_914_096;

const TS3_INIT_MAC: &[u8; MAC_LEN] = b"TS3INIT1";
const DUMMY_KEY: &[u8; 16] = b"c:\\windows\\syste";
const DUMMY_NONCE: &[u8; 16] = b"m\\firewall32.cpl";

/// Abgeleitetes Schluessel/Nonce-Paar einer Generation
#[derive(Debug, Clone, Copy)]
struct KeyNonce {
    key: [u8; 16],
    nonce: [u8; 16],
    generation: u32,
}

/// Zustand der Paketverschluesselung einer Verbindung
///
/// Wird beim Verbindungsaufbau mit [`TsCrypt::reset`] zurueckgesetzt.
pub struct TsCrypt {
    pub(crate) identity: Identity,
    pub(crate) crypto_init_complete: bool,
    pub(crate) init_version: u32,
    pub(crate) client_ip: String,
    pub(crate) alpha_tmp: Option<[u8; 10]>,
    iv_struct: Option<Vec<u8>>,
    fake_signature: [u8; MAC_LEN],
    /// Hoechstens 2 x 9 Eintraege
    key_cache: HashMap<(Direction, PacketType), KeyNonce>,
}

impl TsCrypt {
    pub fn neu(identity: Identity) -> Self {
        Self {
            identity,
            crypto_init_complete: false,
            init_version: INIT_VERSION,
            client_ip: String::new(),
            alpha_tmp: None,
            iv_struct: None,
            fake_signature: [0u8; MAC_LEN],
            key_cache: HashMap::new(),
        }
    }

    /// Verwirft alle Sitzungsdaten (Identitaet und Client-IP bleiben)
    pub fn reset(&mut self) {
        self.crypto_init_complete = false;
        self.iv_struct = None;
        self.alpha_tmp = None;
        self.init_version = INIT_VERSION;
        self.fake_signature = [0u8; MAC_LEN];
        self.key_cache.clear();
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn set_client_ip(&mut self, ip: &str) {
        self.client_ip = ip.trim().to_string();
    }

    pub fn is_crypto_init_complete(&self) -> bool {
        self.crypto_init_complete
    }

    pub fn fake_signature(&self) -> &[u8; MAC_LEN] {
        &self.fake_signature
    }

    // -----------------------------------------------------------------------
    // Schluesselaustausch
    // -----------------------------------------------------------------------

    /// Altes Verfahren (`initivexpand`): ECDH mit dem P-256-Schluessel des Servers
    pub fn crypto_init(&mut self, alpha: &str, beta: &str, omega: &str) -> CryptoResult<()> {
        let alpha = STANDARD.decode(alpha)?;
        let beta = STANDARD.decode(beta)?;
        let omega = STANDARD.decode(omega)?;

        let server = der::import_key_dynamic(&omega)?
            .oeffentlich
            .ok_or_else(|| CryptoError::KeyExchange("omega ohne oeffentlichen Schluessel".into()))?;
        let geteilt = diffie_hellman(self.identity.secret_key().to_nonzero_scalar(), server.as_affine());
        let shared = Sha1::digest(geteilt.raw_secret_bytes());

        self.set_shared_secret(&alpha, &beta, &shared)
    }

    /// Neues Verfahren (`initivexpand2`): Lizenzkette + Edwards-Schluessel
    ///
    /// `proof` muss eine gueltige Signatur des Servers (omega) ueber die
    /// Lizenzbytes sein.
    pub fn crypto_init2(
        &mut self,
        license: &str,
        omega: &str,
        proof: &str,
        beta: &str,
        temp_private: &[u8; 32],
    ) -> CryptoResult<()> {
        let alpha = self
            .alpha_tmp
            .ok_or_else(|| CryptoError::KeyExchange("alpha nicht initialisiert".into()))?;
        let license = STANDARD.decode(license)?;
        let omega = STANDARD.decode(omega)?;
        let proof = STANDARD.decode(proof)?;
        let beta = STANDARD.decode(beta)?;

        let server = der::import_key_dynamic(&omega)?
            .oeffentlich
            .ok_or_else(|| CryptoError::KeyExchange("omega ohne oeffentlichen Schluessel".into()))?;
        if !verify_sign(&server, &license, &proof) {
            return Err(CryptoError::SignaturVerifikation("init proof ungueltig".into()));
        }

        let lizenzen = Licenses::parse(&license)?;
        let schluessel = lizenzen.derive_key()?;
        let shared = edwards::shared_secret(&schluessel, temp_private)?;
        debug!(bloecke = lizenzen.blocks.len(), "Lizenzkette abgeleitet");

        self.set_shared_secret(&alpha, &beta, &shared)
    }

    /// Baut das IV-Struct und schliesst das Krypto-Setup ab
    ///
    /// `iv = (shared[0..10] ^ alpha) ‖ (shared[10..10+len(beta)] ^ beta)`
    pub(crate) fn set_shared_secret(
        &mut self,
        alpha: &[u8],
        beta: &[u8],
        shared: &[u8],
    ) -> CryptoResult<()> {
        if alpha.len() != 10 {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: 10,
                erhalten: alpha.len(),
            });
        }
        if beta.len() != 10 && beta.len() != 54 {
            return Err(CryptoError::KeyExchange(format!(
                "ungueltige beta-Groesse ({})",
                beta.len()
            )));
        }
        if shared.len() < 10 + beta.len() {
            return Err(CryptoError::KeyExchange("gemeinsames Geheimnis zu kurz".into()));
        }

        let mut iv = Vec::with_capacity(10 + beta.len());
        iv.extend(shared[..10].iter().zip(alpha).map(|(s, a)| s ^ a));
        iv.extend(shared[10..10 + beta.len()].iter().zip(beta).map(|(s, b)| s ^ b));

        let signatur = Sha1::digest(&iv);
        self.fake_signature.copy_from_slice(&signatur[..MAC_LEN]);
        self.iv_struct = Some(iv);
        self.key_cache.clear();
        self.alpha_tmp = None;
        self.crypto_init_complete = true;
        debug!(iv_len = 10 + beta.len(), "Krypto-Setup abgeschlossen");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ver- und Entschluesselung
    // -----------------------------------------------------------------------

    /// Setzt `packet.raw` = MAC ‖ Header ‖ (verschluesselte) Nutzdaten
    pub fn encrypt(&mut self, packet: &mut Packet) -> CryptoResult<()> {
        if packet.packet_type == PacketType::Init1 {
            packet.raw = fake_encrypt(packet, TS3_INIT_MAC);
            return Ok(());
        }
        if packet.hat_flag(PacketFlags::UNENCRYPTED) {
            packet.raw = fake_encrypt(packet, &self.fake_signature);
            return Ok(());
        }

        let header = packet.header();
        let kn = self.key_nonce(packet, !self.crypto_init_complete)?;
        let cipher = Aes128Eax8::new(GenericArray::from_slice(&kn.key));
        let mut buf = packet.data.clone();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&kn.nonce), &header, &mut buf)
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

        let mut raw = Vec::with_capacity(MAC_LEN + header.len() + buf.len());
        raw.extend_from_slice(&tag);
        raw.extend_from_slice(&header);
        raw.extend_from_slice(&buf);
        packet.raw = raw;
        Ok(())
    }

    /// Prueft den MAC und setzt `packet.data` auf den Klartext
    ///
    /// Schlaegt die echte Entschluesselung eines ACK mit ID <= 2 fehl, wird
    /// der Dummy-Schluessel versucht (der Server bestaetigt die ersten
    /// Kommandos noch mit dem alten Schluessel).
    pub fn decrypt(&mut self, packet: &mut Packet) -> CryptoResult<()> {
        if packet.packet_type == PacketType::Init1 {
            return fake_decrypt(packet, TS3_INIT_MAC);
        }
        if packet.hat_flag(PacketFlags::UNENCRYPTED) {
            let mac = self.fake_signature;
            return fake_decrypt(packet, &mac);
        }

        match self.decrypt_data(packet, !self.crypto_init_complete) {
            Ok(()) => Ok(()),
            Err(e) if packet.packet_type == PacketType::Ack && packet.id <= 2 => {
                trace!(id = packet.id, fehler = %e, "ACK-Fallback auf Dummy-Schluessel");
                self.decrypt_data(packet, true)
            }
            Err(e) => Err(e),
        }
    }

    fn decrypt_data(&mut self, packet: &mut Packet, dummy: bool) -> CryptoResult<()> {
        let header = packet.header();
        let start = MAC_LEN + header.len();
        if packet.raw.len() < start {
            return Err(CryptoError::Entschluesselung("Paket kuerzer als Header".into()));
        }

        let kn = self.key_nonce(packet, dummy)?;
        let cipher = Aes128Eax8::new(GenericArray::from_slice(&kn.key));
        let mut buf = packet.raw[start..].to_vec();
        let tag = GenericArray::clone_from_slice(&packet.raw[..MAC_LEN]);
        cipher
            .decrypt_in_place_detached(GenericArray::from_slice(&kn.nonce), &header, &mut buf, &tag)
            .map_err(|_| CryptoError::Entschluesselung(format!("MAC ungueltig (id={})", packet.id)))?;
        packet.data = buf;
        Ok(())
    }

    fn key_nonce(&mut self, packet: &Packet, dummy: bool) -> CryptoResult<KeyNonce> {
        if dummy {
            return Ok(KeyNonce {
                key: *DUMMY_KEY,
                nonce: *DUMMY_NONCE,
                generation: packet.generation,
            });
        }
        let iv = self.iv_struct.as_ref().ok_or(CryptoError::NichtInitialisiert)?;

        let schluessel = (packet.direction, packet.packet_type);
        let kn = match self.key_cache.get(&schluessel) {
            Some(kn) if kn.generation == packet.generation => *kn,
            _ => {
                let mut hasher = Sha256::new();
                hasher.update([
                    match packet.direction {
                        Direction::ServerToClient => 0x30,
                        Direction::ClientToServer => 0x31,
                    },
                    packet.packet_type as u8 & 0x0F,
                ]);
                hasher.update(packet.generation.to_be_bytes());
                hasher.update(iv);
                let hash = hasher.finalize();

                let mut kn = KeyNonce {
                    key: [0u8; 16],
                    nonce: [0u8; 16],
                    generation: packet.generation,
                };
                kn.key.copy_from_slice(&hash[..16]);
                kn.nonce.copy_from_slice(&hash[16..32]);
                self.key_cache.insert(schluessel, kn);
                kn
            }
        };

        let mut kn = kn;
        kn.key[0] ^= (packet.id >> 8) as u8;
        kn.key[1] ^= (packet.id & 0xFF) as u8;
        Ok(kn)
    }
}

fn fake_encrypt(packet: &Packet, mac: &[u8; MAC_LEN]) -> Vec<u8> {
    let mut raw = packet.encode();
    raw[..MAC_LEN].copy_from_slice(mac);
    raw
}

fn fake_decrypt(packet: &mut Packet, mac: &[u8; MAC_LEN]) -> CryptoResult<()> {
    let start = MAC_LEN + packet.header_len();
    if packet.raw.len() < start {
        return Err(CryptoError::Entschluesselung("Paket kuerzer als Header".into()));
    }
    if &packet.raw[..MAC_LEN] != mac {
        return Err(CryptoError::Entschluesselung(format!(
            "Fake-MAC stimmt nicht (typ={:?}, id={})",
            packet.packet_type, packet.id
        )));
    }
    packet.data = packet.raw[start..].to_vec();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypt() -> TsCrypt {
        TsCrypt::neu(Identity::generate(0).unwrap())
    }

    /// Simuliert die Gegenstelle: gleiches IV-Struct, andere Richtung
    fn paar() -> (TsCrypt, TsCrypt) {
        let mut a = crypt();
        let mut b = crypt();
        let shared = [7u8; 64];
        a.set_shared_secret(&[1u8; 10], &[2u8; 54], &shared).unwrap();
        b.set_shared_secret(&[1u8; 10], &[2u8; 54], &shared).unwrap();
        (a, b)
    }

    fn eingehend(raw: &[u8]) -> Packet {
        Packet::decode(Direction::ClientToServer, raw).unwrap()
    }

    #[test]
    fn init1_mit_festem_mac() {
        let mut c = crypt();
        let mut p = Packet::neu(PacketType::Init1, PacketFlags::KEINE, vec![1, 2, 3]);
        p.id = 101;
        c.encrypt(&mut p).unwrap();
        assert_eq!(&p.raw[..8], b"TS3INIT1");
        assert_eq!(&p.raw[13..], &[1, 2, 3]);

        let mut zurueck = eingehend(&p.raw);
        c.decrypt(&mut zurueck).unwrap();
        assert_eq!(zurueck.data, vec![1, 2, 3]);
    }

    #[test]
    fn unverschluesselt_mit_fake_signatur() {
        let (mut a, mut b) = paar();
        assert_ne!(a.fake_signature(), &[0u8; 8]);
        let mut p = Packet::neu(PacketType::Ping, PacketFlags::UNENCRYPTED, vec![]);
        a.encrypt(&mut p).unwrap();
        assert_eq!(&p.raw[..8], a.fake_signature());

        let mut zurueck = eingehend(&p.raw);
        b.decrypt(&mut zurueck).unwrap();

        // Falscher MAC wird abgelehnt
        let mut kaputt = p.raw.clone();
        kaputt[0] ^= 1;
        assert!(b.decrypt(&mut eingehend(&kaputt)).is_err());
    }

    #[test]
    fn dummy_schluessel_vor_setup() {
        let mut a = crypt();
        let mut b = crypt();
        let mut p = Packet::neu(PacketType::Command, PacketFlags::NEW_PROTOCOL, b"clientinitiv".to_vec());
        p.id = 0;
        a.encrypt(&mut p).unwrap();
        assert_eq!(p.raw.len(), 8 + 5 + 12);
        assert_ne!(&p.raw[13..], b"clientinitiv");

        let mut zurueck = eingehend(&p.raw);
        b.decrypt(&mut zurueck).unwrap();
        assert_eq!(zurueck.data, b"clientinitiv");
    }

    #[test]
    fn echte_verschluesselung_roundtrip() {
        let (mut a, mut b) = paar();
        for id in [0u16, 1, 300, 65535] {
            let mut p = Packet::neu(PacketType::Command, PacketFlags::NEW_PROTOCOL, b"clientinit".to_vec());
            p.id = id;
            p.generation = 3;
            a.encrypt(&mut p).unwrap();

            let mut zurueck = eingehend(&p.raw);
            zurueck.generation = 3;
            b.decrypt(&mut zurueck).unwrap();
            assert_eq!(zurueck.data, b"clientinit");

            // Falsche Generation -> anderer Schluessel
            let mut falsch = eingehend(&p.raw);
            falsch.generation = 4;
            assert!(b.decrypt(&mut falsch).is_err());
        }
    }

    #[test]
    fn header_ist_authentifiziert() {
        let (mut a, mut b) = paar();
        let mut p = Packet::neu(PacketType::Command, PacketFlags::NEW_PROTOCOL, b"x".to_vec());
        p.id = 9;
        a.encrypt(&mut p).unwrap();
        let mut raw = p.raw.clone();
        // Flag-Nibble veraendern
        raw[12] ^= 0x40;
        assert!(b.decrypt(&mut eingehend(&raw)).is_err());
    }

    #[test]
    fn ack_faellt_auf_dummy_zurueck() {
        let mut alt = crypt();
        let (_, mut neu) = paar();
        for (id, erwartet_ok) in [(1u16, true), (2, true), (3, false)] {
            let mut ack = Packet::neu(PacketType::Ack, PacketFlags::KEINE, id.to_be_bytes().to_vec());
            ack.id = id;
            alt.encrypt(&mut ack).unwrap();
            let mut zurueck = eingehend(&ack.raw);
            assert_eq!(neu.decrypt(&mut zurueck).is_ok(), erwartet_ok, "id={id}");
        }
    }

    #[test]
    fn shared_secret_validierung() {
        let mut c = crypt();
        assert!(c.set_shared_secret(&[0; 10], &[0; 11], &[0; 64]).is_err());
        assert!(c.set_shared_secret(&[0; 9], &[0; 10], &[0; 64]).is_err());
        assert!(c.set_shared_secret(&[0; 10], &[0; 54], &[0; 20]).is_err());
        assert!(!c.is_crypto_init_complete());

        c.alpha_tmp = Some([1; 10]);
        c.set_shared_secret(&[0; 10], &[0; 10], &[0; 20]).unwrap();
        assert!(c.is_crypto_init_complete());
        assert!(c.alpha_tmp.is_none());
        // SHA1 von 20 Nullbytes beginnt mit 67 68 03 3e
        assert_eq!(&c.fake_signature()[..4], &[0x67, 0x68, 0x03, 0x3e]);
    }

    #[test]
    fn crypto_init_ecdh_beide_seiten_gleich() {
        // Client und Server rechnen ECDH jeweils mit dem Gegenschluessel
        let client = Identity::generate(0).unwrap();
        let server = Identity::generate(0).unwrap();
        let alpha = STANDARD.encode([3u8; 10]);
        let beta = STANDARD.encode([4u8; 10]);

        let mut c = TsCrypt::neu(client.clone());
        c.crypto_init(&alpha, &beta, server.public_key_string()).unwrap();
        let mut s = TsCrypt::neu(server);
        s.crypto_init(&alpha, &beta, client.public_key_string()).unwrap();

        assert_eq!(c.fake_signature(), s.fake_signature());
    }

    #[test]
    fn crypto_init2_braucht_alpha_und_gueltigen_beweis() {
        let server = Identity::generate(0).unwrap();
        let lizenz = STANDARD.encode([1u8]);
        let beweis = STANDARD.encode(server.sign(&[1u8]));
        let beta = STANDARD.encode([9u8; 54]);
        let temp = edwards::generate_temporary_key();

        let mut c = crypt();
        assert!(c
            .crypto_init2(&lizenz, server.public_key_string(), &beweis, &beta, &temp.private_key)
            .is_err());

        c.alpha_tmp = Some([5u8; 10]);
        let falscher_beweis = STANDARD.encode(server.sign(&[2u8]));
        assert!(matches!(
            c.crypto_init2(&lizenz, server.public_key_string(), &falscher_beweis, &beta, &temp.private_key),
            Err(CryptoError::SignaturVerifikation(_))
        ));

        // Leere Kette: abgeleiteter Schluessel = Wurzelschluessel
        c.crypto_init2(&lizenz, server.public_key_string(), &beweis, &beta, &temp.private_key)
            .unwrap();
        assert!(c.is_crypto_init_complete());
    }

    #[test]
    fn reset_verwirft_setup() {
        let (mut a, _) = paar();
        a.reset();
        assert!(!a.is_crypto_init_complete());
        assert_eq!(a.fake_signature(), &[0u8; 8]);
        assert_eq!(a.init_version, INIT_VERSION);
    }
}
