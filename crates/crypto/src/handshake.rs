//! Init1-Handshake (Cookie-Austausch und RSA-Puzzle)
//!
//! Vor jedem verschluesselten Paket tauschen Client und Server fuenf
//! INIT1-Pakete aus. Der Client antwortet auf jeden Server-Schritt mit
//! dem naechsten eigenen Schritt.
//!
//! ```text
//! Client                                     Server
//!   | --- 0: version, zeit, zufall ---------->  |
//!   | <-- 1: cookie(16), zufall(4) -----------  |
//!   | --- 2: version, cookie zurueck -------->  |
//!   | <-- 3: x(64), n(64), level(4), 100 -----  |
//!   | --- 4: y = x^(2^level) mod n, clientinitiv
//!   | <-- 0x7F: Neustart (von vorn) ----------  |
//! ```
//!
//! C2S-Pakete beginnen mit der 4-Byte-Version, S2C-Pakete direkt mit dem Schritt.

use num_bigint::BigUint;
use rand_core::{OsRng, RngCore};
use tracing::{debug, trace};
use tsvoice_protocol::Direction;

use crate::error::{CryptoError, CryptoResult};
use crate::tscrypt::{TsCrypt, INIT_VERSION};

/// Sekunden bis zum Referenzzeitpunkt der Init-Version (2013-01-01)
const VERSION_EPOCHE: i64 = 1_356_998_400;

/// Hoechstes zulaessiges Puzzle-Level
pub const PUZZLE_LEVEL_MAX: i32 = 1_000_000;

const VERSION_LEN: usize = 4;
const SCHRITT_LEN: usize = 1;
const PUZZLE_LEN: usize = SCHRITT_LEN + 64 + 64 + 4 + 100;

/// Erkannter Handshake-Schritt eines INIT1-Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init1Schritt {
    /// Noch kein Paket: Client beginnt
    Start,
    /// 0: Client-Hallo (version, zeit, zufall)
    ClientHallo,
    /// 1: Server-Cookie
    ServerCookie,
    /// 2: Client gibt das Cookie zurueck
    ClientCookie,
    /// 3: Server schickt das Puzzle
    ServerPuzzle,
    /// 4: Client-Loesung mit `clientinitiv`
    ClientLoesung,
    /// 0x7F: Server verlangt Neustart
    Neustart,
}

impl Init1Schritt {
    /// Liest den Schritt aus den Nutzdaten (S2C: Byte 0, C2S: Byte 4)
    pub fn erkennen(direction: Direction, data: Option<&[u8]>) -> CryptoResult<Self> {
        let Some(data) = data else {
            return Ok(Self::Start);
        };
        match direction {
            Direction::ServerToClient => match data.first() {
                None => Err(CryptoError::Handshake("Paket zu kurz".into())),
                Some(1) => Ok(Self::ServerCookie),
                Some(3) => Ok(Self::ServerPuzzle),
                Some(0x7F) => Ok(Self::Neustart),
                Some(andere) => Err(CryptoError::Handshake(format!("ungueltiger Schritt {andere}"))),
            },
            Direction::ClientToServer => match data.get(VERSION_LEN) {
                None => Err(CryptoError::Handshake("Paket zu kurz".into())),
                Some(0) => Ok(Self::ClientHallo),
                Some(2) => Ok(Self::ClientCookie),
                Some(4) => Ok(Self::ClientLoesung),
                Some(andere) => Err(CryptoError::Handshake(format!("ungueltiger Schritt {andere}"))),
            },
        }
    }
}

impl TsCrypt {
    /// Berechnet die Antwort auf ein INIT1-Paket
    ///
    /// `None` startet den Handshake. Eine leere Antwort bedeutet: Handshake
    /// abgeschlossen, nichts mehr zu senden.
    pub fn process_init1(
        &mut self,
        direction: Direction,
        data: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        let schritt = Init1Schritt::erkennen(direction, data)?;
        trace!(?schritt, "Init1-Schritt");
        let data = data.unwrap_or_default();

        match schritt {
            Init1Schritt::Start | Init1Schritt::Neustart => {
                self.init_version_aktualisieren();
                let mut antwort = Vec::with_capacity(VERSION_LEN + SCHRITT_LEN + 4 + 4 + 8);
                antwort.extend_from_slice(&self.init_version.to_be_bytes());
                antwort.push(0x00);
                antwort.extend_from_slice(&(chrono::Utc::now().timestamp() as u32).to_be_bytes());
                antwort.extend_from_slice(&OsRng.next_u32().to_be_bytes());
                antwort.extend_from_slice(&[0u8; 8]);
                Ok(antwort)
            }
            Init1Schritt::ClientHallo => {
                laenge_pruefen(data, 21)?;
                let mut antwort = vec![0u8; SCHRITT_LEN + 16 + 4];
                antwort[0] = 0x01;
                let zufall = u32::from_le_bytes([data[9], data[10], data[11], data[12]]);
                antwort[17..21].copy_from_slice(&zufall.to_be_bytes());
                Ok(antwort)
            }
            Init1Schritt::ServerCookie => match data.len() {
                21 => {
                    let mut antwort = Vec::with_capacity(VERSION_LEN + SCHRITT_LEN + 20);
                    antwort.extend_from_slice(&self.init_version.to_be_bytes());
                    antwort.push(0x02);
                    antwort.extend_from_slice(&data[1..21]);
                    Ok(antwort)
                }
                5 => {
                    let fehler = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
                    Err(CryptoError::Handshake(format!("Init1(1) error: {fehler}")))
                }
                andere => Err(CryptoError::Handshake(format!("ungueltige Laenge {andere}"))),
            },
            Init1Schritt::ClientCookie => {
                laenge_pruefen(data, VERSION_LEN + SCHRITT_LEN + 16 + 4)?;
                let mut antwort = vec![0u8; PUZZLE_LEN];
                antwort[0] = 0x03;
                antwort[SCHRITT_LEN + 63] = 1;
                antwort[SCHRITT_LEN + 127] = 1;
                antwort[129..133].copy_from_slice(&1i32.to_be_bytes());
                Ok(antwort)
            }
            Init1Schritt::ServerPuzzle => {
                laenge_pruefen(data, PUZZLE_LEN)?;
                self.puzzle_beantworten(data)
            }
            Init1Schritt::ClientLoesung => {
                let minimum = VERSION_LEN + PUZZLE_LEN + 64;
                if data.len() < minimum {
                    return Err(CryptoError::Handshake(format!(
                        "Paket zu kurz ({} < {minimum})",
                        data.len()
                    )));
                }
                Ok(Vec::new())
            }
        }
    }

    fn puzzle_beantworten(&mut self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut alpha = [0u8; 10];
        OsRng.fill_bytes(&mut alpha);
        self.alpha_tmp = Some(alpha);

        let befehl = format!(
            "clientinitiv alpha={} omega={} ot=1 ip={}",
            base64_kodieren(&alpha),
            self.identity.public_key_string(),
            self.client_ip
        );

        let level = i32::from_be_bytes([data[129], data[130], data[131], data[132]]);
        let y = loese_puzzle(&data[1..65], &data[65..129], level)?;
        debug!(level, "RSA-Puzzle geloest");

        let mut antwort = Vec::with_capacity(VERSION_LEN + SCHRITT_LEN + 232 + 64 + befehl.len());
        antwort.extend_from_slice(&self.init_version.to_be_bytes());
        antwort.push(0x04);
        antwort.extend_from_slice(&data[1..233]);
        let mut y_feld = [0u8; 64];
        y_feld[64 - y.len()..].copy_from_slice(&y);
        antwort.extend_from_slice(&y_feld);
        antwort.extend_from_slice(befehl.as_bytes());
        Ok(antwort)
    }

    /// Init-Version = Sekunden seit 2013-01-01, ausserhalb von u32 der Standardwert
    fn init_version_aktualisieren(&mut self) {
        let version = chrono::Utc::now().timestamp() - VERSION_EPOCHE;
        self.init_version = match u32::try_from(version) {
            Ok(v) if v > 0 => v,
            _ => INIT_VERSION,
        };
    }
}

/// y = x^(2^level) mod n, big-endian ohne fuehrende Nullen (mindestens 1 Byte)
pub fn loese_puzzle(x: &[u8], n: &[u8], level: i32) -> CryptoResult<Vec<u8>> {
    if !(0..=PUZZLE_LEVEL_MAX).contains(&level) {
        return Err(CryptoError::Handshake(format!(
            "Puzzle-Level {level} ausserhalb 0..={PUZZLE_LEVEL_MAX}"
        )));
    }
    let x = BigUint::from_bytes_be(x);
    let n = BigUint::from_bytes_be(n);
    if n.bits() == 0 {
        return Err(CryptoError::Handshake("Puzzle-Modul ist 0".into()));
    }
    let exponent = BigUint::from(1u8) << (level as usize);
    let y = x.modpow(&exponent, &n).to_bytes_be();
    if y.len() > 64 {
        return Err(CryptoError::Handshake("Puzzle-Ergebnis laenger als 64 Bytes".into()));
    }
    Ok(y)
}

fn laenge_pruefen(data: &[u8], erwartet: usize) -> CryptoResult<()> {
    if data.len() != erwartet {
        return Err(CryptoError::Handshake(format!(
            "ungueltige Laenge {} (erwartet {erwartet})",
            data.len()
        )));
    }
    Ok(())
}

fn base64_kodieren(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn crypt() -> TsCrypt {
        let mut c = TsCrypt::neu(Identity::generate(0).unwrap());
        c.set_client_ip("203.0.113.5");
        c
    }

    #[test]
    fn start_paket() {
        let mut c = crypt();
        let start = c.process_init1(Direction::ClientToServer, None).unwrap();
        assert_eq!(start.len(), 21);
        assert_eq!(start[4], 0x00);
        assert_eq!(&start[13..21], &[0u8; 8]);
        let version = u32::from_be_bytes([start[0], start[1], start[2], start[3]]);
        assert_ne!(version, INIT_VERSION);
        assert_eq!(version, c.init_version);
    }

    #[test]
    fn schritt_erkennung() {
        use Init1Schritt::*;
        let s2c = Direction::ServerToClient;
        let c2s = Direction::ClientToServer;
        assert_eq!(Init1Schritt::erkennen(s2c, None).unwrap(), Start);
        assert_eq!(Init1Schritt::erkennen(s2c, Some(&[1])).unwrap(), ServerCookie);
        assert_eq!(Init1Schritt::erkennen(s2c, Some(&[3])).unwrap(), ServerPuzzle);
        assert_eq!(Init1Schritt::erkennen(s2c, Some(&[0x7F])).unwrap(), Neustart);
        assert!(Init1Schritt::erkennen(s2c, Some(&[2])).is_err());
        assert!(Init1Schritt::erkennen(s2c, Some(&[])).is_err());
        assert_eq!(Init1Schritt::erkennen(c2s, Some(&[0, 0, 0, 0, 2])).unwrap(), ClientCookie);
        assert!(Init1Schritt::erkennen(c2s, Some(&[0, 0, 0, 0])).is_err());
        assert!(Init1Schritt::erkennen(c2s, Some(&[0, 0, 0, 0, 1])).is_err());
    }

    #[test]
    fn client_hallo_wird_zum_cookie() {
        let mut c = crypt();
        let mut hallo = c.process_init1(Direction::ClientToServer, None).unwrap();
        hallo[9..13].copy_from_slice(&0x1122_3344u32.to_le_bytes());
        let cookie = c.process_init1(Direction::ClientToServer, Some(&hallo)).unwrap();
        assert_eq!(cookie.len(), 21);
        assert_eq!(cookie[0], 1);
        assert_eq!(&cookie[17..21], &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn server_cookie_wird_zurueckgegeben() {
        let mut c = crypt();
        let mut cookie = vec![1u8];
        cookie.extend((1..=20).map(|i| i as u8));
        let antwort = c.process_init1(Direction::ServerToClient, Some(&cookie)).unwrap();
        assert_eq!(antwort.len(), 25);
        assert_eq!(antwort[4], 0x02);
        assert_eq!(&antwort[5..], &cookie[1..]);
    }

    #[test]
    fn server_fehlercode() {
        let mut c = crypt();
        let err = c
            .process_init1(Direction::ServerToClient, Some(&[1, 0, 0, 0, 9]))
            .unwrap_err();
        assert!(err.to_string().contains("Init1(1) error: 9"));
        assert!(c.process_init1(Direction::ServerToClient, Some(&[1, 2, 3])).is_err());
    }

    #[test]
    fn client_cookie_wird_zum_puzzle() {
        let mut c = crypt();
        let mut data = vec![0u8; 25];
        data[4] = 2;
        let puzzle = c.process_init1(Direction::ClientToServer, Some(&data)).unwrap();
        assert_eq!(puzzle.len(), 233);
        assert_eq!(puzzle[0], 3);
        assert_eq!(puzzle[64], 1);
        assert_eq!(puzzle[128], 1);
        assert_eq!(&puzzle[129..133], &[0, 0, 0, 1]);
        assert!(c.process_init1(Direction::ClientToServer, Some(&data[..24])).is_err());
    }

    #[test]
    fn puzzle_loesen_und_clientinitiv() {
        let mut c = crypt();
        let mut puzzle = vec![0u8; 233];
        puzzle[0] = 3;
        puzzle[64] = 3; // x = 3
        puzzle[128] = 7; // n = 7
        puzzle[129..133].copy_from_slice(&2i32.to_be_bytes()); // 3^4 mod 7 = 4

        let antwort = c.process_init1(Direction::ServerToClient, Some(&puzzle)).unwrap();
        assert_eq!(antwort[4], 0x04);
        assert_eq!(&antwort[5..237], &puzzle[1..233]);
        assert_eq!(&antwort[237..300], &[0u8; 63]);
        assert_eq!(antwort[300], 4);

        let text = std::str::from_utf8(&antwort[301..]).unwrap();
        assert!(text.starts_with("clientinitiv alpha="));
        assert!(text.contains(&format!("omega={}", c.identity().public_key_string())));
        assert!(text.ends_with(" ot=1 ip=203.0.113.5"));
        assert!(c.alpha_tmp.is_some());

        // Schritt 4 ist das Ende
        let mut c2s = antwort.clone();
        c2s.truncate(301);
        assert!(c.process_init1(Direction::ClientToServer, Some(&c2s)).unwrap().is_empty());
        assert!(c.process_init1(Direction::ClientToServer, Some(&c2s[..300])).is_err());
    }

    #[test]
    fn puzzle_grenzen() {
        assert_eq!(loese_puzzle(&[2], &[100], 0).unwrap(), vec![2]);
        assert_eq!(loese_puzzle(&[2], &[100], 3).unwrap(), vec![56]);
        assert_eq!(loese_puzzle(&[5], &[5], 1).unwrap(), vec![0]);
        assert!(loese_puzzle(&[2], &[100], -1).is_err());
        assert!(loese_puzzle(&[2], &[100], PUZZLE_LEVEL_MAX + 1).is_err());
        assert!(loese_puzzle(&[2], &[0], 1).is_err());
    }

    #[test]
    fn neustart_beginnt_von_vorn() {
        let mut c = crypt();
        let antwort = c.process_init1(Direction::ServerToClient, Some(&[0x7F])).unwrap();
        assert_eq!(antwort.len(), 21);
        assert_eq!(antwort[4], 0);
    }
}
