//! Verbindungsparameter eines Protokoll-Clients
//!
//! Die Parameter gelten fuer genau einen Verbindungsversuch. Bei einem
//! Reconnect mit geaenderter Identitaet oder Konfiguration werden sie neu
//! gebaut und per `configure` uebergeben.

use serde::{Deserialize, Serialize};
use tsvoice_crypto::{hash_password, Identity};

/// Hardware-ID, falls keine konfiguriert ist
pub const DEFAULT_HWID: &str = "+LyYqbDqOvEEpN5pdAbF8/v5kZ0=";

/// Anzeigename, falls keiner konfiguriert ist
pub const DEFAULT_NICKNAME: &str = "tsvoice";

// ---------------------------------------------------------------------------
// Password
// ---------------------------------------------------------------------------

/// Server- oder Kanalpasswort, immer bereits gehasht
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password {
    hashed: String,
}

impl Password {
    /// Kein Passwort (leerer Hash)
    pub const LEER: Password = Password {
        hashed: String::new(),
    };

    /// Uebernimmt einen bereits berechneten Hash
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hashed: hash.into(),
        }
    }

    /// Hasht ein Klartextpasswort (leer bleibt leer)
    pub fn from_plain(klartext: &str) -> Self {
        Self {
            hashed: hash_password(klartext),
        }
    }

    pub fn hashed(&self) -> &str {
        &self.hashed
    }

    pub fn ist_leer(&self) -> bool {
        self.hashed.is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ist_leer() {
            f.write_str("Password(leer)")
        } else {
            f.write_str("Password(***)")
        }
    }
}

// ---------------------------------------------------------------------------
// Plattform und signierte Version
// ---------------------------------------------------------------------------

/// Betriebssystem, als das sich der Client ausgibt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientPlatform {
    Windows,
    Linux,
    MacOs,
    Android,
    Ios,
}

impl ClientPlatform {
    /// Leitet den Typ aus einer Plattform-Angabe wie "OS X" ab
    ///
    /// Unbekanntes gilt als Windows.
    pub fn aus_text(plattform: &str) -> Self {
        let wert = plattform.to_lowercase();
        if wert.contains("win") {
            Self::Windows
        } else if wert.contains("mac") || wert.contains("os x") || wert.contains("osx") {
            Self::MacOs
        } else if wert.contains("linux") {
            Self::Linux
        } else if wert.contains("android") {
            Self::Android
        } else if wert.contains("ios") {
            Self::Ios
        } else {
            Self::Windows
        }
    }
}

/// Versionsstring, Plattform und die dazu passende Server-Signatur
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSigned {
    pub version: String,
    pub platform: String,
    pub platform_typ: ClientPlatform,
    pub build: u64,
    pub sign: String,
}

impl VersionSigned {
    pub fn windows() -> Self {
        Self::eingebaut(
            "3.5.3 [Build: 1587971024]",
            "Windows",
            ClientPlatform::Windows,
            1_587_971_024,
            "Kvmj7qX6wJCPI5GVT71samfmhz/bvs7M+OTXWB/JWxdQbxDe17xda7dzUWLX7pjvdJTqZmbse1HBmTxThPKvAg==",
        )
    }

    pub fn linux() -> Self {
        Self::eingebaut(
            "3.5.3 [Build: 1587971024]",
            "Linux",
            ClientPlatform::Linux,
            1_587_971_024,
            "59chu1YQ1W4DdVj+yJOVmwhJK7s9p9FatqIjQRxEDmIb0CcDDO/K8CrbVnBHbD67/cExJbC3PjC/o/n0pDbiCg==",
        )
    }

    pub fn macos() -> Self {
        Self::eingebaut(
            "3.5.3 [Build: 1586955962]",
            "OS X",
            ClientPlatform::MacOs,
            1_586_955_962,
            "/9gsbyyJoyHW1okwykGgXrn2j29wvnEfnw6/Hvft2WS12CURxTv5L9uLuu36I5u3TzWOxyB9dEbD1FeZ201uCQ==",
        )
    }

    fn eingebaut(
        version: &str,
        platform: &str,
        platform_typ: ClientPlatform,
        build: u64,
        sign: &str,
    ) -> Self {
        Self {
            version: version.to_string(),
            platform: platform.to_string(),
            platform_typ,
            build,
            sign: sign.to_string(),
        }
    }

    /// Signierte Version passend zum laufenden Betriebssystem
    pub fn standard_fuer_os() -> Self {
        if cfg!(target_os = "windows") {
            Self::windows()
        } else if cfg!(target_os = "macos") {
            Self::macos()
        } else {
            Self::linux()
        }
    }

    /// Baut eine Version aus Konfigurationswerten
    ///
    /// Leere Angaben fallen auf die Standardversion des Betriebssystems
    /// zurueck. Die Build-Nummer wird aus `Build: N` im Versionsstring
    /// gelesen.
    pub fn aus_konfiguration(version: &str, plattform: &str, signatur: &str) -> Self {
        let basis = Self::standard_fuer_os();
        let version = nicht_leer(version).unwrap_or(&basis.version).to_string();
        let platform = nicht_leer(plattform).unwrap_or(&basis.platform).to_string();
        let sign = nicht_leer(signatur).unwrap_or(&basis.sign).to_string();
        Self {
            platform_typ: ClientPlatform::aus_text(&platform),
            build: build_nummer(&version).unwrap_or(basis.build),
            version,
            platform,
            sign,
        }
    }
}

fn nicht_leer(wert: &str) -> Option<&str> {
    let wert = wert.trim();
    (!wert.is_empty()).then_some(wert)
}

/// Liest die Zahl hinter `Build:` (Leerzeichen danach sind erlaubt)
fn build_nummer(version: &str) -> Option<u64> {
    let (_, rest) = version.split_once("Build:")?;
    let ziffern: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    ziffern.parse().ok()
}

// ---------------------------------------------------------------------------
// ConnectionParameters
// ---------------------------------------------------------------------------

/// Alles, was fuer einen Verbindungsversuch gebraucht wird
#[derive(Debug, Clone)]
pub struct ConnectionParameters {
    /// `host[:port]`, Standardport 9987
    pub adresse: String,
    pub identity: Identity,
    pub version: VersionSigned,
    pub nickname: String,
    pub server_passwort: Password,
    /// Kanal nach dem Login: ID, `cid=ID`, `#ID`, Name oder Pfad `a/b`
    pub standard_kanal: String,
    pub kanal_passwort: Password,
    pub nickname_phonetisch: String,
    pub standard_token: String,
    pub hwid: String,
}

impl ConnectionParameters {
    pub fn neu(adresse: impl Into<String>, identity: Identity) -> Self {
        Self {
            adresse: adresse.into(),
            identity,
            version: VersionSigned::standard_fuer_os(),
            nickname: DEFAULT_NICKNAME.to_string(),
            server_passwort: Password::LEER,
            standard_kanal: String::new(),
            kanal_passwort: Password::LEER,
            nickname_phonetisch: String::new(),
            standard_token: String::new(),
            hwid: DEFAULT_HWID.to_string(),
        }
    }

    /// Konfigurierte HWID oder die Standard-HWID
    pub fn hwid_oder_standard(&self) -> &str {
        nicht_leer(&self.hwid).unwrap_or(DEFAULT_HWID)
    }

    /// Konfigurierter Name oder der Standardname
    pub fn nickname_oder_standard(&self) -> &str {
        nicht_leer(&self.nickname).unwrap_or(DEFAULT_NICKNAME)
    }
}
