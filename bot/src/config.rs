//! Bot-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, sodass der Bot ohne Konfigurationsdatei einen lokalen
//! Server anspricht.

use serde::{Deserialize, Serialize};
use tsvoice_client::{ConnectionParameters, Password, VersionSigned};
use tsvoice_crypto::Identity;
use tsvoice_observability::{log_format_gueltig, log_level_gueltig};

/// Mindestlevel der Identitaet
pub const STANDARD_SICHERHEITSLEVEL: i32 = 8;

/// Hoechstes Level, das der Bot selbst errechnet
pub const MAX_SICHERHEITSLEVEL: i32 = 20;

/// Vollstaendige Bot-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub verbindung: VerbindungsEinstellungen,
    pub identitaet: IdentitaetsEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Server, Kanal und Client-Angaben
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// `host[:port]`
    pub adresse: String,
    /// Zielkanal: ID, `cid=ID`, `#ID`, Name oder Pfad `a/b` (leer = Standardkanal des Servers)
    pub kanal: String,
    pub kanal_passwort: String,
    pub server_passwort: String,
    pub nickname: String,
    pub nickname_phonetic: String,
    pub standard_token: String,
    /// Leer = Standard-HWID
    pub hwid: String,
    /// Versionsstring, Plattform und Signatur gehoeren zusammen.
    /// Ohne Signatur gilt die signierte Standardversion des Betriebssystems.
    pub version: String,
    pub plattform: String,
    pub signatur: String,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            adresse: "127.0.0.1:9987".into(),
            kanal: String::new(),
            kanal_passwort: String::new(),
            server_passwort: String::new(),
            nickname: "tsvoice-bot".into(),
            nickname_phonetic: String::new(),
            standard_token: String::new(),
            hwid: String::new(),
            version: String::new(),
            plattform: String::new(),
            signatur: String::new(),
        }
    }
}

/// Identitaetsdatei und Ziel-Sicherheitslevel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitaetsEinstellungen {
    /// Wird beim ersten Start erzeugt
    pub datei: String,
    /// Gewuenschtes Level, mindestens 8, hoechstens 20
    pub sicherheitslevel: i32,
    /// Offset fuer Schluessel ohne eingebetteten Offset (reines Base64-DER)
    pub key_offset: u64,
}

impl Default for IdentitaetsEinstellungen {
    fn default() -> Self {
        Self {
            datei: "identity.txt".into(),
            sicherheitslevel: STANDARD_SICHERHEITSLEVEL,
            key_offset: 0,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl BotConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if self.verbindung.adresse.trim().is_empty() {
            anyhow::bail!("[verbindung] adresse fehlt");
        }
        if self.identitaet.datei.trim().is_empty() {
            anyhow::bail!("[identitaet] datei fehlt");
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("[logging] format '{}' ungueltig", self.logging.format);
        }
        let level = self.logging.level.trim();
        if !level.contains(['=', ',']) && !log_level_gueltig(level) {
            anyhow::bail!("[logging] level '{level}' ungueltig");
        }
        Ok(())
    }

    /// Gewuenschtes Sicherheitslevel, auf 8..=20 begrenzt
    pub fn ziel_sicherheitslevel(&self) -> i32 {
        let gewuenscht = self.identitaet.sicherheitslevel.max(STANDARD_SICHERHEITSLEVEL);
        if gewuenscht > MAX_SICHERHEITSLEVEL {
            tracing::warn!(
                gewuenscht,
                max = MAX_SICHERHEITSLEVEL,
                "Sicherheitslevel zu hoch, wird begrenzt"
            );
            return MAX_SICHERHEITSLEVEL;
        }
        gewuenscht
    }

    /// Verbindungsparameter fuer den Client
    pub fn verbindungsparameter(&self, identity: Identity) -> ConnectionParameters {
        let v = &self.verbindung;
        let mut parameter = ConnectionParameters::neu(v.adresse.trim(), identity);
        if !v.signatur.trim().is_empty() {
            parameter.version = VersionSigned::aus_konfiguration(&v.version, &v.plattform, &v.signatur);
        }
        parameter.nickname = v.nickname.clone();
        parameter.server_passwort = Password::from_plain(&v.server_passwort);
        parameter.standard_kanal = v.kanal.clone();
        parameter.kanal_passwort = Password::from_plain(&v.kanal_passwort);
        parameter.nickname_phonetisch = v.nickname_phonetic.clone();
        parameter.standard_token = v.standard_token.clone();
        parameter.hwid = v.hwid.clone();
        parameter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.verbindung.adresse, "127.0.0.1:9987");
        assert_eq!(cfg.identitaet.sicherheitslevel, 8);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [verbindung]
            adresse = "ts.example.org"
            kanal = "Musik/Rock"
            nickname = "Radio"

            [identitaet]
            sicherheitslevel = 12
        "#;
        let cfg = BotConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.verbindung.adresse, "ts.example.org");
        assert_eq!(cfg.verbindung.kanal, "Musik/Rock");
        assert_eq!(cfg.identitaet.sicherheitslevel, 12);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.identitaet.datei, "identity.txt");
        assert_eq!(cfg.logging.format, "text");
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = BotConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.pruefen().is_err());

        let mut cfg = BotConfig::default();
        cfg.logging.level = "laut".into();
        assert!(cfg.pruefen().is_err());

        let mut cfg = BotConfig::default();
        cfg.logging.level = "info,tsvoice_transport=trace".into();
        assert!(cfg.pruefen().is_ok());

        let mut cfg = BotConfig::default();
        cfg.verbindung.adresse = " ".into();
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn sicherheitslevel_begrenzen() {
        let mut cfg = BotConfig::default();
        cfg.identitaet.sicherheitslevel = 3;
        assert_eq!(cfg.ziel_sicherheitslevel(), 8);
        cfg.identitaet.sicherheitslevel = 14;
        assert_eq!(cfg.ziel_sicherheitslevel(), 14);
        cfg.identitaet.sicherheitslevel = 40;
        assert_eq!(cfg.ziel_sicherheitslevel(), 20);
    }

    #[test]
    fn parameter_aus_config() {
        let mut cfg = BotConfig::default();
        cfg.verbindung.kanal = "Lobby".into();
        cfg.verbindung.server_passwort = "geheim".into();
        cfg.verbindung.nickname = "Radio".into();
        let parameter = cfg.verbindungsparameter(Identity::generate(0).unwrap());
        assert_eq!(parameter.adresse, "127.0.0.1:9987");
        assert_eq!(parameter.standard_kanal, "Lobby");
        assert_eq!(parameter.nickname, "Radio");
        assert_eq!(parameter.server_passwort, Password::from_plain("geheim"));
        assert!(parameter.kanal_passwort.ist_leer());
        assert_eq!(parameter.version, VersionSigned::standard_fuer_os());
    }

    #[test]
    fn eigene_version_nur_mit_signatur() {
        let mut cfg = BotConfig::default();
        cfg.verbindung.version = "3.6.0 [Build: 1690193193]".into();
        let p = cfg.verbindungsparameter(Identity::generate(0).unwrap());
        assert_eq!(p.version, VersionSigned::standard_fuer_os());

        cfg.verbindung.plattform = "Linux".into();
        cfg.verbindung.signatur = "abc".into();
        let p = cfg.verbindungsparameter(Identity::generate(0).unwrap());
        assert_eq!(p.version.version, "3.6.0 [Build: 1690193193]");
        assert_eq!(p.version.build, 1690193193);
        assert_eq!(p.version.sign, "abc");
    }
}
