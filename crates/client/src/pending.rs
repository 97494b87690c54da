//! Korrelierte Anfragen: ein Kommando, eine Antwort
//!
//! Der Client haengt `return_code=N` an. Alle Antwortzeilen bis zum
//! `error` mit demselben `return_code` gehoeren zur Anfrage. Es gibt genau
//! einen Platz; eine zweite Anfrage wird sofort abgelehnt.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tsvoice_protocol::ParsedCommand;

use crate::error::{ClientFehler, ClientResult};

/// Hoechster `return_code`, danach beginnt der Zaehler wieder bei 1
pub const RETURN_CODE_MAX: u16 = 0x7FFF;

/// Gesammelte Antwort auf eine Anfrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnfrageErgebnis {
    pub return_code: u16,
    pub antworten: Vec<ParsedCommand>,
    /// Das abschliessende `error`-Kommando
    pub fehler: ParsedCommand,
}

impl AnfrageErgebnis {
    /// Fehler-ID des Servers (0 = ok)
    pub fn fehler_id(&self) -> u32 {
        self.fehler.zahl("id").unwrap_or(0)
    }

    pub fn fehler_nachricht(&self) -> &str {
        self.fehler.param("msg").unwrap_or_default()
    }
}

/// Was mit einem empfangenen Kommando passiert ist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Zuordnung {
    /// Gehoert zu keiner Anfrage (Notify, Handshake oder nichts offen)
    Ignoriert,
    /// Als Antwortzeile gesammelt
    Gesammelt,
    /// `error` hat die offene Anfrage abgeschlossen
    Abgeschlossen,
    /// `error` ohne passende Anfrage, geht an den allgemeinen Fehler-Listener
    Unaufgefordert,
}

struct OffeneAnfrage {
    return_code: u16,
    antworten: Vec<ParsedCommand>,
    fertig: oneshot::Sender<AnfrageErgebnis>,
}

/// Der einzige Platz fuer eine offene Anfrage
pub struct AnfrageSlot {
    offen: Mutex<Option<OffeneAnfrage>>,
    naechster_code: Mutex<u16>,
}

impl Default for AnfrageSlot {
    fn default() -> Self {
        Self {
            offen: Mutex::new(None),
            naechster_code: Mutex::new(1),
        }
    }
}

impl AnfrageSlot {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn ist_belegt(&self) -> bool {
        self.offen.lock().is_some()
    }

    /// Belegt den Platz und vergibt einen `return_code`
    pub fn oeffnen(&self, name: &str) -> ClientResult<(u16, oneshot::Receiver<AnfrageErgebnis>)> {
        let mut offen = self.offen.lock();
        if offen.is_some() {
            return Err(ClientFehler::Beschaeftigt {
                name: name.to_string(),
            });
        }
        let return_code = self.naechster_return_code();
        let (tx, rx) = oneshot::channel();
        *offen = Some(OffeneAnfrage {
            return_code,
            antworten: Vec::new(),
            fertig: tx,
        });
        Ok((return_code, rx))
    }

    /// Gibt den Platz frei, falls er noch von dieser Anfrage belegt ist
    pub fn schliessen(&self, return_code: u16) {
        let mut offen = self.offen.lock();
        if offen.as_ref().is_some_and(|a| a.return_code == return_code) {
            *offen = None;
        }
    }

    /// Verwirft die offene Anfrage; der Wartende erhaelt einen Fehler
    pub fn abbrechen(&self) {
        self.offen.lock().take();
    }

    /// Ordnet ein empfangenes Kommando der offenen Anfrage zu
    pub fn zuordnen(&self, cmd: &ParsedCommand) -> Zuordnung {
        let ist_fehler = cmd.name.eq_ignore_ascii_case("error");
        let mut offen = self.offen.lock();
        let Some(anfrage) = offen.as_mut() else {
            return if ist_fehler {
                Zuordnung::Unaufgefordert
            } else {
                Zuordnung::Ignoriert
            };
        };

        if gehoert_nie_zu_anfrage(&cmd.name) {
            return Zuordnung::Ignoriert;
        }
        if !ist_fehler {
            anfrage.antworten.push(cmd.clone());
            return Zuordnung::Gesammelt;
        }

        let passt = match cmd.param("return_code") {
            None => true,
            Some(code) => code.trim().parse::<u16>().ok() == Some(anfrage.return_code),
        };
        if !passt {
            return Zuordnung::Unaufgefordert;
        }
        if let Some(anfrage) = offen.take() {
            let _ = anfrage.fertig.send(AnfrageErgebnis {
                return_code: anfrage.return_code,
                antworten: anfrage.antworten,
                fehler: cmd.clone(),
            });
        }
        Zuordnung::Abgeschlossen
    }

    fn naechster_return_code(&self) -> u16 {
        let mut naechster = self.naechster_code.lock();
        let code = *naechster;
        *naechster = if code >= RETURN_CODE_MAX { 1 } else { code + 1 };
        code
    }
}

fn gehoert_nie_zu_anfrage(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("notify")
        || name == "initivexpand"
        || name == "initivexpand2"
        || name == "initserver"
}
