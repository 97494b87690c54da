//! Text-Kommandos (Command/CommandLow-Nutzdaten)
//!
//! Zeilenbasiertes Format:
//!   name key1=value1 key2=value2
//!
//! Mehrere Kommandos koennen auf einer Zeile mit `|` getrennt werden.
//! Sonderzeichen in Werten werden mit Backslash escaped:
//!
//! ```text
//! \\  Backslash     \/  Slash        \s  Leerzeichen    \p  Pipe
//! \f  Formfeed      \n  Newline      \r  Return         \t  Tab
//! \v  Vertikal-Tab
//! ```
//!
//! Unbekannte Escape-Sequenzen sind ein harter Fehler.

use crate::error::{ProtokollFehler, ProtokollResult};

/// Ein geparstes Kommando
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCommand {
    /// Kommandoname (z.B. "initserver", "notifycliententerview")
    pub name: String,
    /// Parameter in Reihenfolge des Auftretens (Schluessel eindeutig)
    pub params: Vec<(String, String)>,
}

impl ParsedCommand {
    /// Gibt einen Parameter als String zurueck
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Gibt den ersten vorhandenen Parameter aus `keys` zurueck
    pub fn param_eines(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.param(k))
    }

    /// Parst einen Parameter als Zahl
    pub fn zahl<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.param(key).and_then(|v| v.trim().parse().ok())
    }

    fn param_setzen(&mut self, key: String, value: String) {
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(eintrag) => eintrag.1 = value,
            None => self.params.push((key, value)),
        }
    }
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

/// Ersetzt Sonderzeichen durch ihre Zwei-Zeichen-Escapes
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            ' ' => out.push_str("\\s"),
            '|' => out.push_str("\\p"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{000B}' => out.push_str("\\v"),
            _ => out.push(c),
        }
    }
    out
}

/// Kehrt `escape` exakt um
///
/// # Fehler
/// `UngueltigeEscapeSequenz` bei unbekanntem Zeichen nach `\` oder
/// einem abschliessenden einzelnen Backslash.
pub fn unescape(input: &str) -> ProtokollResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let ersetzt = match chars.next() {
            Some('v') => '\u{000B}',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('n') => '\n',
            Some('f') => '\u{000C}',
            Some('p') => '|',
            Some('s') => ' ',
            Some('/') => '/',
            Some('\\') => '\\',
            Some(andere) => {
                return Err(ProtokollFehler::UngueltigeEscapeSequenz(format!("\\{andere}")))
            }
            None => return Err(ProtokollFehler::UngueltigeEscapeSequenz("\\".into())),
        };
        out.push(ersetzt);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Baut eine Kommandozeile Parameter fuer Parameter auf
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    name: String,
    params: Vec<(String, String)>,
}

impl CommandBuilder {
    pub fn neu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Haengt einen Parameter an (Reihenfolge bleibt erhalten)
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Setzt einen Parameter, ueberschreibt einen vorhandenen gleichen Schluessels
    pub fn param_setzen(&mut self, key: &str, value: impl ToString) {
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some(eintrag) => eintrag.1 = value.to_string(),
            None => self.params.push((key.to_string(), value.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bauen(&self) -> ProtokollResult<String> {
        let params: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        build(&self.name, &params)
    }
}

/// Baut `name k=v k=v` mit escapeten Werten
pub fn build(name: &str, params: &[(&str, &str)]) -> ProtokollResult<String> {
    if name.trim().is_empty() {
        return Err(ProtokollFehler::LeererBefehl);
    }
    let mut out = escape(name);
    for (key, value) in params {
        out.push(' ');
        out.push_str(key);
        out.push('=');
        out.push_str(&escape(value));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parst eine komplette Nutzlast mit beliebig vielen Zeilen und `|`-Teilen
///
/// Leere Zeilen und leere Teile werden uebersprungen.
pub fn parse_lines(payload: &str) -> ProtokollResult<Vec<ParsedCommand>> {
    let mut commands = Vec::new();
    for line in payload.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        for teil in split_unescaped(line, '|') {
            let teil = teil.trim();
            if teil.is_empty() {
                continue;
            }
            commands.push(parse_line(teil)?);
        }
    }
    Ok(commands)
}

/// Parst ein einzelnes Kommando
///
/// Das erste Token ist der Name. Tokens ohne `=` oder mit fuehrendem `=`
/// werden ignoriert.
pub fn parse_line(line: &str) -> ProtokollResult<ParsedCommand> {
    let mut tokens = split_unescaped(line.trim(), ' ')
        .into_iter()
        .filter(|t| !t.is_empty());
    let name = tokens.next().ok_or(ProtokollFehler::LeererBefehl)?;

    let mut cmd = ParsedCommand {
        name: unescape(&name)?,
        params: Vec::new(),
    };
    for token in tokens {
        match token.find('=') {
            Some(eq) if eq > 0 => {
                let value = unescape(&token[eq + 1..])?;
                cmd.param_setzen(token[..eq].to_string(), value);
            }
            _ => continue,
        }
    }
    Ok(cmd)
}

/// Trennt an `trenner`, ausser das Zeichen ist escaped
///
/// Escapes bleiben in den Teilen erhalten und werden erst beim
/// Parsen der Werte aufgeloest.
fn split_unescaped(line: &str, trenner: char) -> Vec<String> {
    let mut teile = Vec::new();
    let mut aktuell = String::new();
    let mut escaped = false;
    for c in line.chars() {
        if escaped {
            aktuell.push('\\');
            aktuell.push(c);
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == trenner {
            if !aktuell.is_empty() {
                teile.push(std::mem::take(&mut aktuell));
            }
            continue;
        }
        aktuell.push(c);
    }
    if escaped {
        // Abschliessender Backslash, unescape meldet den Fehler
        aktuell.push('\\');
    }
    if !aktuell.is_empty() {
        teile.push(aktuell);
    }
    teile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_tabelle() {
        assert_eq!(escape("a b|c\\d/e"), "a\\sb\\pc\\\\d\\/e");
        assert_eq!(escape("\n\r\t\u{000B}\u{000C}"), "\\n\\r\\t\\v\\f");
        assert_eq!(escape("normal"), "normal");
    }

    #[test]
    fn escape_unescape_roundtrip() {
        let original = "Hallo Welt | mit/Slash \\ und\nZeilen\tTab\u{000B}\u{000C}\r";
        assert_eq!(unescape(&escape(original)).unwrap(), original);
    }

    #[test]
    fn unescape_ungueltige_sequenz() {
        assert_eq!(
            unescape("abc\\x").unwrap_err(),
            ProtokollFehler::UngueltigeEscapeSequenz("\\x".into())
        );
        assert!(unescape("abc\\").is_err());
    }

    #[test]
    fn build_und_parse() {
        let zeile = build(
            "clientmove",
            &[("clid", "5"), ("cid", "12"), ("cpw", "geheim wort")],
        )
        .unwrap();
        assert_eq!(zeile, "clientmove clid=5 cid=12 cpw=geheim\\swort");

        let cmd = parse_line(&zeile).unwrap();
        assert_eq!(cmd.name, "clientmove");
        assert_eq!(cmd.param("clid"), Some("5"));
        assert_eq!(cmd.param("cpw"), Some("geheim wort"));
        assert_eq!(cmd.zahl::<u64>("cid"), Some(12));
    }

    #[test]
    fn build_leerer_name() {
        assert_eq!(build("  ", &[]).unwrap_err(), ProtokollFehler::LeererBefehl);
    }

    #[test]
    fn builder_behaelt_reihenfolge() {
        let mut b = CommandBuilder::neu("clientinit")
            .param("client_nickname", "Bot")
            .param("client_input_hardware", 1);
        b.param_setzen("client_nickname", "Neu");
        assert_eq!(
            b.bauen().unwrap(),
            "clientinit client_nickname=Neu client_input_hardware=1"
        );
    }

    #[test]
    fn parse_ignoriert_tokens_ohne_wert() {
        let cmd = parse_line("channellist -topic =leer cid=1").unwrap();
        assert_eq!(cmd.params, vec![("cid".to_string(), "1".to_string())]);
    }

    #[test]
    fn parse_leerer_wert() {
        let cmd = parse_line("error id=0 msg=ok return_code=").unwrap();
        assert_eq!(cmd.param("return_code"), Some(""));
    }

    #[test]
    fn parse_lines_mit_pipes() {
        let payload = "channellist cid=1 channel_name=Lobby|cid=2 channel_name=AFK\\sRaum\r\nerror id=0 msg=ok";
        let cmds = parse_lines(payload).unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0].name, "channellist");
        // Fortsetzungsteile beginnen mit key=value, das erste Token wird zum Namen
        assert_eq!(cmds[1].name, "cid=2");
        assert_eq!(cmds[1].param("channel_name"), Some("AFK Raum"));
        assert_eq!(cmds[2].name, "error");
    }

    #[test]
    fn escapte_pipe_trennt_nicht() {
        let cmds = parse_lines("sendtextmessage msg=a\\pb").unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].param("msg"), Some("a|b"));
    }

    #[test]
    fn parse_lines_leer() {
        assert!(parse_lines("").unwrap().is_empty());
        assert!(parse_lines("\n\r\n  ").unwrap().is_empty());
    }

    #[test]
    fn parse_fehlerhafte_escape_ist_fehler() {
        assert!(parse_lines("notifytextmessage msg=\\q").is_err());
    }
}
