//! Kanalliste und Aufloesung des Zielkanals
//!
//! Ein Ziel kann angegeben werden als:
//!
//! ```text
//! cid=12        -> Kanal-ID
//! #12           -> Kanal-ID
//! Lobby/Musik   -> Pfad ab der Wurzel, Ebene fuer Ebene
//! Musik         -> exakter Name (erster Treffer)
//! 12            -> Kanal-ID, falls kein Kanal so heisst
//! ```

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;
use tsvoice_core::ChannelId;
use tsvoice_protocol::ParsedCommand;

const PRAEFIX_ID: &str = "cid=";
const PRAEFIX_MARKER: &str = "#";
const PFAD_TRENNER: char = '/';

/// Ein Eintrag aus `channellist`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSnapshot {
    pub cid: ChannelId,
    pub parent: ChannelId,
    pub order: Option<String>,
    pub name: String,
    pub params: Vec<(String, String)>,
}

/// Codec-Einstellungen eines Kanals aus `channelinfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelCodecInfo {
    pub codec: i64,
    pub quality: i64,
}

/// Liest Kanaleintraege aus der Antwort auf `channellist`
pub fn snapshots_parsen(antworten: &[ParsedCommand]) -> Vec<ChannelSnapshot> {
    antworten
        .iter()
        .filter(|cmd| ist_kanaleintrag(cmd))
        .filter_map(|cmd| {
            let cid = listen_feld(cmd, "cid").and_then(ChannelId::parsen)?;
            let parent = cmd
                .param("cpid")
                .and_then(ChannelId::parsen)
                .unwrap_or(ChannelId::WURZEL);
            Some(ChannelSnapshot {
                cid,
                parent,
                order: cmd.param("channel_order").map(str::to_string),
                name: cmd.param("channel_name").unwrap_or_default().to_string(),
                params: cmd.params.clone(),
            })
        })
        .collect()
}

/// Liest ein Feld eines Listeneintrags
///
/// Folgeeintraege einer `|`-Liste tragen ihr erstes Feld als Namen
/// (`cid=2`), dort wird es zuletzt gesucht.
pub fn listen_feld<'a>(cmd: &'a ParsedCommand, key: &str) -> Option<&'a str> {
    cmd.param(key)
        .or_else(|| cmd.name.strip_prefix(key)?.strip_prefix('='))
}

fn ist_kanaleintrag(cmd: &ParsedCommand) -> bool {
    cmd.name.eq_ignore_ascii_case("channellist") || cmd.param("channel_name").is_some()
}

/// Loest ein Ziel gegen die Kanalliste auf
pub fn kanal_aufloesen(kanaele: &[ChannelSnapshot], ziel: &str) -> Option<ChannelId> {
    let ziel = ziel.trim();
    if ziel.is_empty() {
        return None;
    }
    if let Some(id) = ziel.strip_prefix(PRAEFIX_ID) {
        return ChannelId::parsen(id);
    }
    if let Some(id) = ziel.strip_prefix(PRAEFIX_MARKER) {
        return ChannelId::parsen(id);
    }
    if ziel.contains(PFAD_TRENNER) {
        return pfad_aufloesen(kanaele, ziel);
    }
    if let Some(kanal) = kanaele.iter().find(|k| k.name == ziel) {
        return Some(kanal.cid);
    }
    if ziel.chars().all(|c| c.is_ascii_digit()) {
        return ChannelId::parsen(ziel);
    }
    None
}

/// Laeuft einen `/`-Pfad ab der Wurzel entlang; leere Teile werden uebersprungen
pub fn pfad_aufloesen(kanaele: &[ChannelSnapshot], pfad: &str) -> Option<ChannelId> {
    let mut nach_eltern: HashMap<ChannelId, Vec<&ChannelSnapshot>> = HashMap::new();
    for kanal in kanaele {
        nach_eltern.entry(kanal.parent).or_default().push(kanal);
    }

    let mut aktuell = ChannelId::WURZEL;
    for teil in pfad.split(PFAD_TRENNER) {
        let name = teil.trim();
        if name.is_empty() {
            continue;
        }
        let kinder = nach_eltern.get(&aktuell)?;
        aktuell = kind_nach_name(kinder, name, aktuell)?.cid;
    }
    Some(aktuell)
}

fn kind_nach_name<'a>(
    kinder: &[&'a ChannelSnapshot],
    name: &str,
    eltern: ChannelId,
) -> Option<&'a ChannelSnapshot> {
    let mut treffer = kinder.iter().filter(|k| k.name == name);
    let erster = treffer.next()?;
    if treffer.next().is_some() {
        warn!(%eltern, name, "Kanalname unter demselben Elternkanal mehrfach vorhanden, erster Treffer gilt");
    }
    Some(erster)
}
