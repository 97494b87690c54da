//! Identitaetsdatei des Bots
//!
//! Die Datei enthaelt die Identitaet im `<offset>V<base64>`-Format. Fehlt
//! sie, wird eine neue erzeugt. Nach einer erfolgreichen Offset-Suche wird
//! sie mit dem neuen Offset ueberschrieben.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use tsvoice_crypto::{Identity, KeyOffsetErgebnis};

/// Laedt die Identitaet oder erzeugt und speichert eine neue
pub fn laden_oder_erzeugen(pfad: &Path, key_offset: u64) -> anyhow::Result<Identity> {
    match std::fs::read_to_string(pfad) {
        Ok(inhalt) => {
            let identity = Identity::load_dynamic(&inhalt, key_offset)
                .with_context(|| format!("Identitaet in '{}' unlesbar", pfad.display()))?;
            tracing::info!(
                pfad = %pfad.display(),
                uid = %identity.client_uid(),
                offset = identity.valid_key_offset,
                "Identitaet geladen"
            );
            Ok(identity)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let identity = Identity::generate(0).context("Identitaet nicht erzeugbar")?;
            speichern(pfad, &identity)?;
            tracing::info!(
                pfad = %pfad.display(),
                uid = %identity.client_uid(),
                "Neue Identitaet erzeugt"
            );
            Ok(identity)
        }
        Err(e) => Err(e).with_context(|| format!("Identitaet '{}' nicht lesbar", pfad.display())),
    }
}

pub fn speichern(pfad: &Path, identity: &Identity) -> anyhow::Result<()> {
    if let Some(verzeichnis) = pfad.parent().filter(|v| !v.as_os_str().is_empty()) {
        std::fs::create_dir_all(verzeichnis)
            .with_context(|| format!("Verzeichnis '{}' nicht anlegbar", verzeichnis.display()))?;
    }
    let inhalt = identity.export_ts()?;
    std::fs::write(pfad, inhalt)
        .with_context(|| format!("Identitaet '{}' nicht schreibbar", pfad.display()))
}

/// Hebt die Identitaet auf mindestens `ziel` an
///
/// Ein Offset von 0 wird immer neu gesucht. Gibt `Ok(None)` zurueck, wenn
/// keine Suche noetig war. Ein gesetztes `abbruch` beendet die Suche mit
/// einem Fehler.
pub fn level_anheben(
    identity: &mut Identity,
    ziel: i32,
    abbruch: &AtomicBool,
) -> anyhow::Result<Option<KeyOffsetErgebnis>> {
    let offset = identity.valid_key_offset;
    if offset > 0 && identity.compute_security_level(offset) >= ziel.max(0) as u32 {
        return Ok(None);
    }

    tracing::info!(ziel, start = offset, "Suche Key-Offset");
    let ergebnis = identity
        .find_key_offset(ziel, offset as i64, abbruch)
        .ok_or_else(|| anyhow::anyhow!("Offset-Suche abgebrochen"))?;
    identity.valid_key_offset = ergebnis.offset;
    identity.last_checked_key_offset = ergebnis.offset;
    if ergebnis.iterationen > 0 {
        tracing::info!(
            offset = ergebnis.offset,
            level = ergebnis.level,
            iterationen = ergebnis.iterationen,
            "Key-Offset gefunden"
        );
    }
    Ok(Some(ergebnis))
}
