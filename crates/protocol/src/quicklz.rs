//! QuickLZ 1.5.0 – Level 1 und Level 3, nicht-streamend
//!
//! Der Server komprimiert grosse Kommandos mit QuickLZ. Das Format muss
//! Bit fuer Bit dem Referenz-Algorithmus entsprechen, deshalb folgt der
//! Code exakt dessen Kontrollwort- und Match-Kodierung.
//!
//! ## Container-Header
//!
//! ```text
//! Langform (9 Bytes, Bit 1 in Byte 0 gesetzt)
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Flags: Bit0 komprimierbar, Bit1 Langform, Bit2-3 Level, Bit6 immer 1
//!  1       4   Komprimierte Gesamtgroesse inkl. Header (little-endian)
//!  5       4   Dekomprimierte Groesse (little-endian)
//!
//! Kurzform (3 Bytes)
//!  0       1   Flags
//!  1       1   Komprimierte Groesse
//!  2       1   Dekomprimierte Groesse
//! ```
//!
//! Danach folgen 32-Bit-Kontrollwoerter (LSB zuerst, 1 = Match, 0 = Literal)
//! mit jeweils bis zu 31 Eintraegen. Das hoechste Bit markiert das Ende.

use crate::error::{ProtokollFehler, ProtokollResult};

const HASH_VALUES: usize = 4096;
const MINOFFSET: usize = 2;
const UNCONDITIONAL_MATCHLEN: usize = 6;
const UNCOMPRESSED_END: usize = 4;
const CWORD_LEN: usize = 4;
const DEFAULT_HEADERLEN: usize = 9;
const POINTERS_LEVEL_3: usize = 16;
const CWORD_ENDE: u32 = 0x8000_0000;

/// Unterstuetzte Kompressionsstufen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Ein Zeiger pro Hash-Bucket, schnell
    Eins,
    /// 16 Zeiger pro Hash-Bucket, bessere Kompression
    Drei,
}

impl Level {
    fn wert(self) -> u8 {
        match self {
            Self::Eins => 1,
            Self::Drei => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Laenge des Headers (9 Byte Langform, 3 Byte Kurzform)
pub fn header_len(source: &[u8]) -> usize {
    match source.first() {
        Some(b) if b & 2 == 2 => 9,
        _ => 3,
    }
}

/// Dekomprimierte Groesse laut Header
pub fn size_decompressed(source: &[u8]) -> ProtokollResult<usize> {
    if header_len(source) == 9 {
        Ok(lesen(source, 5, 4)? as usize)
    } else {
        Ok(lesen(source, 2, 1)? as usize)
    }
}

/// Komprimierte Gesamtgroesse laut Header
pub fn size_compressed(source: &[u8]) -> ProtokollResult<usize> {
    if header_len(source) == 9 {
        Ok(lesen(source, 1, 4)? as usize)
    } else {
        Ok(lesen(source, 1, 1)? as usize)
    }
}

fn header_schreiben(
    ziel: &mut [u8],
    level: Level,
    komprimierbar: bool,
    groesse_komprimiert: usize,
    groesse_dekomprimiert: usize,
) {
    ziel[0] = 2 | u8::from(komprimierbar) | (level.wert() << 2) | (1 << 6);
    schreiben(ziel, 1, groesse_komprimiert as u64, 4);
    schreiben(ziel, 5, groesse_dekomprimiert as u64, 4);
}

// ---------------------------------------------------------------------------
// Little-Endian Hilfen
// ---------------------------------------------------------------------------

/// Liest `anzahl` Bytes little-endian, Fehler statt Panic bei kurzen Daten
fn lesen(a: &[u8], i: usize, anzahl: usize) -> ProtokollResult<u32> {
    let bytes = a.get(i..i + anzahl).ok_or_else(|| {
        ProtokollFehler::Beschaedigt(format!("Lesen hinter Datenende bei {i}"))
    })?;
    Ok(bytes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (j, b)| acc | (u32::from(*b) << (j * 8))))
}

/// Liest 3 Bytes aus einem Puffer, dessen Laenge der Aufrufer garantiert
fn lesen3(a: &[u8], i: usize) -> u32 {
    u32::from(a[i]) | (u32::from(a[i + 1]) << 8) | (u32::from(a[i + 2]) << 16)
}

fn schreiben(a: &mut [u8], i: usize, wert: u64, anzahl: usize) {
    for j in 0..anzahl {
        a[i + j] = (wert >> (j * 8)) as u8;
    }
}

fn hash_von(fetch: u32) -> usize {
    (((fetch >> 12) ^ fetch) as usize) & (HASH_VALUES - 1)
}

// ---------------------------------------------------------------------------
// Kompression
// ---------------------------------------------------------------------------

/// Komprimiert `source` mit der gegebenen Stufe
///
/// Leere Eingaben ergeben eine leere Ausgabe. Nicht komprimierbare Daten
/// werden mit Header unveraendert abgelegt (`source.len() + 9` Bytes).
pub fn compress(source: &[u8], level: Level) -> Vec<u8> {
    if source.is_empty() {
        return Vec::new();
    }

    let len = source.len();
    let mut ziel = vec![0u8; len + 400];
    let mut src = 0usize;
    let mut dst = DEFAULT_HEADERLEN + CWORD_LEN;
    let mut cword_val = CWORD_ENDE;
    let mut cword_ptr = DEFAULT_HEADERLEN;
    let zeiger = match level {
        Level::Eins => 1,
        Level::Drei => POINTERS_LEVEL_3,
    };
    let mut hashtable = vec![0usize; HASH_VALUES * zeiger];
    let mut cachetable = vec![0u32; HASH_VALUES];
    let mut hash_counter = vec![0u8; HASH_VALUES];
    // Letzte Position, ab der noch nach Matches gesucht wird
    let letzter_matchstart = len as isize
        - UNCONDITIONAL_MATCHLEN as isize
        - UNCOMPRESSED_END as isize
        - 1;
    let mut lits = 0usize;
    let mut fetch = 0u32;

    if (src as isize) <= letzter_matchstart {
        fetch = lesen3(source, src);
    }

    while (src as isize) <= letzter_matchstart {
        if cword_val & 1 == 1 {
            if src > 3 * (len >> 2) && dst > src - (src >> 5) {
                return unkomprimiert(source, level);
            }
            schreiben(&mut ziel, cword_ptr, u64::from((cword_val >> 1) | CWORD_ENDE), 4);
            cword_ptr = dst;
            dst += CWORD_LEN;
            cword_val = CWORD_ENDE;
        }

        match level {
            Level::Eins => {
                let hash = hash_von(fetch);
                let o = hashtable[hash];
                let cache = cachetable[hash] ^ fetch;
                cachetable[hash] = fetch;
                hashtable[hash] = src;

                let wiederholung = src == o + 1
                    && lits >= 3
                    && src > 3
                    && source[src] == source[src - 3]
                    && source[src] == source[src - 2]
                    && source[src] == source[src - 1]
                    && source[src] == source[src + 1]
                    && source[src] == source[src + 2];

                if cache == 0 && hash_counter[hash] != 0 && (src - o > MINOFFSET || wiederholung) {
                    cword_val = (cword_val >> 1) | CWORD_ENDE;
                    if source[o + 3] != source[src + 3] {
                        let f = (3 - 2) | (hash << 4);
                        ziel[dst] = f as u8;
                        ziel[dst + 1] = (f >> 8) as u8;
                        src += 3;
                        dst += 2;
                    } else {
                        let alt = src;
                        let rest = (len - UNCOMPRESSED_END - src).min(255);

                        src += 4;
                        if source[o + src - alt] == source[src] {
                            src += 1;
                            if source[o + src - alt] == source[src] {
                                src += 1;
                                while source[o + (src - alt)] == source[src] && (src - alt) < rest {
                                    src += 1;
                                }
                            }
                        }

                        let matchlen = src - alt;
                        let hash = hash << 4;
                        if matchlen < 18 {
                            let f = hash | (matchlen - 2);
                            ziel[dst] = f as u8;
                            ziel[dst + 1] = (f >> 8) as u8;
                            dst += 2;
                        } else {
                            let f = hash | (matchlen << 16);
                            schreiben(&mut ziel, dst, f as u64, 3);
                            dst += 3;
                        }
                    }
                    lits = 0;
                    fetch = lesen3(source, src);
                } else {
                    lits += 1;
                    hash_counter[hash] = 1;
                    ziel[dst] = source[src];
                    cword_val >>= 1;
                    src += 1;
                    dst += 1;
                    fetch = ((fetch >> 8) & 0xffff) | (u32::from(source[src + 2]) << 16);
                }
            }
            Level::Drei => {
                fetch = lesen3(source, src);

                let rest = (len - UNCOMPRESSED_END - src).min(255);
                let hash = hash_von(fetch);
                let c = hash_counter[hash];
                let mut matchlen = 0usize;
                let mut offset2 = 0usize;

                // c >= 128 bedeutet: alle 16 Zeiger sind belegt
                let mut k = 0usize;
                while k < POINTERS_LEVEL_3 && (c as usize) > k {
                    let o = hashtable[hash * POINTERS_LEVEL_3 + k];
                    if fetch as u8 == source[o]
                        && (fetch >> 8) as u8 == source[o + 1]
                        && (fetch >> 16) as u8 == source[o + 2]
                        && o + MINOFFSET < src
                    {
                        let mut m = 3usize;
                        while source[o + m] == source[src + m] && m < rest {
                            m += 1;
                        }
                        if m > matchlen || (m == matchlen && o > offset2) {
                            offset2 = o;
                            matchlen = m;
                        }
                    }
                    k += 1;
                }
                let o = offset2;
                hashtable[hash * POINTERS_LEVEL_3 + (c as usize & (POINTERS_LEVEL_3 - 1))] = src;
                hash_counter[hash] = c.wrapping_add(1);

                if matchlen >= 3 && src - o < 131_071 {
                    let offset = (src - o) as u64;
                    for u in 1..matchlen {
                        let f = lesen3(source, src + u);
                        let h = hash_von(f);
                        let c = hash_counter[h];
                        hash_counter[h] = c.wrapping_add(1);
                        hashtable[h * POINTERS_LEVEL_3 + (c as usize & (POINTERS_LEVEL_3 - 1))] =
                            src + u;
                    }

                    src += matchlen;
                    cword_val = (cword_val >> 1) | CWORD_ENDE;

                    let ml = matchlen as u64;
                    if matchlen == 3 && offset <= 63 {
                        schreiben(&mut ziel, dst, offset << 2, 1);
                        dst += 1;
                    } else if matchlen == 3 && offset <= 16383 {
                        schreiben(&mut ziel, dst, (offset << 2) | 1, 2);
                        dst += 2;
                    } else if matchlen <= 18 && offset <= 1023 {
                        schreiben(&mut ziel, dst, ((ml - 3) << 2) | (offset << 6) | 2, 2);
                        dst += 2;
                    } else if matchlen <= 33 {
                        schreiben(&mut ziel, dst, ((ml - 2) << 2) | (offset << 7) | 3, 3);
                        dst += 3;
                    } else {
                        schreiben(&mut ziel, dst, ((ml - 3) << 7) | (offset << 15) | 3, 4);
                        dst += 4;
                    }
                } else {
                    ziel[dst] = source[src];
                    cword_val >>= 1;
                    src += 1;
                    dst += 1;
                }
            }
        }
    }

    // Rest als Literale
    while src < len {
        if cword_val & 1 == 1 {
            schreiben(&mut ziel, cword_ptr, u64::from((cword_val >> 1) | CWORD_ENDE), 4);
            cword_ptr = dst;
            dst += CWORD_LEN;
            cword_val = CWORD_ENDE;
        }
        ziel[dst] = source[src];
        src += 1;
        dst += 1;
        cword_val >>= 1;
    }
    while cword_val & 1 != 1 {
        cword_val >>= 1;
    }
    schreiben(&mut ziel, cword_ptr, u64::from((cword_val >> 1) | CWORD_ENDE), CWORD_LEN);
    header_schreiben(&mut ziel, level, true, dst, len);

    ziel.truncate(dst);
    ziel
}

fn unkomprimiert(source: &[u8], level: Level) -> Vec<u8> {
    let mut ziel = vec![0u8; source.len() + DEFAULT_HEADERLEN];
    header_schreiben(
        &mut ziel,
        level,
        false,
        source.len() + DEFAULT_HEADERLEN,
        source.len(),
    );
    ziel[DEFAULT_HEADERLEN..].copy_from_slice(source);
    ziel
}

// ---------------------------------------------------------------------------
// Dekompression
// ---------------------------------------------------------------------------

/// Dekomprimiert einen QuickLZ-Block
///
/// # Fehler
/// - `KompressionsLevel` bei anderem Level als 1 oder 3
/// - `ZuGross` wenn die angegebene Groesse `maximum` uebersteigt
/// - `Beschaedigt` bei abgeschnittenen oder inkonsistenten Daten
pub fn decompress(source: &[u8], maximum: usize) -> ProtokollResult<Vec<u8>> {
    let erstes = *source.first().ok_or(ProtokollFehler::ZuKurz {
        erwartet: 3,
        erhalten: 0,
    })?;
    let level = match (erstes >> 2) & 0x3 {
        1 => Level::Eins,
        3 => Level::Drei,
        andere => return Err(ProtokollFehler::KompressionsLevel(andere)),
    };

    let hlen = header_len(source);
    if source.len() < hlen {
        return Err(ProtokollFehler::ZuKurz {
            erwartet: hlen,
            erhalten: source.len(),
        });
    }
    let groesse = size_decompressed(source)?;
    if groesse > maximum {
        return Err(ProtokollFehler::ZuGross { groesse, maximum });
    }

    if erstes & 1 != 1 {
        return source
            .get(hlen..hlen + groesse)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ProtokollFehler::Beschaedigt("unkomprimierter Block zu kurz".into()));
    }

    let mut ziel = vec![0u8; groesse];
    let mut hashtable = vec![0usize; HASH_VALUES];
    let letzter_matchstart =
        groesse as isize - UNCONDITIONAL_MATCHLEN as isize - UNCOMPRESSED_END as isize - 1;
    let mut src = hlen;
    let mut dst = 0usize;
    let mut cword_val: u32 = 1;
    let mut last_hashed: isize = -1;
    let mut fetch = 0u32;
    let fetch_len = match level {
        Level::Eins => 3,
        Level::Drei => 4,
    };

    loop {
        if cword_val == 1 {
            cword_val = lesen(source, src, 4)?;
            src += 4;
            if (dst as isize) <= letzter_matchstart {
                fetch = lesen(source, src, fetch_len)?;
            }
        }

        if cword_val & 1 == 1 {
            cword_val >>= 1;

            let (offset2, matchlen) = match level {
                Level::Eins => {
                    let hash = ((fetch >> 4) & 0xfff) as usize;
                    let offset2 = hashtable[hash];
                    let matchlen = if fetch & 0xf != 0 {
                        src += 2;
                        (fetch & 0xf) as usize + 2
                    } else {
                        let m = lesen(source, src + 2, 1)? as usize;
                        src += 3;
                        m
                    };
                    (offset2, matchlen)
                }
                Level::Drei => {
                    let (offset, matchlen) = if fetch & 3 == 0 {
                        src += 1;
                        ((fetch & 0xff) >> 2, 3)
                    } else if fetch & 2 == 0 {
                        src += 2;
                        ((fetch & 0xffff) >> 2, 3)
                    } else if fetch & 1 == 0 {
                        src += 2;
                        ((fetch & 0xffff) >> 6, ((fetch >> 2) & 15) as usize + 3)
                    } else if fetch & 127 != 3 {
                        src += 3;
                        ((fetch >> 7) & 0x1ffff, ((fetch >> 2) & 0x1f) as usize + 2)
                    } else {
                        src += 4;
                        (fetch >> 15, ((fetch >> 7) & 255) as usize + 3)
                    };
                    let offset2 = dst.checked_sub(offset as usize).ok_or_else(|| {
                        ProtokollFehler::Beschaedigt(format!("Offset {offset} vor Datenanfang"))
                    })?;
                    (offset2, matchlen)
                }
            };

            if offset2 >= dst || dst + matchlen > groesse || matchlen < 3 {
                return Err(ProtokollFehler::Beschaedigt(format!(
                    "ungueltiger Match: quelle={offset2} ziel={dst} laenge={matchlen}"
                )));
            }
            // Ueberlappende Kopie, Byte fuer Byte
            for i in 0..matchlen {
                ziel[dst + i] = ziel[offset2 + i];
            }
            dst += matchlen;

            match level {
                Level::Eins => {
                    let mut f = lesen3(&ziel, (last_hashed + 1) as usize);
                    while last_hashed < (dst - matchlen) as isize {
                        last_hashed += 1;
                        let hash = hash_von(f);
                        hashtable[hash] = last_hashed as usize;
                        let naechstes = ziel.get(last_hashed as usize + 3).copied().unwrap_or(0);
                        f = ((f >> 8) & 0xffff) | (u32::from(naechstes) << 16);
                    }
                    fetch = lesen(source, src, 3)?;
                }
                Level::Drei => {
                    fetch = lesen(source, src, 4)?;
                }
            }
            last_hashed = dst as isize - 1;
        } else if (dst as isize) <= letzter_matchstart {
            ziel[dst] = *source
                .get(src)
                .ok_or_else(|| ProtokollFehler::Beschaedigt("Literal fehlt".into()))?;
            dst += 1;
            src += 1;
            cword_val >>= 1;

            match level {
                Level::Eins => {
                    while last_hashed < dst as isize - 3 {
                        last_hashed += 1;
                        let f = lesen3(&ziel, last_hashed as usize);
                        hashtable[hash_von(f)] = last_hashed as usize;
                    }
                    fetch = ((fetch >> 8) & 0xffff) | (lesen(source, src + 2, 1)? << 16);
                }
                Level::Drei => {
                    fetch = ((fetch >> 8) & 0xffff)
                        | (lesen(source, src + 2, 1)? << 16)
                        | (lesen(source, src + 3, 1)? << 24);
                }
            }
        } else {
            while dst < groesse {
                if cword_val == 1 {
                    src += CWORD_LEN;
                    cword_val = CWORD_ENDE;
                }
                ziel[dst] = *source
                    .get(src)
                    .ok_or_else(|| ProtokollFehler::Beschaedigt("Endliteral fehlt".into()))?;
                dst += 1;
                src += 1;
                cword_val >>= 1;
            }
            return Ok(ziel);
        }
    }
}
