//! Sprachpakete und Sprech-Sessions
//!
//! ```text
//! +--------+-------+---------------+-------------+
//! | id BE  | codec | opus          | [session]   |
//! | 2 Byte | 1     | n Byte        | 1 Byte      |
//! +--------+-------+---------------+-------------+
//! ```
//!
//! Die ersten 5 Pakete einer Sprech-Session tragen zusaetzlich die
//! Session-ID und das COMPRESSED-Flag. Ein leerer Frame beendet die Session,
//! die ID laeuft dann 1..7 weiter.

use tsvoice_protocol::PacketFlags;

/// Pakete pro Session, die die Session-ID tragen
pub const VOICE_FLAGGED_PACKETS: u8 = 5;

/// Hoechste Session-ID, danach beginnt sie wieder bei 1
pub const VOICE_SESSION_MAX: u8 = 7;

/// Opus Voice (Sprache)
pub const CODEC_OPUS_VOICE: u8 = 4;

/// Opus Music, Standard
pub const CODEC_OPUS_MUSIC: u8 = 5;

/// Gibt true zurueck fuer die beiden unterstuetzten Opus-Codecs
pub fn codec_unterstuetzt(codec: i64) -> bool {
    codec == CODEC_OPUS_VOICE as i64 || codec == CODEC_OPUS_MUSIC as i64
}

/// Zustand der aktuellen Sprech-Session
#[derive(Debug, Clone)]
pub struct VoiceSession {
    aktiv: bool,
    markiert_rest: u8,
    session_id: u8,
}

impl Default for VoiceSession {
    fn default() -> Self {
        Self {
            aktiv: false,
            markiert_rest: VOICE_FLAGGED_PACKETS,
            session_id: 1,
        }
    }
}

impl VoiceSession {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> u8 {
        self.session_id
    }

    pub fn ist_aktiv(&self) -> bool {
        self.aktiv
    }

    /// Naechster Frame der Session: true wenn er die Session-ID tragen muss
    pub fn naechster_frame(&mut self) -> bool {
        if !self.aktiv {
            self.aktiv = true;
            self.markiert_rest = VOICE_FLAGGED_PACKETS;
        }
        if self.markiert_rest > 0 {
            self.markiert_rest -= 1;
            true
        } else {
            false
        }
    }

    /// Beendet die Session, die naechste bekommt eine neue ID
    pub fn beenden(&mut self) {
        self.aktiv = false;
        self.markiert_rest = VOICE_FLAGGED_PACKETS;
        self.session_id = if self.session_id >= VOICE_SESSION_MAX {
            1
        } else {
            self.session_id + 1
        };
    }
}

/// Baut Nutzdaten und Flags eines VOICE-Pakets
pub fn voice_daten(
    paket_id: u16,
    codec: u8,
    opus: &[u8],
    session: Option<u8>,
) -> (Vec<u8>, PacketFlags) {
    let mut daten = Vec::with_capacity(3 + opus.len() + 1);
    daten.extend_from_slice(&paket_id.to_be_bytes());
    daten.push(codec);
    daten.extend_from_slice(opus);
    match session {
        Some(id) => {
            daten.push(id);
            (daten, PacketFlags::COMPRESSED)
        }
        None => (daten, PacketFlags::KEINE),
    }
}
