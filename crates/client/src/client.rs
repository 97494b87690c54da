//! TsFullClient: Handshake, Kommandos, Kanaele und Sprachpakete
//!
//! ```text
//! connect()
//!   -> INIT1 (id 101)            Phase::Handshake
//!   <- INIT1 ... (Puzzle)
//!   <- initivexpand[2]           Phase::KryptoAushandlung
//!   -> [clientek] clientinit     Phase::ClientInitGesendet
//!   <- initserver                Phase::Verbunden, ClientEvent::Angemeldet
//!   -> channellist / clientmove  (einmal, im Hintergrund)
//! ```
//!
//! Alle Pakete des Transports laufen durch genau einen Empfangs-Task.
//! Korrelierte Anfragen ([`TsFullClient::request_command`]) warten ueber
//! den [`AnfrageSlot`] auf ihr `error`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use tsvoice_core::{ChannelId, ClientEvent, ClientId};
use tsvoice_crypto::{generate_temporary_key, TsCrypt};
use tsvoice_protocol::command::parse_lines;
use tsvoice_protocol::{CommandBuilder, Direction, Packet, PacketFlags, PacketType, ParsedCommand};
use tsvoice_transport::{GeteilteKrypto, PacketHandler, TransportEreignis};

use crate::address::{adresse_aufloesen, client_ip};
use crate::channel::{
    kanal_aufloesen, listen_feld, snapshots_parsen, ChannelCodecInfo, ChannelSnapshot,
};
use crate::connection::ConnectionParameters;
use crate::connection_info::{setconnectioninfo, InfoDrossel};
use crate::counter::{PacketCounter, INIT1_PAKET_ID};
use crate::error::{ClientFehler, ClientResult};
use crate::fragment::{fragmentieren, BEFEHL_BUDGET};
use crate::pending::{AnfrageErgebnis, AnfrageSlot, Zuordnung};
use crate::queue::CommandQueue;
use crate::traits::{AudioSink, VoiceClient};
use crate::voice::{codec_unterstuetzt, voice_daten, VoiceSession, CODEC_OPUS_MUSIC};

/// Wartezeit auf das `error` einer korrelierten Anfrage
pub const ANTWORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Versuche fuer `channellist` nach der Anmeldung
pub const KANALLISTE_VERSUCHE: u32 = 3;

/// Pause zwischen zwei `channellist`-Versuchen
pub const KANALLISTE_PAUSE: Duration = Duration::from_secs(1);

/// Laenge von `beta` im neuen Schluesselaustausch
const BETA_LAENGE: usize = 54;

/// Lebenszyklus einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Getrennt,
    Handshake,
    KryptoAushandlung,
    ClientInitGesendet,
    Verbunden,
    /// Vom Transport beendet (Zeitlimit, Fehler, Krypto-Setup)
    Abgebrochen,
}

// ---------------------------------------------------------------------------
// TsFullClient
// ---------------------------------------------------------------------------

/// Vollstaendiger Protokoll-Client
///
/// Klonen ist billig, alle Klone steuern dieselbe Verbindung.
#[derive(Clone)]
pub struct TsFullClient {
    inner: Arc<Inner>,
}

struct Inner {
    handler: PacketHandler,
    parameter: Mutex<Option<ConnectionParameters>>,
    krypto: Mutex<Option<GeteilteKrypto>>,
    phase: Mutex<Phase>,
    verbunden: AtomicBool,
    zaehler: Mutex<PacketCounter>,
    command_queue: Mutex<CommandQueue>,
    command_low_queue: Mutex<CommandQueue>,
    voice: Mutex<VoiceSession>,
    voice_codec: AtomicU8,
    /// Paket-ID von `clientinit`, wird durch `initserver` bestaetigt
    clientinit_id: Mutex<Option<u16>>,
    aktueller_kanal: Mutex<Option<ChannelId>>,
    ziel_kanal: Mutex<String>,
    kanalliste_angefordert: AtomicBool,
    anfrage: AnfrageSlot,
    drossel: Mutex<InfoDrossel>,
    ereignisse: mpsc::UnboundedSender<ClientEvent>,
    empfang: Mutex<Option<JoinHandle<()>>>,
    /// Solange gesetzt, steht das Gestoppt-Ereignis der Sitzung noch aus
    sitzung_aktiv: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TsFullClient {
    /// Erstellt einen Client und den Empfaenger seiner Ereignisse
    pub fn neu() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            handler: PacketHandler::neu(),
            parameter: Mutex::new(None),
            krypto: Mutex::new(None),
            phase: Mutex::new(Phase::Getrennt),
            verbunden: AtomicBool::new(false),
            zaehler: Mutex::new(PacketCounter::neu()),
            command_queue: Mutex::new(CommandQueue::neu()),
            command_low_queue: Mutex::new(CommandQueue::neu()),
            voice: Mutex::new(VoiceSession::neu()),
            voice_codec: AtomicU8::new(CODEC_OPUS_MUSIC),
            clientinit_id: Mutex::new(None),
            aktueller_kanal: Mutex::new(None),
            ziel_kanal: Mutex::new(String::new()),
            kanalliste_angefordert: AtomicBool::new(false),
            anfrage: AnfrageSlot::neu(),
            drossel: Mutex::new(InfoDrossel::default()),
            ereignisse: tx,
            empfang: Mutex::new(None),
            sitzung_aktiv: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Setzt die Parameter fuer den naechsten Verbindungsaufbau
    pub fn configure(&self, parameter: ConnectionParameters) {
        let krypto = Arc::new(Mutex::new(TsCrypt::neu(parameter.identity.clone())));
        *self.inner.krypto.lock() = Some(krypto);
        *self.inner.parameter.lock() = Some(parameter);
    }

    /// Startet den Handshake
    ///
    /// Kehrt nach dem ersten INIT1 zurueck; die Anmeldung wird ueber
    /// [`ClientEvent::Angemeldet`] gemeldet. Eine leere Adresse nimmt die
    /// aus den Parametern, ein leerer `kanal_pfad` den Standardkanal.
    pub async fn connect(&self, adresse: &str, kanal_pfad: &str) -> ClientResult<()> {
        let inner = &self.inner;
        let parameter = inner
            .parameter
            .lock()
            .clone()
            .ok_or(ClientFehler::NichtKonfiguriert)?;
        let krypto = inner
            .krypto
            .lock()
            .clone()
            .ok_or(ClientFehler::NichtKonfiguriert)?;

        let adresse = if adresse.trim().is_empty() {
            parameter.adresse.as_str()
        } else {
            adresse
        };
        let ziel: SocketAddr = adresse_aufloesen(adresse).await?;

        inner.zuruecksetzen();
        let kanal = if kanal_pfad.trim().is_empty() {
            parameter.standard_kanal.clone()
        } else {
            kanal_pfad.trim().to_string()
        };
        *inner.ziel_kanal.lock() = kanal.clone();

        {
            let mut k = krypto.lock();
            k.reset();
            k.set_client_ip(&client_ip(ziel.ip()));
        }
        info!(
            %ziel,
            uid = %parameter.identity.client_uid(),
            nickname = parameter.nickname_oder_standard(),
            kanal = %kanal,
            "Verbinde"
        );

        let rx = inner.handler.connect(ziel, Arc::clone(&krypto)).await?;
        let empfang = tokio::spawn(empfangs_loop(Arc::clone(inner), rx));
        *inner.empfang.lock() = Some(empfang);
        inner.sitzung_aktiv.store(true, Ordering::SeqCst);
        inner.phase_setzen(Phase::Handshake);

        let start = krypto.lock().process_init1(Direction::ClientToServer, None);
        let daten = match start {
            Ok(d) => d,
            Err(e) => {
                inner.handler.abbrechen(&format!("INIT1 fehlgeschlagen: {e}"));
                return Err(e.into());
            }
        };
        let mut paket = Packet::neu(PacketType::Init1, PacketFlags::UNENCRYPTED, daten);
        paket.id = INIT1_PAKET_ID;
        if let Err(e) = inner.handler.add_outgoing_packet(paket).await {
            inner.handler.abbrechen(&format!("INIT1 nicht gesendet: {e}"));
            return Err(e.into());
        }
        debug!("INIT1 gesendet");
        Ok(())
    }

    /// Trennt die Verbindung (idempotent)
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        if inner.verbunden.load(Ordering::SeqCst) {
            let cmd = CommandBuilder::neu("clientdisconnect")
                .param("reasonid", 8)
                .param("reasonmsg", "leaving");
            if let Err(e) = inner.builder_senden(&cmd).await {
                debug!(fehler = %e, "clientdisconnect nicht gesendet");
            }
        }
        inner.voice.lock().beenden();
        inner.verbunden.store(false, Ordering::SeqCst);
        inner.phase_setzen(Phase::Getrennt);
        inner.worker_beenden();
        inner.handler.stop();
        info!("Verbindung getrennt");
    }

    /// true nach `initserver` und bis zum Ende der Verbindung
    pub fn is_connected(&self) -> bool {
        self.inner.verbunden.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock()
    }

    pub fn client_id(&self) -> ClientId {
        ClientId(self.inner.handler.client_id())
    }

    pub fn aktueller_kanal(&self) -> Option<ChannelId> {
        *self.inner.aktueller_kanal.lock()
    }

    /// Codec fuer ausgehende Sprachpakete (4 oder 5)
    pub fn voice_codec(&self) -> u8 {
        self.inner.voice_codec.load(Ordering::Relaxed)
    }

    /// Transport der Verbindung (Statistik, Ping)
    pub fn handler(&self) -> &PacketHandler {
        &self.inner.handler
    }

    /// Sendet ein Opus-Frame; `laenge == 0` beendet die Sprech-Session
    pub async fn send_opus_frame(&self, daten: &[u8], laenge: usize) {
        let inner = &self.inner;
        if !inner.verbunden.load(Ordering::SeqCst) {
            return;
        }
        if laenge > daten.len() {
            warn!(laenge, puffer = daten.len(), "Opus-Laenge groesser als Puffer");
            return;
        }
        if laenge == 0 {
            inner.voice_senden(&[], None).await;
            inner.voice.lock().beenden();
            return;
        }
        let session = {
            let mut v = inner.voice.lock();
            v.naechster_frame().then(|| v.session_id())
        };
        inner.voice_senden(&daten[..laenge], session).await;
    }

    /// Sendet ein Kommando und wartet auf sein `error`
    ///
    /// Nur eine Anfrage gleichzeitig; eine zweite schlaegt sofort mit
    /// [`ClientFehler::Beschaeftigt`] fehl.
    pub async fn request_command(
        &self,
        name: &str,
        params: &[(&str, &str)],
    ) -> ClientResult<AnfrageErgebnis> {
        self.inner.anfrage_senden(name, params).await
    }

    /// Kanalliste des Servers
    pub async fn channel_list(&self) -> ClientResult<Vec<ChannelSnapshot>> {
        let antworten = self.inner.anfrage_antworten("channellist", &[]).await?;
        Ok(snapshots_parsen(&antworten))
    }

    /// Loest ein Ziel auf und wechselt dorthin
    pub async fn join_channel(&self, ziel: &str) -> ClientResult<ChannelId> {
        let kanaele = self.channel_list().await?;
        let cid = kanal_aufloesen(&kanaele, ziel)
            .ok_or_else(|| ClientFehler::KanalNichtGefunden(ziel.to_string()))?;
        self.inner.kanal_wechseln(cid).await?;
        Ok(cid)
    }

    /// Codec-Einstellungen des aktuellen Kanals
    ///
    /// Ein unterstuetzter Codec wird fuer ausgehende Sprachpakete uebernommen.
    pub async fn fetch_channel_codec_info(&self) -> ClientResult<ChannelCodecInfo> {
        let inner = &self.inner;
        if !inner.verbunden.load(Ordering::SeqCst) {
            return Err(ClientFehler::NichtVerbunden);
        }
        let bekannt = *inner.aktueller_kanal.lock();
        let cid = match bekannt {
            Some(cid) => cid,
            None => match inner.kanal_aus_clientinfo().await {
                Some(cid) => cid,
                None => inner
                    .kanal_aus_clientlist()
                    .await
                    .ok_or_else(|| ClientFehler::KanalNichtGefunden("aktueller Kanal".into()))?,
            },
        };
        *inner.aktueller_kanal.lock() = Some(cid);

        let cid_text = cid.0.to_string();
        let antworten = inner
            .anfrage_antworten("channelinfo", &[("cid", cid_text.as_str())])
            .await?;
        let eintrag = antworten
            .iter()
            .find(|cmd| cmd.param("channel_codec").is_some())
            .ok_or_else(|| ClientFehler::UnvollstaendigeAntwort("channelinfo ohne channel_codec".into()))?;
        let codec: i64 = eintrag
            .zahl("channel_codec")
            .ok_or_else(|| ClientFehler::UnvollstaendigeAntwort("channel_codec".into()))?;
        let quality: i64 = eintrag.zahl("channel_codec_quality").unwrap_or(0);

        if codec_unterstuetzt(codec) {
            inner.voice_codec.store(codec as u8, Ordering::Relaxed);
        } else {
            warn!(%cid, codec, "Kanal-Codec nicht unterstuetzt, Codec bleibt");
        }
        info!(%cid, codec, quality, "Kanal-Codec gelesen");
        Ok(ChannelCodecInfo { codec, quality })
    }
}

#[async_trait]
impl VoiceClient for TsFullClient {
    fn configure(&self, parameter: ConnectionParameters) {
        TsFullClient::configure(self, parameter);
    }

    async fn connect(&self, adresse: &str, kanal_pfad: &str) -> ClientResult<()> {
        TsFullClient::connect(self, adresse, kanal_pfad).await
    }

    async fn disconnect(&self) {
        TsFullClient::disconnect(self).await;
    }

    fn is_connected(&self) -> bool {
        TsFullClient::is_connected(self)
    }
}

#[async_trait]
impl AudioSink for TsFullClient {
    async fn send_opus_frame(&self, daten: &[u8], laenge: usize) {
        TsFullClient::send_opus_frame(self, daten, laenge).await;
    }

    fn is_connected(&self) -> bool {
        TsFullClient::is_connected(self)
    }
}

// ---------------------------------------------------------------------------
// Empfang
// ---------------------------------------------------------------------------

async fn empfangs_loop(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<TransportEreignis>) {
    while let Some(ereignis) = rx.recv().await {
        match ereignis {
            TransportEreignis::Paket(paket) => inner.paket_verarbeiten(paket).await,
            TransportEreignis::Gestoppt(grund) => {
                inner.gestoppt(grund);
                break;
            }
        }
    }
}

impl Inner {
    fn phase_setzen(&self, phase: Phase) {
        let mut aktuell = self.phase.lock();
        if *aktuell != phase {
            let alt = *aktuell;
            debug!(von = ?alt, nach = ?phase, "Phasenwechsel");
            *aktuell = phase;
        }
    }

    fn melden(&self, ereignis: ClientEvent) {
        let _ = self.ereignisse.send(ereignis);
    }

    fn krypto(&self) -> Option<GeteilteKrypto> {
        self.krypto.lock().clone()
    }

    /// Setzt den Sitzungszustand fuer einen neuen Verbindungsaufbau zurueck
    ///
    /// Eine noch laufende Sitzung wird mit `Gestoppt` abgeschlossen.
    fn zuruecksetzen(&self) {
        if let Some(alt) = self.empfang.lock().take() {
            alt.abort();
        }
        self.gestoppt("neue Verbindung".to_string());
        self.worker_beenden();
        self.anfrage.abbrechen();
        self.verbunden.store(false, Ordering::SeqCst);
        self.zaehler.lock().zuruecksetzen();
        self.command_queue.lock().zuruecksetzen();
        self.command_low_queue.lock().zuruecksetzen();
        self.voice.lock().beenden();
        self.voice_codec.store(CODEC_OPUS_MUSIC, Ordering::Relaxed);
        *self.clientinit_id.lock() = None;
        *self.aktueller_kanal.lock() = None;
        self.kanalliste_angefordert.store(false, Ordering::SeqCst);
        self.drossel.lock().zuruecksetzen();
        self.handler.set_client_id(0);
    }

    fn worker_beenden(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Meldet das Ende der Sitzung genau einmal
    fn gestoppt(&self, grund: String) {
        if !self.sitzung_aktiv.swap(false, Ordering::SeqCst) {
            return;
        }
        self.verbunden.store(false, Ordering::SeqCst);
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Getrennt {
                *phase = Phase::Abgebrochen;
            }
        }
        self.anfrage.abbrechen();
        self.worker_beenden();
        info!(grund = %grund, "Verbindung beendet");
        self.melden(ClientEvent::Gestoppt { grund });
    }

    async fn paket_verarbeiten(self: &Arc<Self>, paket: Packet) {
        match paket.packet_type {
            PacketType::Init1 => self.init1_verarbeiten(paket).await,
            PacketType::Command | PacketType::CommandLow => self.command_verarbeiten(paket).await,
            PacketType::Ping => {
                let daten = paket.id.to_be_bytes().to_vec();
                if let Err(e) = self.paket_senden(PacketType::Pong, PacketFlags::UNENCRYPTED, daten).await {
                    debug!(fehler = %e, "PONG nicht gesendet");
                }
            }
            andere => trace!(typ = ?andere, id = paket.id, "Paket ignoriert"),
        }
    }

    async fn init1_verarbeiten(&self, paket: Packet) {
        let Some(krypto) = self.krypto() else {
            return;
        };
        let antwort = krypto
            .lock()
            .process_init1(Direction::ServerToClient, Some(&paket.data));
        match antwort {
            Ok(daten) if daten.is_empty() => debug!("INIT1-Austausch abgeschlossen"),
            Ok(daten) => {
                let mut antwort = Packet::neu(PacketType::Init1, PacketFlags::UNENCRYPTED, daten);
                antwort.id = INIT1_PAKET_ID;
                if let Err(e) = self.handler.add_outgoing_packet(antwort).await {
                    warn!(fehler = %e, "INIT1-Antwort nicht gesendet");
                }
            }
            Err(e) => warn!(fehler = %e, laenge = paket.data.len(), "INIT1 verworfen"),
        }
    }

    async fn command_verarbeiten(self: &Arc<Self>, paket: Packet) {
        let (ack_typ, ack_flags) = if paket.packet_type == PacketType::Command {
            (PacketType::Ack, PacketFlags::KEINE)
        } else {
            (PacketType::AckLow, PacketFlags::UNENCRYPTED)
        };
        let ack = paket.id.to_be_bytes().to_vec();
        if let Err(e) = self.paket_senden(ack_typ, ack_flags, ack).await {
            debug!(fehler = %e, id = paket.id, "ACK nicht gesendet");
        }

        let nutzlasten = if paket.packet_type == PacketType::Command {
            self.command_queue.lock().annehmen(paket)
        } else {
            self.command_low_queue.lock().annehmen(paket)
        };
        for nutzlast in nutzlasten {
            self.nutzlast_verarbeiten(&nutzlast).await;
        }
    }

    async fn nutzlast_verarbeiten(self: &Arc<Self>, nutzlast: &[u8]) {
        let text = String::from_utf8_lossy(nutzlast);
        let befehle = match parse_lines(&text) {
            Ok(b) => b,
            Err(e) => {
                warn!(fehler = %e, "Kommando nicht lesbar");
                return;
            }
        };
        for cmd in befehle {
            trace!(name = %cmd.name, "Kommando empfangen");
            match cmd.name.to_ascii_lowercase().as_str() {
                "initivexpand" => self.initivexpand(&cmd).await,
                "initivexpand2" => self.initivexpand2(&cmd).await,
                "initserver" => self.initserver(&cmd),
                "notifyconnectioninforequest" => self.verbindungsinfo_senden().await,
                "notifycliententerview" => self.eigener_kanal(&cmd, false),
                "notifyclientmoved" => self.eigener_kanal(&cmd, true),
                "notifyclientleftview" => self.eigener_client_entfernt(&cmd),
                _ => {}
            }
            if self.anfrage.zuordnen(&cmd) == Zuordnung::Unaufgefordert {
                let id = cmd.zahl("id").unwrap_or(0);
                let nachricht = cmd.param("msg").unwrap_or_default().to_string();
                if id != 0 {
                    warn!(id, nachricht = %nachricht, "Server-Fehler");
                }
                self.melden(ClientEvent::ServerFehler {
                    id,
                    nachricht,
                    return_code: cmd.param("return_code").map(str::to_string),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Schluesselaustausch und Anmeldung
    // -----------------------------------------------------------------------

    async fn initivexpand(&self, cmd: &ParsedCommand) {
        self.phase_setzen(Phase::KryptoAushandlung);
        let (Some(alpha), Some(beta), Some(omega)) =
            (cmd.param("alpha"), cmd.param("beta"), cmd.param("omega"))
        else {
            self.handler.abbrechen("initivexpand unvollstaendig");
            return;
        };
        let Some(krypto) = self.krypto() else {
            return;
        };
        let ergebnis = krypto.lock().crypto_init(alpha, beta, omega);
        if let Err(e) = ergebnis {
            error!(fehler = %e, "Krypto-Setup fehlgeschlagen");
            self.handler.abbrechen(&format!("Krypto-Setup fehlgeschlagen: {e}"));
            return;
        }
        self.handler.mark_init_complete();
        self.clientinit_senden().await;
    }

    async fn initivexpand2(&self, cmd: &ParsedCommand) {
        self.phase_setzen(Phase::KryptoAushandlung);
        let (Some(license), Some(omega), Some(proof), Some(beta)) = (
            cmd.param_eines(&["license", "l"]),
            cmd.param("omega"),
            cmd.param("proof"),
            cmd.param("beta"),
        ) else {
            self.handler.abbrechen("initivexpand2 unvollstaendig");
            return;
        };
        let Some(krypto) = self.krypto() else {
            return;
        };

        let beta_bytes = match STANDARD.decode(beta) {
            Ok(b) if b.len() == BETA_LAENGE => b,
            Ok(b) => {
                self.handler
                    .abbrechen(&format!("beta hat {} statt {BETA_LAENGE} Bytes", b.len()));
                return;
            }
            Err(e) => {
                self.handler.abbrechen(&format!("beta nicht lesbar: {e}"));
                return;
            }
        };

        let temp = generate_temporary_key();
        let mut zu_signieren = Vec::with_capacity(temp.public_key.len() + beta_bytes.len());
        zu_signieren.extend_from_slice(&temp.public_key);
        zu_signieren.extend_from_slice(&beta_bytes);
        let signatur = krypto.lock().identity().sign(&zu_signieren);

        let clientek = CommandBuilder::neu("clientek")
            .param("ek", STANDARD.encode(temp.public_key))
            .param("proof", STANDARD.encode(signatur));
        if let Err(e) = self.builder_senden(&clientek).await {
            self.handler.abbrechen(&format!("clientek nicht gesendet: {e}"));
            return;
        }

        let ergebnis = krypto
            .lock()
            .crypto_init2(license, omega, proof, beta, &temp.private_key);
        if let Err(e) = ergebnis {
            error!(fehler = %e, "Krypto-Setup fehlgeschlagen");
            self.handler.abbrechen(&format!("Krypto-Setup fehlgeschlagen: {e}"));
            return;
        }
        self.handler.mark_init_complete();
        self.clientinit_senden().await;
    }

    async fn clientinit_senden(&self) {
        let Some(p) = self.parameter.lock().clone() else {
            return;
        };
        let standard_kanal = self.ziel_kanal.lock().clone();
        let cmd = CommandBuilder::neu("clientinit")
            .param("client_nickname", p.nickname_oder_standard())
            .param("client_version", &p.version.version)
            .param("client_platform", &p.version.platform)
            .param("client_input_hardware", 1)
            .param("client_output_hardware", 1)
            .param("client_default_channel", standard_kanal)
            .param("client_default_channel_password", p.kanal_passwort.hashed())
            .param("client_server_password", p.server_passwort.hashed())
            .param("client_nickname_phonetic", &p.nickname_phonetisch)
            .param("client_meta_data", "")
            .param("client_default_token", &p.standard_token)
            .param("client_version_sign", &p.version.sign)
            .param("client_key_offset", p.identity.valid_key_offset)
            .param("hwid", p.hwid_oder_standard());

        match self.builder_senden(&cmd).await {
            Ok(id) => {
                *self.clientinit_id.lock() = Some(id);
                self.phase_setzen(Phase::ClientInitGesendet);
                info!(id, nickname = p.nickname_oder_standard(), "clientinit gesendet");
            }
            Err(e) => self.handler.abbrechen(&format!("clientinit nicht gesendet: {e}")),
        }
    }

    fn initserver(self: &Arc<Self>, cmd: &ParsedCommand) {
        if let Some(id) = self.clientinit_id.lock().take() {
            self.handler.ack_command(id);
        }
        if let Some(cid) = cmd.param("cid").and_then(ChannelId::parsen) {
            *self.aktueller_kanal.lock() = Some(cid);
        }
        if let Some(wert) = cmd.param_eines(&["aclid", "client_id"]) {
            match ClientId::parsen(wert) {
                Some(id) => self.handler.set_client_id(id.0),
                None => warn!(wert, "initserver mit ungueltiger Client-ID"),
            }
        }
        self.codec_uebernehmen(cmd);

        self.verbunden.store(true, Ordering::SeqCst);
        self.phase_setzen(Phase::Verbunden);
        let client_id = ClientId(self.handler.client_id());
        let kanal_id = self.aktueller_kanal.lock().unwrap_or(ChannelId::WURZEL);
        info!(%client_id, %kanal_id, codec = self.voice_codec.load(Ordering::Relaxed), "Angemeldet");
        self.melden(ClientEvent::Angemeldet { client_id, kanal_id });
        self.kanalliste_planen();
    }

    fn codec_uebernehmen(&self, cmd: &ParsedCommand) {
        let Some(wert) = cmd.param_eines(&["virtualserver_codec", "virtualserver_default_channel_codec"])
        else {
            return;
        };
        match wert.trim().parse::<i64>() {
            Ok(codec) if codec_unterstuetzt(codec) => {
                self.voice_codec.store(codec as u8, Ordering::Relaxed);
            }
            Ok(codec) => {
                warn!(codec, "Server-Codec nicht unterstuetzt, nutze Opus Music");
                self.voice_codec.store(CODEC_OPUS_MUSIC, Ordering::Relaxed);
            }
            Err(_) => warn!(wert, "Server-Codec nicht lesbar"),
        }
    }

    fn eigener_kanal(&self, cmd: &ParsedCommand, verschoben: bool) {
        let eigene = self.handler.client_id();
        if eigene == 0 || cmd.param("clid").and_then(ClientId::parsen) != Some(ClientId(eigene)) {
            return;
        }
        let Some(cid) = cmd.param_eines(&["ctid", "cid"]).and_then(ChannelId::parsen) else {
            return;
        };
        *self.aktueller_kanal.lock() = Some(cid);
        if verschoben {
            info!(kanal = %cid, "Kanal gewechselt");
            self.melden(ClientEvent::KanalGewechselt { kanal_id: cid });
        }
    }

    fn eigener_client_entfernt(&self, cmd: &ParsedCommand) {
        let eigene = self.handler.client_id();
        if eigene != 0 && cmd.param("clid").and_then(ClientId::parsen) == Some(ClientId(eigene)) {
            *self.aktueller_kanal.lock() = None;
        }
    }

    async fn verbindungsinfo_senden(&self) {
        let jetzt = Instant::now();
        if !self.drossel.lock().erlauben(jetzt) {
            trace!("setconnectioninfo gedrosselt");
            return;
        }
        let cmd = setconnectioninfo(self.handler.ping_stats(), |art| self.handler.stats(art), jetzt);
        if let Err(e) = self.builder_senden(&cmd).await {
            debug!(fehler = %e, "setconnectioninfo nicht gesendet");
        }
    }

    // -----------------------------------------------------------------------
    // Kanaele
    // -----------------------------------------------------------------------

    fn kanalliste_planen(self: &Arc<Self>) {
        if self.kanalliste_angefordert.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = tokio::spawn(kanalliste_worker(Arc::clone(self)));
        self.tasks.lock().push(task);
    }

    async fn kanal_wechseln(&self, cid: ChannelId) -> ClientResult<()> {
        if *self.aktueller_kanal.lock() == Some(cid) {
            debug!(kanal = %cid, "Bereits im Zielkanal");
            return Ok(());
        }
        let client_id = self.handler.client_id();
        if client_id == 0 {
            return Err(ClientFehler::KeineClientId);
        }
        let passwort = self
            .parameter
            .lock()
            .as_ref()
            .map(|p| p.kanal_passwort.hashed().to_string())
            .unwrap_or_default();
        let clid = client_id.to_string();
        let cid_text = cid.0.to_string();
        let mut params = vec![("clid", clid.as_str()), ("cid", cid_text.as_str())];
        if !passwort.is_empty() {
            params.push(("cpw", passwort.as_str()));
        }
        self.anfrage_antworten("clientmove", &params).await?;
        info!(kanal = %cid, "Kanalwechsel angefordert");
        Ok(())
    }

    async fn kanal_aus_clientinfo(&self) -> Option<ChannelId> {
        let client_id = self.handler.client_id();
        if client_id == 0 {
            return None;
        }
        let clid = client_id.to_string();
        match self.anfrage_antworten("clientinfo", &[("clid", clid.as_str())]).await {
            Ok(antworten) => antworten
                .iter()
                .find_map(|cmd| cmd.param("cid").and_then(ChannelId::parsen)),
            Err(e) => {
                debug!(fehler = %e, "clientinfo ohne Kanal");
                None
            }
        }
    }

    async fn kanal_aus_clientlist(&self) -> Option<ChannelId> {
        let eigene = self.handler.client_id().to_string();
        match self.anfrage_antworten("clientlist", &[]).await {
            Ok(antworten) => antworten
                .iter()
                .find(|cmd| listen_feld(cmd, "clid") == Some(eigene.as_str()))
                .and_then(|cmd| cmd.param("cid").and_then(ChannelId::parsen)),
            Err(e) => {
                debug!(fehler = %e, "clientlist ohne eigenen Eintrag");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    async fn paket_senden(&self, typ: PacketType, flags: PacketFlags, daten: Vec<u8>) -> ClientResult<u16> {
        let (id, generation) = self.zaehler.lock().naechster(typ);
        let mut paket = Packet::neu(typ, flags, daten);
        paket.id = id;
        paket.generation = generation;
        self.handler.add_outgoing_packet(paket).await?;
        Ok(id)
    }

    async fn builder_senden(&self, cmd: &CommandBuilder) -> ClientResult<u16> {
        let zeile = cmd.bauen()?;
        self.befehl_senden(cmd.name(), &zeile).await
    }

    /// Sendet ein Kommando, bei Bedarf komprimiert und fragmentiert
    ///
    /// Gibt die ID des letzten Pakets zurueck.
    async fn befehl_senden(&self, name: &str, zeile: &str) -> ClientResult<u16> {
        let fragmente = fragmentieren(zeile.as_bytes(), BEFEHL_BUDGET);
        let pakete: Vec<Packet> = {
            let mut zaehler = self.zaehler.lock();
            fragmente
                .into_iter()
                .map(|f| {
                    let (id, generation) = zaehler.naechster(PacketType::Command);
                    let mut p = Packet::neu(PacketType::Command, f.flags, f.daten);
                    p.id = id;
                    p.generation = generation;
                    p
                })
                .collect()
        };
        let anzahl = pakete.len();
        let mut letzte = 0;
        for paket in pakete {
            letzte = paket.id;
            self.handler.add_outgoing_packet(paket).await?;
        }
        debug!(name, pakete = anzahl, id = letzte, "Kommando gesendet");
        Ok(letzte)
    }

    async fn voice_senden(&self, opus: &[u8], session: Option<u8>) {
        let (id, generation) = self.zaehler.lock().naechster(PacketType::Voice);
        let codec = self.voice_codec.load(Ordering::Relaxed);
        let (daten, flags) = voice_daten(id, codec, opus, session);
        let mut paket = Packet::neu(PacketType::Voice, flags, daten);
        paket.id = id;
        paket.generation = generation;
        if let Err(e) = self.handler.add_outgoing_packet(paket).await {
            trace!(fehler = %e, "Sprachpaket nicht gesendet");
        }
    }

    // -----------------------------------------------------------------------
    // Korrelierte Anfragen
    // -----------------------------------------------------------------------

    async fn anfrage_senden(&self, name: &str, params: &[(&str, &str)]) -> ClientResult<AnfrageErgebnis> {
        if !self.verbunden.load(Ordering::SeqCst) {
            return Err(ClientFehler::NichtVerbunden);
        }
        let (return_code, rx) = self.anfrage.oeffnen(name)?;
        let mut cmd = CommandBuilder::neu(name);
        for (k, v) in params {
            cmd.param_setzen(k, v);
        }
        cmd.param_setzen("return_code", return_code);

        if let Err(e) = self.builder_senden(&cmd).await {
            self.anfrage.schliessen(return_code);
            return Err(e);
        }

        match tokio::time::timeout(ANTWORT_TIMEOUT, rx).await {
            Ok(Ok(ergebnis)) => Ok(ergebnis),
            Ok(Err(_)) => Err(ClientFehler::Abgebrochen {
                name: name.to_string(),
            }),
            Err(_) => {
                self.anfrage.schliessen(return_code);
                warn!(name, return_code, "Keine Antwort");
                Err(ClientFehler::Zeitlimit {
                    name: name.to_string(),
                    return_code,
                })
            }
        }
    }

    /// Wie [`Inner::anfrage_senden`], ein `error` mit id != 0 wird zum Fehler
    async fn anfrage_antworten(&self, name: &str, params: &[(&str, &str)]) -> ClientResult<Vec<ParsedCommand>> {
        let ergebnis = self.anfrage_senden(name, params).await?;
        match ergebnis.fehler_id() {
            0 => Ok(ergebnis.antworten),
            id => Err(ClientFehler::Server {
                id,
                nachricht: ergebnis.fehler_nachricht().to_string(),
            }),
        }
    }
}

/// Holt nach der Anmeldung die Kanalliste und betritt den Zielkanal
async fn kanalliste_worker(inner: Arc<Inner>) {
    for versuch in 1..=KANALLISTE_VERSUCHE {
        if !inner.verbunden.load(Ordering::SeqCst) {
            return;
        }
        match inner.anfrage_antworten("channellist", &[]).await {
            Ok(antworten) => {
                let kanaele = snapshots_parsen(&antworten);
                if !kanaele.is_empty() {
                    for k in &kanaele {
                        debug!(cid = %k.cid, parent = %k.parent, name = %k.name, "Kanal");
                    }
                    info!(anzahl = kanaele.len(), "Kanalliste empfangen");
                    zielkanal_betreten(&inner, &kanaele).await;
                    return;
                }
                debug!(versuch, "Kanalliste leer");
            }
            Err(e) => warn!(versuch, fehler = %e, "channellist fehlgeschlagen"),
        }
        if versuch < KANALLISTE_VERSUCHE {
            tokio::time::sleep(KANALLISTE_PAUSE).await;
        }
    }
    warn!("Keine Kanalliste erhalten");
}

async fn zielkanal_betreten(inner: &Inner, kanaele: &[ChannelSnapshot]) {
    let ziel = inner.ziel_kanal.lock().clone();
    if ziel.trim().is_empty() {
        return;
    }
    let Some(cid) = kanal_aufloesen(kanaele, &ziel) else {
        warn!(ziel = %ziel, "Zielkanal nicht gefunden");
        return;
    };
    if let Err(e) = inner.kanal_wechseln(cid).await {
        warn!(ziel = %ziel, kanal = %cid, fehler = %e, "Kanalwechsel fehlgeschlagen");
    }
}
