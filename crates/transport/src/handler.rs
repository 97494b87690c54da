//! PacketHandler – UDP-Socket, Empfangs-Loop und Timer einer Verbindung
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv)
//!     |
//!     v
//! Packet::decode(S2C)          <- ungueltig: verwerfen
//!     |
//!     v
//! EmpfangsFenster::aufloesen() <- Generation bestimmen
//!     |
//!     v
//! TsCrypt::decrypt()           <- MAC falsch: verwerfen
//!     |
//!     +--> ACK/ACK_LOW  -> ResendSpeicher::bestaetigen()
//!     +--> PONG         -> PingTracker::pong()
//!     +--> sonst        -> TransportEreignis::Paket (mpsc)
//!
//! Timer (1s): Resend-Sweep, danach PING
//! ```
//!
//! Alle Datagramme laufen ueber eine einzige Sende-Sperre.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use tsvoice_crypto::TsCrypt;
use tsvoice_protocol::{Direction, Packet, PacketFlags, PacketKind, PacketType};

use crate::error::{TransportFehler, TransportResult};
use crate::ping::{PingStats, PingTracker};
use crate::resend::{ResendSpeicher, RESEND_INTERVALL};
use crate::statistics::{PacketStatistics, Verkehrsstatistik};
use crate::window::EmpfangsFenster;

/// Empfangspuffer (groesser als jedes Protokoll-Datagramm)
const EMPFANGS_PUFFER: usize = 8192;

/// Zwischen Client und Transport geteilter Kryptozustand
pub type GeteilteKrypto = Arc<Mutex<TsCrypt>>;

/// Meldungen des Transports an den Besitzer der Verbindung
#[derive(Debug)]
pub enum TransportEreignis {
    /// Entschluesseltes Paket (alles ausser ACK und PONG)
    Paket(Packet),
    /// Verbindung beendet, mit Grund
    Gestoppt(String),
}

// ---------------------------------------------------------------------------
// PacketHandler
// ---------------------------------------------------------------------------

/// Besitzt den UDP-Socket einer Verbindung
///
/// Klonen ist billig, alle Klone teilen denselben Zustand.
#[derive(Clone, Default)]
pub struct PacketHandler {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    verbunden: AtomicBool,
    client_id: AtomicU16,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    sende_sperre: tokio::sync::Mutex<()>,
    krypto: Mutex<Option<GeteilteKrypto>>,
    fenster: Mutex<EmpfangsFenster>,
    resend: ResendSpeicher,
    ping: Mutex<PingTracker>,
    statistik: Mutex<Verkehrsstatistik>,
    ereignisse: Mutex<Option<mpsc::UnboundedSender<TransportEreignis>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PacketHandler {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Oeffnet den Socket und startet Empfangs-Loop und Timer
    ///
    /// Eine bestehende Verbindung wird vorher beendet. Die Ereignisse der
    /// neuen Verbindung kommen ueber den zurueckgegebenen Empfaenger.
    pub async fn connect(
        &self,
        adresse: SocketAddr,
        krypto: GeteilteKrypto,
    ) -> TransportResult<mpsc::UnboundedReceiver<TransportEreignis>> {
        self.inner.stoppen("neue Verbindung");

        let bind: SocketAddr = if adresse.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(adresse).await?;
        let socket = Arc::new(socket);
        info!(
            %adresse,
            lokal = ?socket.local_addr().ok(),
            "PacketHandler verbunden"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = &self.inner;
        inner.fenster.lock().zuruecksetzen();
        inner.ping.lock().zuruecksetzen();
        *inner.statistik.lock() = Verkehrsstatistik::default();
        inner.resend.leeren();
        *inner.socket.lock() = Some(Arc::clone(&socket));
        *inner.krypto.lock() = Some(krypto);
        *inner.ereignisse.lock() = Some(tx);
        inner.verbunden.store(true, Ordering::SeqCst);

        let empfang = tokio::spawn(empfangs_loop(Arc::clone(inner), socket));
        let timer = tokio::spawn(timer_loop(Arc::clone(inner)));
        inner.tasks.lock().extend([empfang, timer]);
        Ok(rx)
    }

    /// Beendet die Verbindung (idempotent)
    pub fn stop(&self) {
        self.inner.stoppen("gestoppt");
    }

    /// Beendet die Verbindung mit eigenem Grund (z.B. fehlgeschlagenes Krypto-Setup)
    pub fn abbrechen(&self, grund: &str) {
        self.inner.stoppen(grund);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.verbunden.load(Ordering::SeqCst)
    }

    pub fn client_id(&self) -> u16 {
        self.inner.client_id.load(Ordering::Relaxed)
    }

    pub fn set_client_id(&self, client_id: u16) {
        self.inner.client_id.store(client_id, Ordering::Relaxed);
    }

    /// Handshake abgeschlossen: das letzte INIT1 nicht weiter wiederholen
    pub fn mark_init_complete(&self) {
        self.inner.resend.init1_verwerfen();
    }

    /// Bestaetigt ein COMMAND ohne ACK-Paket (z.B. `clientinit` durch `initserver`)
    pub fn ack_command(&self, id: u16) {
        self.inner.resend.bestaetigen(PacketType::Ack, id);
    }

    /// Verschluesselt und sendet ein Paket, zuverlaessige Typen werden gemerkt
    pub async fn add_outgoing_packet(&self, packet: Packet) -> TransportResult<()> {
        self.inner.paket_senden(packet).await
    }

    /// Anzahl noch unbestaetigter Pakete
    pub fn ausstehend(&self) -> usize {
        self.inner.resend.ausstehend()
    }

    pub fn stats(&self, art: PacketKind) -> PacketStatistics {
        self.inner.statistik.lock().klasse(art).clone()
    }

    pub fn ping_stats(&self) -> PingStats {
        self.inner.ping.lock().stats()
    }

    pub fn lokale_adresse(&self) -> Option<SocketAddr> {
        self.inner
            .socket
            .lock()
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }
}

// ---------------------------------------------------------------------------
// Inner
// ---------------------------------------------------------------------------

impl Inner {
    fn verbunden(&self) -> bool {
        self.verbunden.load(Ordering::SeqCst)
    }

    fn krypto(&self) -> Option<GeteilteKrypto> {
        self.krypto.lock().clone()
    }

    fn stoppen(&self, grund: &str) {
        if !self.verbunden.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(grund, "PacketHandler gestoppt");
        self.socket.lock().take();
        self.resend.leeren();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(tx) = self.ereignisse.lock().take() {
            let _ = tx.send(TransportEreignis::Gestoppt(grund.to_string()));
        }
    }

    async fn paket_senden(&self, mut packet: Packet) -> TransportResult<()> {
        if !self.verbunden() {
            return Err(TransportFehler::NichtVerbunden);
        }
        packet.direction = Direction::ClientToServer;
        packet.client_id = self.client_id.load(Ordering::Relaxed);

        match self.krypto() {
            Some(krypto) => krypto.lock().encrypt(&mut packet)?,
            None => packet.raw = packet.encode(),
        }

        let jetzt = Instant::now();
        self.statistik
            .lock()
            .ausgehend(packet.packet_type, packet.raw.len(), jetzt);
        if packet.packet_type.ist_zuverlaessig() {
            self.resend
                .merken(packet.packet_type, packet.id, &packet.raw, jetzt);
        }

        trace!(
            typ = ?packet.packet_type,
            id = packet.id,
            generation = packet.generation,
            bytes = packet.raw.len(),
            "Paket senden"
        );
        self.datagramm_senden(&packet.raw).await
    }

    async fn datagramm_senden(&self, raw: &[u8]) -> TransportResult<()> {
        let socket = self
            .socket
            .lock()
            .clone()
            .ok_or(TransportFehler::NichtVerbunden)?;
        let _sperre = self.sende_sperre.lock().await;
        socket.send(raw).await?;
        Ok(())
    }

    fn datagramm_verarbeiten(&self, raw: &[u8]) {
        let mut packet = match Packet::decode(Direction::ServerToClient, raw) {
            Ok(p) => p,
            Err(e) => {
                debug!(fehler = %e, bytes = raw.len(), "Ungueltiges Datagramm verworfen");
                return;
            }
        };

        let info = self.fenster.lock().aufloesen(packet.packet_type, packet.id);
        packet.generation = info.generation;

        if let Some(krypto) = self.krypto() {
            if let Err(e) = krypto.lock().decrypt(&mut packet) {
                debug!(
                    typ = ?packet.packet_type,
                    id = packet.id,
                    fehler = %e,
                    "Entschluesselung fehlgeschlagen"
                );
                return;
            }
        }

        let jetzt = Instant::now();
        self.statistik
            .lock()
            .eingehend(packet.packet_type, raw.len(), jetzt);

        if info.im_fenster {
            self.fenster
                .lock()
                .vorruecken(packet.packet_type, packet.id, info.generation);
        }

        match packet.packet_type {
            PacketType::Ack | PacketType::AckLow => {
                if let [hi, lo, ..] = packet.data.as_slice() {
                    let id = u16::from_be_bytes([*hi, *lo]);
                    let bekannt = self.resend.bestaetigen(packet.packet_type, id);
                    trace!(typ = ?packet.packet_type, id, bekannt, "ACK empfangen");
                }
            }
            PacketType::Pong => {
                if let Some(rtt) = self.ping.lock().pong(&packet.data, jetzt) {
                    trace!(rtt_ms = rtt * 1000.0, "PONG empfangen");
                }
            }
            _ => {
                trace!(
                    typ = ?packet.packet_type,
                    id = packet.id,
                    generation = packet.generation,
                    "Paket empfangen"
                );
                if let Some(tx) = self.ereignisse.lock().as_ref() {
                    let _ = tx.send(TransportEreignis::Paket(packet));
                }
            }
        }
    }

    /// Gibt false zurueck, wenn die Verbindung wegen Zeitueberschreitung beendet wurde
    async fn resend_sweep(&self) -> bool {
        let jetzt = Instant::now();
        let ergebnis = self.resend.sweep(jetzt);

        if let Some(eintrag) = ergebnis.abgelaufen {
            let fehler = TransportFehler::Zeitlimit {
                packet_type: eintrag.packet_type,
                id: eintrag.id,
                sekunden: jetzt.duration_since(eintrag.erstmals_gesendet).as_secs(),
            };
            warn!(
                typ = ?eintrag.packet_type,
                id = eintrag.id,
                "Paket unbestaetigt, Verbindung wird abgebrochen"
            );
            self.stoppen(&fehler.to_string());
            return false;
        }

        for eintrag in ergebnis.erneut {
            match self.datagramm_senden(&eintrag.raw).await {
                Ok(()) => {
                    self.resend.gesendet(eintrag.packet_type, eintrag.id, jetzt);
                    debug!(typ = ?eintrag.packet_type, id = eintrag.id, "Paket erneut gesendet");
                }
                Err(e) => debug!(fehler = %e, "Erneutes Senden fehlgeschlagen"),
            }
        }
        true
    }

    async fn ping_senden(&self) {
        let (id, generation) = self.ping.lock().naechster_ping(Instant::now());
        let mut ping = Packet::neu(PacketType::Ping, PacketFlags::UNENCRYPTED, Vec::new());
        ping.id = id;
        ping.generation = generation;
        if let Err(e) = self.paket_senden(ping).await {
            debug!(fehler = %e, "PING nicht gesendet");
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn empfangs_loop(inner: Arc<Inner>, socket: Arc<UdpSocket>) {
    let mut puffer = vec![0u8; EMPFANGS_PUFFER];
    debug!("Empfangs-Loop gestartet");
    loop {
        match socket.recv(&mut puffer).await {
            Ok(n) => inner.datagramm_verarbeiten(&puffer[..n]),
            Err(e) => {
                if inner.verbunden() {
                    error!(fehler = %e, "UDP-Empfangsfehler");
                    inner.stoppen(&format!("Empfangsfehler: {e}"));
                }
                break;
            }
        }
    }
    debug!("Empfangs-Loop beendet");
}

async fn timer_loop(inner: Arc<Inner>) {
    let mut takt = tokio::time::interval_at(Instant::now() + RESEND_INTERVALL, RESEND_INTERVALL);
    takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        takt.tick().await;
        if !inner.verbunden() || !inner.resend_sweep().await {
            break;
        }
        inner.ping_senden().await;
    }
}
