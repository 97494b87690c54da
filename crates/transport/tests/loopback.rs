//! Transport gegen einen Test-Server auf der Loopback-Schnittstelle

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tsvoice_crypto::{Identity, TsCrypt};
use tsvoice_protocol::{Direction, Packet, PacketFlags, PacketKind, PacketType};
use tsvoice_transport::{GeteilteKrypto, PacketHandler, TransportEreignis};

/// Minimaler Server: antwortet mit dem Dummy-Schluessel wie vor dem Krypto-Setup
struct TestServer {
    socket: UdpSocket,
    krypto: TsCrypt,
    client: Option<SocketAddr>,
}

impl TestServer {
    async fn neu() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            krypto: TsCrypt::neu(Identity::generate(0).unwrap()),
            client: None,
        }
    }

    fn adresse(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    /// Wartet auf das naechste Paket eines Typs, andere werden uebersprungen
    async fn empfangen(&mut self, typ: PacketType) -> Packet {
        let mut puffer = [0u8; 2048];
        loop {
            let (n, von) = timeout(Duration::from_secs(5), self.socket.recv_from(&mut puffer))
                .await
                .expect("Server wartet zu lange")
                .unwrap();
            self.client = Some(von);
            let mut paket = Packet::decode(Direction::ClientToServer, &puffer[..n]).unwrap();
            if paket.packet_type != typ {
                continue;
            }
            self.krypto.decrypt(&mut paket).unwrap();
            return paket;
        }
    }

    async fn senden(&mut self, mut paket: Packet) {
        paket.direction = Direction::ServerToClient;
        self.krypto.encrypt(&mut paket).unwrap();
        let ziel = self.client.expect("Client-Adresse unbekannt");
        self.socket.send_to(&paket.raw, ziel).await.unwrap();
    }
}

fn krypto() -> GeteilteKrypto {
    Arc::new(Mutex::new(TsCrypt::neu(Identity::generate(0).unwrap())))
}

fn command(id: u16, text: &str) -> Packet {
    let mut p = Packet::neu(PacketType::Command, PacketFlags::NEW_PROTOCOL, text.as_bytes().to_vec());
    p.id = id;
    p
}

async fn warten_bis(bedingung: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Bedingung nicht erfuellt");
}

#[tokio::test]
async fn command_wird_gesendet_und_per_ack_bestaetigt() {
    let mut server = TestServer::neu().await;
    let handler = PacketHandler::neu();
    handler.set_client_id(7);
    let _rx = handler.connect(server.adresse(), krypto()).await.unwrap();

    handler
        .add_outgoing_packet(command(1, "clientinit client_nickname=test"))
        .await
        .unwrap();
    assert_eq!(handler.ausstehend(), 1);

    let empfangen = server.empfangen(PacketType::Command).await;
    assert_eq!(empfangen.id, 1);
    assert_eq!(empfangen.client_id, 7);
    assert!(empfangen.hat_flag(PacketFlags::NEW_PROTOCOL));
    assert_eq!(empfangen.data, b"clientinit client_nickname=test");

    let ack = Packet::neu(PacketType::Ack, PacketFlags::KEINE, 1u16.to_be_bytes().to_vec());
    server.senden(ack).await;

    let h = handler.clone();
    warten_bis(move || h.ausstehend() == 0).await;
    assert_eq!(handler.stats(PacketKind::Control).gesendete_pakete, 1);
    assert_eq!(handler.stats(PacketKind::Control).empfangene_pakete, 1);
    handler.stop();
}

#[tokio::test]
async fn server_command_kommt_als_ereignis() {
    let mut server = TestServer::neu().await;
    let handler = PacketHandler::neu();
    let mut rx = handler.connect(server.adresse(), krypto()).await.unwrap();

    handler.add_outgoing_packet(command(1, "hallo")).await.unwrap();
    server.empfangen(PacketType::Command).await;

    let mut antwort = command(0, "notifytest a=1");
    antwort.flags = PacketFlags::NEW_PROTOCOL;
    server.senden(antwort).await;

    let ereignis = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("kein Ereignis")
        .expect("Kanal geschlossen");
    match ereignis {
        TransportEreignis::Paket(p) => {
            assert_eq!(p.packet_type, PacketType::Command);
            assert_eq!(p.direction, Direction::ServerToClient);
            assert_eq!(p.id, 0);
            assert_eq!(p.generation, 0);
            assert_eq!(p.data, b"notifytest a=1");
        }
        andere => panic!("unerwartet: {andere:?}"),
    }
    handler.stop();
}

#[tokio::test]
async fn ping_pong_liefert_rtt() {
    let mut server = TestServer::neu().await;
    let handler = PacketHandler::neu();
    let _rx = handler.connect(server.adresse(), krypto()).await.unwrap();
    assert_eq!(handler.ping_stats().ping_sekunden, 30.0);

    // Der erste PING kommt nach etwa einer Sekunde
    let ping = server.empfangen(PacketType::Ping).await;
    assert!(ping.hat_flag(PacketFlags::UNENCRYPTED));
    assert!(ping.data.is_empty());

    let pong = Packet::neu(PacketType::Pong, PacketFlags::UNENCRYPTED, ping.id.to_be_bytes().to_vec());
    server.senden(pong).await;

    let h = handler.clone();
    warten_bis(move || h.ping_stats().ping_sekunden < 30.0).await;
    assert!(handler.ping_stats().ping_sekunden < 1.0);
    assert_eq!(handler.stats(PacketKind::Keepalive).empfangene_pakete, 1);
    handler.stop();
}

#[tokio::test(start_paused = true)]
async fn abbruch_nach_30s_ohne_ack() {
    let server = TestServer::neu().await;
    let handler = PacketHandler::neu();
    let mut rx = handler.connect(server.adresse(), krypto()).await.unwrap();

    let start = Instant::now();
    handler.add_outgoing_packet(command(1, "wird nie bestaetigt")).await.unwrap();

    let grund = timeout(Duration::from_secs(40), async {
        loop {
            match rx.recv().await {
                Some(TransportEreignis::Gestoppt(grund)) => return grund,
                Some(_) => continue,
                None => panic!("Kanal ohne Gestoppt geschlossen"),
            }
        }
    })
    .await
    .expect("Verbindung muss abbrechen");

    let vergangen = start.elapsed();
    assert!(vergangen > Duration::from_secs(30), "abgebrochen nach {vergangen:?}");
    assert!(vergangen < Duration::from_secs(33), "abgebrochen nach {vergangen:?}");
    assert!(grund.contains("id=1"), "{grund}");
    assert!(!handler.is_connected());

    // Original plus eine Wiederholung pro Sekunde
    let mut puffer = [0u8; 2048];
    let mut commands = 0;
    while let Ok((n, _)) = server.socket.try_recv_from(&mut puffer) {
        if n > 12 && puffer[12] & 0x0F == PacketType::Command as u8 {
            commands += 1;
        }
    }
    assert!(commands >= 10, "nur {commands} Sendungen");
}
