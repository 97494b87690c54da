//! Kommando-Text durch Kompression und Paket-Framing und zurueck

use tsvoice_protocol::command::{parse_line, parse_lines};
use tsvoice_protocol::quicklz::{self, Level};
use tsvoice_protocol::{CommandBuilder, Direction, Packet, PacketFlags, PacketType, ProtokollFehler};

fn kanalliste(anzahl: usize) -> String {
    let eintraege: Vec<String> = (1..=anzahl)
        .map(|i| {
            format!(
                "cid={i} cpid=0 channel_name=Raum\\s{i} channel_order={} total_clients=0 channel_needed_subscribe_power=0",
                i - 1
            )
        })
        .collect();
    format!("channellist {}", eintraege.join("|"))
}

#[test]
fn komprimiertes_kommando_ueber_das_netz() {
    let text = kanalliste(40);
    let komprimiert = quicklz::compress(text.as_bytes(), Level::Eins);
    assert!(komprimiert.len() < text.len() / 2);

    let mut paket = Packet::neu(
        PacketType::Command,
        PacketFlags::NEW_PROTOCOL | PacketFlags::COMPRESSED,
        komprimiert,
    );
    paket.direction = Direction::ServerToClient;
    paket.id = 7;
    let raw = paket.encode();

    let empfangen = Packet::decode(Direction::ServerToClient, &raw).unwrap();
    assert_eq!(empfangen.id, 7);
    assert!(empfangen.hat_flag(PacketFlags::COMPRESSED));
    let klartext = quicklz::decompress(&empfangen.data, 1 << 20).unwrap();
    assert_eq!(klartext, text.as_bytes());

    let befehle = parse_lines(std::str::from_utf8(&klartext).unwrap()).unwrap();
    assert_eq!(befehle.len(), 40);
    assert_eq!(befehle[0].name, "channellist");
    assert_eq!(befehle[0].param("channel_name"), Some("Raum 1"));
    assert_eq!(befehle[0].zahl::<u64>("cid"), Some(1));
    // Fortsetzungen tragen das erste Feld als Namen
    assert_eq!(befehle[39].name, "cid=40");
    assert_eq!(befehle[39].param("channel_name"), Some("Raum 40"));
}

#[test]
fn beide_level_liefern_dasselbe() {
    let text = kanalliste(200);
    let eins = quicklz::compress(text.as_bytes(), Level::Eins);
    let drei = quicklz::compress(text.as_bytes(), Level::Drei);
    assert_eq!(drei[0] & 0x0C, 0x0C);
    assert_eq!(quicklz::size_decompressed(&eins).unwrap(), text.len());
    assert_eq!(quicklz::size_compressed(&drei).unwrap(), drei.len());
    assert_eq!(quicklz::decompress(&eins, text.len()).unwrap(), text.as_bytes());
    assert_eq!(quicklz::decompress(&drei, text.len()).unwrap(), text.as_bytes());
}

#[test]
fn zu_grosse_ausgabe_wird_abgelehnt() {
    let text = kanalliste(10);
    let komprimiert = quicklz::compress(text.as_bytes(), Level::Eins);
    match quicklz::decompress(&komprimiert, text.len() - 1) {
        Err(ProtokollFehler::ZuGross { groesse, .. }) => assert_eq!(groesse, text.len()),
        andere => panic!("erwartet ZuGross, erhalten {andere:?}"),
    }
}

#[test]
fn builder_text_ist_parsebar() {
    let text = CommandBuilder::neu("clientinit")
        .param("client_nickname", "Bot | Radio")
        .param("client_version", "3.6.0 [Build: 1690193193]")
        .param("client_default_channel", "/5")
        .param("client_input_hardware", 1)
        .bauen()
        .unwrap();
    assert!(!text.contains("Bot | Radio"));

    let befehl = parse_line(&text).unwrap();
    assert_eq!(befehl.name, "clientinit");
    assert_eq!(befehl.param("client_nickname"), Some("Bot | Radio"));
    assert_eq!(befehl.param("client_version"), Some("3.6.0 [Build: 1690193193]"));
    assert_eq!(befehl.param("client_default_channel"), Some("/5"));
    assert_eq!(befehl.zahl::<u8>("client_input_hardware"), Some(1));
}

#[test]
fn fehlerantwort_zerlegen() {
    let befehle = parse_lines("error id=768 msg=invalid\\schannelID return_code=12").unwrap();
    assert_eq!(befehle.len(), 1);
    let fehler = &befehle[0];
    assert_eq!(fehler.name, "error");
    assert_eq!(fehler.zahl::<u32>("id"), Some(768));
    assert_eq!(fehler.param("msg"), Some("invalid channelID"));
    assert_eq!(fehler.param("return_code"), Some("12"));
}
