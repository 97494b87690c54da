//! Antwort auf `notifyconnectioninforequest`
//!
//! Der Server fragt regelmaessig nach Verbindungswerten. Geantwortet wird
//! mit `setconnectioninfo`, hoechstens einmal pro Sekunde.

use std::time::Duration;

use tokio::time::Instant;
use tsvoice_protocol::{CommandBuilder, PacketKind};
use tsvoice_transport::{PacketStatistics, PingStats};

/// Mindestabstand zwischen zwei `setconnectioninfo`
pub const MIN_ABSTAND: Duration = Duration::from_secs(1);

/// Drosselt die Antworten auf Verbindungsinfo-Anfragen
#[derive(Debug, Default)]
pub struct InfoDrossel {
    zuletzt: Option<Instant>,
}

impl InfoDrossel {
    /// Gibt true zurueck und merkt sich den Zeitpunkt, wenn gesendet werden darf
    pub fn erlauben(&mut self, jetzt: Instant) -> bool {
        match self.zuletzt {
            Some(t) if jetzt.duration_since(t) < MIN_ABSTAND => false,
            _ => {
                self.zuletzt = Some(jetzt);
                true
            }
        }
    }

    pub fn zuruecksetzen(&mut self) {
        self.zuletzt = None;
    }
}

/// Baut `setconnectioninfo` aus Ping und Verkehrsstatistik
pub fn setconnectioninfo(
    ping: PingStats,
    statistik: impl Fn(PacketKind) -> PacketStatistics,
    jetzt: Instant,
) -> CommandBuilder {
    let ping_ms = (ping.ping_sekunden * 1000.0).round() as i64;
    let abweichung_ms = (ping.abweichung_sekunden * 1_000_000.0).round() / 1000.0;

    let mut cmd = CommandBuilder::neu("setconnectioninfo")
        .param("connection_ping", ping_ms)
        .param("connection_ping_deviation", format!("{abweichung_ms:?}"));

    for art in PacketKind::ALLE {
        let s = statistik(art);
        let l = art.label();
        cmd = cmd
            .param(format!("connection_packets_sent_{l}"), s.gesendete_pakete)
            .param(format!("connection_packets_received_{l}"), s.empfangene_pakete)
            .param(format!("connection_bytes_sent_{l}"), s.gesendete_bytes)
            .param(format!("connection_bytes_received_{l}"), s.empfangene_bytes)
            .param(format!("connection_server2client_packetloss_{l}"), 0)
            .param(
                format!("connection_bandwidth_sent_last_second_{l}"),
                s.gesendet_letzte_sekunde(jetzt),
            )
            .param(
                format!("connection_bandwidth_sent_last_minute_{l}"),
                s.gesendet_letzte_minute(jetzt),
            )
            .param(
                format!("connection_bandwidth_received_last_second_{l}"),
                s.empfangen_letzte_sekunde(jetzt),
            )
            .param(
                format!("connection_bandwidth_received_last_minute_{l}"),
                s.empfangen_letzte_minute(jetzt),
            );
    }
    cmd.param("connection_server2client_packetloss_total", 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsvoice_protocol::command::parse_line;

    #[test]
    fn drossel_einmal_pro_sekunde() {
        let mut d = InfoDrossel::default();
        let t0 = Instant::now();
        assert!(d.erlauben(t0));
        assert!(!d.erlauben(t0 + Duration::from_millis(999)));
        assert!(d.erlauben(t0 + Duration::from_secs(1)));
        d.zuruecksetzen();
        assert!(d.erlauben(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn parameter() {
        let jetzt = Instant::now();
        let ping = PingStats {
            ping_sekunden: 0.0426,
            abweichung_sekunden: 0.001_234_56,
        };
        let statistik = |art: PacketKind| {
            let mut s = PacketStatistics::default();
            if art == PacketKind::Control {
                s.ausgehend(100, jetzt);
                s.eingehend(40, jetzt);
            }
            s
        };

        let zeile = setconnectioninfo(ping, statistik, jetzt).bauen().unwrap();
        let cmd = parse_line(&zeile).unwrap();
        assert_eq!(cmd.name, "setconnectioninfo");
        assert_eq!(cmd.param("connection_ping"), Some("43"));
        assert_eq!(cmd.param("connection_ping_deviation"), Some("1.235"));
        assert_eq!(cmd.param("connection_packets_sent_control"), Some("1"));
        assert_eq!(cmd.param("connection_bytes_received_control"), Some("40"));
        assert_eq!(cmd.param("connection_bandwidth_sent_last_second_control"), Some("100"));
        assert_eq!(cmd.param("connection_bytes_sent_speech"), Some("0"));
        assert_eq!(cmd.param("connection_server2client_packetloss_keepalive"), Some("0"));
        assert_eq!(cmd.param("connection_server2client_packetloss_total"), Some("0"));
        // 2 + 3 * 9 + 1
        assert_eq!(cmd.params.len(), 30);
    }

    #[test]
    fn ohne_messung() {
        let ping = PingStats {
            ping_sekunden: 30.0,
            abweichung_sekunden: 0.0,
        };
        let zeile = setconnectioninfo(ping, |_| PacketStatistics::default(), Instant::now())
            .bauen()
            .unwrap();
        let cmd = parse_line(&zeile).unwrap();
        assert_eq!(cmd.param("connection_ping"), Some("30000"));
        assert_eq!(cmd.param("connection_ping_deviation"), Some("0.0"));
    }
}
