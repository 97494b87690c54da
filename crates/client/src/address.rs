//! Serveradresse und oeffentliche Client-IP

use std::net::{IpAddr, SocketAddr};

use crate::error::{ClientFehler, ClientResult};

/// Standardport des Sprachservers
pub const STANDARD_PORT: u16 = 9987;

/// Standardhost bei leerer Adresse
pub const STANDARD_HOST: &str = "127.0.0.1";

/// Zerlegt `host[:port]` in Host und Port
///
/// Ohne Port (oder bei ungueltigem Port) gilt 9987. IPv6-Adressen
/// brauchen fuer einen Port eckige Klammern: `[::1]:9987`.
pub fn host_und_port(adresse: &str) -> (String, u16) {
    let adresse = adresse.trim();
    if adresse.is_empty() {
        return (STANDARD_HOST.to_string(), STANDARD_PORT);
    }
    if let Ok(sock) = adresse.parse::<SocketAddr>() {
        return (sock.ip().to_string(), sock.port());
    }
    if let Ok(ip) = adresse.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        return (ip.to_string(), STANDARD_PORT);
    }
    match adresse.split_once(':') {
        Some((host, port)) => (host.to_string(), port.trim().parse().unwrap_or(STANDARD_PORT)),
        None => (adresse.to_string(), STANDARD_PORT),
    }
}

/// Loest eine Serveradresse auf (erste gefundene Adresse gilt)
pub async fn adresse_aufloesen(adresse: &str) -> ClientResult<SocketAddr> {
    let (host, port) = host_und_port(adresse);
    let mut treffer = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| ClientFehler::UngueltigeAdresse(format!("{adresse}: {e}")))?;
    treffer
        .next()
        .ok_or_else(|| ClientFehler::UngueltigeAdresse(adresse.to_string()))
}

/// IP, die im Handshake als Client-Adresse angegeben wird
///
/// Fuer lokale und private Ziele bleibt sie leer.
pub fn client_ip(ziel: IpAddr) -> String {
    if ziel.is_unspecified() || ziel.is_loopback() {
        return String::new();
    }
    let lokal = match ziel {
        IpAddr::V4(v4) => v4.is_link_local() || v4.is_private(),
        IpAddr::V6(v6) => {
            let erstes = v6.segments()[0];
            // fe80::/10 link-local, fec0::/10 site-local
            (erstes & 0xffc0) == 0xfe80 || (erstes & 0xffc0) == 0xfec0
        }
    };
    if lokal {
        String::new()
    } else {
        ziel.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adressen_zerlegen() {
        assert_eq!(host_und_port(""), ("127.0.0.1".into(), 9987));
        assert_eq!(host_und_port("ts.example.org"), ("ts.example.org".into(), 9987));
        assert_eq!(host_und_port("ts.example.org:10000"), ("ts.example.org".into(), 10000));
        assert_eq!(host_und_port("ts.example.org:abc"), ("ts.example.org".into(), 9987));
        assert_eq!(host_und_port("10.0.0.1:9988"), ("10.0.0.1".into(), 9988));
        assert_eq!(host_und_port("[::1]:9000"), ("::1".into(), 9000));
        assert_eq!(host_und_port("::1"), ("::1".into(), 9987));
        assert_eq!(host_und_port("[fe80::1]"), ("fe80::1".into(), 9987));
    }

    #[tokio::test]
    async fn ip_adresse_aufloesen() {
        let a = adresse_aufloesen("127.0.0.1:4000").await.unwrap();
        assert_eq!(a, "127.0.0.1:4000".parse().unwrap());
        let a = adresse_aufloesen("").await.unwrap();
        assert_eq!(a.port(), 9987);
    }

    #[test]
    fn lokale_ziele_ohne_client_ip() {
        for ip in ["0.0.0.0", "127.0.0.1", "169.254.1.1", "10.1.2.3", "172.16.0.1", "192.168.1.1", "::1", "fe80::1", "fec0::1"] {
            assert_eq!(client_ip(ip.parse().unwrap()), "", "{ip}");
        }
        assert_eq!(client_ip("8.8.8.8".parse().unwrap()), "8.8.8.8");
        assert_eq!(client_ip("2001:db8::1".parse().unwrap()), "2001:db8::1");
    }
}
