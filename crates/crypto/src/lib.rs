//! # tsvoice-crypto
//!
//! Identitaeten, Lizenzkette, Init1-Handshake und Paketverschluesselung.
//!
//! ## Module
//! - `identity` - P-256 Identitaet, Sicherheitslevel, TS-Exportformat
//! - `der` - ASN.1/DER Schluesselformat (oeffentlich/privat/beides)
//! - `edwards` - Curve25519-Edwards Punkte fuer Lizenz und `clientek`
//! - `license` - Lizenzkette aus `initivexpand2`
//! - `handshake` - INIT1 Cookie-Austausch und RSA-Puzzle
//! - `tscrypt` - EAX-Verschluesselung, Schluesselableitung, Fake-Signatur
//! - `error` - Fehlertypen

pub mod der;
pub mod edwards;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod license;
pub mod tscrypt;

// Bequeme Re-Exports
pub use edwards::{generate_temporary_key, TempKey};
pub use error::{CryptoError, CryptoResult};
pub use handshake::Init1Schritt;
pub use identity::{
    hash_password, is_ts_identity_format, uid_from_public_key, verify_sign, Identity,
    KeyOffsetErgebnis,
};
pub use license::{LicenseBlock, Licenses};
pub use tscrypt::{TsCrypt, INIT_VERSION};
