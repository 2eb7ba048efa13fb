//! Fuzz target for the TLS record / handshake / ClientHello parsers.

#![no_main]

use flowprint_core::fingerprint::{Fingerprint, FingerprintType};
use flowprint_core::protocol::tls::{TlsClientHello, TlsHandshake, TlsRecord};
use flowprint_core::Cursor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut c = Cursor::new(data);
    let record = TlsRecord::parse(&mut c);
    let mut frag = record.fragment;
    let handshake = TlsHandshake::parse(&mut frag);
    let mut body = handshake.body;
    let hello = TlsClientHello::parse(&mut body);
    if hello.is_not_empty() {
        let _ = hello.server_name();
        let _ = hello.alpn();
        let _ = Fingerprint::build(FingerprintType::Tls, |b| hello.fingerprint(b));
    }
});
