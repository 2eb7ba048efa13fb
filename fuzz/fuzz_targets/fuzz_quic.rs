//! Fuzz target for QUIC Initial parsing and decryption.
//!
//! Almost every input fails the AEAD tag check; the point is that the
//! header parser, varint reader and frame walk never panic or read out
//! of bounds on hostile bytes.

#![no_main]

use flowprint_core::protocol::quic::{QuicCryptoEngine, QuicInit, QuicVersionNegotiation};
use flowprint_core::Cursor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut engine = QuicCryptoEngine::new();
    let mut c = Cursor::new(data);
    let _ = QuicInit::parse(&mut c, &mut engine);

    let mut c = Cursor::new(data);
    let _ = QuicVersionNegotiation::parse(&mut c);
});
