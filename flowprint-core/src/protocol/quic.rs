//! QUIC Initial packets: parsing, key derivation, payload decryption and
//! CRYPTO-frame reassembly into the embedded TLS ClientHello.
//!
//! Only IETF QUIC versions (draft-22 through v1) are decrypted. Google
//! QUIC versions are recognized and reported but never decrypted, and no
//! packet after the first Initial is touched.

use crate::crypto::{
    aes128_ecb_mask, aes128_gcm_open, hkdf_expand_label, hkdf_extract_sha256, AES_KEY_LEN,
    HP_KEY_LEN, HP_SAMPLE_LEN, IV_LEN,
};
use crate::cursor::Cursor;
use crate::fingerprint::FingerprintBuffer;
use crate::output::JsonObject;
use crate::protocol::tls::{read_varint, TlsClientHello, TlsHandshake};
use crate::protocol::MaskAndValue;

/// Long header, fixed type bits, dcid length below 0x20.
pub const INITIAL_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0b1011_0000, 0x00, 0x00, 0x00, 0x00, 0xe0, 0x00, 0x00],
    [0b1000_0000, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
);

/// An Initial must ride in a datagram of at least this size.
const MIN_PDU_LEN: usize = 1200;

/// Minimum value of the packet-number-and-payload length field.
const MIN_PN_AND_PAYLOAD: u64 = 64;

/// Decrypted-plaintext scratch size.
const PT_BUF_LEN: usize = 4096;

/// Reassembled CRYPTO stream capacity.
const CRYPTO_BUF_LEN: usize = 4096;

/// Copy of the AAD span with room for the packet-number bytes.
const AAD_BUF_LEN: usize = 1024;

const SALT_D22: [u8; 20] = [
    0x7f, 0xbc, 0xdb, 0x0e, 0x7c, 0x66, 0xbb, 0xe9, 0x19, 0x3a, 0x96, 0xcd, 0x21, 0x51, 0x9e,
    0xbd, 0x7a, 0x02, 0x64, 0x4a,
];
const SALT_D23_D28: [u8; 20] = [
    0xc3, 0xee, 0xf7, 0x12, 0xc7, 0x2e, 0xbb, 0x5a, 0x11, 0xa7, 0xd2, 0x43, 0x2b, 0xb4, 0x63,
    0x65, 0xbe, 0xf9, 0xf5, 0x02,
];
const SALT_D29_D32: [u8; 20] = [
    0xaf, 0xbf, 0xec, 0x28, 0x99, 0x93, 0xd2, 0x4c, 0x9e, 0x97, 0x86, 0xf1, 0x9c, 0x61, 0x11,
    0xe0, 0x43, 0x90, 0xa8, 0x99,
];
const SALT_D33_V1: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c,
    0xad, 0xcc, 0xbb, 0x7f, 0x0a,
];

/// Version-specific salt for the Initial secret; `None` for versions we
/// do not decrypt.
fn initial_salt(version: u32) -> Option<&'static [u8; 20]> {
    match version {
        0xff00_0016 => Some(&SALT_D22),
        0xff00_0017..=0xff00_001c => Some(&SALT_D23_D28),
        0xff00_001d..=0xff00_0020 => Some(&SALT_D29_D32),
        0xff00_0021 | 0xff00_0022 | 0x0000_0001 => Some(&SALT_D33_V1),
        _ => None,
    }
}

fn is_gquic(version: u32) -> bool {
    matches!(version, 0x5130_3433 | 0x5130_3436 | 0x5130_3530) // Q043 Q046 Q050
}

/// Parsed (still protected) Initial packet.
#[derive(Debug, Clone, Copy)]
pub struct QuicInitialPacket<'a> {
    pub connection_info: u8,
    pub version: &'a [u8],
    pub dcid: &'a [u8],
    pub scid: &'a [u8],
    pub token: &'a [u8],
    /// Packet number and payload, still header-protected.
    pub payload: &'a [u8],
    /// Byte 0 through the start of the packet-number area, verbatim.
    pub aad: &'a [u8],
    pub gquic: bool,
    valid: bool,
}

impl<'a> QuicInitialPacket<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let start = c.as_slice();
        let empty = QuicInitialPacket {
            connection_info: 0,
            version: &[],
            dcid: &[],
            scid: &[],
            token: &[],
            payload: &[],
            aad: &[],
            gquic: false,
            valid: false,
        };

        if start.len() < MIN_PDU_LEN {
            return empty;
        }

        let connection_info = c.read_u8();
        // header form 1, long packet type 00
        if connection_info & 0b1011_0000 != 0b1000_0000 {
            return empty;
        }

        let version_bytes = c.read_slice(4);
        let version = u32::from_be_bytes(version_bytes.as_slice().try_into().unwrap_or([0; 4]));
        let gquic = is_gquic(version);
        if initial_salt(version).is_none() && !gquic {
            return empty;
        }

        let dcid_len = c.read_u8() as usize;
        if dcid_len > 20 {
            return empty;
        }
        let dcid = c.read_slice(dcid_len);

        let scid_len = c.read_u8() as usize;
        if scid_len > 20 {
            return empty;
        }
        let scid = c.read_slice(scid_len);

        let token_len = read_varint(c);
        let token = c.read_slice(token_len as usize);

        let length = read_varint(c); // packet number plus payload
        if c.is_null() || length < MIN_PN_AND_PAYLOAD || (c.len() as u64) < length {
            return empty;
        }

        let aad_len = start.len() - c.len();
        let payload = c.read_slice(length as usize);
        if payload.is_empty() || dcid.is_empty() {
            return empty;
        }

        QuicInitialPacket {
            connection_info,
            version: version_bytes.as_slice(),
            dcid: dcid.as_slice(),
            scid: scid.as_slice(),
            token: token.as_slice(),
            payload: payload.as_slice(),
            aad: &start[..aad_len],
            gquic,
            valid: true,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    pub fn version_u32(&self) -> u32 {
        u32::from_be_bytes(self.version.try_into().unwrap_or([0; 4]))
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        let mut bits = String::with_capacity(8);
        for shift in (0..8).rev() {
            bits.push(if self.connection_info >> shift & 1 == 1 {
                '1'
            } else {
                '0'
            });
        }
        o.print_key_string("connection_info", &bits);
        o.print_key_hex("version", self.version);
        o.print_key_hex("dcid", self.dcid);
        o.print_key_hex("scid", self.scid);
        o.print_key_hex("token", self.token);
        o.print_key_hex("data", self.payload);
    }
}

/// ACK frame summary.
#[derive(Debug, Clone, Copy)]
pub struct AckInfo {
    pub largest_acked: u64,
    pub ack_delay: u64,
    pub ack_range_count: u64,
    pub first_ack_range: u64,
}

/// CONNECTION_CLOSE frame summary.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionCloseInfo<'e> {
    pub error_code: u64,
    pub frame_type: u64,
    pub reason: &'e [u8],
}

/// Decryption output borrowed from the engine's scratch buffers.
pub struct InitialPlaintext<'e> {
    pub plaintext: &'e [u8],
    pub crypto: &'e [u8],
    pub ack: Option<AckInfo>,
    pub connection_close: Option<ConnectionCloseInfo<'e>>,
}

/// Per-worker QUIC decryption engine; buffers are reused across packets.
pub struct QuicCryptoEngine {
    plaintext: Box<[u8]>,
    crypto_buffer: Box<[u8]>,
}

impl QuicCryptoEngine {
    pub fn new() -> Self {
        QuicCryptoEngine {
            plaintext: vec![0u8; PT_BUF_LEN].into_boxed_slice(),
            crypto_buffer: vec![0u8; CRYPTO_BUF_LEN].into_boxed_slice(),
        }
    }

    /// Decrypt an Initial payload and reassemble its CRYPTO frames.
    /// Returns `None` on any derivation, length or authentication
    /// failure; no partial plaintext escapes.
    pub fn process<'e>(&'e mut self, pkt: &QuicInitialPacket<'_>) -> Option<InitialPlaintext<'e>> {
        if !pkt.valid || pkt.gquic {
            return None;
        }
        let salt = initial_salt(pkt.version_u32())?;
        if pkt.payload.len() < 4 + HP_SAMPLE_LEN || pkt.aad.len() + 4 > AAD_BUF_LEN {
            return None;
        }

        // RFC 9001 Section 5.2: initial and traffic secrets
        let initial_secret = hkdf_extract_sha256(salt, pkt.dcid);
        let mut client_secret = [0u8; 32];
        hkdf_expand_label(&initial_secret, b"tls13 client in", &mut client_secret).ok()?;
        let mut key = [0u8; AES_KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        let mut hp = [0u8; HP_KEY_LEN];
        hkdf_expand_label(&client_secret, b"tls13 quic key", &mut key).ok()?;
        hkdf_expand_label(&client_secret, b"tls13 quic iv", &mut iv).ok()?;
        hkdf_expand_label(&client_secret, b"tls13 quic hp", &mut hp).ok()?;

        // header protection (RFC 9001 Section 5.4.1): sample 16 bytes at
        // offset 4 past the shortest possible packet number
        let mut sample = [0u8; HP_SAMPLE_LEN];
        sample.copy_from_slice(&pkt.payload[4..4 + HP_SAMPLE_LEN]);
        let mask = aes128_ecb_mask(&hp, &sample);

        let first_byte = pkt.connection_info ^ (mask[0] & 0x0f);
        let pn_length = ((first_byte & 0x03) + 1) as usize;
        if pkt.payload.len() <= pn_length {
            return None;
        }

        // rebuild the AAD with the unmasked first byte and packet number
        let mut aad = [0u8; AAD_BUF_LEN];
        aad[0] = first_byte;
        aad[1..pkt.aad.len()].copy_from_slice(&pkt.aad[1..]);
        let mut aad_len = pkt.aad.len();
        for i in 0..pn_length {
            let pn_byte = pkt.payload[i] ^ mask[1 + i];
            aad[aad_len] = pn_byte;
            aad_len += 1;
            // nonce construction: packet number XORed into the IV tail
            iv[IV_LEN - pn_length + i] ^= pn_byte;
        }

        let ciphertext = &pkt.payload[pn_length..];
        let plaintext_len =
            aes128_gcm_open(&key, &iv, &aad[..aad_len], ciphertext, &mut self.plaintext).ok()?;

        // walk frames, filling the crypto buffer
        self.crypto_buffer.fill(0);
        let mut crypto_len = 0usize;
        let mut ack = None;
        let mut connection_close = None;

        let plaintext = &self.plaintext[..plaintext_len];
        let mut c = Cursor::new(plaintext);
        while c.is_not_empty() {
            let frame_type = c.read_u8();
            match frame_type {
                0x00 | 0x01 => {} // PADDING, PING
                0x02 => {
                    let largest_acked = read_varint(&mut c);
                    let ack_delay = read_varint(&mut c);
                    let ack_range_count = read_varint(&mut c);
                    let first_ack_range = read_varint(&mut c);
                    for _ in 0..ack_range_count.min(256) {
                        read_varint(&mut c); // gap
                        read_varint(&mut c); // range length
                    }
                    if c.is_null() {
                        break;
                    }
                    ack = Some(AckInfo {
                        largest_acked,
                        ack_delay,
                        ack_range_count,
                        first_ack_range,
                    });
                }
                0x06 => {
                    let offset = read_varint(&mut c) as usize;
                    let length = read_varint(&mut c) as usize;
                    let data = c.read_slice(length);
                    if c.is_null() {
                        break;
                    }
                    if offset + length <= CRYPTO_BUF_LEN {
                        self.crypto_buffer[offset..offset + length]
                            .copy_from_slice(data.as_slice());
                        if offset + length > crypto_len {
                            crypto_len = offset + length;
                        }
                    }
                }
                0x1c => {
                    let error_code = read_varint(&mut c);
                    let cc_frame_type = read_varint(&mut c);
                    let reason_len = read_varint(&mut c) as usize;
                    let reason = c.read_slice(reason_len);
                    if c.is_null() {
                        break;
                    }
                    connection_close = Some(ConnectionCloseInfo {
                        error_code,
                        frame_type: cc_frame_type,
                        reason: reason.as_slice(),
                    });
                }
                _ => break, // unknown frame: abort iteration
            }
        }

        Some(InitialPlaintext {
            plaintext,
            crypto: &self.crypto_buffer[..crypto_len],
            ack,
            connection_close,
        })
    }
}

impl Default for QuicCryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully processed initial QUIC message: protected header fields plus,
/// when decryption succeeded, the inner ClientHello.
pub struct QuicInit<'a, 'e> {
    pub packet: QuicInitialPacket<'a>,
    pub hello: TlsClientHello<'e>,
    pub ack: Option<AckInfo>,
    pub connection_close: Option<ConnectionCloseInfo<'e>>,
    /// Payload decryption (including tag verification) succeeded.
    pub decrypted: bool,
}

impl<'a, 'e> QuicInit<'a, 'e> {
    pub fn parse(c: &mut Cursor<'a>, engine: &'e mut QuicCryptoEngine) -> Self {
        let packet = QuicInitialPacket::parse(c);

        let mut hello = TlsClientHello::null();
        let mut ack = None;
        let mut connection_close = None;
        let mut decrypted = false;

        if let Some(initial) = engine.process(&packet) {
            decrypted = true;
            ack = initial.ack;
            connection_close = initial.connection_close;
            if !initial.crypto.is_empty() {
                let mut crypto = Cursor::new(initial.crypto);
                let handshake = TlsHandshake::parse(&mut crypto);
                if handshake.msg_type == super::tls::handshake_type::CLIENT_HELLO {
                    let mut body = handshake.body;
                    hello = TlsClientHello::parse(&mut body);
                    hello.is_quic_hello = true;
                }
            }
        }

        QuicInit {
            packet,
            hello,
            ack,
            connection_close,
            decrypted,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.packet.is_not_empty()
    }

    pub fn has_tls(&self) -> bool {
        self.hello.is_not_empty()
    }

    /// `(quic_version)` then the inner TLS tokens, then the transport
    /// parameter ids.
    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        buf.write_hex_token(self.packet.version);
        if self.hello.is_not_empty() {
            self.hello.fingerprint(buf);
            self.hello.quic_transport_parameters_token(buf);
        }
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        let mut quic = o.open_object("quic");
        self.packet.write_json(&mut quic);
        if let Some(cc) = &self.connection_close {
            let mut cc_obj = quic.open_object("connection_close");
            cc_obj.print_key_uint("error_code", cc.error_code);
            cc_obj.print_key_uint("frame_type", cc.frame_type);
            cc_obj.print_key_json_string("reason_phrase", cc.reason);
            cc_obj.close();
        }
        if let Some(ack) = &self.ack {
            let mut ack_obj = quic.open_object("ack");
            ack_obj.print_key_uint("largest_acked", ack.largest_acked);
            ack_obj.print_key_uint("ack_delay", ack.ack_delay);
            ack_obj.print_key_uint("ack_range_count", ack.ack_range_count);
            ack_obj.print_key_uint("first_ack_range", ack.first_ack_range);
            ack_obj.close();
        }
        quic.close();
    }
}

/// Version negotiation packet (version field zero).
#[derive(Debug, Clone, Copy)]
pub struct QuicVersionNegotiation<'a> {
    pub connection_info: u8,
    pub dcid: &'a [u8],
    pub scid: &'a [u8],
    pub versions: &'a [u8],
    valid: bool,
}

impl<'a> QuicVersionNegotiation<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let empty = QuicVersionNegotiation {
            connection_info: 0,
            dcid: &[],
            scid: &[],
            versions: &[],
            valid: false,
        };

        let connection_info = c.read_u8();
        if connection_info & 0x80 != 0x80 {
            return empty;
        }
        let version = c.read_u32();
        if version != 0 {
            return empty;
        }
        let dcid_len = c.read_u8() as usize;
        let dcid = c.read_slice(dcid_len);
        let scid_len = c.read_u8() as usize;
        let scid = c.read_slice(scid_len);
        let versions = c.read_rest();
        if versions.is_empty() || dcid.is_null() {
            return empty;
        }

        QuicVersionNegotiation {
            connection_info,
            dcid: dcid.as_slice(),
            scid: scid.as_slice(),
            versions: versions.as_slice(),
            valid: true,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        let mut vn = o.open_object("version_negotiation");
        vn.print_key_hex("dcid", self.dcid);
        vn.print_key_hex("scid", self.scid);
        let mut list = vn.open_array("versions");
        for chunk in self.versions.chunks(4) {
            list.print_hex(chunk);
        }
        list.close();
        vn.close();
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::{build_initial, crypto_frame_with_hello};
    use super::*;

    const DCID: [u8; 8] = [0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08];

    #[test]
    fn test_parse_initial_header_fields() {
        let pkt = build_initial(&DCID, &crypto_frame_with_hello("www.example.org"));
        let mut c = Cursor::new(&pkt);
        let initial = QuicInitialPacket::parse(&mut c);

        assert!(initial.is_not_empty());
        assert_eq!(initial.version_u32(), 1);
        assert_eq!(initial.dcid, &DCID);
        assert!(initial.scid.is_empty());
        assert!(initial.token.is_empty());
        assert!(!initial.gquic);
    }

    #[test]
    fn test_decrypt_and_extract_client_hello() {
        let pkt = build_initial(&DCID, &crypto_frame_with_hello("www.example.org"));
        let mut engine = QuicCryptoEngine::new();
        let mut c = Cursor::new(&pkt);
        let init = QuicInit::parse(&mut c, &mut engine);

        assert!(init.is_not_empty());
        assert!(init.has_tls());
        assert!(init.hello.is_quic_hello);
        assert_eq!(init.hello.server_name(), Some("www.example.org"));
    }

    #[test]
    fn test_quic_fingerprint_form() {
        let pkt = build_initial(&DCID, &crypto_frame_with_hello("www.example.org"));
        let mut engine = QuicCryptoEngine::new();
        let mut c = Cursor::new(&pkt);
        let init = QuicInit::parse(&mut c, &mut engine);

        let fp = crate::fingerprint::Fingerprint::build(
            crate::fingerprint::FingerprintType::Quic,
            |b| init.fingerprint(b),
        );
        assert!(fp.as_str().starts_with("quic/1/(00000001)(0303)(130113021303)("));
    }

    #[test]
    fn test_corrupted_payload_fails_closed() {
        let mut pkt = build_initial(&DCID, &crypto_frame_with_hello("www.example.org"));
        let last = pkt.len() - 1;
        pkt[last] ^= 0xff; // break the AEAD tag

        let mut engine = QuicCryptoEngine::new();
        let mut c = Cursor::new(&pkt);
        let init = QuicInit::parse(&mut c, &mut engine);
        assert!(init.is_not_empty()); // header still parses
        assert!(!init.has_tls()); // but no plaintext escapes
    }

    #[test]
    fn test_split_crypto_frames_reassemble() {
        let whole = crypto_frame_with_hello("split.example");
        // the frame is [0x06, offset, 2-byte len, data]; split the data
        let data = &whole[4..];
        let (a, b) = data.split_at(data.len() / 2);

        let mut frames = vec![0x06, 0x00];
        frames.extend_from_slice(&(0x4000u16 | a.len() as u16).to_be_bytes());
        frames.extend_from_slice(a);
        // second frame at its offset, out of order first
        let mut second = vec![0x06];
        second.extend_from_slice(&(0x4000u16 | a.len() as u16).to_be_bytes()); // offset
        second.extend_from_slice(&(0x4000u16 | b.len() as u16).to_be_bytes());
        second.extend_from_slice(b);

        let mut combined = second;
        combined.extend_from_slice(&frames);

        let pkt = build_initial(&DCID, &combined);
        let mut engine = QuicCryptoEngine::new();
        let mut c = Cursor::new(&pkt);
        let init = QuicInit::parse(&mut c, &mut engine);
        assert!(init.has_tls());
        assert_eq!(init.hello.server_name(), Some("split.example"));
    }

    #[test]
    fn test_short_datagram_rejected() {
        let pkt = build_initial(&DCID, &crypto_frame_with_hello("x.test"));
        let mut c = Cursor::new(&pkt[..600]);
        assert!(!QuicInitialPacket::parse(&mut c).is_not_empty());
    }

    #[test]
    fn test_gquic_reported_not_decrypted() {
        let mut pkt = build_initial(&DCID, &crypto_frame_with_hello("x.test"));
        pkt[1..5].copy_from_slice(&0x5130_3433u32.to_be_bytes()); // Q043

        let mut engine = QuicCryptoEngine::new();
        let mut c = Cursor::new(&pkt);
        let init = QuicInit::parse(&mut c, &mut engine);
        assert!(init.is_not_empty());
        assert!(init.packet.gquic);
        assert!(!init.has_tls());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut pkt = build_initial(&DCID, &crypto_frame_with_hello("x.test"));
        pkt[1..5].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        let mut c = Cursor::new(&pkt);
        assert!(!QuicInitialPacket::parse(&mut c).is_not_empty());
    }

    #[test]
    fn test_version_negotiation() {
        let mut pkt = vec![0x80, 0, 0, 0, 0];
        pkt.push(4);
        pkt.extend_from_slice(&[1, 2, 3, 4]);
        pkt.push(0);
        pkt.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0xff, 0x00, 0x00, 0x1d]);

        let mut c = Cursor::new(&pkt);
        let vn = QuicVersionNegotiation::parse(&mut c);
        assert!(vn.is_not_empty());
        assert_eq!(vn.dcid, &[1, 2, 3, 4]);
        assert_eq!(vn.versions.len(), 8);
    }
}
