//! DTLS record and ClientHello views.
//!
//! DTLS reuses the TLS handshake structure with an epoch/sequence record
//! header and per-message fragmentation fields; only the ClientHello (and
//! the ServerHello's existence) matter for fingerprinting.

use crate::cursor::Cursor;
use crate::fingerprint::FingerprintBuffer;
use crate::output::JsonObject;
use crate::protocol::tls::TlsClientHello;
use crate::protocol::MaskAndValue;

pub const CLIENT_HELLO_MATCHER: MaskAndValue<16> = MaskAndValue::new(
    [
        0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x00,
        0x00,
    ],
    [
        0x16, 0xfe, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
        0x00,
    ],
);

pub const SERVER_HELLO_MATCHER: MaskAndValue<16> = MaskAndValue::new(
    [
        0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x00,
        0x00,
    ],
    [
        0x16, 0xfe, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00,
        0x00,
    ],
);

/// DTLS record plus handshake framing; `body` is the handshake fragment.
#[derive(Debug, Clone, Copy)]
pub struct DtlsRecord<'a> {
    pub content_type: u8,
    pub version: u16,
    pub epoch: u16,
    pub msg_type: u8,
    pub body: Cursor<'a>,
    valid: bool,
}

impl<'a> DtlsRecord<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let content_type = c.read_u8();
        let version = c.read_u16();
        let epoch = c.read_u16();
        c.skip(6); // record sequence number
        let record_len = c.read_u16() as usize;
        let mut fragment = c.read_slice(record_len.min(c.len()));

        // handshake header with fragmentation fields
        let msg_type = fragment.read_u8();
        fragment.skip(3); // length
        fragment.skip(2); // message_seq
        fragment.skip(3); // fragment_offset
        fragment.skip(3); // fragment_length

        let valid = content_type == 22 && (version >> 8) == 0xfe && !fragment.is_null();
        DtlsRecord {
            content_type,
            version,
            epoch,
            msg_type,
            body: fragment,
            valid,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }
}

/// DTLS ClientHello: the TLS view plus the cookie field.
#[derive(Debug, Clone, Copy)]
pub struct DtlsClientHello<'a> {
    pub record: DtlsRecord<'a>,
    pub hello: TlsClientHello<'a>,
}

impl<'a> DtlsClientHello<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let record = DtlsRecord::parse(c);
        let hello = if record.is_not_empty() && record.msg_type == 1 {
            let mut body = record.body;
            TlsClientHello::parse_dtls(&mut body)
        } else {
            TlsClientHello::null()
        };
        DtlsClientHello { record, hello }
    }

    pub fn is_not_empty(&self) -> bool {
        self.hello.is_not_empty()
    }

    /// Same token order as TLS, under the `dtls` type tag.
    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        self.hello.fingerprint(buf);
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.is_not_empty() {
            return;
        }
        let mut dtls = o.open_object("dtls");
        dtls.print_key_hex("version", &self.record.version.to_be_bytes());
        dtls.print_key_uint("epoch", self.record.epoch as u64);
        self.hello.write_json(&mut dtls);
        dtls.close();
    }
}
