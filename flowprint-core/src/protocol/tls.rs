//! TLS record, handshake, ClientHello/ServerHello and Certificate views.
//!
//! All views borrow from the packet buffer. A handshake that declares
//! more bytes than the segment carries reports the deficit through
//! `additional_bytes_needed`, which the worker uses to start TCP
//! reassembly; nothing is emitted until the message completes or the
//! reassembler reaps it.

use crate::cursor::Cursor;
use crate::fingerprint::{degrease_u16, is_grease_u16, FingerprintBuffer};
use crate::output::JsonObject;
use crate::protocol::MaskAndValue;

/// TLS record types.
mod record_type {
    pub const HANDSHAKE: u8 = 22;
}

/// TLS handshake types.
pub mod handshake_type {
    pub const CLIENT_HELLO: u8 = 1;
    pub const SERVER_HELLO: u8 = 2;
    pub const CERTIFICATE: u8 = 11;
}

/// TLS extension types.
mod extension_type {
    pub const SERVER_NAME: u16 = 0;
    pub const SUPPORTED_GROUPS: u16 = 10;
    pub const APPLICATION_LAYER_PROTOCOL_NEGOTIATION: u16 = 16;
    pub const SUPPORTED_VERSIONS: u16 = 43;
    pub const QUIC_TRANSPORT_PARAMETERS: u16 = 57;
    pub const QUIC_TRANSPORT_PARAMETERS_DRAFT: u16 = 0xffa5;
}

/// Extensions whose data bytes are part of the fingerprint; all other
/// extensions contribute their id only. Fixed set, in numeric order.
const STATIC_EXTENSION_TYPES: [u16; 12] = [1, 5, 7, 10, 11, 13, 15, 16, 21, 27, 43, 45];

pub const CLIENT_HELLO_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0xff, 0xff, 0xfc, 0x00, 0x00, 0xff, 0x00, 0x00],
    [0x16, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00],
);

pub const SERVER_HELLO_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0xff, 0xff, 0xfc, 0x00, 0x00, 0xff, 0x00, 0x00],
    [0x16, 0x03, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00],
);

pub const CERTIFICATE_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0xff, 0xff, 0xfc, 0x00, 0x00, 0xff, 0x00, 0x00],
    [0x16, 0x03, 0x00, 0x00, 0x00, 0x0b, 0x00, 0x00],
);

/// TLS record layer framing.
#[derive(Debug, Clone, Copy)]
pub struct TlsRecord<'a> {
    pub content_type: u8,
    pub version: u16,
    pub fragment: Cursor<'a>,
    /// Bytes the record declares beyond what the segment carries.
    pub additional_bytes_needed: usize,
}

impl<'a> TlsRecord<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let content_type = c.read_u8();
        let version = c.read_u16();
        let length = c.read_u16() as usize;

        let available = c.len();
        let (fragment, deficit) = if length <= available {
            (c.read_slice(length), 0)
        } else {
            (c.read_rest(), length - available)
        };

        TlsRecord {
            content_type,
            version,
            fragment,
            additional_bytes_needed: deficit,
        }
    }

    pub fn is_handshake(&self) -> bool {
        self.content_type == record_type::HANDSHAKE
    }
}

/// Handshake message framing inside a record (or a QUIC crypto buffer).
#[derive(Debug, Clone, Copy)]
pub struct TlsHandshake<'a> {
    pub msg_type: u8,
    pub body: Cursor<'a>,
    pub additional_bytes_needed: usize,
}

impl<'a> TlsHandshake<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let msg_type = c.read_u8();
        let hi = c.read_u8() as usize;
        let length = (hi << 16) | c.read_u16() as usize;

        let available = c.len();
        let (body, deficit) = if length <= available {
            (c.read_slice(length), 0)
        } else {
            (c.read_rest(), length - available)
        };

        TlsHandshake {
            msg_type,
            body,
            additional_bytes_needed: deficit,
        }
    }
}

/// Iterator over TLS extensions.
#[derive(Debug, Clone, Copy)]
pub struct TlsExtensions<'a> {
    raw: &'a [u8],
}

impl<'a> TlsExtensions<'a> {
    pub fn iter(&self) -> ExtensionIter<'a> {
        ExtensionIter {
            c: Cursor::new(self.raw),
        }
    }

    /// Value of extension `id`, if present and well-formed.
    pub fn find(&self, id: u16) -> Option<&'a [u8]> {
        self.iter().find(|(ext_id, _)| *ext_id == id).map(|(_, d)| d)
    }
}

pub struct ExtensionIter<'a> {
    c: Cursor<'a>,
}

impl<'a> Iterator for ExtensionIter<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.c.is_not_empty() {
            return None;
        }
        let id = self.c.read_u16();
        let len = self.c.read_u16() as usize;
        let data = self.c.read_slice(len);
        if self.c.is_null() {
            return None;
        }
        Some((id, data.as_slice()))
    }
}

/// TLS ClientHello view.
#[derive(Debug, Clone, Copy)]
pub struct TlsClientHello<'a> {
    pub version: u16,
    pub random: &'a [u8],
    pub session_id: &'a [u8],
    pub cipher_suites: &'a [u8],
    pub compression_methods: &'a [u8],
    pub extensions: TlsExtensions<'a>,
    /// Set when the hello was carried inside a QUIC Initial; selects the
    /// QUIC fingerprint form.
    pub is_quic_hello: bool,
    valid: bool,
}

impl<'a> TlsClientHello<'a> {
    pub fn null() -> Self {
        TlsClientHello {
            version: 0,
            random: &[],
            session_id: &[],
            cipher_suites: &[],
            compression_methods: &[],
            extensions: TlsExtensions { raw: &[] },
            is_quic_hello: false,
            valid: false,
        }
    }

    /// Parse a ClientHello body (the bytes after the handshake header).
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        Self::parse_inner(c, false)
    }

    /// DTLS variant: a cookie field follows the session id.
    pub fn parse_dtls(c: &mut Cursor<'a>) -> Self {
        Self::parse_inner(c, true)
    }

    fn parse_inner(c: &mut Cursor<'a>, with_cookie: bool) -> Self {
        let version = c.read_u16();
        let random = c.read_slice(32);

        let session_id_len = c.read_u8() as usize;
        let session_id = c.read_slice(session_id_len);

        if with_cookie {
            let cookie_len = c.read_u8() as usize;
            c.skip(cookie_len);
        }

        let cipher_suites_len = c.read_u16() as usize;
        let cipher_suites = c.read_slice(cipher_suites_len);

        let compression_len = c.read_u8() as usize;
        let compression_methods = c.read_slice(compression_len);

        let extensions_len = c.read_u16() as usize;
        let extensions = c.read_slice(extensions_len);

        let valid = !c.is_null() && cipher_suites.len() >= 2;
        TlsClientHello {
            version,
            random: random.as_slice(),
            session_id: session_id.as_slice(),
            cipher_suites: cipher_suites.as_slice(),
            compression_methods: compression_methods.as_slice(),
            extensions: TlsExtensions {
                raw: extensions.as_slice(),
            },
            is_quic_hello: false,
            valid,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    /// Hostname from the server_name extension.
    pub fn server_name(&self) -> Option<&'a str> {
        let data = self.extensions.find(extension_type::SERVER_NAME)?;
        let mut c = Cursor::new(data);
        let list_len = c.read_u16() as usize;
        let mut list = c.read_slice(list_len.min(c.len()));
        while list.is_not_empty() {
            let name_type = list.read_u8();
            let name_len = list.read_u16() as usize;
            let name = list.read_slice(name_len);
            if list.is_null() {
                return None;
            }
            if name_type == 0 {
                return std::str::from_utf8(name.as_slice()).ok();
            }
        }
        None
    }

    /// First ALPN protocol name, if offered.
    pub fn alpn(&self) -> Option<&'a str> {
        let data = self
            .extensions
            .find(extension_type::APPLICATION_LAYER_PROTOCOL_NEGOTIATION)?;
        let mut c = Cursor::new(data);
        let _list_len = c.read_u16();
        let proto_len = c.read_u8() as usize;
        let proto = c.read_slice(proto_len);
        if c.is_null() {
            return None;
        }
        std::str::from_utf8(proto.as_slice()).ok()
    }

    /// `(version)(cipher_suites)(extensions)` with GREASE normalization.
    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        if !self.valid {
            return;
        }
        buf.write_hex_token(&self.version.to_be_bytes());

        buf.open();
        let mut suites = Cursor::new(self.cipher_suites);
        while suites.len() >= 2 {
            buf.write_hex_u16(degrease_u16(suites.read_u16()));
        }
        buf.close();

        buf.open();
        for (id, data) in self.extensions.iter() {
            if self.is_quic_hello
                && (id == extension_type::QUIC_TRANSPORT_PARAMETERS
                    || id == extension_type::QUIC_TRANSPORT_PARAMETERS_DRAFT)
            {
                // transport parameters get their own token with
                // QUIC-specific GREASE handling
                continue;
            }
            fingerprint_extension(buf, id, data);
        }
        buf.close();
    }

    /// QUIC transport parameter ids, canonical GREASE form, one token.
    pub fn quic_transport_parameters_token(&self, buf: &mut FingerprintBuffer) {
        let Some(data) = self
            .extensions
            .find(extension_type::QUIC_TRANSPORT_PARAMETERS)
            .or_else(|| {
                self.extensions
                    .find(extension_type::QUIC_TRANSPORT_PARAMETERS_DRAFT)
            })
        else {
            return;
        };

        buf.open();
        let mut c = Cursor::new(data);
        while c.is_not_empty() {
            let (id, id_raw) = read_varint_with_bytes(&mut c);
            let len = read_varint(&mut c);
            c.skip(len as usize);
            if c.is_null() {
                break;
            }
            if id % 31 == 27 {
                // canonical smallest GREASE id
                buf.write_str("1b");
            } else {
                buf.write_hex(&id_raw);
            }
        }
        buf.close();
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        let mut client = o.open_object("client");
        client.print_key_hex("version", &self.version.to_be_bytes());
        client.print_key_hex("random", self.random);
        client.print_key_hex("session_id", self.session_id);
        client.print_key_hex("cipher_suites", self.cipher_suites);
        client.print_key_hex("compression_methods", self.compression_methods);
        if let Some(name) = self.server_name() {
            client.print_key_string("server_name", name);
        }
        if let Some(alpn) = self.alpn() {
            client.print_key_string("application_layer_protocol_negotiation", alpn);
        }
        client.close();
    }
}

/// One extension as a fingerprint token: `(id[data])`, data only for the
/// static allow-list, GREASE everywhere normalized to 0a0a.
fn fingerprint_extension(buf: &mut FingerprintBuffer, id: u16, data: &[u8]) {
    buf.open();
    buf.write_hex_u16(degrease_u16(id));
    if !is_grease_u16(id) && STATIC_EXTENSION_TYPES.contains(&id) {
        buf.write_hex_u16(data.len() as u16);
        match id {
            extension_type::SUPPORTED_GROUPS => {
                // u16 list length, then u16 values
                let mut c = Cursor::new(data);
                buf.write_hex_u16(c.read_u16());
                while c.len() >= 2 {
                    buf.write_hex_u16(degrease_u16(c.read_u16()));
                }
            }
            extension_type::SUPPORTED_VERSIONS => {
                // u8 list length, then u16 values
                let mut c = Cursor::new(data);
                let list_len = c.read_u8();
                buf.write_hex(&[list_len]);
                while c.len() >= 2 {
                    buf.write_hex_u16(degrease_u16(c.read_u16()));
                }
            }
            _ => buf.write_hex(data),
        }
    }
    buf.close();
}

/// TLS ServerHello view.
#[derive(Debug, Clone, Copy)]
pub struct TlsServerHello<'a> {
    pub version: u16,
    pub random: &'a [u8],
    pub cipher_suite: u16,
    pub compression_method: u8,
    pub extensions: TlsExtensions<'a>,
    valid: bool,
}

impl<'a> TlsServerHello<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let version = c.read_u16();
        let random = c.read_slice(32);
        let session_id_len = c.read_u8() as usize;
        c.skip(session_id_len);
        let cipher_suite = c.read_u16();
        let compression_method = c.read_u8();

        // extensions are absent in TLS 1.1 and earlier hellos
        let extensions = if c.len() >= 2 {
            let extensions_len = c.read_u16() as usize;
            c.read_slice(extensions_len.min(c.len()))
        } else {
            Cursor::new(&[])
        };

        let valid = !c.is_null();
        TlsServerHello {
            version,
            random: random.as_slice(),
            cipher_suite,
            compression_method,
            extensions: TlsExtensions {
                raw: extensions.as_slice(),
            },
            valid,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    /// `(version)(selected_cipher)(extensions)`.
    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        if !self.valid {
            return;
        }
        buf.write_hex_token(&self.version.to_be_bytes());
        buf.write_hex_token(&degrease_u16(self.cipher_suite).to_be_bytes());
        buf.open();
        for (id, data) in self.extensions.iter() {
            fingerprint_extension(buf, id, data);
        }
        buf.close();
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        let mut server = o.open_object("server");
        server.print_key_hex("version", &self.version.to_be_bytes());
        server.print_key_hex("random", self.random);
        server.print_key_hex("cipher_suite", &self.cipher_suite.to_be_bytes());
        server.print_key_hex("compression_method", &[self.compression_method]);
        server.close();
    }
}

/// TLS Certificate message: the certificate chain as raw byte spans.
#[derive(Debug, Clone)]
pub struct TlsServerCertificate<'a> {
    certs: smallvec::SmallVec<[&'a [u8]; 4]>,
    valid: bool,
}

impl<'a> TlsServerCertificate<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let mut certs = smallvec::SmallVec::new();

        let hi = c.read_u8() as usize;
        let list_len = (hi << 16) | c.read_u16() as usize;
        let mut list = c.read_slice(list_len.min(c.len()));

        while list.is_not_empty() {
            let hi = list.read_u8() as usize;
            let cert_len = (hi << 16) | list.read_u16() as usize;
            let cert = list.read_slice(cert_len);
            if list.is_null() {
                break;
            }
            certs.push(cert.as_slice());
        }

        let valid = !certs.is_empty();
        TlsServerCertificate { certs, valid }
    }

    pub fn is_not_empty(&self) -> bool {
        self.valid
    }

    pub fn certs(&self) -> &[&'a [u8]] {
        &self.certs
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.valid {
            return;
        }
        let mut arr = o.open_array("certs");
        for cert in &self.certs {
            let mut entry = arr.open_object();
            entry.print_key_hex("certificate", cert);
            entry.close();
        }
        arr.close();
    }
}

/// QUIC variable-length integer (RFC 9000 Section 16).
pub fn read_varint(c: &mut Cursor<'_>) -> u64 {
    let first = c.read_u8();
    let extra = match first & 0xc0 {
        0xc0 => 7,
        0x80 => 3,
        0x40 => 1,
        _ => 0,
    };
    let mut value = (first & 0x3f) as u64;
    for _ in 0..extra {
        value = value << 8 | c.read_u8() as u64;
    }
    value
}

/// Varint plus its raw encoded bytes (for fingerprinting ids verbatim).
fn read_varint_with_bytes(c: &mut Cursor<'_>) -> (u64, smallvec::SmallVec<[u8; 8]>) {
    let mut raw = smallvec::SmallVec::new();
    let first = c.read_u8();
    raw.push(first);
    let extra = match first & 0xc0 {
        0xc0 => 7,
        0x80 => 3,
        0x40 => 1,
        _ => 0,
    };
    let mut value = (first & 0x3f) as u64;
    for _ in 0..extra {
        let b = c.read_u8();
        raw.push(b);
        value = value << 8 | b as u64;
    }
    (value, raw)
}

#[cfg(test)]
pub(crate) mod test_utils {
    /// Assemble a ClientHello handshake body (no record/handshake
    /// framing) from parts.
    pub fn client_hello_body(
        version: u16,
        cipher_suites: &[u16],
        extensions: &[(u16, Vec<u8>)],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&version.to_be_bytes());
        body.extend_from_slice(&[0u8; 32]); // random
        body.push(0); // session id

        body.extend_from_slice(&((cipher_suites.len() * 2) as u16).to_be_bytes());
        for cs in cipher_suites {
            body.extend_from_slice(&cs.to_be_bytes());
        }
        body.push(1); // compression methods
        body.push(0);

        let mut exts = Vec::new();
        for (id, data) in extensions {
            exts.extend_from_slice(&id.to_be_bytes());
            exts.extend_from_slice(&(data.len() as u16).to_be_bytes());
            exts.extend_from_slice(data);
        }
        body.extend_from_slice(&(exts.len() as u16).to_be_bytes());
        body.extend_from_slice(&exts);
        body
    }

    /// SNI extension data for a hostname.
    pub fn sni_extension(host: &str) -> (u16, Vec<u8>) {
        let mut data = Vec::new();
        data.extend_from_slice(&((host.len() + 3) as u16).to_be_bytes());
        data.push(0);
        data.extend_from_slice(&(host.len() as u16).to_be_bytes());
        data.extend_from_slice(host.as_bytes());
        (0, data)
    }

    /// Wrap a handshake body in handshake + record framing.
    pub fn tls_record(msg_type: u8, body: &[u8]) -> Vec<u8> {
        let mut hs = vec![msg_type];
        hs.push((body.len() >> 16) as u8);
        hs.extend_from_slice(&((body.len() & 0xffff) as u16).to_be_bytes());
        hs.extend_from_slice(body);

        let mut rec = vec![22, 0x03, 0x03];
        rec.extend_from_slice(&(hs.len() as u16).to_be_bytes());
        rec.extend_from_slice(&hs);
        rec
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use crate::fingerprint::{Fingerprint, FingerprintType};

    fn parse_hello(record_bytes: &[u8]) -> (TlsRecord<'_>, TlsHandshake<'_>) {
        let mut c = Cursor::new(record_bytes);
        let record = TlsRecord::parse(&mut c);
        let mut frag = record.fragment;
        let handshake = TlsHandshake::parse(&mut frag);
        (record, handshake)
    }

    #[test]
    fn test_client_hello_roundtrip() {
        let body = client_hello_body(
            0x0303,
            &[0x1301, 0x1302, 0xc02b],
            &[sni_extension("example.com"), (23, vec![]), (65281, vec![0])],
        );
        let rec = tls_record(handshake_type::CLIENT_HELLO, &body);
        let (record, handshake) = parse_hello(&rec);

        assert!(record.is_handshake());
        assert_eq!(handshake.msg_type, handshake_type::CLIENT_HELLO);
        assert_eq!(handshake.additional_bytes_needed, 0);

        let mut body_cursor = handshake.body;
        let hello = TlsClientHello::parse(&mut body_cursor);
        assert!(hello.is_not_empty());
        assert_eq!(hello.version, 0x0303);
        assert_eq!(hello.server_name(), Some("example.com"));
        assert_eq!(hello.cipher_suites.len(), 6);
    }

    #[test]
    fn test_truncated_handshake_reports_deficit() {
        let body = client_hello_body(0x0303, &[0x1301], &[sni_extension("x.test")]);
        let rec = tls_record(handshake_type::CLIENT_HELLO, &body);

        // deliver only the first 40 bytes
        let (_, handshake) = parse_hello(&rec[..40]);
        let expected = body.len() - (40 - 9); // record(5) + handshake(4) headers
        assert_eq!(handshake.additional_bytes_needed, expected);
    }

    #[test]
    fn test_fingerprint_shape_and_determinism() {
        let body = client_hello_body(
            0x0303,
            &[0x1301, 0x1302],
            &[sni_extension("example.com"), (23, vec![]), (65281, vec![0])],
        );
        let rec = tls_record(handshake_type::CLIENT_HELLO, &body);
        let (_, handshake) = parse_hello(&rec);
        let mut bc = handshake.body;
        let hello = TlsClientHello::parse(&mut bc);

        let fp = Fingerprint::build(FingerprintType::Tls, |b| hello.fingerprint(b));
        assert_eq!(fp.as_str(), "tls/1/(0303)(13011302)((0000)(0017)(ff01))");

        let fp2 = Fingerprint::build(FingerprintType::Tls, |b| hello.fingerprint(b));
        assert_eq!(fp.as_str(), fp2.as_str());
    }

    #[test]
    fn test_extension_order_changes_fingerprint() {
        let mk = |exts: &[(u16, Vec<u8>)]| {
            let body = client_hello_body(0x0303, &[0x1301], exts);
            let rec = tls_record(handshake_type::CLIENT_HELLO, &body);
            let mut c = Cursor::new(&rec);
            let record = TlsRecord::parse(&mut c);
            let mut frag = record.fragment;
            let hs = TlsHandshake::parse(&mut frag);
            let mut bc = hs.body;
            let hello = TlsClientHello::parse(&mut bc);
            Fingerprint::build(FingerprintType::Tls, |b| hello.fingerprint(b))
        };

        let a = mk(&[(23, vec![]), (65281, vec![0])]);
        let b = mk(&[(65281, vec![0]), (23, vec![])]);
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_grease_normalization() {
        let mk = |grease: u16| {
            let body = client_hello_body(0x0303, &[grease, 0x1301], &[(grease, vec![])]);
            let rec = tls_record(handshake_type::CLIENT_HELLO, &body);
            let mut c = Cursor::new(&rec);
            let record = TlsRecord::parse(&mut c);
            let mut frag = record.fragment;
            let hs = TlsHandshake::parse(&mut frag);
            let mut bc = hs.body;
            let hello = TlsClientHello::parse(&mut bc);
            Fingerprint::build(FingerprintType::Tls, |b| hello.fingerprint(b))
        };

        // any GREASE value produces the identical fingerprint
        assert_eq!(mk(0x1a1a).as_str(), mk(0xfafa).as_str());
        assert!(mk(0x1a1a).as_str().contains("0a0a"));
    }

    #[test]
    fn test_supported_versions_data_in_fingerprint() {
        // supported_versions (43): list length 2, value 0x0304
        let body = client_hello_body(0x0303, &[0x1301], &[(43, vec![2, 0x03, 0x04])]);
        let rec = tls_record(handshake_type::CLIENT_HELLO, &body);
        let (_, hs) = parse_hello(&rec);
        let mut bc = hs.body;
        let hello = TlsClientHello::parse(&mut bc);

        let fp = Fingerprint::build(FingerprintType::Tls, |b| hello.fingerprint(b));
        assert_eq!(fp.as_str(), "tls/1/(0303)(1301)((002b0003020304))");
    }

    #[test]
    fn test_server_hello() {
        let mut body = Vec::new();
        body.extend_from_slice(&0x0303u16.to_be_bytes());
        body.extend_from_slice(&[0u8; 32]);
        body.push(0); // session id
        body.extend_from_slice(&0xc02fu16.to_be_bytes());
        body.push(0); // compression
        let rec = tls_record(handshake_type::SERVER_HELLO, &body);
        let (_, hs) = parse_hello(&rec);
        assert_eq!(hs.msg_type, handshake_type::SERVER_HELLO);

        let mut bc = hs.body;
        let hello = TlsServerHello::parse(&mut bc);
        assert!(hello.is_not_empty());
        assert_eq!(hello.cipher_suite, 0xc02f);

        let fp = Fingerprint::build(FingerprintType::TlsServer, |b| hello.fingerprint(b));
        assert_eq!(fp.as_str(), "tls_server/1/(0303)(c02f)()");
    }

    #[test]
    fn test_certificate_chain() {
        let cert_a = vec![0xde; 8];
        let cert_b = vec![0xad; 4];
        let mut list = Vec::new();
        for cert in [&cert_a, &cert_b] {
            list.push(0);
            list.extend_from_slice(&(cert.len() as u16).to_be_bytes());
            list.extend_from_slice(cert);
        }
        let mut body = vec![0];
        body.extend_from_slice(&(list.len() as u16).to_be_bytes());
        body.extend_from_slice(&list);

        let mut c = Cursor::new(&body);
        let certs = TlsServerCertificate::parse(&mut c);
        assert!(certs.is_not_empty());
        assert_eq!(certs.certs().len(), 2);
        assert_eq!(certs.certs()[0], &cert_a[..]);
    }

    #[test]
    fn test_malformed_hello_is_empty() {
        let mut c = Cursor::new(&[0x03, 0x03, 0x01]);
        let hello = TlsClientHello::parse(&mut c);
        assert!(!hello.is_not_empty());
    }

    #[test]
    fn test_varint() {
        let mut c = Cursor::new(&[0x25]);
        assert_eq!(read_varint(&mut c), 37);
        let mut c = Cursor::new(&[0x7b, 0xbd]);
        assert_eq!(read_varint(&mut c), 15293);
        let mut c = Cursor::new(&[0x9d, 0x7f, 0x3e, 0x7d]);
        assert_eq!(read_varint(&mut c), 494_878_333);
        let mut c = Cursor::new(&[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c]);
        assert_eq!(read_varint(&mut c), 151_288_809_941_952_652);
    }
}
