//! HTTP/1.x request and response views.
//!
//! Headers are reported through a fixed allow-list dictionary: a listed
//! name appears in the fingerprint either as `(name)` or, for names whose
//! value identifies the client or content, as `(name: value)` verbatim.
//! Unlisted headers never reach the fingerprint but are still reported in
//! metadata.

use smallvec::SmallVec;

use crate::cursor::Cursor;
use crate::fingerprint::FingerprintBuffer;
use crate::output::JsonObject;
use crate::protocol::MaskAndValue;

/// Matches the three-uppercase-letter shape of every HTTP method.
pub const REQUEST_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0xe0, 0xe0, 0xe0, 0x80, 0x80, 0x80, 0x80, 0x80],
    [0x40, 0x40, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00],
);

/// Matches `HTTP/1` exactly; must be consulted before the request
/// bitmask.
pub const RESPONSE_MATCHER: MaskAndValue<8> = MaskAndValue::new(
    [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00],
    [b'H', b'T', b'T', b'P', b'/', b'1', 0x00, 0x00],
);

/// Upper bound on parsed headers per message.
const MAX_HEADERS: usize = 20;

/// Request header allow-list: (name, include_value).
const REQUEST_HEADERS: [(&str, bool); 6] = [
    ("user-agent", true),
    ("host", true),
    ("x-forwarded-for", false),
    ("via", false),
    ("upgrade", false),
    ("referer", false),
];

/// Response header allow-list: (name, include_value).
const RESPONSE_HEADERS: [(&str, bool); 4] = [
    ("content-type", true),
    ("content-length", false),
    ("server", true),
    ("via", false),
];

/// One parsed header.
#[derive(Debug, Clone, Copy)]
pub struct HttpHeader<'a> {
    pub name: &'a [u8],
    pub value: &'a [u8],
}

fn name_eq(name: &[u8], expected: &str) -> bool {
    name.len() == expected.len()
        && name
            .iter()
            .zip(expected.as_bytes())
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

/// Parse header lines up to (and consuming) the blank line. Returns the
/// headers and whether the terminating blank line was seen.
fn parse_headers<'a>(c: &mut Cursor<'a>) -> (SmallVec<[HttpHeader<'a>; 8]>, bool) {
    let mut headers = SmallVec::new();
    let mut complete = false;

    while c.is_not_empty() && headers.len() < MAX_HEADERS {
        let line = c.read_up_to_delim(b'\n');
        c.skip(1); // LF
        let mut line_bytes = line.as_slice();
        if line_bytes.ends_with(b"\r") {
            line_bytes = &line_bytes[..line_bytes.len() - 1];
        }
        if line_bytes.is_empty() {
            complete = true;
            break;
        }

        let Some(colon) = line_bytes.iter().position(|&b| b == b':') else {
            break; // malformed line terminates the header block
        };
        let name = &line_bytes[..colon];
        let mut value_start = colon + 1;
        while value_start < line_bytes.len()
            && (line_bytes[value_start] == b' ' || line_bytes[value_start] == b'\t')
        {
            value_start += 1;
        }
        headers.push(HttpHeader {
            name,
            value: &line_bytes[value_start..],
        });
    }

    (headers, complete)
}

fn fingerprint_headers(
    buf: &mut FingerprintBuffer,
    headers: &[HttpHeader<'_>],
    allow_list: &[(&str, bool)],
) {
    for h in headers {
        if let Some((name, include_value)) = allow_list
            .iter()
            .find(|(name, _)| name_eq(h.name, name))
        {
            // names are canonicalized to lowercase so header-case quirks
            // do not fragment clusters; values stay verbatim
            buf.open();
            buf.write_str(name);
            if *include_value {
                buf.write_str(": ");
                for &b in h.value {
                    buf.write_char(b);
                }
            }
            buf.close();
        }
    }
}

fn headers_json(o: &mut JsonObject, headers: &[HttpHeader<'_>]) {
    if headers.is_empty() {
        return;
    }
    let mut arr = o.open_array("headers");
    for h in headers {
        let mut hdr = arr.open_object();
        hdr.print_key_json_string("name", h.name);
        hdr.print_key_json_string("value", h.value);
        hdr.close();
    }
    arr.close();
}

/// HTTP request view.
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub method: &'a [u8],
    pub uri: &'a [u8],
    pub protocol: &'a [u8],
    pub headers: SmallVec<[HttpHeader<'a>; 8]>,
    pub complete: bool,
}

impl<'a> HttpRequest<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let method = c.read_up_to_delim(b' ');
        c.skip(1);
        let uri = c.read_up_to_delim(b' ');
        c.skip(1);
        let request_line = c.read_up_to_delim(b'\n');
        c.skip(1);
        let mut protocol = request_line.as_slice();
        if protocol.ends_with(b"\r") {
            protocol = &protocol[..protocol.len() - 1];
        }

        let (headers, complete) = if c.is_null() {
            (SmallVec::new(), false)
        } else {
            parse_headers(c)
        };

        HttpRequest {
            method: method.as_slice(),
            uri: uri.as_slice(),
            protocol,
            headers,
            complete,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        !self.protocol.is_empty() && self.protocol.starts_with(b"HTTP")
    }

    /// First header matching `name` (ASCII case-insensitive).
    pub fn header(&self, name: &str) -> Option<&'a [u8]> {
        self.headers
            .iter()
            .find(|h| name_eq(h.name, name))
            .map(|h| h.value)
    }

    pub fn user_agent(&self) -> Option<&'a str> {
        std::str::from_utf8(self.header("user-agent")?).ok()
    }

    pub fn host(&self) -> Option<&'a str> {
        std::str::from_utf8(self.header("host")?).ok()
    }

    /// `(method)(version)` followed by allow-listed header tokens.
    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        if !self.is_not_empty() {
            return;
        }
        buf.write_raw_token(self.method);
        buf.write_raw_token(self.protocol);
        fingerprint_headers(buf, &self.headers, &REQUEST_HEADERS);
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.is_not_empty() {
            return;
        }
        let mut req = o.open_object("request");
        req.print_key_json_string("method", self.method);
        req.print_key_json_string("uri", self.uri);
        req.print_key_json_string("protocol", self.protocol);
        headers_json(&mut req, &self.headers);
        req.close();
    }
}

/// HTTP response view.
#[derive(Debug, Clone)]
pub struct HttpResponse<'a> {
    pub version: &'a [u8],
    pub status_code: &'a [u8],
    pub status_reason: &'a [u8],
    pub headers: SmallVec<[HttpHeader<'a>; 8]>,
    pub complete: bool,
}

impl<'a> HttpResponse<'a> {
    pub fn parse(c: &mut Cursor<'a>) -> Self {
        let version = c.read_up_to_delim(b' ');
        c.skip(1);
        let status_code = c.read_up_to_delim(b' ');
        c.skip(1);
        let reason_line = c.read_up_to_delim(b'\n');
        c.skip(1);
        let mut status_reason = reason_line.as_slice();
        if status_reason.ends_with(b"\r") {
            status_reason = &status_reason[..status_reason.len() - 1];
        }

        let (headers, complete) = if c.is_null() {
            (SmallVec::new(), false)
        } else {
            parse_headers(c)
        };

        HttpResponse {
            version: version.as_slice(),
            status_code: status_code.as_slice(),
            status_reason,
            headers,
            complete,
        }
    }

    pub fn is_not_empty(&self) -> bool {
        !self.status_code.is_empty() && self.version.starts_with(b"HTTP")
    }

    /// `(status)(version)` followed by allow-listed header tokens.
    pub fn fingerprint(&self, buf: &mut FingerprintBuffer) {
        if !self.is_not_empty() {
            return;
        }
        buf.write_raw_token(self.status_code);
        buf.write_raw_token(self.version);
        fingerprint_headers(buf, &self.headers, &RESPONSE_HEADERS);
    }

    pub fn write_json(&self, o: &mut JsonObject) {
        if !self.is_not_empty() {
            return;
        }
        let mut resp = o.open_object("response");
        resp.print_key_json_string("version", self.version);
        resp.print_key_json_string("status_code", self.status_code);
        resp.print_key_json_string("status_reason", self.status_reason);
        headers_json(&mut resp, &self.headers);
        resp.close();
    }
}
